//! Host functions a script can be granted, and the ports that back them.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::core::config::HttpConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `csRequest(method, url, headers_json, body)`
    Request,
    /// `csCopyText(text)`
    CopyText,
}

impl Capability {
    pub const ALL: [Capability; 2] = [Capability::Request, Capability::CopyText];

    pub fn name(&self) -> &'static str {
        match self {
            Capability::Request => "csRequest",
            Capability::CopyText => "csCopyText",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cap| cap.name() == name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl HttpRequest {
    /// Build a request from the four script-side arguments. `headers_json`
    /// is a JSON object of string values; blank means no headers.
    pub fn from_script_args(method: &str, url: &str, headers_json: &str, body: &str) -> Result<Self> {
        let headers = if headers_json.trim().is_empty() {
            BTreeMap::new()
        } else {
            let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(headers_json)
                .map_err(|e| anyhow!("headers must be a JSON object: {}", e))?;
            raw.into_iter()
                .map(|(key, value)| {
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, value)
                })
                .collect()
        };
        let method = if method.trim().is_empty() {
            "GET".to_string()
        } else {
            method.trim().to_uppercase()
        };
        Ok(Self {
            method,
            url: url.to_string(),
            headers,
            body: body.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    /// JSON text handed back to the script.
    pub fn to_descriptor(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[async_trait]
pub trait HttpProxy: Send + Sync {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[async_trait]
pub trait ClipboardWriter: Send + Sync {
    async fn write_text(&self, text: &str) -> Result<()>;
}

/// Modal notification. Resolves once the user dismissed it.
#[async_trait]
pub trait Dialog: Send + Sync {
    async fn alert(&self, message: &str) -> Result<()>;
}

/// Host implementations available to scripts. `alert` always exists; the
/// others are only bound when both implemented here and imported by the
/// script.
#[derive(Clone)]
pub struct HostCapabilities {
    pub dialog: Arc<dyn Dialog>,
    pub http: Option<Arc<dyn HttpProxy>>,
    pub clipboard: Option<Arc<dyn ClipboardWriter>>,
}

impl HostCapabilities {
    pub fn new(dialog: Arc<dyn Dialog>) -> Self {
        Self {
            dialog,
            http: None,
            clipboard: None,
        }
    }

    pub fn headless() -> Self {
        Self::new(Arc::new(LogDialog))
    }

    pub fn with_http(mut self, http: Arc<dyn HttpProxy>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_clipboard(mut self, clipboard: Arc<dyn ClipboardWriter>) -> Self {
        self.clipboard = Some(clipboard);
        self
    }

    pub fn implements(&self, capability: Capability) -> bool {
        match capability {
            Capability::Request => self.http.is_some(),
            Capability::CopyText => self.clipboard.is_some(),
        }
    }
}

/// Dialog for runs without a user in front of them: the message is logged
/// and dismissed immediately.
pub struct LogDialog;

#[async_trait]
impl Dialog for LogDialog {
    async fn alert(&self, message: &str) -> Result<()> {
        info!("Script alert: {}", message);
        Ok(())
    }
}

pub struct ReqwestHttpProxy {
    client: reqwest::Client,
}

impl ReqwestHttpProxy {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProxy for ReqwestHttpProxy {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| anyhow!("invalid HTTP method '{}'", request.method))?;
        info!("Script HTTP request: {} {}", method, request.url);

        let mut builder = self.client.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(key, value)| {
                (
                    key.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).to_string(),
                )
            })
            .collect();
        let body = response.text().await?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
        })
    }
}
