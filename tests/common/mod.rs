#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use rusqlite::{Connection, params};
use std::path::Path;

use clipscript::core::item::{ClipboardItem, ContentType};
use clipscript::core::script::UserScript;
use clipscript::core::store::sqlite::SCHEMA;
use clipscript::scripts::capabilities::{
    ClipboardWriter, Dialog, HostCapabilities, HttpProxy, HttpRequest, HttpResponse,
};

#[derive(Default)]
pub struct RecordingClipboard {
    pub writes: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl RecordingClipboard {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClipboardWriter for RecordingClipboard {
    async fn write_text(&self, text: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.writes.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Answers every request with the same canned response.
pub struct CannedHttp {
    pub requests: Mutex<Vec<HttpRequest>>,
    pub response: HttpResponse,
}

impl CannedHttp {
    pub fn ok(body: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            response: HttpResponse {
                status: 200,
                status_text: "OK".to_string(),
                headers: BTreeMap::from([(
                    "content-type".to_string(),
                    "application/json".to_string(),
                )]),
                body: body.to_string(),
            },
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpProxy for CannedHttp {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        Ok(self.response.clone())
    }
}

pub struct UnreachableHttp;

#[async_trait]
impl HttpProxy for UnreachableHttp {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse> {
        Err(anyhow!("connection refused: {}", request.url))
    }
}

#[derive(Default)]
pub struct RecordingDialog {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingDialog {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dialog for RecordingDialog {
    async fn alert(&self, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

pub struct Host {
    pub dialog: Arc<RecordingDialog>,
    pub clipboard: Arc<RecordingClipboard>,
    pub http: Arc<CannedHttp>,
}

impl Host {
    pub fn new() -> Self {
        Self {
            dialog: Arc::new(RecordingDialog::default()),
            clipboard: Arc::new(RecordingClipboard::default()),
            http: Arc::new(CannedHttp::ok(r#"{"ok":true}"#)),
        }
    }

    pub fn capabilities(&self) -> HostCapabilities {
        HostCapabilities::new(self.dialog.clone())
            .with_clipboard(self.clipboard.clone())
            .with_http(self.http.clone())
    }
}

pub fn text_item(id: &str, content: &str) -> ClipboardItem {
    ClipboardItem {
        id: id.to_string(),
        ..ClipboardItem::from_text(content, ContentType::Text)
    }
}

/// Writes rows the way the clipboard application does, so the read-only
/// store has something to open.
pub struct SeedDb {
    db: Connection,
}

impl SeedDb {
    pub fn create(path: &Path) -> Self {
        let db = Connection::open(path).unwrap();
        db.execute_batch(SCHEMA).unwrap();
        Self { db }
    }

    pub fn item(&self, item: &ClipboardItem) -> &Self {
        self.db
            .execute(
                "INSERT INTO clipboard_items
                 (id, content, content_type, content_hash, image_data, file_paths, file_info,
                  timestamp, source, char_count, word_count, is_favorite)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    item.id,
                    item.content,
                    item.content_type.as_str(),
                    item.content_hash,
                    item.image_data,
                    item.file_paths,
                    item.file_info,
                    item.timestamp.map(|ts| ts.to_rfc3339()).unwrap_or_default(),
                    item.source,
                    item.char_count,
                    item.word_count,
                    item.is_favorite as i64,
                ],
            )
            .unwrap();
        self
    }

    pub fn script(&self, script: &UserScript) -> &Self {
        let content_types: Vec<&str> = script.content_type.iter().map(|t| t.as_str()).collect();
        self.db
            .execute(
                "INSERT INTO user_scripts
                 (id, name, enabled, trigger, content_types, keywords, script, description,
                  sort_order, plugin_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    script.id,
                    script.name,
                    script.enabled as i64,
                    script.trigger,
                    serde_json::to_string(&content_types).unwrap(),
                    serde_json::to_string(&script.keywords).unwrap(),
                    script.script,
                    script.description,
                    script.sort_order,
                    script.plugin_id,
                ],
            )
            .unwrap();
        self
    }
}
