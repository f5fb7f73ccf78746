use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub events: EventConfig,
}

/// Limits applied to every script run.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Wall-clock bound per script, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Total operation budget per run; 0 disables the budget.
    #[serde(default)]
    pub max_operations: u64,

    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,

    #[serde(default = "default_max_expr_depth")]
    pub max_expr_depth: usize,

    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,

    #[serde(default = "default_max_collection_size")]
    pub max_array_size: usize,

    #[serde(default = "default_max_collection_size")]
    pub max_map_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_timeout_ms() -> u64 {
    10_000
}
fn default_max_call_levels() -> usize {
    64
}
fn default_max_expr_depth() -> usize {
    64
}
fn default_max_string_size() -> usize {
    10 * 1024 * 1024
}
fn default_max_collection_size() -> usize {
    100_000
}
fn default_http_timeout_ms() -> u64 {
    30_000
}
fn default_user_agent() -> String {
    "clipscript".to_string()
}
fn default_channel_capacity() -> usize {
    256
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_operations: 0,
            max_call_levels: default_max_call_levels(),
            max_expr_depth: default_max_expr_depth(),
            max_string_size: default_max_string_size(),
            max_array_size: default_max_collection_size(),
            max_map_size: default_max_collection_size(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_http_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl EngineConfig {
    /// `<config dir>/clipscript/engine.toml`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("clipscript").join("engine.toml"))
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = path.as_ref();
        if !config_path.exists() {
            info!(
                "No engine config at {:?}, using default limits.",
                config_path
            );
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(config_path).await?;
        let mut config: EngineConfig = toml::from_str(&content)?;
        config.sanitize();

        info!(
            "Loaded engine config: timeout={}ms, max_ops={}, http_timeout={}ms",
            config.execution.timeout_ms,
            if config.execution.max_operations > 0 {
                config.execution.max_operations.to_string()
            } else {
                "unlimited".to_string()
            },
            config.http.timeout_ms
        );
        Ok(config)
    }

    /// Zero values would either disable the time bound or make every run
    /// fail, so they fall back to defaults.
    fn sanitize(&mut self) {
        if self.execution.timeout_ms == 0 {
            warn!("execution.timeout_ms = 0 is not allowed, using default");
            self.execution.timeout_ms = default_timeout_ms();
        }
        if self.execution.max_call_levels == 0 {
            self.execution.max_call_levels = default_max_call_levels();
        }
        if self.execution.max_expr_depth == 0 {
            self.execution.max_expr_depth = default_max_expr_depth();
        }
        if self.http.timeout_ms == 0 {
            warn!("http.timeout_ms = 0 is not allowed, using default");
            self.http.timeout_ms = default_http_timeout_ms();
        }
        if self.events.channel_capacity == 0 {
            self.events.channel_capacity = default_channel_capacity();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_timeout() {
        let config = EngineConfig::default();
        assert_eq!(config.execution.timeout_ms, 10_000);
        assert_eq!(config.execution.timeout(), Duration::from_secs(10));
        assert_eq!(config.execution.max_operations, 0);
        assert_eq!(config.http.user_agent, "clipscript");
        assert_eq!(config.events.channel_capacity, 256);
    }

    #[tokio::test]
    async fn load_missing_file_returns_default() {
        let tmpdir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(tmpdir.path().join("engine.toml"))
            .await
            .unwrap();
        assert_eq!(config.execution.timeout_ms, 10_000);
    }

    #[tokio::test]
    async fn load_partial_file_keeps_other_defaults() {
        let tmpdir = tempfile::tempdir().unwrap();
        let path = tmpdir.path().join("engine.toml");
        std::fs::write(
            &path,
            r#"
[execution]
timeout_ms = 2500
max_operations = 1000000

[http]
user_agent = "my-agent"
"#,
        )
        .unwrap();

        let config = EngineConfig::load(&path).await.unwrap();
        assert_eq!(config.execution.timeout_ms, 2500);
        assert_eq!(config.execution.max_operations, 1_000_000);
        assert_eq!(config.execution.max_call_levels, 64);
        assert_eq!(config.http.user_agent, "my-agent");
        assert_eq!(config.http.timeout_ms, 30_000);
    }

    #[tokio::test]
    async fn load_replaces_zero_timeouts() {
        let tmpdir = tempfile::tempdir().unwrap();
        let path = tmpdir.path().join("engine.toml");
        std::fs::write(
            &path,
            "[execution]\ntimeout_ms = 0\n\n[http]\ntimeout_ms = 0\n\n[events]\nchannel_capacity = 0\n",
        )
        .unwrap();

        let config = EngineConfig::load(&path).await.unwrap();
        assert_eq!(config.execution.timeout_ms, 10_000);
        assert_eq!(config.http.timeout_ms, 30_000);
        assert_eq!(config.events.channel_capacity, 256);
    }

    #[tokio::test]
    async fn load_rejects_malformed_toml() {
        let tmpdir = tempfile::tempdir().unwrap();
        let path = tmpdir.path().join("engine.toml");
        std::fs::write(&path, "[execution\ntimeout_ms = ").unwrap();
        assert!(EngineConfig::load(&path).await.is_err());
    }
}
