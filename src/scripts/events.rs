use serde::Serialize;
use tokio::sync::broadcast;

use super::ScriptResult;

pub const STREAM_START: &str = "script-stream-start";
pub const STREAM_CHUNK: &str = "script-stream-chunk";
pub const STREAM_END: &str = "script-stream-end";

/// Everything observers learn about running scripts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ScriptEvent {
    StreamStart {
        item_id: String,
    },
    StreamChunk {
        item_id: String,
        chunk: String,
    },
    StreamEnd {
        item_id: String,
    },
    Finished {
        item_id: String,
        script_id: String,
        script_name: String,
        result: ScriptResult,
    },
}

impl ScriptEvent {
    /// Map a script-side `dispatch_event(name, detail)` call onto an event.
    /// The item id always comes from the running item.
    pub fn from_progress(
        name: &str,
        item_id: &str,
        detail: &serde_json::Value,
    ) -> Result<Self, String> {
        let item_id = item_id.to_string();
        match name {
            STREAM_START => Ok(ScriptEvent::StreamStart { item_id }),
            STREAM_CHUNK => {
                let chunk = match detail.get("chunk") {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(serde_json::Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                Ok(ScriptEvent::StreamChunk { item_id, chunk })
            }
            STREAM_END => Ok(ScriptEvent::StreamEnd { item_id }),
            other => Err(format!("unknown event '{}'", other)),
        }
    }

    pub fn item_id(&self) -> &str {
        match self {
            ScriptEvent::StreamStart { item_id }
            | ScriptEvent::StreamChunk { item_id, .. }
            | ScriptEvent::StreamEnd { item_id }
            | ScriptEvent::Finished { item_id, .. } => item_id,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScriptEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScriptEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ScriptEvent) {
        let _ = self.sender.send(event); // no subscribers is fine
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
