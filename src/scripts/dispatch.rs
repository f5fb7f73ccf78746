//! Capture-side half of the pipeline: decides right after an entry is saved
//! whether any script should run, and builds the request for the executor.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::coordinator::ExecutionRequest;
use super::matcher;
use crate::core::item::ClipboardItem;
use crate::core::script::trigger;
use crate::core::store::ScriptStore;

pub struct TriggerDispatcher {
    scripts: Arc<dyn ScriptStore>,
}

impl TriggerDispatcher {
    pub fn new(scripts: Arc<dyn ScriptStore>) -> Self {
        Self { scripts }
    }

    pub async fn after_save(&self, item: &ClipboardItem) -> Option<ExecutionRequest> {
        self.prepare(trigger::AFTER_SAVE, item).await
    }

    /// Pre-filter the enabled scripts of `trigger` against `item`. The
    /// request carries the matched ids and a snapshot without image bytes.
    pub async fn prepare(&self, trigger: &str, item: &ClipboardItem) -> Option<ExecutionRequest> {
        let scripts = match self.scripts.get_enabled_scripts_by_trigger(trigger).await {
            Ok(scripts) => scripts,
            Err(e) => {
                error!("Failed to load {} scripts: {}", trigger, e);
                return None;
            }
        };

        let matched: Vec<String> = scripts
            .into_iter()
            .filter(|script| matcher::matches(script, item))
            .map(|script| script.id)
            .collect();

        if matched.is_empty() {
            info!("No matching {} scripts for item {}", trigger, item.id);
            return None;
        }

        info!(
            "Found {} matching {} scripts for item {}, sending to executor",
            matched.len(),
            trigger,
            item.id
        );
        Some(
            ExecutionRequest::new(item.id.clone(), trigger)
                .with_script_ids(matched)
                .with_item(item.without_image_data()),
        )
    }

    /// `after_save` plus delivery. Returns whether a request was sent.
    pub async fn notify_saved(
        &self,
        item: &ClipboardItem,
        tx: &mpsc::Sender<ExecutionRequest>,
    ) -> bool {
        let Some(request) = self.after_save(item).await else {
            return false;
        };
        if tx.send(request).await.is_err() {
            warn!("Script executor is not running, request for item {} dropped", item.id);
            return false;
        }
        true
    }
}
