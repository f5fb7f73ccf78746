use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use super::capabilities::HostCapabilities;
use super::events::{EventBus, ScriptEvent};
use super::matcher;
use super::sandbox::Sandbox;
use super::ScriptResult;
use crate::core::config::EngineConfig;
use crate::core::item::ClipboardItem;
use crate::core::script::UserScript;
use crate::core::store::{ItemStore, ScriptStore};

/// Signal asking for the scripts of one item to run.
///
/// A non-empty `script_ids` means the sender already filtered scripts and the
/// coordinator runs exactly those. `item` spares a lookup when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub item_id: String,
    pub trigger: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<ClipboardItem>,
}

impl ExecutionRequest {
    pub fn new(item_id: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            trigger: trigger.into(),
            script_ids: None,
            item: None,
        }
    }

    pub fn with_script_ids(mut self, ids: Vec<String>) -> Self {
        self.script_ids = Some(ids);
        self
    }

    pub fn with_item(mut self, item: ClipboardItem) -> Self {
        self.item = Some(item);
        self
    }

    fn preselected_ids(&self) -> Option<&[String]> {
        self.script_ids.as_deref().filter(|ids| !ids.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchStatus {
    Completed,
    NoScripts,
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutcome {
    pub script_id: String,
    pub script_name: String,
    pub result: ScriptResult,
}

/// What happened to one request. Returned for observability only; nothing
/// in it is an error the caller must act on.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub item_id: String,
    pub trigger: String,
    pub status: BatchStatus,
    pub outcomes: Vec<ScriptOutcome>,
}

impl BatchReport {
    fn new(request: &ExecutionRequest, status: BatchStatus) -> Self {
        Self {
            item_id: request.item_id.clone(),
            trigger: request.trigger.clone(),
            status,
            outcomes: Vec::new(),
        }
    }

    pub fn script_ids(&self) -> Vec<&str> {
        self.outcomes.iter().map(|o| o.script_id.as_str()).collect()
    }
}

pub struct ExecutionCoordinator {
    items: Arc<dyn ItemStore>,
    scripts: Arc<dyn ScriptStore>,
    sandbox: Sandbox,
}

impl ExecutionCoordinator {
    pub fn new(items: Arc<dyn ItemStore>, scripts: Arc<dyn ScriptStore>, sandbox: Sandbox) -> Self {
        Self {
            items,
            scripts,
            sandbox,
        }
    }

    pub fn from_config(
        items: Arc<dyn ItemStore>,
        scripts: Arc<dyn ScriptStore>,
        host: HostCapabilities,
        config: &EngineConfig,
    ) -> Self {
        let events = EventBus::new(config.events.channel_capacity);
        let sandbox = Sandbox::new(host, config.execution.clone(), events);
        Self::new(items, scripts, sandbox)
    }

    pub fn events(&self) -> &EventBus {
        self.sandbox.events()
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Resolve the item and its scripts, then run them one after another.
    pub async fn handle(&self, request: ExecutionRequest) -> BatchReport {
        let item = match self.resolve_item(&request).await {
            Ok(item) => item,
            Err(reason) => {
                error!("Script batch for item {} aborted: {}", request.item_id, reason);
                return BatchReport::new(&request, BatchStatus::Aborted(reason));
            }
        };

        let scripts = match self.resolve_scripts(&request, &item).await {
            Ok(scripts) => scripts,
            Err(reason) => {
                error!("Script batch for item {} aborted: {}", request.item_id, reason);
                return BatchReport::new(&request, BatchStatus::Aborted(reason));
            }
        };

        if scripts.is_empty() {
            info!(
                "No matching {} scripts for item {}",
                request.trigger, request.item_id
            );
            return BatchReport::new(&request, BatchStatus::NoScripts);
        }

        info!(
            "Found {} matching {} scripts for item {}, executing...",
            scripts.len(),
            request.trigger,
            request.item_id
        );

        let mut report = BatchReport::new(&request, BatchStatus::Completed);
        for script in scripts {
            info!("Executing script [{}]", script.name);
            let result = self.sandbox.execute(&script, &item).await;
            self.events().publish(ScriptEvent::Finished {
                item_id: item.id.clone(),
                script_id: script.id.clone(),
                script_name: script.name.clone(),
                result: result.clone(),
            });
            report.outcomes.push(ScriptOutcome {
                script_id: script.id,
                script_name: script.name,
                result,
            });
        }
        report
    }

    /// Consume requests until the channel closes. Each request gets its own
    /// task, so separate batches run concurrently. The returned handle
    /// resolves once the channel is closed and every batch has finished.
    pub fn listen(self: Arc<Self>, mut rx: mpsc::Receiver<ExecutionRequest>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Script executor listening for execution requests");
            let mut batches = JoinSet::new();
            while let Some(request) = rx.recv().await {
                let coordinator = self.clone();
                batches.spawn(async move { coordinator.handle(request).await });
                while let Some(done) = batches.try_join_next() {
                    if let Err(e) = done {
                        error!("Script batch task failed: {}", e);
                    }
                }
            }
            while let Some(done) = batches.join_next().await {
                if let Err(e) = done {
                    error!("Script batch task failed: {}", e);
                }
            }
            info!("Execution request channel closed, script executor stopped");
        })
    }

    async fn resolve_item(&self, request: &ExecutionRequest) -> Result<ClipboardItem, String> {
        if let Some(snapshot) = &request.item {
            let mut item = snapshot.clone();
            if item.is_missing_image_data() {
                match self.items.get_item_by_id(&request.item_id).await {
                    Ok(Some(full)) if full.image_data.as_ref().is_some_and(|b| !b.is_empty()) => {
                        item.image_data = full.image_data;
                    }
                    Ok(_) => warn!("No image data stored for item {}", request.item_id),
                    Err(e) => warn!(
                        "Failed to load image data for item {}: {}",
                        request.item_id, e
                    ),
                }
            }
            return Ok(item);
        }

        match self.items.get_item_by_id(&request.item_id).await {
            Ok(Some(item)) => Ok(item),
            Ok(None) => Err(format!("clipboard item {} not found", request.item_id)),
            Err(e) => Err(format!("failed to load clipboard item: {}", e)),
        }
    }

    async fn resolve_scripts(
        &self,
        request: &ExecutionRequest,
        item: &ClipboardItem,
    ) -> Result<Vec<UserScript>, String> {
        if let Some(ids) = request.preselected_ids() {
            let scripts = self
                .scripts
                .get_scripts_by_ids(ids)
                .await
                .map_err(|e| format!("failed to load scripts by id: {}", e))?;
            if scripts.is_empty() {
                return Err(format!("none of the {} requested scripts exist", ids.len()));
            }
            return Ok(scripts);
        }

        let scripts = self
            .scripts
            .get_enabled_scripts_by_trigger(&request.trigger)
            .await
            .map_err(|e| format!("failed to load {} scripts: {}", request.trigger, e))?;
        Ok(scripts
            .into_iter()
            .filter(|script| matcher::matches(script, item))
            .collect())
    }
}
