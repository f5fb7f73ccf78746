//! Read-only lookups the engine consumes. The capture subsystem owns the
//! data; the engine never writes back.

pub mod sqlite;

pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::item::ClipboardItem;
use super::script::UserScript;

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn get_item_by_id(&self, id: &str) -> Result<Option<ClipboardItem>>;
}

#[async_trait]
pub trait ScriptStore: Send + Sync {
    /// Enabled scripts bound to `trigger`, highest `sort_order` first.
    async fn get_enabled_scripts_by_trigger(&self, trigger: &str) -> Result<Vec<UserScript>>;

    /// Scripts with the given ids, in the order the ids were given. Unknown
    /// ids are skipped.
    async fn get_scripts_by_ids(&self, ids: &[String]) -> Result<Vec<UserScript>>;
}

/// In-process store, used by the CLI for ad-hoc runs and by tests.
#[derive(Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, ClipboardItem>>,
    // Insertion order is the tie-breaker for equal sort orders.
    scripts: RwLock<Vec<UserScript>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, item: ClipboardItem) -> Self {
        self.items.get_mut().insert(item.id.clone(), item);
        self
    }

    pub fn with_script(mut self, script: UserScript) -> Self {
        self.scripts.get_mut().push(script);
        self
    }

    pub async fn insert_item(&self, item: ClipboardItem) {
        self.items.write().await.insert(item.id.clone(), item);
    }

    pub async fn insert_script(&self, script: UserScript) {
        let mut scripts = self.scripts.write().await;
        scripts.retain(|existing| existing.id != script.id);
        scripts.push(script);
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn get_item_by_id(&self, id: &str) -> Result<Option<ClipboardItem>> {
        Ok(self.items.read().await.get(id).cloned())
    }
}

#[async_trait]
impl ScriptStore for MemoryStore {
    async fn get_enabled_scripts_by_trigger(&self, trigger: &str) -> Result<Vec<UserScript>> {
        let mut matched: Vec<UserScript> = self
            .scripts
            .read()
            .await
            .iter()
            .filter(|s| s.enabled && s.trigger == trigger)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.sort_order.cmp(&a.sort_order));
        Ok(matched)
    }

    async fn get_scripts_by_ids(&self, ids: &[String]) -> Result<Vec<UserScript>> {
        let scripts = self.scripts.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| scripts.iter().find(|s| &s.id == id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::item::ContentType;

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_item(ClipboardItem {
                id: "i1".to_string(),
                ..ClipboardItem::from_text("hello", ContentType::Text)
            })
            .with_script(UserScript::new("low", "Low", "1").with_sort_order(1))
            .with_script(UserScript::new("high", "High", "2").with_sort_order(9))
            .with_script(UserScript::new("off", "Off", "3").disabled())
            .with_script(UserScript::new("copy", "Copy", "4").with_trigger("on_copy"))
    }

    #[tokio::test]
    async fn item_lookup_returns_none_for_unknown_id() {
        let store = store();
        assert!(store.get_item_by_id("i1").await.unwrap().is_some());
        assert!(store.get_item_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn trigger_lookup_filters_disabled_and_orders_by_sort_order() {
        let store = store();
        let ids: Vec<String> = store
            .get_enabled_scripts_by_trigger("after_save")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn id_lookup_keeps_requested_order_and_skips_unknown() {
        let store = store();
        let ids = vec!["copy".to_string(), "ghost".to_string(), "off".to_string()];
        let found: Vec<String> = store
            .get_scripts_by_ids(&ids)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(found, vec!["copy", "off"]);
    }

    #[tokio::test]
    async fn insert_script_replaces_same_id() {
        let store = store();
        store
            .insert_script(UserScript::new("low", "Renamed", "5").with_sort_order(1))
            .await;
        let ids = vec!["low".to_string()];
        let found = store.get_scripts_by_ids(&ids).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Renamed");
    }
}
