use serde::{Deserialize, Deserializer, Serialize};

use super::item::ContentType;

/// Trigger names the capture pipeline fires. Scripts may bind to any other
/// string as well; these are only the ones the host emits itself.
pub mod trigger {
    pub const BEFORE_SAVE: &str = "before_save";
    pub const AFTER_SAVE: &str = "after_save";
    pub const ON_COPY: &str = "on_copy";
    pub const MANUAL: &str = "manual";
}

/// A user-authored automation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserScript {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub trigger: String,
    /// Content-type allow-list; empty means every type.
    #[serde(default, deserialize_with = "nullable_vec")]
    pub content_type: Vec<ContentType>,
    /// Plain substrings or `/pattern/flags` entries; empty means no constraint.
    #[serde(default, deserialize_with = "nullable_vec")]
    pub keywords: Vec<String>,
    pub script: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default, rename = "PluginID")]
    pub plugin_id: String,
}

impl UserScript {
    pub fn new(id: impl Into<String>, name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            trigger: trigger::AFTER_SAVE.to_string(),
            content_type: Vec::new(),
            keywords: Vec::new(),
            script: script.into(),
            description: String::new(),
            sort_order: 0,
            plugin_id: String::new(),
        }
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = trigger.into();
        self
    }

    pub fn with_content_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ContentType>,
    {
        self.content_type = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_keywords<I, T>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sort_order(mut self, sort_order: i64) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// The capture side serializes empty lists as `null`.
fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
