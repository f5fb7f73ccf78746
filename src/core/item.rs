use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Content-type tag of a captured clipboard entry.
///
/// Tags are compared as strings, so an unknown tag coming from the capture
/// subsystem is kept verbatim instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
    Text,
    Image,
    File,
    Url,
    Color,
    Json,
    Other(String),
}

impl ContentType {
    pub fn as_str(&self) -> &str {
        match self {
            ContentType::Text => "Text",
            ContentType::Image => "Image",
            ContentType::File => "File",
            ContentType::Url => "URL",
            ContentType::Color => "Color",
            ContentType::Json => "JSON",
            ContentType::Other(tag) => tag,
        }
    }
}

impl From<&str> for ContentType {
    fn from(tag: &str) -> Self {
        match tag {
            "Text" => ContentType::Text,
            "Image" => ContentType::Image,
            "File" => ContentType::File,
            "URL" => ContentType::Url,
            "Color" => ContentType::Color,
            "JSON" => ContentType::Json,
            other => ContentType::Other(other.to_string()),
        }
    }
}

impl From<String> for ContentType {
    fn from(tag: String) -> Self {
        ContentType::from(tag.as_str())
    }
}

impl From<ContentType> for String {
    fn from(content_type: ContentType) -> Self {
        content_type.as_str().to_string()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured clipboard entry as stored by the capture subsystem.
///
/// Field names on the wire are PascalCase and `ImageData` travels as base64,
/// matching what the capture side emits. `IsFavorite` is accepted either as a
/// boolean or as a 0/1 integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClipboardItem {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub content: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub image_data: Option<Vec<u8>>,
    #[serde(default)]
    pub file_paths: String,
    #[serde(default)]
    pub file_info: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub char_count: i64,
    #[serde(default)]
    pub word_count: i64,
    #[serde(default, deserialize_with = "flag")]
    pub is_favorite: bool,
}

impl ClipboardItem {
    /// Build a text-like item the way the capture subsystem would: hashes the
    /// content and fills the character/word counters.
    pub fn from_text(content: impl Into<String>, content_type: ContentType) -> Self {
        let content = content.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_hash: content_hash(&content),
            char_count: content.chars().count() as i64,
            word_count: content.split_whitespace().count() as i64,
            content,
            content_type,
            image_data: None,
            file_paths: String::new(),
            file_info: String::new(),
            timestamp: Some(Utc::now()),
            source: String::new(),
            is_favorite: false,
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type == ContentType::Image
    }

    /// True for picture entries whose binary payload was left out of the
    /// snapshot and still has to be fetched from the store.
    pub fn is_missing_image_data(&self) -> bool {
        self.is_image() && self.image_data.as_ref().is_none_or(|bytes| bytes.is_empty())
    }

    /// Copy of this item without the image payload, as sent over the
    /// execution-request channel.
    pub fn without_image_data(&self) -> Self {
        Self {
            image_data: None,
            ..self.clone()
        }
    }

    /// Read-only projection handed to a script.
    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id.clone(),
            content: self.content.clone(),
            content_type: self.content_type.as_str().to_string(),
            content_hash: self.content_hash.clone(),
            image_data: self
                .image_data
                .as_deref()
                .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes))
                .unwrap_or_default(),
            file_paths: self.file_paths.clone(),
            file_info: self.file_info.clone(),
            timestamp: self
                .timestamp
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_default(),
            source: self.source.clone(),
            char_count: self.char_count,
            word_count: self.word_count,
            is_favorite: self.is_favorite,
        }
    }
}

/// Hex SHA-256 of the entry content, used by the capture side for dedup.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Detached, owned copy of the item fields a script may read. Timestamps are
/// normalized to RFC 3339 in UTC; image bytes are base64 text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemSnapshot {
    #[serde(rename = "ID")]
    pub id: String,
    pub content: String,
    pub content_type: String,
    pub content_hash: String,
    pub image_data: String,
    pub file_paths: String,
    pub file_info: String,
    pub timestamp: String,
    pub source: String,
    pub char_count: i64,
    pub word_count: i64,
    pub is_favorite: bool,
}

impl ItemSnapshot {
    /// Combined byte length of all string fields.
    pub fn text_len(&self) -> usize {
        [
            &self.id,
            &self.content,
            &self.content_type,
            &self.content_hash,
            &self.image_data,
            &self.file_paths,
            &self.file_info,
            &self.timestamp,
            &self.source,
        ]
        .iter()
        .map(|s| s.len())
        .sum()
    }
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(n)) => n != 0,
        None => false,
    })
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => serializer
                .serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Option::<String>::deserialize(deserializer)?;
        match encoded.as_deref() {
            None | Some("") => Ok(None),
            Some(text) => base64::engine::general_purpose::STANDARD
                .decode(text)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_round_trips_known_and_unknown_tags() {
        assert_eq!(ContentType::from("URL"), ContentType::Url);
        assert_eq!(ContentType::from("JSON").as_str(), "JSON");
        let odd = ContentType::from("RichText");
        assert_eq!(odd, ContentType::Other("RichText".to_string()));
        assert_eq!(odd.to_string(), "RichText");
    }

    #[test]
    fn deserializes_capture_side_payload() {
        let raw = r#"{
            "ID": "42",
            "Content": "hello world",
            "ContentType": "Text",
            "ContentHash": "abc",
            "FilePaths": "",
            "FileInfo": "",
            "Timestamp": "2024-05-01T08:30:00+08:00",
            "Source": "Terminal",
            "CharCount": 11,
            "WordCount": 2,
            "IsFavorite": 1
        }"#;
        let item: ClipboardItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.id, "42");
        assert_eq!(item.content_type, ContentType::Text);
        assert!(item.is_favorite);
        assert!(item.image_data.is_none());
        assert_eq!(item.snapshot().timestamp, "2024-05-01T00:30:00.000Z");
    }

    #[test]
    fn image_data_travels_as_base64() {
        let mut item = ClipboardItem::from_text("", ContentType::Image);
        item.image_data = Some(vec![0x89, 0x50, 0x4e, 0x47]);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["ImageData"], "iVBORw==");

        let back: ClipboardItem = serde_json::from_value(json).unwrap();
        assert_eq!(back.image_data, Some(vec![0x89, 0x50, 0x4e, 0x47]));
        assert_eq!(back.snapshot().image_data, "iVBORw==");
    }

    #[test]
    fn image_without_payload_is_flagged_for_hydration() {
        let mut item = ClipboardItem::from_text("", ContentType::Image);
        assert!(item.is_missing_image_data());
        item.image_data = Some(Vec::new());
        assert!(item.is_missing_image_data());
        item.image_data = Some(vec![1]);
        assert!(!item.is_missing_image_data());
        assert!(item.without_image_data().is_missing_image_data());

        let text = ClipboardItem::from_text("hi", ContentType::Text);
        assert!(!text.is_missing_image_data());
    }

    #[test]
    fn from_text_fills_counters_and_hash() {
        let item = ClipboardItem::from_text("héllo  wörld", ContentType::Text);
        assert_eq!(item.char_count, 12);
        assert_eq!(item.word_count, 2);
        assert_eq!(item.content_hash.len(), 64);
        assert_eq!(item.content_hash, content_hash("héllo  wörld"));
    }

    #[test]
    fn text_len_counts_encoded_image() {
        let mut item = ClipboardItem::from_text("abc", ContentType::Text);
        item.id = "i".to_string();
        item.timestamp = None;
        item.image_data = Some(vec![0u8; 3]);
        // "i" + "abc" + "Text" + 64-char hash + "AAAA"
        assert_eq!(item.snapshot().text_len(), 76);
    }

    #[test]
    fn snapshot_without_timestamp_is_empty_string() {
        let mut item = ClipboardItem::from_text("x", ContentType::Text);
        item.timestamp = None;
        assert_eq!(item.snapshot().timestamp, "");
    }
}
