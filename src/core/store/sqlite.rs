use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params, params_from_iter};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{ItemStore, ScriptStore};
use crate::core::item::{ClipboardItem, ContentType};
use crate::core::script::UserScript;

const ITEM_COLUMNS: &str = "id, content, content_type, COALESCE(content_hash, ''), image_data, \
     COALESCE(file_paths, ''), COALESCE(file_info, ''), timestamp, COALESCE(source, ''), \
     COALESCE(char_count, 0), COALESCE(word_count, 0), COALESCE(is_favorite, 0)";

const SCRIPT_COLUMNS: &str = "id, name, enabled, trigger, COALESCE(content_types, ''), \
     COALESCE(keywords, ''), script, COALESCE(description, ''), COALESCE(sort_order, 0), \
     COALESCE(plugin_id, '')";

/// The tables this adapter reads, as the clipboard application creates them.
pub const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS clipboard_items (
        id TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        content_type TEXT NOT NULL,
        content_hash TEXT,
        image_data BLOB,
        file_paths TEXT,
        file_info TEXT,
        timestamp DATETIME NOT NULL,
        source TEXT,
        char_count INTEGER,
        word_count INTEGER,
        is_favorite INTEGER DEFAULT 0,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE IF NOT EXISTS user_scripts (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        enabled INTEGER DEFAULT 1,
        trigger TEXT NOT NULL,
        content_types TEXT,
        keywords TEXT,
        script TEXT NOT NULL,
        description TEXT,
        sort_order INTEGER DEFAULT 0,
        plugin_id TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_script_trigger ON user_scripts(trigger);";

const REQUIRED_TABLES: [&str; 2] = ["clipboard_items", "user_scripts"];

/// Read-only adapter over the clipboard application's SQLite database
/// (`clipboard_items` and `user_scripts` tables).
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open an existing database read-only. Fails when the file is missing or
    /// does not carry both tables.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("failed to open clipboard database {:?}", path))?;
        check_schema(&db).with_context(|| format!("{:?} is not a clipboard database", path))?;
        info!("Opened clipboard database at {:?} (read-only)", path);
        Ok(Self::from_connection(db))
    }

    pub fn from_connection(db: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }
}

fn check_schema(db: &Connection) -> Result<()> {
    for table in REQUIRED_TABLES {
        let found: Option<String> = db
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        if found.is_none() {
            bail!("missing table `{}`", table);
        }
    }
    Ok(())
}

struct ItemRow {
    id: String,
    content: String,
    content_type: String,
    content_hash: String,
    image_data: Option<Vec<u8>>,
    file_paths: String,
    file_info: String,
    timestamp: Option<String>,
    source: String,
    char_count: i64,
    word_count: i64,
    is_favorite: i64,
}

impl ItemRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            content: row.get(1)?,
            content_type: row.get(2)?,
            content_hash: row.get(3)?,
            image_data: row.get(4)?,
            file_paths: row.get(5)?,
            file_info: row.get(6)?,
            timestamp: row.get(7)?,
            source: row.get(8)?,
            char_count: row.get(9)?,
            word_count: row.get(10)?,
            is_favorite: row.get(11)?,
        })
    }

    fn into_item(self) -> ClipboardItem {
        ClipboardItem {
            timestamp: self.timestamp.as_deref().and_then(parse_timestamp),
            id: self.id,
            content: self.content,
            content_type: ContentType::from(self.content_type),
            content_hash: self.content_hash,
            image_data: self.image_data.filter(|bytes| !bytes.is_empty()),
            file_paths: self.file_paths,
            file_info: self.file_info,
            source: self.source,
            char_count: self.char_count,
            word_count: self.word_count,
            is_favorite: self.is_favorite != 0,
        }
    }
}

struct ScriptRow {
    id: String,
    name: String,
    enabled: i64,
    trigger: String,
    content_types: String,
    keywords: String,
    script: String,
    description: String,
    sort_order: i64,
    plugin_id: String,
}

impl ScriptRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            enabled: row.get(2)?,
            trigger: row.get(3)?,
            content_types: row.get(4)?,
            keywords: row.get(5)?,
            script: row.get(6)?,
            description: row.get(7)?,
            sort_order: row.get(8)?,
            plugin_id: row.get(9)?,
        })
    }

    fn into_script(self) -> UserScript {
        let content_types: Vec<String> = parse_json_list(&self.id, "content_types", &self.content_types);
        UserScript {
            content_type: content_types.into_iter().map(ContentType::from).collect(),
            keywords: parse_json_list(&self.id, "keywords", &self.keywords),
            id: self.id,
            name: self.name,
            enabled: self.enabled != 0,
            trigger: self.trigger,
            script: self.script,
            description: self.description,
            sort_order: self.sort_order,
            plugin_id: self.plugin_id,
        }
    }
}

fn parse_json_list(script_id: &str, column: &str, raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Option<Vec<String>>>(raw) {
        Ok(list) => list.unwrap_or_default(),
        Err(e) => {
            warn!(
                "Script [{}]: ignoring unreadable {} column: {}",
                script_id, column, e
            );
            Vec::new()
        }
    }
}

/// Accepts RFC 3339 as well as the `YYYY-MM-DD HH:MM:SS[.fff][+hh:mm]` form
/// SQLite drivers tend to write. Naive values are taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl ItemStore for SqliteStore {
    async fn get_item_by_id(&self, id: &str) -> Result<Option<ClipboardItem>> {
        let db = self.db.lock().await;
        let sql = format!("SELECT {} FROM clipboard_items WHERE id = ?1", ITEM_COLUMNS);
        let row = db
            .query_row(&sql, params![id], ItemRow::from_row)
            .optional()?;
        Ok(row.map(ItemRow::into_item))
    }
}

#[async_trait]
impl ScriptStore for SqliteStore {
    async fn get_enabled_scripts_by_trigger(&self, trigger: &str) -> Result<Vec<UserScript>> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {} FROM user_scripts WHERE enabled = 1 AND trigger = ?1
             ORDER BY sort_order DESC, created_at DESC",
            SCRIPT_COLUMNS
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(params![trigger], ScriptRow::from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?.into_script());
        }
        Ok(results)
    }

    async fn get_scripts_by_ids(&self, ids: &[String]) -> Result<Vec<UserScript>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let db = self.db.lock().await;
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT {} FROM user_scripts WHERE id IN ({})",
            SCRIPT_COLUMNS, placeholders
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), ScriptRow::from_row)?;

        let mut found = Vec::new();
        for row in rows {
            found.push(row?.into_script());
        }

        // IN (...) has no defined order; hand them back in request order.
        Ok(ids
            .iter()
            .filter_map(|id| found.iter().find(|s| &s.id == id).cloned())
            .collect())
    }
}
