//! Metadata storage with SQLite
//!
//! One [`MetadataStore`] wraps one connection. Every increment is applied
//! inside a single transaction; readers on other connections see either
//! the state before or after it (WAL mode).

mod aggregates;
mod schema;

pub use aggregates::{
    DayActivity, FileHotspot, FileTouch, HourCount, Overview, ToolUsage, TopicCount,
    WeekdayCount,
};
pub use schema::SCHEMA;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::PipelineResult;
use crate::ingest::Increment;
use crate::report::TimeWindow;
use crate::sync::{CursorSet, SyncCursor};

pub struct MetadataStore {
    conn: Connection,
}

impl MetadataStore {
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an existing store without write access, for reports and search.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!(
                "No store at {} (run `insights sync` first)",
                path.display()
            );
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    /// A connection for one sync worker. The schema must already exist.
    pub fn connect(path: &Path) -> PipelineResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(schema::PRAGMAS)?;
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ============================================
    // INCREMENTS
    // ============================================

    /// Apply one increment atomically.
    ///
    /// Safe to call twice with the same increment: facts are inserted with
    /// `OR IGNORE` under their offset keys and counts are recomputed.
    pub fn apply_increment(&self, increment: &Increment) -> PipelineResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        if increment.reset {
            delete_conversation(&tx, &increment.conversation_id)?;
        }

        upsert_conversation(&tx, increment)?;
        insert_messages(&tx, increment)?;
        append_tool_use_events(&tx, increment)?;

        for topic in &increment.topics {
            tx.execute(
                "INSERT OR IGNORE INTO topics (conversation_id, topic) VALUES (?, ?)",
                params![increment.conversation_id, topic],
            )?;
        }

        tx.execute(
            r#"UPDATE conversations SET
                   message_count = (SELECT COUNT(*) FROM messages WHERE conversation_id = ?1),
                   user_messages = (SELECT COUNT(*) FROM messages
                                    WHERE conversation_id = ?1 AND role = 'user'),
                   assistant_messages = (SELECT COUNT(*) FROM messages
                                         WHERE conversation_id = ?1 AND role = 'assistant')
               WHERE id = ?1"#,
            params![increment.conversation_id],
        )?;

        tx.commit()?;

        debug!(
            conversation = %increment.conversation_id,
            to = increment.end_offset,
            "applied increment"
        );
        Ok(())
    }

    // ============================================
    // CURSORS
    // ============================================

    pub fn load_cursors(&self) -> Result<CursorSet> {
        let mut stmt = self.conn.prepare(
            "SELECT source_path, byte_offset, record_count, file_len FROM sync_cursors",
        )?;
        let rows = stmt.query_map([], |row| {
            let path: String = row.get(0)?;
            Ok((
                PathBuf::from(path),
                SyncCursor {
                    offset: row.get::<_, i64>(1)? as u64,
                    records: row.get::<_, i64>(2)? as u64,
                    file_len: row.get::<_, i64>(3)? as u64,
                },
            ))
        })?;

        let mut cursors = CursorSet::default();
        for row in rows {
            let (path, cursor) = row?;
            cursors.insert(path, cursor);
        }
        Ok(cursors)
    }

    pub fn save_cursor(&self, source_path: &Path, cursor: &SyncCursor) -> PipelineResult<()> {
        self.conn.execute(
            r#"INSERT INTO sync_cursors (source_path, byte_offset, record_count, file_len, updated_at)
               VALUES (?, ?, ?, ?, datetime('now'))
               ON CONFLICT(source_path) DO UPDATE SET
                   byte_offset = excluded.byte_offset,
                   record_count = excluded.record_count,
                   file_len = excluded.file_len,
                   updated_at = excluded.updated_at"#,
            params![
                source_path.to_string_lossy().to_string(),
                cursor.offset as i64,
                cursor.records as i64,
                cursor.file_len as i64,
            ],
        )?;
        Ok(())
    }

    // ============================================
    // CONVERSATIONS
    // ============================================

    pub fn get_conversation(&self, id: &str) -> PipelineResult<Option<ConversationRow>> {
        let sql = format!(
            "SELECT {} FROM conversations c WHERE c.id = ?1 OR c.external_id = ?1 LIMIT 1",
            CONVERSATION_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![id], map_conversation)
            .optional()?;
        Ok(row)
    }

    pub fn list_conversations(&self, limit: usize) -> Result<Vec<ConversationRow>> {
        let sql = format!(
            "SELECT {} FROM conversations c ORDER BY c.started_at DESC, c.id LIMIT ?",
            CONVERSATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], map_conversation)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Conversations whose opening/closing message or topics mention `query`
    pub fn keyword_search(
        &self,
        query: &str,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<Vec<ConversationRow>> {
        let (from, to) = window.bounds();
        let sql = format!(
            r#"SELECT {} FROM conversations c
               WHERE (c.first_user_message LIKE ?1
                      OR c.last_assistant_message LIKE ?1
                      OR EXISTS (SELECT 1 FROM topics t
                                 WHERE t.conversation_id = c.id AND t.topic LIKE ?1))
                 AND (?2 IS NULL OR c.started_at >= ?2)
                 AND (?3 IS NULL OR c.started_at < ?3)
               ORDER BY c.started_at DESC, c.id
               LIMIT ?4"#,
            CONVERSATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![format!("%{}%", query), from, to, limit as i64],
            map_conversation,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Conversations that touched a file matching `pattern` (substring)
    pub fn conversations_by_file(&self, pattern: &str, limit: usize) -> Result<Vec<ConversationRow>> {
        let sql = format!(
            r#"SELECT {} FROM conversations c
               WHERE EXISTS (SELECT 1 FROM tool_use_events e
                             WHERE e.conversation_id = c.id AND e.file_path LIKE ?1)
               ORDER BY c.started_at DESC, c.id
               LIMIT ?2"#,
            CONVERSATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![format!("%{}%", pattern), limit as i64],
            map_conversation,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Conversations that used a tool whose name matches `name` (substring)
    pub fn conversations_by_tool(&self, name: &str, limit: usize) -> Result<Vec<ConversationRow>> {
        let sql = format!(
            r#"SELECT {} FROM conversations c
               WHERE EXISTS (SELECT 1 FROM tool_use_events e
                             WHERE e.conversation_id = c.id AND e.tool_name LIKE ?1)
               ORDER BY c.started_at DESC, c.id
               LIMIT ?2"#,
            CONVERSATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![format!("%{}%", name), limit as i64], map_conversation)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn conversation_topics(&self, id: &str) -> PipelineResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT topic FROM topics WHERE conversation_id = ? ORDER BY topic")?;
        let rows = stmt.query_map(params![id], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Distinct files touched by a conversation, in first-touch order
    pub fn conversation_files(&self, id: &str) -> PipelineResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT file_path FROM tool_use_events
               WHERE conversation_id = ? AND file_path IS NOT NULL
               GROUP BY file_path
               ORDER BY MIN(byte_offset), file_path"#,
        )?;
        let rows = stmt.query_map(params![id], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn conversation_tools(&self, id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT tool_name FROM tool_use_events WHERE conversation_id = ?
               GROUP BY tool_name ORDER BY COUNT(*) DESC, tool_name"#,
        )?;
        let rows = stmt.query_map(params![id], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// The facts an embedding is computed from
    pub fn embedding_document(&self, id: &str) -> PipelineResult<Option<EmbeddingDocument>> {
        let Some(conversation) = self.get_conversation(id)? else {
            return Ok(None);
        };
        Ok(Some(EmbeddingDocument {
            topics: self.conversation_topics(&conversation.id)?,
            files: self.conversation_files(&conversation.id)?,
            timestamp: conversation.last_activity(),
            first_user_message: conversation.first_user_message,
            last_assistant_message: conversation.last_assistant_message,
            conversation_id: conversation.id,
        }))
    }

    pub fn all_conversation_ids(&self) -> PipelineResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM conversations ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Row counts of every fact table
    pub fn counts(&self) -> Result<StoreCounts> {
        let count = |table: &str| -> Result<i64> {
            let n = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n)
        };
        Ok(StoreCounts {
            conversations: count("conversations")?,
            messages: count("messages")?,
            tool_uses: count("tool_use_events")?,
            topics: count("topics")?,
        })
    }
}

// ============================================
// WRITE HELPERS
// ============================================

fn delete_conversation(conn: &Connection, id: &str) -> rusqlite::Result<()> {
    for table in ["messages", "tool_use_events", "topics"] {
        conn.execute(
            &format!("DELETE FROM {} WHERE conversation_id = ?", table),
            params![id],
        )?;
    }
    conn.execute("DELETE FROM conversations WHERE id = ?", params![id])?;
    Ok(())
}

/// Insert the conversation or widen the existing row with this increment.
fn upsert_conversation(conn: &Connection, inc: &Increment) -> rusqlite::Result<()> {
    conn.execute(
        r#"INSERT INTO conversations
           (id, external_id, source_path, project_path, started_at, ended_at,
            first_user_message, first_user_offset, last_assistant_message,
            last_assistant_offset, ingested_offset, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
           ON CONFLICT(id) DO UPDATE SET
               project_path = COALESCE(conversations.project_path, excluded.project_path),
               started_at = CASE
                   WHEN conversations.started_at IS NULL OR excluded.started_at < conversations.started_at
                   THEN excluded.started_at ELSE conversations.started_at END,
               ended_at = CASE
                   WHEN conversations.ended_at IS NULL OR excluded.ended_at > conversations.ended_at
                   THEN excluded.ended_at ELSE conversations.ended_at END,
               first_user_message = CASE
                   WHEN excluded.first_user_offset IS NOT NULL
                        AND (conversations.first_user_offset IS NULL
                             OR excluded.first_user_offset < conversations.first_user_offset)
                   THEN excluded.first_user_message ELSE conversations.first_user_message END,
               first_user_offset = CASE
                   WHEN excluded.first_user_offset IS NOT NULL
                        AND (conversations.first_user_offset IS NULL
                             OR excluded.first_user_offset < conversations.first_user_offset)
                   THEN excluded.first_user_offset ELSE conversations.first_user_offset END,
               last_assistant_message = CASE
                   WHEN excluded.last_assistant_offset IS NOT NULL
                        AND (conversations.last_assistant_offset IS NULL
                             OR excluded.last_assistant_offset >= conversations.last_assistant_offset)
                   THEN excluded.last_assistant_message ELSE conversations.last_assistant_message END,
               last_assistant_offset = CASE
                   WHEN excluded.last_assistant_offset IS NOT NULL
                        AND (conversations.last_assistant_offset IS NULL
                             OR excluded.last_assistant_offset >= conversations.last_assistant_offset)
                   THEN excluded.last_assistant_offset ELSE conversations.last_assistant_offset END,
               ingested_offset = MAX(conversations.ingested_offset, excluded.ingested_offset),
               updated_at = excluded.updated_at"#,
        params![
            inc.conversation_id,
            inc.external_id,
            inc.source_path.to_string_lossy().to_string(),
            inc.project_path,
            inc.first_timestamp.as_ref().map(format_ts),
            inc.last_timestamp.as_ref().map(format_ts),
            inc.first_user_message.as_ref().map(|e| e.text.as_str()),
            inc.first_user_message.as_ref().map(|e| e.offset as i64),
            inc.last_assistant_message.as_ref().map(|e| e.text.as_str()),
            inc.last_assistant_message.as_ref().map(|e| e.offset as i64),
            inc.end_offset as i64,
        ],
    )?;
    Ok(())
}

fn insert_messages(conn: &Connection, inc: &Increment) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO messages (conversation_id, byte_offset, role, timestamp)
         VALUES (?, ?, ?, ?)",
    )?;
    for msg in &inc.messages {
        stmt.execute(params![
            inc.conversation_id,
            msg.offset as i64,
            msg.role,
            msg.timestamp.as_ref().map(format_ts),
        ])?;
    }
    Ok(())
}

/// Tool-use events are append-only; a replayed offset is ignored.
fn append_tool_use_events(conn: &Connection, inc: &Increment) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        r#"INSERT OR IGNORE INTO tool_use_events
           (conversation_id, byte_offset, seq, tool_name, tool_id, file_path, operation, timestamp)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )?;
    for event in &inc.tool_uses {
        stmt.execute(params![
            inc.conversation_id,
            event.offset as i64,
            event.seq,
            event.tool_name,
            event.tool_id,
            event.file_path,
            event.operation.as_str(),
            event.timestamp.as_ref().map(format_ts),
        ])?;
    }
    Ok(())
}

/// Canonical timestamp text; lexical order equals chronological order.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ============================================
// ROW TYPES
// ============================================

const CONVERSATION_COLUMNS: &str = "c.id, c.external_id, c.source_path, c.project_path, \
     c.started_at, c.ended_at, c.message_count, c.user_messages, c.assistant_messages, \
     c.first_user_message, c.last_assistant_message, c.ingested_offset";

fn map_conversation(row: &rusqlite::Row) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        external_id: row.get(1)?,
        source_path: row.get(2)?,
        project_path: row.get(3)?,
        started_at: row.get(4)?,
        ended_at: row.get(5)?,
        message_count: row.get(6)?,
        user_messages: row.get(7)?,
        assistant_messages: row.get(8)?,
        first_user_message: row.get(9)?,
        last_assistant_message: row.get(10)?,
        ingested_offset: row.get(11)?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationRow {
    pub id: String,
    pub external_id: String,
    pub source_path: String,
    pub project_path: Option<String>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub message_count: i64,
    pub user_messages: i64,
    pub assistant_messages: i64,
    pub first_user_message: Option<String>,
    pub last_assistant_message: Option<String>,
    pub ingested_offset: i64,
}

impl ConversationRow {
    /// Most recent known activity
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.ended_at
            .as_deref()
            .or(self.started_at.as_deref())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingDocument {
    pub conversation_id: String,
    pub first_user_message: Option<String>,
    pub last_assistant_message: Option<String>,
    pub topics: Vec<String>,
    pub files: Vec<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub conversations: i64,
    pub messages: i64,
    pub tool_uses: i64,
    pub topics: i64,
}
