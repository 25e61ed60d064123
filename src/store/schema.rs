//! SQLite schema definition
//!
//! Facts are keyed by conversation + byte offset so that re-applying an
//! increment is a no-op. Derived counts on `conversations` are always
//! recomputed from the fact tables.

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;
PRAGMA foreign_keys = ON;
"#;

pub const SCHEMA: &str = r#"
-- ============================================
-- CONVERSATIONS
-- ============================================

CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,                   -- sha256(source_path), 16 hex chars
    external_id TEXT NOT NULL,             -- file stem / session id
    source_path TEXT NOT NULL UNIQUE,
    project_path TEXT,                     -- first cwd seen
    started_at DATETIME,
    ended_at DATETIME,
    message_count INTEGER DEFAULT 0,
    user_messages INTEGER DEFAULT 0,
    assistant_messages INTEGER DEFAULT 0,
    first_user_message TEXT,
    first_user_offset INTEGER,
    last_assistant_message TEXT,
    last_assistant_offset INTEGER,
    ingested_offset INTEGER DEFAULT 0,     -- highest byte offset applied
    updated_at DATETIME
);

-- ============================================
-- MESSAGES
-- ============================================

CREATE TABLE IF NOT EXISTS messages (
    conversation_id TEXT NOT NULL,
    byte_offset INTEGER NOT NULL,
    role TEXT NOT NULL,                    -- 'user', 'assistant'
    timestamp DATETIME,
    PRIMARY KEY(conversation_id, byte_offset),
    FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

-- ============================================
-- TOOL USES
-- ============================================

CREATE TABLE IF NOT EXISTS tool_use_events (
    conversation_id TEXT NOT NULL,
    byte_offset INTEGER NOT NULL,
    seq INTEGER NOT NULL,                  -- position among the record's tool_use blocks
    tool_name TEXT NOT NULL,
    tool_id TEXT,
    file_path TEXT,
    operation TEXT NOT NULL,               -- 'read', 'write', 'edit', 'other'
    timestamp DATETIME,
    PRIMARY KEY(conversation_id, byte_offset, seq),
    FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

-- ============================================
-- TOPICS
-- ============================================

CREATE TABLE IF NOT EXISTS topics (
    conversation_id TEXT NOT NULL,
    topic TEXT NOT NULL,
    PRIMARY KEY(conversation_id, topic),
    FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

-- ============================================
-- SYNC CURSORS
-- ============================================

CREATE TABLE IF NOT EXISTS sync_cursors (
    source_path TEXT PRIMARY KEY,
    byte_offset INTEGER NOT NULL,
    record_count INTEGER NOT NULL,
    file_len INTEGER NOT NULL,
    updated_at DATETIME
);

-- ============================================
-- INDEXES
-- ============================================

CREATE INDEX IF NOT EXISTS idx_conversations_started ON conversations(started_at);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
CREATE INDEX IF NOT EXISTS idx_tool_uses_file ON tool_use_events(file_path);
CREATE INDEX IF NOT EXISTS idx_tool_uses_name ON tool_use_events(tool_name);
CREATE INDEX IF NOT EXISTS idx_tool_uses_timestamp ON tool_use_events(timestamp);
CREATE INDEX IF NOT EXISTS idx_topics_topic ON topics(topic);
"#;
