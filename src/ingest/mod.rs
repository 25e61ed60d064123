//! Log ingestion: source discovery and incremental transcript parsing
//!
//! A source log is one append-only JSONL transcript. Ingestion always
//! starts from a byte offset recorded by the sync cursor and only
//! consumes complete, newline-terminated lines, so re-reading from any
//! recorded offset yields the same records.

mod claudecode;
mod reader;
mod topics;

pub use claudecode::interpret_record;
pub use reader::{Record, TranscriptReader};
pub use topics::detect_topics;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};

/// Reference to a transcript file on disk
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLog {
    pub path: PathBuf,
    /// File stem, normally the assistant's session id
    pub external_id: String,
    /// Name of the directory holding the transcript
    pub project_dir: Option<String>,
}

impl SourceLog {
    pub fn new(path: PathBuf) -> Self {
        let external_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();
        let project_dir = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|s| s.to_str())
            .map(String::from);
        Self {
            path,
            external_id,
            project_dir,
        }
    }

    /// Conversation identity. The source path is part of the key, so the
    /// same session copied to two files yields two conversations.
    pub fn conversation_id(&self) -> String {
        let digest = Sha256::digest(self.path.to_string_lossy().as_bytes());
        hex::encode(&digest[..8])
    }
}

/// What a tool use did to its target file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Write,
    Edit,
    Other,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
            OperationKind::Edit => "edit",
            OperationKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "read" => OperationKind::Read,
            "write" => OperationKind::Write,
            "edit" => OperationKind::Edit,
            _ => OperationKind::Other,
        }
    }

    /// Classify a tool by name
    pub fn for_tool(tool_name: &str) -> Self {
        match tool_name {
            "Read" => OperationKind::Read,
            "Write" => OperationKind::Write,
            "Edit" | "MultiEdit" | "NotebookEdit" => OperationKind::Edit,
            _ => OperationKind::Other,
        }
    }
}

/// One user or assistant message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageFact {
    pub offset: u64,
    pub role: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One tool invocation. `(offset, seq)` is unique within a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUseEvent {
    pub offset: u64,
    pub seq: u32,
    pub tool_name: String,
    pub tool_id: Option<String>,
    pub file_path: Option<String>,
    pub operation: OperationKind,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A text excerpt with the offset of the record it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Excerpt {
    pub offset: u64,
    pub text: String,
}

/// Everything discovered in one source log since its last cursor
#[derive(Debug)]
pub struct Increment {
    pub conversation_id: String,
    pub external_id: String,
    pub source_path: PathBuf,
    /// Offset the read started from
    pub start_offset: u64,
    /// Offset after the last complete line consumed
    pub end_offset: u64,
    /// Non-blank lines consumed, including skipped ones
    pub records: u64,
    /// File shrank below the cursor; previously stored facts must go
    pub reset: bool,
    pub file_len: u64,
    pub project_path: Option<String>,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub messages: Vec<MessageFact>,
    pub tool_uses: Vec<ToolUseEvent>,
    pub topics: Vec<String>,
    pub first_user_message: Option<Excerpt>,
    pub last_assistant_message: Option<Excerpt>,
    pub skipped: Vec<PipelineError>,
}

impl Increment {
    fn empty(source: &SourceLog, start_offset: u64, file_len: u64, reset: bool) -> Self {
        Self {
            conversation_id: source.conversation_id(),
            external_id: source.external_id.clone(),
            source_path: source.path.clone(),
            start_offset,
            end_offset: start_offset,
            records: 0,
            reset,
            file_len,
            project_path: None,
            first_timestamp: None,
            last_timestamp: None,
            messages: vec![],
            tool_uses: vec![],
            topics: vec![],
            first_user_message: None,
            last_assistant_message: None,
            skipped: vec![],
        }
    }

    /// Nothing new was consumed
    pub fn is_empty(&self) -> bool {
        self.records == 0 && !self.reset
    }
}

/// Find transcript files below `root`.
///
/// `project` is a glob matched against the directory holding each
/// transcript. A missing root yields no sources.
pub fn discover(root: &Path, project: Option<&str>) -> anyhow::Result<Vec<SourceLog>> {
    if !root.exists() {
        warn!(root = %root.display(), "transcripts root does not exist");
        return Ok(vec![]);
    }

    let pattern = project.map(glob::Pattern::new).transpose()?;

    let mut sources = vec![];
    for entry in walkdir::WalkDir::new(root).min_depth(1).follow_links(true) {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().map(|e| e != "jsonl").unwrap_or(true)
        {
            continue;
        }

        let source = SourceLog::new(path.to_path_buf());
        if let Some(ref pattern) = pattern {
            let matches = source
                .project_dir
                .as_deref()
                .map(|dir| pattern.matches(dir))
                .unwrap_or(false);
            if !matches {
                continue;
            }
        }
        sources.push(source);
    }

    sources.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(count = sources.len(), root = %root.display(), "discovered sources");
    Ok(sources)
}

/// Read everything after `from_offset` in `source`.
///
/// Malformed records are skipped and kept in [`Increment::skipped`]. A
/// missing file or a corrupt header fails the whole source.
pub fn read_increment(source: &SourceLog, from_offset: u64) -> PipelineResult<Increment> {
    let file_len = std::fs::metadata(&source.path)
        .map_err(|e| PipelineError::SourceUnavailable {
            path: source.path.clone(),
            source: e,
        })?
        .len();

    let (start, reset) = if file_len < from_offset {
        warn!(
            source = %source.path.display(),
            cursor = from_offset,
            file_len,
            "source shrank below cursor, re-ingesting from start"
        );
        (0, true)
    } else {
        (from_offset, false)
    };

    let mut increment = Increment::empty(source, start, file_len, reset);
    let mut reader = TranscriptReader::open(&source.path, start)?;

    for item in reader.by_ref() {
        increment.records += 1;
        match item {
            Ok(record) => interpret_record(&record, &mut increment),
            Err(e) => {
                warn!(source = %source.path.display(), error = %e, "skipping malformed record");
                increment.skipped.push(e);
            }
        }
    }
    increment.end_offset = reader.offset();

    debug!(
        source = %source.path.display(),
        from = increment.start_offset,
        to = increment.end_offset,
        records = increment.records,
        messages = increment.messages.len(),
        tool_uses = increment.tool_uses.len(),
        "read increment"
    );
    Ok(increment)
}

/// Truncate to at most `max` characters on a char boundary
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
