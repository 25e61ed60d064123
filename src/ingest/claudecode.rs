//! Claude Code transcript records
//!
//! Data format: JSONL files in ~/.claude/projects/<project_hash>/<session_id>.jsonl
//! Each line carries `type`, `timestamp`, `cwd` and a `message` whose
//! `content` is either a string or a list of typed blocks.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{
    detect_topics, truncate_chars, Excerpt, Increment, MessageFact, OperationKind, Record,
    ToolUseEvent,
};

const EXCERPT_CHARS: usize = 500;

/// Fold one record into the increment being built.
pub fn interpret_record(record: &Record, increment: &mut Increment) {
    let json = &record.value;

    let record_type = json.get("type").and_then(|v| v.as_str()).unwrap_or("");

    // Extract project path from cwd
    if increment.project_path.is_none() {
        increment.project_path = json.get("cwd").and_then(|v| v.as_str()).map(String::from);
    }

    let timestamp = json
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    if let Some(ts) = timestamp {
        if increment.first_timestamp.map_or(true, |first| ts < first) {
            increment.first_timestamp = Some(ts);
        }
        if increment.last_timestamp.map_or(true, |last| ts > last) {
            increment.last_timestamp = Some(ts);
        }
    }

    // Only user/assistant turns count as messages; summaries, queue
    // operations and the like are consumed but carry no facts.
    if record_type != "user" && record_type != "assistant" {
        return;
    }

    increment.messages.push(MessageFact {
        offset: record.offset,
        role: record_type.to_string(),
        timestamp,
    });

    let content = json.get("message").and_then(|m| m.get("content"));
    let text = content.map(content_text).unwrap_or_default();

    if record_type == "user" {
        if !text.trim().is_empty() {
            if increment.first_user_message.is_none() {
                increment.first_user_message = Some(Excerpt {
                    offset: record.offset,
                    text: truncate_chars(&text, EXCERPT_CHARS),
                });
            }
            for topic in detect_topics(&text) {
                if !increment.topics.contains(&topic) {
                    increment.topics.push(topic);
                }
            }
        }
        return;
    }

    if !text.trim().is_empty() {
        increment.last_assistant_message = Some(Excerpt {
            offset: record.offset,
            text: truncate_chars(&text, EXCERPT_CHARS),
        });
    }

    let blocks = content.and_then(|c| c.as_array());
    let tool_uses = blocks
        .map(|arr| {
            arr.iter()
                .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("tool_use"))
                .enumerate()
                .map(|(seq, item)| tool_use_event(record.offset, seq as u32, item, timestamp))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    increment.tool_uses.extend(tool_uses);
}

fn tool_use_event(
    offset: u64,
    seq: u32,
    item: &Value,
    timestamp: Option<DateTime<Utc>>,
) -> ToolUseEvent {
    let tool_name = item
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let input = item.get("input");
    let file_path = input
        .and_then(|i| i.get("file_path").or_else(|| i.get("notebook_path")))
        .and_then(|v| v.as_str())
        .filter(|p| !p.is_empty())
        .map(String::from);

    ToolUseEvent {
        offset,
        seq,
        operation: OperationKind::for_tool(&tool_name),
        tool_id: item.get("id").and_then(|v| v.as_str()).map(String::from),
        tool_name,
        file_path,
        timestamp,
    }
}

/// Plain text of a message: the string itself, or its text blocks joined
fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(arr) => arr
            .iter()
            .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}
