//! JSON reporter

use anyhow::Result;
use serde_json::json;

use super::{ReportData, ReportKind, Renderer};

/// Pretty-printed JSON. The overview carries the whole [`ReportData`];
/// the focused kinds carry only their own rows.
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, data: &ReportData) -> Result<String> {
        let value = match data.kind {
            ReportKind::Overview => serde_json::to_value(data)?,
            ReportKind::FileHeatmap => json!({
                "kind": data.kind,
                "window": data.window,
                "generated_at": data.generated_at,
                "files": data.file_heatmap(),
            }),
            ReportKind::ToolUsage => json!({
                "kind": data.kind,
                "window": data.window,
                "generated_at": data.generated_at,
                "total_uses": data.tool_usage.iter().map(|t| t.uses).sum::<i64>(),
                "tools": data.tool_shares(),
            }),
        };
        Ok(serde_json::to_string_pretty(&value)?)
    }
}
