//! CSV reporter
//!
//! The overview is one table for the whole report: `section` says which
//! aggregate a row comes from, and columns that do not apply to a section
//! stay empty. The heatmap and tool-usage kinds are plain tables.

use anyhow::Result;

use super::{ReportData, ReportKind, Renderer};

const HEADER: [&str; 7] = [
    "section",
    "name",
    "count",
    "reads",
    "writes",
    "edits",
    "conversations",
];

const HEATMAP_HEADER: [&str; 7] = [
    "path",
    "conversations",
    "reads",
    "writes",
    "edits",
    "total",
    "heat_level",
];

const TOOL_HEADER: [&str; 4] = ["tool", "uses", "conversations", "percentage"];

pub struct CsvRenderer;

impl Renderer for CsvRenderer {
    fn render(&self, data: &ReportData) -> Result<String> {
        let (header, rows) = match data.kind {
            ReportKind::Overview => (&HEADER[..], overview_rows(data)),
            ReportKind::FileHeatmap => (&HEATMAP_HEADER[..], heatmap_rows(data)),
            ReportKind::ToolUsage => (&TOOL_HEADER[..], tool_rows(data)),
        };

        let mut out = header.join(",");
        out.push('\n');
        for row in rows {
            let fields: Vec<String> = row.iter().map(|f| escape_field(f)).collect();
            out.push_str(&fields.join(","));
            out.push('\n');
        }
        Ok(out)
    }
}

fn heatmap_rows(data: &ReportData) -> Vec<Vec<String>> {
    data.file_heatmap()
        .into_iter()
        .map(|f| {
            vec![
                f.path,
                f.conversations.to_string(),
                f.reads.to_string(),
                f.writes.to_string(),
                f.edits.to_string(),
                f.total.to_string(),
                f.heat_level.to_string(),
            ]
        })
        .collect()
}

fn tool_rows(data: &ReportData) -> Vec<Vec<String>> {
    data.tool_shares()
        .into_iter()
        .map(|t| {
            vec![
                t.tool_name,
                t.uses.to_string(),
                t.conversations.to_string(),
                format!("{:.1}", t.percentage),
            ]
        })
        .collect()
}

fn overview_rows(data: &ReportData) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = vec![];
    let blank = String::new;

    let o = &data.overview;
    for (name, value) in [
        ("conversations", o.conversations),
        ("messages", o.messages),
        ("user_messages", o.user_messages),
        ("assistant_messages", o.assistant_messages),
        ("tool_uses", o.tool_uses),
        ("active_days", o.active_days),
    ] {
        rows.push(vec![
            "overview".into(),
            name.into(),
            value.to_string(),
            blank(),
            blank(),
            blank(),
            blank(),
        ]);
    }

    for h in &data.file_hotspots {
        rows.push(vec![
            "file".into(),
            h.path.clone(),
            h.count.to_string(),
            h.reads.to_string(),
            h.writes.to_string(),
            h.edits.to_string(),
            h.conversations.to_string(),
        ]);
    }

    for t in &data.tool_usage {
        rows.push(vec![
            "tool".into(),
            t.tool_name.clone(),
            t.uses.to_string(),
            blank(),
            blank(),
            blank(),
            t.conversations.to_string(),
        ]);
    }

    for t in &data.topics {
        rows.push(vec![
            "topic".into(),
            t.topic.clone(),
            t.conversations.to_string(),
            blank(),
            blank(),
            blank(),
            t.conversations.to_string(),
        ]);
    }

    for d in &data.timeline {
        rows.push(vec![
            "day".into(),
            d.date.clone(),
            d.messages.to_string(),
            blank(),
            blank(),
            blank(),
            d.conversations.to_string(),
        ]);
    }

    for w in &data.weekdays {
        rows.push(vec![
            "weekday".into(),
            w.weekday.to_string(),
            w.messages.to_string(),
            blank(),
            blank(),
            blank(),
            blank(),
        ]);
    }

    for h in &data.hourly {
        rows.push(vec![
            "hour".into(),
            format!("{:02}", h.hour),
            h.messages.to_string(),
            blank(),
            blank(),
            blank(),
            blank(),
        ]);
    }

    rows
}

/// Quote a field when it contains a delimiter, quote or line break.
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
