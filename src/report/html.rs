//! HTML reporter: one self-contained page with inline CSS.

use anyhow::Result;
use std::fmt::Write;

use super::{ReportData, ReportKind, Renderer};

pub struct HtmlRenderer {
    pub title: String,
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self {
            title: "Conversation Insights".to_string(),
        }
    }
}

impl HtmlRenderer {
    fn escape_html(s: &str) -> String {
        s.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&#39;")
    }

    /// A table whose last numeric column is drawn as a proportional bar
    fn bar_table(out: &mut String, title: &str, headers: &[&str], rows: &[(Vec<String>, i64)]) {
        let max = rows.iter().map(|(_, v)| *v).max().unwrap_or(0);

        let _ = writeln!(out, "<section><h2>{}</h2>", Self::escape_html(title));
        out.push_str("<table><thead><tr>");
        for h in headers {
            let _ = write!(out, "<th>{}</th>", Self::escape_html(h));
        }
        out.push_str("<th></th></tr></thead><tbody>\n");
        for (cells, value) in rows {
            out.push_str("<tr>");
            for cell in cells {
                let _ = write!(out, "<td>{}</td>", Self::escape_html(cell));
            }
            let pct = if max > 0 { *value * 100 / max } else { 0 };
            let _ = writeln!(
                out,
                "<td class=\"bar\"><span style=\"width:{}%\"></span></td></tr>",
                pct
            );
        }
        out.push_str("</tbody></table></section>\n");
    }
}

const STYLE: &str = r#"
body { font-family: -apple-system, 'Segoe UI', sans-serif; margin: 2rem auto; max-width: 960px; color: #222; }
h1 { border-bottom: 2px solid #444; padding-bottom: .3rem; }
.meta { color: #666; }
.cards { display: flex; gap: 1rem; flex-wrap: wrap; }
.card { border: 1px solid #ddd; border-radius: 6px; padding: .8rem 1.2rem; min-width: 120px; }
.card .value { font-size: 1.6rem; font-weight: bold; }
table { border-collapse: collapse; width: 100%; margin-bottom: 1.5rem; }
th, td { text-align: left; padding: .3rem .6rem; border-bottom: 1px solid #eee; }
td.bar { width: 35%; }
td.bar span { display: block; height: .8rem; background: #4a7bd0; border-radius: 2px; }
.empty { padding: 2rem; text-align: center; color: #888; }
"#;

impl Renderer for HtmlRenderer {
    fn render(&self, data: &ReportData) -> Result<String> {
        let mut out = String::new();
        let title = match data.kind {
            ReportKind::Overview => Self::escape_html(&self.title),
            ReportKind::FileHeatmap => "File Interaction Heatmap".to_string(),
            ReportKind::ToolUsage => "Tool Usage Analytics".to_string(),
        };

        out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
        writeln!(out, "<title>{}</title>", title)?;
        writeln!(out, "<style>{}</style>\n</head>\n<body>", STYLE)?;
        writeln!(out, "<h1>{}</h1>", title)?;
        writeln!(
            out,
            "<p class=\"meta\">{} &middot; generated {}</p>",
            Self::escape_html(&data.window.describe()),
            data.generated_at.format("%Y-%m-%d %H:%M UTC")
        )?;

        match data.kind {
            ReportKind::Overview => Self::overview(&mut out, data)?,
            ReportKind::FileHeatmap => Self::heatmap(&mut out, data),
            ReportKind::ToolUsage => Self::tool_usage(&mut out, data),
        }

        out.push_str("</body>\n</html>\n");
        Ok(out)
    }
}

impl HtmlRenderer {
    fn overview(out: &mut String, data: &ReportData) -> Result<()> {
        let o = &data.overview;
        out.push_str("<div class=\"cards\">\n");
        for (label, value) in [
            ("Conversations", o.conversations.to_string()),
            ("Active days", o.active_days.to_string()),
            ("Messages", o.messages.to_string()),
            ("Tool uses", o.tool_uses.to_string()),
            ("Avg messages", o.avg_messages_per_conversation.to_string()),
        ] {
            writeln!(
                out,
                "<div class=\"card\"><div>{}</div><div class=\"value\">{}</div></div>",
                label, value
            )?;
        }
        out.push_str("</div>\n");

        if data.is_empty() {
            out.push_str("<p class=\"empty\">No activity recorded in this period.</p>\n");
        } else {
            let hotspots: Vec<(Vec<String>, i64)> = data
                .file_hotspots
                .iter()
                .map(|h| {
                    (
                        vec![
                            h.path.clone(),
                            h.count.to_string(),
                            h.reads.to_string(),
                            h.writes.to_string(),
                            h.edits.to_string(),
                            h.conversations.to_string(),
                        ],
                        h.count,
                    )
                })
                .collect();
            Self::bar_table(
                out,
                "File hotspots",
                &["File", "Touches", "Reads", "Writes", "Edits", "Conversations"],
                &hotspots,
            );

            let tools: Vec<(Vec<String>, i64)> = data
                .tool_usage
                .iter()
                .map(|t| {
                    (
                        vec![
                            t.tool_name.clone(),
                            t.uses.to_string(),
                            t.conversations.to_string(),
                        ],
                        t.uses,
                    )
                })
                .collect();
            Self::bar_table(out, "Tool usage", &["Tool", "Uses", "Conversations"], &tools);

            let topics: Vec<(Vec<String>, i64)> = data
                .topics
                .iter()
                .map(|t| (vec![t.topic.clone(), t.conversations.to_string()], t.conversations))
                .collect();
            Self::bar_table(out, "Topics", &["Topic", "Conversations"], &topics);

            let timeline: Vec<(Vec<String>, i64)> = data
                .timeline
                .iter()
                .map(|d| {
                    (
                        vec![
                            d.date.clone(),
                            d.conversations.to_string(),
                            d.messages.to_string(),
                        ],
                        d.messages,
                    )
                })
                .collect();
            Self::bar_table(
                out,
                "Activity",
                &["Day", "Conversations", "Messages"],
                &timeline,
            );

            let weekdays: Vec<(Vec<String>, i64)> = data
                .weekdays
                .iter()
                .map(|w| (vec![w.weekday.to_string(), w.messages.to_string()], w.messages))
                .collect();
            Self::bar_table(out, "Weekdays", &["Weekday", "Messages"], &weekdays);

            let hours: Vec<(Vec<String>, i64)> = data
                .hourly
                .iter()
                .map(|h| (vec![format!("{:02}:00", h.hour), h.messages.to_string()], h.messages))
                .collect();
            Self::bar_table(out, "Hours (UTC)", &["Hour", "Messages"], &hours);
        }
        Ok(())
    }

    fn heatmap(out: &mut String, data: &ReportData) {
        let files = data.file_heatmap();
        if files.is_empty() {
            out.push_str("<p class=\"empty\">No file interactions found in this period.</p>\n");
            return;
        }
        let rows: Vec<(Vec<String>, i64)> = files
            .into_iter()
            .map(|f| {
                (
                    vec![
                        f.path,
                        "\u{1F525}".repeat(f.heat_level as usize),
                        f.conversations.to_string(),
                        f.reads.to_string(),
                        f.writes.to_string(),
                        f.edits.to_string(),
                        f.total.to_string(),
                    ],
                    f.total,
                )
            })
            .collect();
        Self::bar_table(
            out,
            "File hotspots",
            &["File", "Heat", "Conversations", "Reads", "Writes", "Edits", "Total"],
            &rows,
        );
    }

    fn tool_usage(out: &mut String, data: &ReportData) {
        let tools = data.tool_shares();
        if tools.is_empty() {
            out.push_str("<p class=\"empty\">No tool usage recorded in this period.</p>\n");
            return;
        }
        let rows: Vec<(Vec<String>, i64)> = tools
            .into_iter()
            .map(|t| {
                (
                    vec![
                        t.tool_name,
                        t.uses.to_string(),
                        t.conversations.to_string(),
                        format!("{:.1}%", t.percentage),
                    ],
                    t.uses,
                )
            })
            .collect();
        Self::bar_table(
            out,
            "Tool statistics",
            &["Tool", "Uses", "Conversations", "Share"],
            &rows,
        );
    }
}
