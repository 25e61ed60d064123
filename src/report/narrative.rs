//! Markdown narrative reporter

use anyhow::Result;

use super::{bar_chart, sparkline, ReportData, ReportKind, Renderer, Summarizer};

const CHART_WIDTH: usize = 40;

/// Markdown report: overview, charts, hotspots and a summarizer's
/// observations.
pub struct NarrativeRenderer {
    summarizer: Box<dyn Summarizer>,
}

impl NarrativeRenderer {
    pub fn new(summarizer: Box<dyn Summarizer>) -> Self {
        Self { summarizer }
    }
}

impl Renderer for NarrativeRenderer {
    fn render(&self, data: &ReportData) -> Result<String> {
        let lines = match data.kind {
            ReportKind::Overview => self.overview(data),
            ReportKind::FileHeatmap => file_heatmap(data),
            ReportKind::ToolUsage => tool_usage(data),
        };
        Ok(lines.join("\n"))
    }
}

fn heading(title: &str, data: &ReportData) -> Vec<String> {
    vec![
        format!("# {}", title),
        format!("**Period:** {}", data.window.describe()),
        format!(
            "**Generated:** {}",
            data.generated_at.format("%Y-%m-%d %H:%M")
        ),
        String::new(),
    ]
}

impl NarrativeRenderer {
    fn overview(&self, data: &ReportData) -> Vec<String> {
        let o = &data.overview;
        let mut lines = heading("Insights Report", data);
        lines.extend([
            "## Overview".to_string(),
            format!("- **Conversations:** {}", o.conversations),
            format!("- **Active days:** {}", o.active_days),
            format!(
                "- **Messages:** {} ({} user, {} assistant)",
                o.messages, o.user_messages, o.assistant_messages
            ),
            format!("- **Tool uses:** {}", o.tool_uses),
            format!(
                "- **Avg messages/conversation:** {}",
                o.avg_messages_per_conversation
            ),
            String::new(),
        ]);

        if data.is_empty() {
            lines.push("No activity recorded in this period.".to_string());
            lines.push(String::new());
        } else {
            let timeline: Vec<(String, i64)> = data
                .timeline
                .iter()
                .map(|d| (d.date.clone(), d.messages))
                .collect();
            push_chart(&mut lines, "Activity Timeline", &timeline);
            if timeline.len() > 1 {
                let values: Vec<i64> = timeline.iter().map(|(_, v)| *v).collect();
                lines.insert(lines.len() - 1, format!("Trend: {}", sparkline(&values)));
            }

            let weekdays: Vec<(String, i64)> = data
                .weekdays
                .iter()
                .map(|w| (w.weekday.to_string(), w.messages))
                .collect();
            push_chart(&mut lines, "Weekday Distribution", &weekdays);

            let hours: Vec<(String, i64)> = data
                .hourly
                .iter()
                .filter(|h| h.messages > 0)
                .map(|h| (format!("{:02}:00", h.hour), h.messages))
                .collect();
            push_chart(&mut lines, "Hourly Distribution (UTC)", &hours);
        }

        if !data.file_hotspots.is_empty() {
            lines.push("## File Hotspots".to_string());
            lines.push(String::new());
            for (i, h) in data.file_hotspots.iter().enumerate() {
                lines.push(format!(
                    "{}. **{}** ({} touches in {} conversation{}, R:{} W:{} E:{})",
                    i + 1,
                    h.path,
                    h.count,
                    h.conversations,
                    if h.conversations == 1 { "" } else { "s" },
                    h.reads,
                    h.writes,
                    h.edits
                ));
            }
            lines.push(String::new());
        }

        if !data.tool_usage.is_empty() {
            let tools: Vec<(String, i64)> = data
                .tool_usage
                .iter()
                .take(10)
                .map(|t| (t.tool_name.clone(), t.uses))
                .collect();
            push_chart(&mut lines, "Tool Usage", &tools);
        }

        if !data.topics.is_empty() {
            let topics: Vec<(String, i64)> = data
                .topics
                .iter()
                .map(|t| (t.topic.clone(), t.conversations))
                .collect();
            push_chart(&mut lines, "Top Topics", &topics);
        }

        lines.push("## Insights".to_string());
        lines.push(String::new());
        lines.push(self.summarizer.summarize(data));
        lines
    }
}

fn file_heatmap(data: &ReportData) -> Vec<String> {
    let mut lines = heading("File Interaction Heatmap", data);
    lines.push("## File Hotspots".to_string());
    lines.push(String::new());

    let files = data.file_heatmap();
    if files.is_empty() {
        lines.push("No file interactions found in this period.".to_string());
        return lines;
    }
    for (i, f) in files.iter().enumerate() {
        lines.extend([
            format!("### {}. {} {}", i + 1, "\u{1F525}".repeat(f.heat_level as usize), f.path),
            format!("- **Conversations:** {}", f.conversations),
            format!("- **Reads:** {}", f.reads),
            format!("- **Writes:** {}", f.writes),
            format!("- **Edits:** {}", f.edits),
            format!("- **Total Interactions:** {}", f.total),
            String::new(),
        ]);
    }
    lines
}

fn tool_usage(data: &ReportData) -> Vec<String> {
    let mut lines = heading("Tool Usage Analytics", data);
    lines.push("## Tool Statistics".to_string());
    lines.push(String::new());

    let tools = data.tool_shares();
    if tools.is_empty() {
        lines.push("No tool usage recorded in this period.".to_string());
        return lines;
    }
    for (i, t) in tools.iter().enumerate() {
        lines.extend([
            format!("### {}. {}", i + 1, t.tool_name),
            format!("- **Total Uses:** {}", t.uses),
            format!("- **Used in Conversations:** {}", t.conversations),
            format!("- **Percentage of Total:** {:.1}%", t.percentage),
            String::new(),
        ]);
    }
    lines
}

fn push_chart(lines: &mut Vec<String>, title: &str, rows: &[(String, i64)]) {
    lines.push(format!("## {}", title));
    lines.push(String::new());
    lines.push("```".to_string());
    lines.push(bar_chart(rows, CHART_WIDTH));
    lines.push("```".to_string());
    lines.push(String::new());
}
