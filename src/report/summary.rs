//! Narrative summaries of report data

use super::ReportData;

/// Conversations touching one file before it counts as a hotspot
const HOT_FILE_CONVERSATIONS: i64 = 5;
/// Conversations sharing a topic before it counts as trending
const TRENDING_TOPIC_CONVERSATIONS: i64 = 3;
/// Fewer active days than this is called out as low activity
const LOW_ACTIVITY_DAYS: i64 = 3;

/// Turns aggregate facts into prose.
pub trait Summarizer: Send + Sync {
    /// Markdown bullet list of observations
    fn summarize(&self, data: &ReportData) -> String;
}

/// Fixed-threshold observations about hot files, trending topics and
/// activity level.
pub struct RuleSummarizer;

impl Summarizer for RuleSummarizer {
    fn summarize(&self, data: &ReportData) -> String {
        if data.is_empty() {
            return "- No activity in this period.".to_string();
        }

        let mut lines = vec![];

        if let Some(top) = data.file_hotspots.first() {
            if top.conversations >= HOT_FILE_CONVERSATIONS {
                lines.push(format!(
                    "- **High activity file:** `{}` was touched in {} conversations. \
                     Consider reviewing it for refactoring opportunities.",
                    top.path, top.conversations
                ));
            }
        }

        if let Some(top) = data.topics.first() {
            if top.conversations >= TRENDING_TOPIC_CONVERSATIONS {
                lines.push(format!(
                    "- **Trending topic:** '{}' came up in {} conversations. \
                     It might warrant documentation or knowledge sharing.",
                    top.topic, top.conversations
                ));
            }
        }

        if data.overview.active_days < LOW_ACTIVITY_DAYS {
            lines.push(format!(
                "- **Low activity:** only {} active day{} in this period.",
                data.overview.active_days,
                if data.overview.active_days == 1 { "" } else { "s" }
            ));
        }

        if lines.is_empty() {
            lines.push("- No significant patterns detected this period.".to_string());
        }
        lines.join("\n")
    }
}

/// Horizontal ASCII bar chart, bars scaled to the largest value.
pub fn bar_chart(rows: &[(String, i64)], max_width: usize) -> String {
    let Some(max) = rows.iter().map(|(_, v)| *v).max() else {
        return "No data".to_string();
    };

    rows.iter()
        .map(|(label, value)| {
            let len = if max > 0 {
                (*value as f64 / max as f64 * max_width as f64) as usize
            } else {
                0
            };
            format!("{:<15} {} {}", label, "#".repeat(len), value)
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// One block character per value, scaled between the series' min and max.
pub fn sparkline(values: &[i64]) -> String {
    let (Some(&min), Some(&max)) = (values.iter().min(), values.iter().max()) else {
        return String::new();
    };
    if min == max {
        return SPARK_LEVELS[0].to_string().repeat(values.len());
    }

    let top = (SPARK_LEVELS.len() - 1) as f64;
    values
        .iter()
        .map(|v| {
            let scaled = (v - min) as f64 / (max - min) as f64;
            SPARK_LEVELS[(scaled * top) as usize]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::{empty_data, sample_data};
    use crate::store::{FileHotspot, TopicCount};

    #[test]
    fn test_bar_chart() {
        let rows = vec![("Write".to_string(), 4), ("Read".to_string(), 2)];
        assert_eq!(
            bar_chart(&rows, 8),
            "Write           ######## 4\nRead            #### 2"
        );
        assert_eq!(bar_chart(&[], 8), "No data");
    }

    #[test]
    fn test_sparkline() {
        assert_eq!(sparkline(&[1, 5, 9]), "▁▄█");
        assert_eq!(sparkline(&[3, 3, 3]), "▁▁▁");
        assert_eq!(sparkline(&[]), "");
    }

    #[test]
    fn test_empty_window() {
        assert_eq!(RuleSummarizer.summarize(&empty_data()), "- No activity in this period.");
    }

    #[test]
    fn test_rules() {
        let mut data = sample_data();
        let text = RuleSummarizer.summarize(&data);
        assert!(text.contains("Low activity"));
        assert!(!text.contains("High activity file"));

        data.file_hotspots.insert(
            0,
            FileHotspot {
                path: "src/lib.rs".into(),
                count: 9,
                reads: 9,
                writes: 0,
                edits: 0,
                conversations: 5,
            },
        );
        data.topics = vec![TopicCount {
            topic: "testing".into(),
            conversations: 3,
        }];
        data.overview.active_days = 4;

        let text = RuleSummarizer.summarize(&data);
        assert!(text.contains("`src/lib.rs` was touched in 5 conversations"));
        assert!(text.contains("'testing' came up in 3 conversations"));
        assert!(!text.contains("Low activity"));
    }
}
