//! Windowed aggregate queries
//!
//! Every query here is read-only and returns rows in a fully determined
//! order (count descending, then name ascending) so reports are
//! reproducible.
//!
//! Facts are placed in time by their own timestamp, falling back to the
//! conversation start when a record carried none.

use anyhow::Result;
use rusqlite::params;
use serde::Serialize;

use super::MetadataStore;
use crate::report::TimeWindow;

/// A file ranked by tool-use touches
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHotspot {
    pub path: String,
    pub count: i64,
    pub reads: i64,
    pub writes: i64,
    pub edits: i64,
    pub conversations: i64,
}

/// Per-file aggregation over all time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileTouch {
    pub path: String,
    pub reads: i64,
    pub writes: i64,
    pub edits: i64,
    pub other: i64,
    pub conversation_ids: Vec<String>,
}

impl FileTouch {
    pub fn total(&self) -> i64 {
        self.reads + self.writes + self.edits + self.other
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolUsage {
    pub tool_name: String,
    pub uses: i64,
    pub conversations: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicCount {
    pub topic: String,
    pub conversations: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayActivity {
    pub date: String,
    pub conversations: i64,
    pub messages: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekdayCount {
    pub weekday: &'static str,
    pub messages: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourCount {
    /// 0-23, UTC
    pub hour: u32,
    pub messages: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overview {
    pub conversations: i64,
    pub messages: i64,
    pub user_messages: i64,
    pub assistant_messages: i64,
    pub tool_uses: i64,
    pub active_days: i64,
    pub avg_messages_per_conversation: f64,
    pub first_activity: Option<String>,
    pub last_activity: Option<String>,
}

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

impl MetadataStore {
    /// Files ranked by touch count, ties broken by path.
    pub fn query_file_hotspots(&self, window: &TimeWindow, limit: usize) -> Result<Vec<FileHotspot>> {
        let (from, to) = window.bounds();
        let mut stmt = self.conn.prepare(
            r#"SELECT e.file_path,
                      COUNT(*) AS touches,
                      SUM(CASE WHEN e.operation = 'read' THEN 1 ELSE 0 END),
                      SUM(CASE WHEN e.operation = 'write' THEN 1 ELSE 0 END),
                      SUM(CASE WHEN e.operation = 'edit' THEN 1 ELSE 0 END),
                      COUNT(DISTINCT e.conversation_id)
               FROM tool_use_events e
               JOIN conversations c ON c.id = e.conversation_id
               WHERE e.file_path IS NOT NULL
                 AND (?1 IS NULL OR COALESCE(e.timestamp, c.started_at) >= ?1)
                 AND (?2 IS NULL OR COALESCE(e.timestamp, c.started_at) < ?2)
               GROUP BY e.file_path
               ORDER BY touches DESC, e.file_path ASC
               LIMIT ?3"#,
        )?;
        let rows = stmt.query_map(params![from, to, limit as i64], |row| {
            Ok(FileHotspot {
                path: row.get(0)?,
                count: row.get(1)?,
                reads: row.get(2)?,
                writes: row.get(3)?,
                edits: row.get(4)?,
                conversations: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Tools ranked by use count, ties broken by name.
    pub fn query_tool_usage_breakdown(&self, window: &TimeWindow) -> Result<Vec<ToolUsage>> {
        let (from, to) = window.bounds();
        let mut stmt = self.conn.prepare(
            r#"SELECT e.tool_name, COUNT(*) AS uses, COUNT(DISTINCT e.conversation_id)
               FROM tool_use_events e
               JOIN conversations c ON c.id = e.conversation_id
               WHERE (?1 IS NULL OR COALESCE(e.timestamp, c.started_at) >= ?1)
                 AND (?2 IS NULL OR COALESCE(e.timestamp, c.started_at) < ?2)
               GROUP BY e.tool_name
               ORDER BY uses DESC, e.tool_name ASC"#,
        )?;
        let rows = stmt.query_map(params![from, to], |row| {
            Ok(ToolUsage {
                tool_name: row.get(0)?,
                uses: row.get(1)?,
                conversations: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Touch counts for one path, across all time
    pub fn file_touch(&self, path: &str) -> Result<Option<FileTouch>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT operation, COUNT(*) FROM tool_use_events
               WHERE file_path = ? GROUP BY operation"#,
        )?;
        let mut touch = FileTouch {
            path: path.to_string(),
            reads: 0,
            writes: 0,
            edits: 0,
            other: 0,
            conversation_ids: vec![],
        };
        let rows = stmt.query_map(params![path], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (operation, n) = row?;
            match operation.as_str() {
                "read" => touch.reads += n,
                "write" => touch.writes += n,
                "edit" => touch.edits += n,
                _ => touch.other += n,
            }
        }
        if touch.total() == 0 {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare(
            r#"SELECT DISTINCT conversation_id FROM tool_use_events
               WHERE file_path = ? ORDER BY conversation_id"#,
        )?;
        touch.conversation_ids = stmt
            .query_map(params![path], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(touch))
    }

    pub fn query_overview(&self, window: &TimeWindow) -> Result<Overview> {
        let (from, to) = window.bounds();
        let mut overview = self.conn.query_row(
            r#"SELECT COUNT(DISTINCT m.conversation_id),
                      COUNT(*),
                      COALESCE(SUM(CASE WHEN m.role = 'user' THEN 1 ELSE 0 END), 0),
                      COALESCE(SUM(CASE WHEN m.role = 'assistant' THEN 1 ELSE 0 END), 0),
                      COUNT(DISTINCT DATE(COALESCE(m.timestamp, c.started_at))),
                      MIN(COALESCE(m.timestamp, c.started_at)),
                      MAX(COALESCE(m.timestamp, c.started_at))
               FROM messages m
               JOIN conversations c ON c.id = m.conversation_id
               WHERE (?1 IS NULL OR COALESCE(m.timestamp, c.started_at) >= ?1)
                 AND (?2 IS NULL OR COALESCE(m.timestamp, c.started_at) < ?2)"#,
            params![from, to],
            |row| {
                Ok(Overview {
                    conversations: row.get(0)?,
                    messages: row.get(1)?,
                    user_messages: row.get(2)?,
                    assistant_messages: row.get(3)?,
                    active_days: row.get(4)?,
                    first_activity: row.get(5)?,
                    last_activity: row.get(6)?,
                    ..Overview::default()
                })
            },
        )?;

        overview.tool_uses = self.conn.query_row(
            r#"SELECT COUNT(*) FROM tool_use_events e
               JOIN conversations c ON c.id = e.conversation_id
               WHERE (?1 IS NULL OR COALESCE(e.timestamp, c.started_at) >= ?1)
                 AND (?2 IS NULL OR COALESCE(e.timestamp, c.started_at) < ?2)"#,
            params![from, to],
            |row| row.get(0),
        )?;

        if overview.conversations > 0 {
            let avg = overview.messages as f64 / overview.conversations as f64;
            overview.avg_messages_per_conversation = (avg * 10.0).round() / 10.0;
        }
        Ok(overview)
    }

    /// Active conversations and messages per day, oldest first
    pub fn query_activity_timeline(&self, window: &TimeWindow) -> Result<Vec<DayActivity>> {
        let (from, to) = window.bounds();
        let mut stmt = self.conn.prepare(
            r#"SELECT DATE(COALESCE(m.timestamp, c.started_at)) AS day,
                      COUNT(DISTINCT m.conversation_id),
                      COUNT(*)
               FROM messages m
               JOIN conversations c ON c.id = m.conversation_id
               WHERE COALESCE(m.timestamp, c.started_at) IS NOT NULL
                 AND (?1 IS NULL OR COALESCE(m.timestamp, c.started_at) >= ?1)
                 AND (?2 IS NULL OR COALESCE(m.timestamp, c.started_at) < ?2)
               GROUP BY day
               ORDER BY day"#,
        )?;
        let rows = stmt.query_map(params![from, to], |row| {
            Ok(DayActivity {
                date: row.get(0)?,
                conversations: row.get(1)?,
                messages: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Messages per weekday, Monday first, zero-filled
    pub fn query_weekday_distribution(&self, window: &TimeWindow) -> Result<Vec<WeekdayCount>> {
        let (from, to) = window.bounds();
        let mut stmt = self.conn.prepare(
            r#"SELECT CAST(strftime('%w', COALESCE(m.timestamp, c.started_at)) AS INTEGER) AS wd,
                      COUNT(*)
               FROM messages m
               JOIN conversations c ON c.id = m.conversation_id
               WHERE COALESCE(m.timestamp, c.started_at) IS NOT NULL
                 AND (?1 IS NULL OR COALESCE(m.timestamp, c.started_at) >= ?1)
                 AND (?2 IS NULL OR COALESCE(m.timestamp, c.started_at) < ?2)
               GROUP BY wd"#,
        )?;

        let mut counts = [0i64; 7];
        let rows = stmt.query_map(params![from, to], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (sunday_based, n) = row?;
            // strftime %w: 0 = Sunday
            let idx = ((sunday_based + 6) % 7) as usize;
            counts[idx] += n;
        }

        Ok(WEEKDAYS
            .into_iter()
            .zip(counts)
            .map(|(weekday, messages)| WeekdayCount { weekday, messages })
            .collect())
    }

    /// Messages per hour of day (UTC), all 24 hours, zero-filled
    pub fn query_hourly_distribution(&self, window: &TimeWindow) -> Result<Vec<HourCount>> {
        let (from, to) = window.bounds();
        let mut stmt = self.conn.prepare(
            r#"SELECT CAST(strftime('%H', COALESCE(m.timestamp, c.started_at)) AS INTEGER) AS hr,
                      COUNT(*)
               FROM messages m
               JOIN conversations c ON c.id = m.conversation_id
               WHERE COALESCE(m.timestamp, c.started_at) IS NOT NULL
                 AND (?1 IS NULL OR COALESCE(m.timestamp, c.started_at) >= ?1)
                 AND (?2 IS NULL OR COALESCE(m.timestamp, c.started_at) < ?2)
               GROUP BY hr"#,
        )?;

        let mut counts = [0i64; 24];
        let rows = stmt.query_map(params![from, to], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (hour, n) = row?;
            if let Some(slot) = counts.get_mut(hour as usize) {
                *slot += n;
            }
        }

        Ok(counts
            .into_iter()
            .enumerate()
            .map(|(hour, messages)| HourCount {
                hour: hour as u32,
                messages,
            })
            .collect())
    }

    /// Topics ranked by the number of conversations active in the window
    pub fn query_topic_clusters(&self, window: &TimeWindow, limit: usize) -> Result<Vec<TopicCount>> {
        let (from, to) = window.bounds();
        let mut stmt = self.conn.prepare(
            r#"SELECT t.topic, COUNT(*) AS n
               FROM topics t
               WHERE EXISTS (
                   SELECT 1 FROM messages m
                   JOIN conversations c ON c.id = m.conversation_id
                   WHERE m.conversation_id = t.conversation_id
                     AND (?1 IS NULL OR COALESCE(m.timestamp, c.started_at) >= ?1)
                     AND (?2 IS NULL OR COALESCE(m.timestamp, c.started_at) < ?2))
               GROUP BY t.topic
               ORDER BY n DESC, t.topic ASC
               LIMIT ?3"#,
        )?;
        let rows = stmt.query_map(params![from, to, limit as i64], |row| {
            Ok(TopicCount {
                topic: row.get(0)?,
                conversations: row.get(1)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{event, increment, sample_increment, temp_store, ts};
    use crate::ingest::MessageFact;

    #[test]
    fn test_hotspots_example() {
        let (_dir, store) = temp_store();
        store.apply_increment(&sample_increment("c1")).unwrap();

        let hotspots = store
            .query_file_hotspots(&TimeWindow::default(), 10)
            .unwrap();
        let ranked: Vec<(&str, i64)> = hotspots.iter().map(|h| (h.path.as_str(), h.count)).collect();
        assert_eq!(ranked, vec![("a.ts", 2), ("b.ts", 1)]);
        assert_eq!(hotspots[0].writes, 2);
        assert_eq!(hotspots[1].reads, 1);
    }

    #[test]
    fn test_hotspot_ties_break_by_path() {
        let (_dir, store) = temp_store();
        let mut inc = increment("c1", 0, 100);
        inc.tool_uses = vec![
            event(10, "Read", Some("z.rs"), ts(9, 0)),
            event(20, "Read", Some("m.rs"), ts(9, 0)),
            event(30, "Edit", Some("a.rs"), ts(9, 0)),
        ];
        store.apply_increment(&inc).unwrap();

        let first = store.query_file_hotspots(&TimeWindow::default(), 10).unwrap();
        let again = store.query_file_hotspots(&TimeWindow::default(), 10).unwrap();
        let paths: Vec<_> = first.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(paths, vec!["a.rs", "m.rs", "z.rs"]);
        assert_eq!(first, again);
    }

    #[test]
    fn test_window_filters_events() {
        let (_dir, store) = temp_store();
        let mut inc = increment("c1", 0, 100);
        inc.tool_uses = vec![
            event(10, "Read", Some("early.rs"), ts(8, 0)),
            event(20, "Read", Some("late.rs"), ts(12, 0)),
        ];
        store.apply_increment(&inc).unwrap();

        let window = TimeWindow::new(Some(ts(10, 0)), None);
        let hotspots = store.query_file_hotspots(&window, 10).unwrap();
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].path, "late.rs");

        let window = TimeWindow::new(None, Some(ts(12, 0)));
        let hotspots = store.query_file_hotspots(&window, 10).unwrap();
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].path, "early.rs");
    }

    #[test]
    fn test_tool_usage_breakdown() {
        let (_dir, store) = temp_store();
        store.apply_increment(&sample_increment("c1")).unwrap();
        let tools = store.query_tool_usage_breakdown(&TimeWindow::default()).unwrap();
        assert_eq!(tools[0].tool_name, "Write");
        assert_eq!(tools[0].uses, 2);
        assert_eq!(tools[1].tool_name, "Read");
        assert_eq!(tools[1].conversations, 1);
    }

    #[test]
    fn test_file_touch() {
        let (_dir, store) = temp_store();
        store.apply_increment(&sample_increment("c1")).unwrap();
        store.apply_increment(&sample_increment("c2")).unwrap();

        let touch = store.file_touch("a.ts").unwrap().unwrap();
        assert_eq!(touch.writes, 4);
        assert_eq!(touch.total(), 4);
        assert_eq!(touch.conversation_ids, vec!["c1", "c2"]);
        assert!(store.file_touch("missing.ts").unwrap().is_none());
    }

    #[test]
    fn test_overview_and_timeline() {
        let (_dir, store) = temp_store();
        store.apply_increment(&sample_increment("c1")).unwrap();

        let overview = store.query_overview(&TimeWindow::default()).unwrap();
        assert_eq!(overview.conversations, 1);
        assert_eq!(overview.messages, 2);
        assert_eq!(overview.user_messages, 1);
        assert_eq!(overview.tool_uses, 3);
        assert_eq!(overview.active_days, 1);
        assert_eq!(overview.avg_messages_per_conversation, 2.0);

        let timeline = store.query_activity_timeline(&TimeWindow::default()).unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].date, "2026-03-02");

        // 2026-03-02 is a Monday
        let weekdays = store.query_weekday_distribution(&TimeWindow::default()).unwrap();
        assert_eq!(weekdays.len(), 7);
        assert_eq!(weekdays[0].weekday, "Monday");
        assert_eq!(weekdays[0].messages, 2);
        assert_eq!(weekdays[6].messages, 0);
    }

    #[test]
    fn test_hourly_distribution() {
        let (_dir, store) = temp_store();
        let mut inc = sample_increment("c1");
        inc.messages.push(MessageFact {
            offset: 200,
            role: "user".into(),
            timestamp: Some(ts(17, 30)),
        });
        store.apply_increment(&inc).unwrap();

        let hours = store.query_hourly_distribution(&TimeWindow::default()).unwrap();
        assert_eq!(hours.len(), 24);
        assert_eq!(hours[9], HourCount { hour: 9, messages: 2 });
        assert_eq!(hours[17].messages, 1);
        assert_eq!(hours.iter().map(|h| h.messages).sum::<i64>(), 3);

        let afternoon = TimeWindow::new(Some(ts(12, 0)), None);
        let hours = store.query_hourly_distribution(&afternoon).unwrap();
        assert_eq!(hours[9].messages, 0);
        assert_eq!(hours[17].messages, 1);
    }

    #[test]
    fn test_empty_window_is_zero() {
        let (_dir, store) = temp_store();
        store.apply_increment(&sample_increment("c1")).unwrap();

        let window = TimeWindow::new(Some(ts(20, 0)), Some(ts(21, 0)));
        let overview = store.query_overview(&window).unwrap();
        assert_eq!(overview.conversations, 0);
        assert_eq!(overview.messages, 0);
        assert_eq!(overview.avg_messages_per_conversation, 0.0);
        assert!(store.query_file_hotspots(&window, 10).unwrap().is_empty());
        assert!(store.query_topic_clusters(&window, 10).unwrap().is_empty());
    }

    #[test]
    fn test_topic_clusters() {
        let (_dir, store) = temp_store();
        store.apply_increment(&sample_increment("c1")).unwrap();
        let mut other = sample_increment("c2");
        other.topics = vec!["auth".into(), "api".into()];
        other.messages.push(MessageFact {
            offset: 200,
            role: "user".into(),
            timestamp: Some(ts(10, 0)),
        });
        store.apply_increment(&other).unwrap();

        let topics = store.query_topic_clusters(&TimeWindow::default(), 10).unwrap();
        assert_eq!(topics[0].topic, "auth");
        assert_eq!(topics[0].conversations, 2);
        assert_eq!(topics[1].topic, "api");
    }
}
