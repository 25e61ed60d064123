//! Reporting windows

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::store::format_ts;

/// Half-open time range `[from, to)`; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    /// The last `days` days up to `now`. `days` must be positive and
    /// small enough to stay within the representable date range.
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Result<Self> {
        if days <= 0 {
            bail!("--days must be positive, got {}", days);
        }
        let from = Duration::try_days(days)
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(|| anyhow!("--days {} reaches past the earliest representable date", days))?;
        Ok(Self {
            from: Some(from),
            to: Some(now),
        })
    }

    /// Parse CLI bounds. A bare date `YYYY-MM-DD` as `from` means the
    /// start of that day; as `to` it includes the whole day.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self> {
        let window = Self {
            from: from.map(|s| parse_bound(s, false)).transpose()?,
            to: to.map(|s| parse_bound(s, true)).transpose()?,
        };
        if let (Some(from), Some(to)) = (window.from, window.to) {
            if from > to {
                return Err(anyhow!("window start {} is after its end {}", from, to));
            }
        }
        Ok(window)
    }

    /// Bounds as stored timestamp text, for SQL parameters
    pub fn bounds(&self) -> (Option<String>, Option<String>) {
        (
            self.from.as_ref().map(format_ts),
            self.to.as_ref().map(format_ts),
        )
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| *ts >= from) && self.to.map_or(true, |to| *ts < to)
    }

    /// Human description, e.g. `2026-03-01 to 2026-03-08`
    pub fn describe(&self) -> String {
        let fmt = |ts: &Option<DateTime<Utc>>, open: &str| {
            ts.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| open.to_string())
        };
        format!("{} to {}", fmt(&self.from, "beginning"), fmt(&self.to, "now"))
    }
}

fn parse_bound(s: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| anyhow!("invalid date '{}': expected YYYY-MM-DD or RFC 3339", s))?;
    let date = if end_of_day {
        date.succ_opt()
            .ok_or_else(|| anyhow!("date '{}' out of range", s))?
    } else {
        date
    };
    let start = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid date '{}'", s))?;
    Ok(start.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_dates() {
        let window = TimeWindow::parse(Some("2026-03-01"), Some("2026-03-07")).unwrap();
        assert_eq!(
            window.from,
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap())
        );
        // `to` covers the whole day
        assert_eq!(
            window.to,
            Some(Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap())
        );
        assert!(window.contains(&Utc.with_ymd_and_hms(2026, 3, 7, 23, 59, 0).unwrap()));
        assert!(!window.contains(&Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_parse_rfc3339() {
        let window = TimeWindow::parse(Some("2026-03-01T12:00:00+02:00"), None).unwrap();
        assert_eq!(
            window.from,
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(window.bounds().0.as_deref(), Some("2026-03-01T10:00:00Z"));
        assert!(window.to.is_none());
    }

    #[test]
    fn test_rejects_inverted_and_garbage() {
        assert!(TimeWindow::parse(Some("2026-03-09"), Some("2026-03-01")).is_err());
        assert!(TimeWindow::parse(Some("last tuesday"), None).is_err());
    }

    #[test]
    fn test_last_days() {
        let now = Utc.with_ymd_and_hms(2026, 3, 8, 12, 0, 0).unwrap();
        let window = TimeWindow::last_days(now, 7).unwrap();
        assert_eq!(
            window.from,
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(window.to, Some(now));
    }

    #[test]
    fn test_last_days_rejects_out_of_range() {
        let now = Utc.with_ymd_and_hms(2026, 3, 8, 12, 0, 0).unwrap();
        assert!(TimeWindow::last_days(now, 0).is_err());
        assert!(TimeWindow::last_days(now, -3).is_err());
        assert!(TimeWindow::last_days(now, 1_000_000_000_000).is_err());
        assert!(TimeWindow::last_days(now, i64::MAX).is_err());
    }

    #[test]
    fn test_open_window() {
        let window = TimeWindow::default();
        assert_eq!(window.bounds(), (None, None));
        assert_eq!(window.describe(), "beginning to now");
    }
}
