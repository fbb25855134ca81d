// crates/core/src/time.rs
use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse a transcript timestamp. Accepts RFC 3339, and naive
/// `%Y-%m-%dT%H:%M:%S` read as UTC.
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}

/// Render `ts` relative to `now`: `just now`, `5m ago`, `2h ago`, `3d ago`.
/// Unparsable input yields an empty string.
pub fn format_relative_time(ts: &str, now: DateTime<Utc>) -> String {
    let Some(then) = parse_timestamp(ts) else {
        return String::new();
    };
    let seconds = (now - then).num_seconds();
    match seconds {
        s if s < 0 => "in the future".to_string(),
        s if s < 60 => "just now".to_string(),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s => format!("{}d ago", s / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2026-03-10T11:00:00.123Z").is_some());
        assert!(parse_timestamp("2026-03-10T11:00:00+02:00").is_some());
        assert!(parse_timestamp("2026-03-10T11:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_relative_buckets() {
        assert_eq!(format_relative_time("2026-03-10T11:59:30Z", now()), "just now");
        assert_eq!(format_relative_time("2026-03-10T11:55:00Z", now()), "5m ago");
        assert_eq!(format_relative_time("2026-03-10T10:00:00Z", now()), "2h ago");
        assert_eq!(format_relative_time("2026-03-07T12:00:00Z", now()), "3d ago");
        assert_eq!(format_relative_time("2026-03-11T00:00:00Z", now()), "in the future");
        assert_eq!(format_relative_time("garbage", now()), "");
    }
}
