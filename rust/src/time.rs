//! Timestamp parsing and duration helpers.

use chrono::{DateTime, NaiveDateTime};

use crate::dbt::DatasetError;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an ISO-8601 timestamp into naive UTC.
///
/// Timestamps carrying an offset (`Z`, `+00:00`, ...) are converted to UTC and
/// the offset dropped; naive timestamps are taken as already being UTC.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, DatasetError> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_utc());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| DatasetError::InvalidTimestamp(value.to_string()))
}

/// Seconds elapsed from `start` to `end`, with microsecond precision.
pub fn duration_seconds(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    let delta = end - start;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

/// Render seconds as `"Hh Mm Ss"`, truncating to whole seconds.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{}h {}m {}s", hours, minutes, secs)
}

/// Sort key that orders `Thread-2` before `Thread-10`.
///
/// The first run of digits in the name is the primary key (0 when absent),
/// the full name breaks ties.
pub fn worker_sort_key(worker: &str) -> (u64, &str) {
    let digits: String = worker
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    (digits.parse().unwrap_or(0), worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_offset_timestamp_converts_to_utc() {
        let parsed = parse_timestamp("2024-05-01T14:00:00+02:00").unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_zulu_and_naive_timestamps() {
        let zulu = parse_timestamp("2024-05-01T12:00:00.250Z").unwrap();
        let naive = parse_timestamp("2024-05-01T12:00:00.250000").unwrap();
        assert_eq!(zulu, naive);

        let spaced = parse_timestamp("2024-05-01 12:00:00").unwrap();
        assert!((duration_seconds(spaced, naive) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_parse_invalid_timestamp() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(matches!(err, DatasetError::InvalidTimestamp(ref v) if v == "yesterday"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0h 0m 0s");
        assert_eq!(format_duration(59.9), "0h 0m 59s");
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
        assert_eq!(format_duration(-5.0), "0h 0m 0s");
    }

    #[test]
    fn test_worker_sort_key_orders_numerically() {
        let mut workers = vec!["Thread-10", "Thread-2", "main", "Thread-1"];
        workers.sort_by(|a, b| worker_sort_key(a).cmp(&worker_sort_key(b)));
        assert_eq!(workers, vec!["main", "Thread-1", "Thread-2", "Thread-10"]);
    }
}
