//! Small helpers for run ids and timestamps.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generates a new run id (UUID v4).
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Returns the current UTC time as an ISO 8601 string with microseconds.
///
/// # Examples
///
/// ```
/// use clusterflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    format_iso8601(&Utc::now())
}

/// Formats a timestamp the same way as [`iso_timestamp`].
#[must_use]
pub fn format_iso8601(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Formats a duration in milliseconds for humans: `850ms`, `12.40s`, `3m05s`.
#[must_use]
pub fn format_duration_ms(ms: f64) -> String {
    if ms < 1000.0 {
        format!("{ms:.0}ms")
    } else if ms < 60_000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else {
        let total = (ms / 1000.0).round() as u64;
        format!("{}m{:02}s", total / 60, total % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_generate_uuid_is_v4_and_unique() {
        let a = generate_uuid();
        let b = generate_uuid();
        assert_eq!(a.get_version_num(), 4);
        assert_ne!(a, b);
    }

    #[test]
    fn test_format_iso8601() {
        let dt = Utc.with_ymd_and_hms(2014, 3, 7, 12, 30, 5).unwrap();
        assert_eq!(format_iso8601(&dt), "2014-03-07T12:30:05.000000+00:00");
    }

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(850.0), "850ms");
        assert_eq!(format_duration_ms(12_400.0), "12.40s");
        assert_eq!(format_duration_ms(185_000.0), "3m05s");
    }
}
