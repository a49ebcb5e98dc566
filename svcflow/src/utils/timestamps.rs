//! Timestamp helpers.

use chrono::{DateTime, Utc};

/// A UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn unix_millis(at: Timestamp) -> i64 {
    at.timestamp_millis()
}

/// Builds a service name unique to the millisecond, `<prefix>_<unix millis>`.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use svcflow::utils::generate_service_name;
///
/// let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
/// assert_eq!(generate_service_name("TestService", at), "TestService_1700000000123");
/// ```
#[must_use]
pub fn generate_service_name(prefix: &str, at: Timestamp) -> String {
    format!("{prefix}_{}", unix_millis(at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unix_millis() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(unix_millis(at), 1_700_000_000_123);
    }

    #[test]
    fn test_generated_names_differ_per_millisecond() {
        let a = Utc.timestamp_millis_opt(1_000).unwrap();
        let b = Utc.timestamp_millis_opt(1_001).unwrap();
        assert_ne!(generate_service_name("TestService", a), generate_service_name("TestService", b));
    }

    #[test]
    fn test_now_is_recent() {
        assert!(unix_millis(now_utc()) > 1_600_000_000_000);
    }
}
