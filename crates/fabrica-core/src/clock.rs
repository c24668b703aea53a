//! Wall-clock helpers.
//!
//! Ledger records store epoch seconds as `f64`; file headers and sync entries
//! store ISO-8601 UTC strings with a fixed microsecond width so that they
//! compare correctly as plain strings.

use chrono::{SecondsFormat, Utc};

/// Current time as fractional seconds since the Unix epoch.
#[must_use]
pub fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Current time as whole milliseconds since the Unix epoch.
#[must_use]
pub fn epoch_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Current time as whole seconds since the Unix epoch.
#[must_use]
pub fn epoch_secs() -> i64 {
    Utc::now().timestamp()
}

/// Current time as an ISO-8601 UTC timestamp.
#[must_use]
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_have_fixed_width() {
        let a = utc_timestamp();
        let b = utc_timestamp();
        assert_eq!(a.len(), b.len());
        assert!(a.ends_with('Z'));
        assert!(a <= b);
    }

    #[test]
    fn epoch_views_agree() {
        let secs = epoch_seconds();
        let millis = epoch_millis();
        assert!(secs > 1_600_000_000.0);
        assert!(millis / 1000 >= secs as u64 - 1);
    }
}
