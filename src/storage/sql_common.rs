//! Helpers shared by the SQLite and PostgreSQL backends

use chrono::{DateTime, Utc};

// ============================================================================
// Column lists
// ============================================================================

pub const CLIENT_COLUMNS: &str =
    "client_id, client_secret, redirect_uri, owner_user_id, name, description, website, created_at";

pub const GRANT_COLUMNS: &str = "id, client_id, code, user_id, redirect_uri, scope, expires";

pub const TOKEN_COLUMNS: &str =
    "id, client_id, user_id, access_token, refresh_token, scope, expires";

// ============================================================================
// SQLite-specific Helpers
// ============================================================================

/// Convert DateTime to SQLite INTEGER (unix timestamp)
#[inline]
pub fn datetime_to_unix(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

/// Parse DateTime from SQLite INTEGER (unix timestamp)
#[inline]
pub fn datetime_from_unix(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_roundtrip_truncates_to_seconds() {
        let now = Utc::now();
        let back = datetime_from_unix(datetime_to_unix(now));
        assert_eq!(back.timestamp(), now.timestamp());
        assert!(back <= now);
    }

    #[test]
    fn test_out_of_range_timestamp_is_epoch() {
        assert_eq!(datetime_from_unix(i64::MAX), DateTime::UNIX_EPOCH);
    }
}
