use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Store key for the opaque token
pub const TOKEN_KEY: &str = "token";

/// Store key for the first-observed time, in epoch milliseconds
pub const TIMESTAMP_KEY: &str = "tokenTimestamp";

/// Client-side validity window applied to every token.
/// The identity provider's tokens expire after 1 hour.
pub const DEFAULT_TTL_SECS: u64 = 60 * 60;

/// How often the watchdog re-reads the wall clock while armed.
/// Monotonic timers can stall while a phone sleeps; a one minute probe
/// catches that without noticeable drift.
pub const DEFAULT_RECHECK_INTERVAL_SECS: u64 = 60;

/// Where the session stands, as seen by the UI shell.
///
/// `Unknown` lasts until `bootstrap()` resolves; the shell shows a splash
/// screen rather than the login screen while in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Unknown,
    Unauthenticated,
    Authenticated,
}

impl SessionStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionStatus::Authenticated)
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, SessionStatus::Unknown)
    }
}

/// Lifecycle notifications broadcast to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub enum SessionEvent {
    /// A new token was accepted and persisted
    Authenticated,
    /// A persisted, unexpired session was picked up at startup
    Restored,
    /// The user logged out
    LoggedOut,
    /// The watchdog ended the session because its window elapsed
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub ttl: Duration,
    /// `None` sleeps straight to the deadline
    pub recheck_interval: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            recheck_interval: Some(Duration::from_secs(DEFAULT_RECHECK_INTERVAL_SECS)),
        }
    }
}

pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.timestamp_millis().to_string()
}

/// Latest accepted `tokenTimestamp`: 9999-12-31T23:59:59.999Z
const MAX_TIMESTAMP_MILLIS: i64 = 253_402_300_799_999;

/// Parse a stored timestamp. Anything before the epoch or past year 9999 is
/// treated as corrupt.
pub(crate) fn decode_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = raw.trim().parse().ok()?;
    if !(0..=MAX_TIMESTAMP_MILLIS).contains(&millis) {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_is_epoch_millis() {
        let at = Utc.timestamp_millis_opt(1_700_000_123_456).unwrap();
        assert_eq!(encode_timestamp(at), "1700000123456");
        assert_eq!(decode_timestamp("1700000123456"), Some(at));
    }

    #[test]
    fn test_decode_timestamp_rejects_garbage() {
        assert_eq!(decode_timestamp(""), None);
        assert_eq!(decode_timestamp("yesterday"), None);
        assert_eq!(decode_timestamp("1.5"), None);
    }

    #[test]
    fn test_decode_timestamp_rejects_out_of_range() {
        assert_eq!(decode_timestamp("-1"), None);
        assert_eq!(decode_timestamp("8210266876799999"), None);
        assert_eq!(decode_timestamp("253402300800000"), None);

        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap()
            + chrono::Duration::milliseconds(999);
        assert_eq!(decode_timestamp("253402300799999"), Some(last));
        assert_eq!(decode_timestamp("0"), Utc.timestamp_millis_opt(0).single());
    }

    #[test]
    fn test_status_helpers() {
        assert!(!SessionStatus::Unknown.is_resolved());
        assert!(SessionStatus::Unauthenticated.is_resolved());
        assert!(SessionStatus::Authenticated.is_authenticated());
        assert!(!SessionStatus::Unauthenticated.is_authenticated());
    }

    #[test]
    fn test_status_serializes_camel_case() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Unauthenticated).unwrap(),
            "\"unauthenticated\""
        );
        assert_eq!(serde_json::to_string(&SessionEvent::Expired).unwrap(), "\"expired\"");
    }
}
