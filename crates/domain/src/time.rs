//! Time and timestamp helpers.
//!
//! Records persist timestamps as epoch milliseconds, so every timestamp that
//! enters a record is truncated to millisecond precision.

use chrono::{DateTime, SubsecRound, Utc};

/// UTC timestamp used for `created_at`, `last_used_at`, session expiry, etc.
pub type Timestamp = DateTime<Utc>;

/// Default lifetime of a freshly created session in milliseconds (7 days).
pub const DEFAULT_SESSION_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Return the current UTC time, truncated to milliseconds.
#[must_use]
pub fn now() -> Timestamp {
    truncate(Utc::now())
}

/// Drop sub-millisecond precision from `ts`.
#[must_use]
pub fn truncate(ts: Timestamp) -> Timestamp {
    ts.trunc_subsecs(3)
}

/// Build a timestamp from epoch milliseconds.
///
/// Returns `None` when `millis` is outside the representable range.
#[must_use]
pub fn from_millis(millis: i64) -> Option<Timestamp> {
    DateTime::from_timestamp_millis(millis)
}

/// Convert a timestamp into epoch milliseconds.
#[must_use]
pub fn to_millis(ts: Timestamp) -> i64 {
    ts.timestamp_millis()
}
