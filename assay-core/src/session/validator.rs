//! Pure checks applied to a session record fetched from the store.
//!
//! The checks are evaluated in a fixed order: usability, then expiry, then
//! extension. [`classify`] encodes that order; an expired record never reaches
//! the extension check.

use chrono::{DateTime, Duration, Utc};

use super::SessionRecord;

/// Remaining lifetime under which an authenticated session is extended.
pub const DEFAULT_EXTENSION_THRESHOLD: Duration = Duration::minutes(30);

/// Lifetime granted to an authenticated session when it is created or extended.
pub const DEFAULT_AUTHENTICATED_LIFETIME: Duration = Duration::hours(4);

/// Classification of a record at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// No authenticated user on the record.
    Unusable,
    /// The record's expiry is in the past. The caller must delete it.
    Expired,
    /// Valid, but inside the extension threshold.
    NeedsExtension,
    Valid,
}

/// A record can back an authenticated session only if it carries a user
pub fn is_record_usable(record: &SessionRecord) -> bool {
    record.user().is_some()
}

pub fn is_expired(record: &SessionRecord, now: DateTime<Utc>) -> bool {
    record.expires_at() < now
}

pub fn needs_extension(record: &SessionRecord, now: DateTime<Utc>, threshold: Duration) -> bool {
    record.expires_at() - now < threshold
}

/// Produce the extended copy of `record` expiring `lifetime` after `now`
pub fn extend(record: SessionRecord, now: DateTime<Utc>, lifetime: Duration) -> SessionRecord {
    record.with_expiry(now + lifetime)
}

pub fn classify(record: &SessionRecord, now: DateTime<Utc>, threshold: Duration) -> RecordState {
    if !is_record_usable(record) {
        RecordState::Unusable
    } else if is_expired(record, now) {
        RecordState::Expired
    } else if needs_extension(record, now, threshold) {
        RecordState::NeedsExtension
    } else {
        RecordState::Valid
    }
}
