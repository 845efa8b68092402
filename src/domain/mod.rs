pub mod changes;
pub mod diff;
pub mod entity;
pub mod lists;

use chrono::{DateTime, Utc};

pub use changes::{ChangeKind, ChangeRecord};
pub use diff::diff;
pub use entity::{parse_entities, Entity, RemovedEntity, TrackedEntity};
pub use lists::{CheckStatus, Lists, WatcherStatus};

pub type Timestamp = DateTime<Utc>;

/// Current time truncated to the millisecond precision the store keeps,
/// so in-memory values compare equal to what is read back.
pub fn now() -> Timestamp {
    from_millis(Utc::now().timestamp_millis())
}

pub fn from_millis(ms: i64) -> Timestamp {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// RFC 7231 date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(ts: Timestamp) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
