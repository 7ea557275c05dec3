/// Timestamp type used throughout the SDK, serialized as ISO-8601/RFC-3339.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

pub(crate) fn now() -> Timestamp {
    chrono::Utc::now()
}
