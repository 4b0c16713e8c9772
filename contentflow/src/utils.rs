//! UUID and timestamp helpers shared across the orchestrator.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// UTC timestamp used throughout workflow and artifact records.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Returns the current UTC time as an RFC 3339 string with microsecond
/// precision, e.g. `2026-08-30T12:34:56.123456Z`.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Generates a new random UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}
