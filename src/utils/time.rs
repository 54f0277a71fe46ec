//! Serde helpers for the timestamps the chat API emits.
//!
//! The server may or may not attach an offset to `created_at`.  Timestamps without one are
//! naive UTC and are read as such.

use serde::{Deserialize, Deserializer, Serializer};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

/// Parse an RFC 3339 timestamp, or an ISO 8601 timestamp without offset taken as UTC.
pub fn parse_timestamp(s: &str) -> Result<OffsetDateTime, time::error::Parse> {
    match OffsetDateTime::parse(s, &Rfc3339) {
        Ok(when) => Ok(when),
        Err(_) => PrimitiveDateTime::parse(s, &Iso8601::DEFAULT).map(|p| p.assume_utc()),
    }
}

/// Deserialize an RFC 3339 or offset-less ISO 8601 string into an OffsetDateTime
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_timestamp(&s).map_err(serde::de::Error::custom)
}

/// Serialize an OffsetDateTime into an RFC 3339 formatted string
pub fn serialize<S>(datetime: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = datetime
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&s)
}
