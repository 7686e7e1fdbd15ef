//! # Feed Envelope
//!
//! Every message pushed by the feed server is a JSON object of the form
//! `{ "event": "<name>", "payload": <any>, "created_at": "<timestamp>" }`.
//! The transport layer never looks inside `payload`; only router subscribers
//! give it meaning.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::error::RealtimeError;

/// Naive layouts the feed server is known to emit (Python `str()` and `isoformat()`
/// of a UTC datetime without an offset).
const NAIVE_LAYOUTS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// The wire unit carried over the feed.
///
/// `T` defaults to `serde_json::Value`, which is what the router dispatches.
/// A missing `payload` decodes as `null` and a missing `created_at` as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    /// Free-form event name, e.g. `device.update`.
    pub event: String,
    /// Event body, opaque to the transport layer.
    #[serde(default)]
    pub payload: T,
    /// Server-side creation time.
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Converts the payload into a concrete type.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<Envelope<T>, RealtimeError> {
        Ok(Envelope {
            event: self.event,
            payload: serde_json::from_value(self.payload)?,
            created_at: self.created_at,
        })
    }
}

/// Decodes one raw message body into an envelope.
pub fn decode_envelope(raw: &str) -> Result<Envelope, RealtimeError> {
    Ok(serde_json::from_str(raw)?)
}

/// Parses a timestamp in RFC 3339 form, or in one of the naive layouts the
/// feed server produces (interpreted as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
        .map(|naive| naive.and_utc())
}

/// Serde adapter for optional timestamps in any format `parse_timestamp` accepts.
///
/// Use together with `#[serde(default)]` so that an absent field is `None`.
pub fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|text| {
        parse_timestamp(&text).ok_or_else(|| D::Error::custom(format!("invalid timestamp '{text}'")))
    })
    .transpose()
}
