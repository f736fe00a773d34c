//! Broadcast events.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named occurrence pushed to every session subscribed to its type.
///
/// Events are immutable once built and are shared between subscribers as
/// `Arc<Event>`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    event_type: String,
    payload: Value,
    timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the current UTC time.
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self::at(event_type, payload, Utc::now())
    }

    /// Create an event with an explicit generation time.
    pub fn at(event_type: impl Into<String>, payload: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp,
        }
    }

    /// Event type used for subscription matching.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Opaque payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Generation time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Generation time as ISO-8601 with millisecond precision.
    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}
