//! Live feed message parsing.
//!
//! Frames are JSON envelopes `{"type": ..., "data": ...}`. Only the
//! `new_log` tag carries an event; anything else is reported as a
//! [`Discard`] for the consumer to drop.

use serde::Deserialize;
use std::fmt;

use crate::types::Event;

/// Tag of the envelope carrying a new event
pub const NEW_EVENT_TAG: &str = "new_log";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Why a frame did not yield an event
#[derive(Debug)]
pub enum Discard {
    /// Not JSON, or not an envelope
    Malformed(serde_json::Error),
    /// Envelope with a tag other than [`NEW_EVENT_TAG`]
    Unrecognized(String),
    /// Right tag, but `data` is not an event
    InvalidEvent(serde_json::Error),
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discard::Malformed(e) => write!(f, "malformed frame: {e}"),
            Discard::Unrecognized(kind) => write!(f, "unrecognized message type: {kind}"),
            Discard::InvalidEvent(e) => write!(f, "invalid event payload: {e}"),
        }
    }
}

/// Parse one text frame into an event
pub fn parse_frame(text: &str) -> Result<Event, Discard> {
    let envelope: Envelope = serde_json::from_str(text).map_err(Discard::Malformed)?;
    if envelope.kind != NEW_EVENT_TAG {
        return Err(Discard::Unrecognized(envelope.kind));
    }
    serde_json::from_value(envelope.data).map_err(Discard::InvalidEvent)
}
