use acs::events::{CallEventData, CloudEvent, RecordingFileStatusUpdatedEventData};
use serde::Deserialize;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;
use url::Url;

const EVENT_TYPE_PREFIX: &str = "Microsoft.Communication.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CallStarted,
    CallEnded,
    RecordingFileStatusUpdated,
    Other,
}

impl EventKind {
    /// Accepts both `Microsoft.Communication.CallStarted` and `CallStarted`.
    pub fn from_type(event_type: &str) -> EventKind {
        match event_type
            .strip_prefix(EVENT_TYPE_PREFIX)
            .unwrap_or(event_type)
        {
            "CallStarted" => EventKind::CallStarted,
            "CallEnded" => EventKind::CallEnded,
            "RecordingFileStatusUpdated" => EventKind::RecordingFileStatusUpdated,
            _ => EventKind::Other,
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            EventKind::CallStarted => f.write_str("CallStarted"),
            EventKind::CallEnded => f.write_str("CallEnded"),
            EventKind::RecordingFileStatusUpdated => f.write_str("RecordingFileStatusUpdated"),
            EventKind::Other => f.write_str("Other"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEvent {
    pub server_call_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingChunk {
    pub content_location: Url,
    pub delete_location: Url,
}

/// A recording file notification. Only the first chunk is acted upon, so it is
/// the only one decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingFileStatusEvent {
    first: RecordingChunk,
}

impl RecordingFileStatusEvent {
    pub fn new(first: RecordingChunk) -> Self {
        Self { first }
    }

    pub fn first_chunk(&self) -> &RecordingChunk {
        &self.first
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    CallStarted(CallEvent),
    CallEnded(CallEvent),
    RecordingFileStatusUpdated(RecordingFileStatusEvent),
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::CallStarted(_) => EventKind::CallStarted,
            InboundEvent::CallEnded(_) => EventKind::CallEnded,
            InboundEvent::RecordingFileStatusUpdated(_) => EventKind::RecordingFileStatusUpdated,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message body is not a cloud event: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("malformed {kind} payload in event {event_id}: {source}")]
    Payload {
        kind: EventKind,
        event_id: String,
        source: serde_json::Error,
    },
    #[error("{kind} event {event_id} carries no recording chunks")]
    NoChunks { kind: EventKind, event_id: String },
    #[error("invalid {field} `{value}` in event {event_id}: {source}")]
    Location {
        field: &'static str,
        value: String,
        event_id: String,
        source: url::ParseError,
    },
}

/// Parses a queue message body holding a single cloud event or an Event Grid
/// batch (a JSON array of them).
pub fn parse_envelopes(body: &str) -> Result<Vec<CloudEvent>, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(DecodeError::Envelope)?;
    let events = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value),
        _ => serde_json::from_value(value).map(|event| vec![event]),
    };

    events.map_err(DecodeError::Envelope)
}

/// Decodes the payload of `event` according to its type. Unrecognised types
/// decode to `None`.
pub fn decode(event: &CloudEvent) -> Result<Option<InboundEvent>, DecodeError> {
    let kind = EventKind::from_type(&event.event_type);
    let decoded = match kind {
        EventKind::CallStarted => InboundEvent::CallStarted(decode_call(kind, event)?),
        EventKind::CallEnded => InboundEvent::CallEnded(decode_call(kind, event)?),
        EventKind::RecordingFileStatusUpdated => {
            InboundEvent::RecordingFileStatusUpdated(decode_recording_file_status(kind, event)?)
        }
        EventKind::Other => return Ok(None),
    };

    Ok(Some(decoded))
}

fn decode_call(kind: EventKind, event: &CloudEvent) -> Result<CallEvent, DecodeError> {
    let data = CallEventData::deserialize(&event.data).map_err(|source| DecodeError::Payload {
        kind,
        event_id: event.id.clone(),
        source,
    })?;

    Ok(CallEvent {
        server_call_id: data.server_call_id,
    })
}

fn decode_recording_file_status(
    kind: EventKind,
    event: &CloudEvent,
) -> Result<RecordingFileStatusEvent, DecodeError> {
    let data = RecordingFileStatusUpdatedEventData::deserialize(&event.data).map_err(|source| {
        DecodeError::Payload {
            kind,
            event_id: event.id.clone(),
            source,
        }
    })?;

    let chunk = data
        .recording_storage_info
        .recording_chunks
        .first()
        .ok_or_else(|| DecodeError::NoChunks {
            kind,
            event_id: event.id.clone(),
        })?;

    Ok(RecordingFileStatusEvent::new(RecordingChunk {
        content_location: location("contentLocation", &chunk.content_location, event)?,
        delete_location: location("deleteLocation", &chunk.delete_location, event)?,
    }))
}

fn location(field: &'static str, value: &str, event: &CloudEvent) -> Result<Url, DecodeError> {
    Url::parse(value).map_err(|source| DecodeError::Location {
        field,
        value: value.to_string(),
        event_id: event.id.clone(),
        source,
    })
}
