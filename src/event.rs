// ABOUTME: Logical event model and wire-frame encoder for the SSE protocol
// ABOUTME: Text, JSON, and heartbeat variants with line-oriented frame serialization
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;

/// A plain-text event: optional id, event type, and a payload that may span
/// multiple lines.
///
/// An empty `id` means the frame carries no `id:` line. Decoded frames on the
/// client side are always represented as `TextEvent`s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextEvent {
    /// Frame id; embedded newlines are stripped at encode time.
    pub id: String,
    /// Event type tag used for subscription filtering.
    pub event: String,
    /// Payload text; each physical line becomes its own `data:` line.
    pub data: String,
}

impl TextEvent {
    /// Creates a text event from id, type, and payload.
    pub fn new(
        id: impl Into<String>,
        event: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            event: event.into(),
            data: data.into(),
        }
    }
}

/// An event whose payload travels as compact JSON in place of plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonEvent {
    /// Frame id; embedded newlines are stripped at encode time.
    pub id: String,
    /// Event type tag used for subscription filtering.
    pub event: String,
    /// Payload value, rendered with `serde_json` at encode time.
    pub data: Value,
}

impl JsonEvent {
    /// Creates a JSON event by serializing `data`.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error when `data` cannot be
    /// represented as a JSON value.
    pub fn new<T: Serialize>(
        id: impl Into<String>,
        event: impl Into<String>,
        data: &T,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            id: id.into(),
            event: event.into(),
            data: serde_json::to_value(data)?,
        })
    }
}

/// One logical unit of the push protocol.
///
/// Heartbeats are comment-only frames: they carry no id, type, or data, and a
/// conforming decoder never surfaces them as events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Plain-text event.
    Text(TextEvent),
    /// Event carrying a JSON payload.
    Json(JsonEvent),
    /// Keep-alive comment frame.
    Heartbeat,
}

impl Event {
    /// Frame id, or `""` for frames without one.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Text(ev) => &ev.id,
            Self::Json(ev) => &ev.id,
            Self::Heartbeat => "",
        }
    }

    /// Event type tag, or `""` for heartbeats.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::Text(ev) => &ev.event,
            Self::Json(ev) => &ev.event,
            Self::Heartbeat => "",
        }
    }

    /// Payload in its wire form: the text itself for text events, the compact
    /// JSON rendering for JSON events, empty for heartbeats.
    #[must_use]
    pub fn data(&self) -> String {
        match self {
            Self::Text(ev) => ev.data.clone(),
            Self::Json(ev) => ev.data.to_string(),
            Self::Heartbeat => String::new(),
        }
    }

    /// Encodes the event as one wire frame, terminated by a blank line.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Text(ev) => encode_frame(&ev.id, &ev.event, &ev.data),
            Self::Json(ev) => encode_frame(&ev.id, &ev.event, &ev.data.to_string()),
            Self::Heartbeat => Bytes::from_static(b": heartbeat\n\n"),
        }
    }
}

impl From<TextEvent> for Event {
    fn from(ev: TextEvent) -> Self {
        Self::Text(ev)
    }
}

impl From<JsonEvent> for Event {
    fn from(ev: JsonEvent) -> Self {
        Self::Json(ev)
    }
}

/// Serializes one frame: optional `id:` line, `event:` line, one `data:` line
/// per payload line, blank-line terminator.
///
/// Ids and event types must stay on their single line, so embedded newlines
/// are stripped. An empty payload still emits one empty `data:` line; the
/// data field is never absent from a non-heartbeat frame.
fn encode_frame(id: &str, event: &str, data: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(data.len() + event.len() + id.len() + 32);

    if !id.is_empty() {
        buf.put_slice(b"id: ");
        buf.put_slice(id.replace('\n', "").as_bytes());
        buf.put_u8(b'\n');
    }

    buf.put_slice(b"event: ");
    buf.put_slice(event.replace('\n', "").as_bytes());
    buf.put_u8(b'\n');

    for line in data.split('\n') {
        buf.put_slice(b"data: ");
        buf.put_slice(line.as_bytes());
        buf.put_u8(b'\n');
    }

    buf.put_u8(b'\n');
    buf.freeze()
}
