// ABOUTME: Transport seam between the broker and the HTTP layer that carries the stream
// ABOUTME: Flushing frame sink trait, canonical response headers, and a channel-backed loopback sink
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue};
use tokio::sync::mpsc;

/// Write half of one streaming response.
///
/// A frame is only useful once it reaches the peer, so `send_frame` combines
/// write and flush. Implementations that buffer without an on-demand flush
/// must report `supports_streaming() == false`, which makes the broker reject
/// the connect attempt with `StreamingUnsupported`.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Writes one encoded frame and flushes it to the peer.
    async fn send_frame(&mut self, frame: Bytes) -> io::Result<()>;

    /// Whether the underlying response can flush on demand.
    fn supports_streaming(&self) -> bool {
        true
    }

    /// Applies the event-stream response headers before the first frame.
    ///
    /// Called once at connect time with the canonical headers merged with the
    /// broker's custom ones. Sinks with no header concept ignore this.
    fn apply_headers(&mut self, _headers: &HeaderMap) {}
}

/// Canonical response headers for an event stream, merged with any
/// caller-supplied custom entries (CORS and the like).
#[must_use]
pub fn stream_headers(custom: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    for (name, value) in custom {
        headers.insert(name.clone(), value.clone());
    }
    headers
}

/// In-memory sink backed by a bounded channel.
///
/// The receiving half exposes the raw frame stream, which can feed a
/// `FeedReader` directly; this is the loopback transport used by the
/// round-trip tests and by embedders that bridge frames into their own HTTP
/// response type.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    /// Creates a sink and the receiver for its frames.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send_frame(&mut self, frame: Bytes) -> io::Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "frame receiver dropped"))
    }
}
