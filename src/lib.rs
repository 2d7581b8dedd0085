// ABOUTME: Main library entry point for the SSE relay crate
// ABOUTME: Server-side broker with per-client sessions plus a client-side streaming feed reader
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![deny(unsafe_code)]

//! # SSE Relay
//!
//! A bidirectional Server-Sent-Events subsystem: a server-side [`Broker`]
//! multiplexes a long-lived push protocol to many concurrently connected
//! clients (each client may hold several sessions at once), and a
//! client-side [`FeedReader`] consumes the same wire protocol, reassembles
//! framed events, and fans them out to independent [`Subscription`]s
//! filtered by event type.
//!
//! ## Server side
//!
//! ```rust,no_run
//! use http::HeaderMap;
//! use sse_relay::{Broker, ChannelSink, Event, TextEvent};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> sse_relay::SseResult<()> {
//! let broker: Broker<String> = Broker::new(HeaderMap::new());
//!
//! // One sink per streaming response; the cancellation token is the
//! // transport's request-abort signal.
//! let (sink, _frames) = ChannelSink::new(8);
//! let connection = broker.connect("user-1".to_owned(), sink, CancellationToken::new())?;
//!
//! broker
//!     .send(&"user-1".to_owned(), &Event::Text(TextEvent::new("1", "message", "42")))
//!     .await?;
//! connection.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Client side
//!
//! ```rust,no_run
//! use http::HeaderMap;
//! use sse_relay::FeedReader;
//!
//! # #[tokio::main]
//! # async fn main() -> sse_relay::SseResult<()> {
//! let feed = FeedReader::connect("https://example.org/sse", HeaderMap::new()).await?;
//! let mut messages = feed.subscribe("message").await?;
//! while let Some(event) = messages.recv().await {
//!     println!("{}: {}", event.event, event.data);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Wire format
//!
//! Frames are line-oriented text: an optional `id:` line, an `event:` line,
//! one `data:` line per payload line, and a terminating blank line.
//! Heartbeats are comment frames (`: heartbeat`) that keep idle connections
//! alive through intermediaries and never surface as events.

/// Session registry keyed by client identity, send/broadcast fan-out
pub mod broker;
/// One live server-side session and its serve task
pub mod connection;
/// Error taxonomy
pub mod error;
/// Event model and wire-frame encoder
pub mod event;
/// Client-side feed reader and subscriptions
pub mod feed;
/// Set-once tracing subscriber installation
pub mod logging;
/// Streaming wire-format decoder
pub mod parser;
/// Transport seam: frame sink trait, response headers, loopback sink
pub mod transport;

pub use broker::{Broker, ClientId, ClientMetadata};
pub use connection::{Connection, DEFAULT_HEARTBEAT_INTERVAL};
pub use error::{SseError, SseResult};
pub use event::{Event, JsonEvent, TextEvent};
pub use feed::{FeedReader, Subscription};
pub use parser::{FrameDecoder, LineBuffer, StreamDecoder};
pub use transport::{stream_headers, ChannelSink, FrameSink};
