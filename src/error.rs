// ABOUTME: Error taxonomy for the SSE broker and feed reader
// ABOUTME: Separates registry-level errors from connection-local and feed-local failures
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use thiserror::Error;

/// Errors surfaced by the broker, its connections, and feed readers.
///
/// Connection-local failures (transport writes, stream reads) terminate only
/// the owning connection or feed and are reported through the disconnect
/// callback or the subscription error queues. Registry-level errors are
/// returned synchronously to the caller.
///
/// The type is `Clone` so a single terminal stream error can fan out to every
/// subscription of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SseError {
    /// The transport cannot flush written frames on demand, so a long-lived
    /// event stream cannot be established over it. Fatal to the one connect
    /// attempt, never to the broker.
    #[error("streaming unsupported: {0}")]
    StreamingUnsupported(String),

    /// An operation addressed a client identity with no live session.
    #[error("unknown client: {0}")]
    UnknownClient(String),

    /// `subscribe` was called on a feed that has already been torn down.
    #[error("sse feed closed")]
    FeedClosed,

    /// Opening the client-side feed failed before any bytes were streamed.
    #[error("feed connect failed: {0}")]
    Connect(String),

    /// The feed's byte stream failed mid-flight. Delivered once to every
    /// subscription's error queue before the feed closes.
    #[error("stream read failed: {0}")]
    Stream(String),
}

/// Result alias used throughout the crate.
pub type SseResult<T> = Result<T, SseError>;
