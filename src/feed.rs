// ABOUTME: Client-side feed reader: one decode task over a streaming GET response
// ABOUTME: Fans decoded events out to subscriptions filtered by event type
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::HeaderMap;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{SseError, SseResult};
use crate::event::TextEvent;
use crate::parser::StreamDecoder;

/// Delivery queue depth per subscription. A subscriber that lags this far
/// behind makes the decode task await until it drains.
const SUBSCRIPTION_BUFFER: usize = 32;

#[derive(Debug)]
struct SubscriptionHandle {
    event_type: String,
    events: mpsc::Sender<TextEvent>,
    errors: mpsc::Sender<SseError>,
}

#[derive(Debug)]
struct FeedInner {
    subscriptions: RwLock<HashMap<Uuid, SubscriptionHandle>>,
    stop: CancellationToken,
    closed: AtomicBool,
}

impl FeedInner {
    /// Delivers one decoded event to every subscription whose filter is empty
    /// or equals the event's type. The subscription lock is held for the
    /// fan-out, never during the stream read.
    async fn deliver(&self, event: TextEvent) {
        let subscriptions = self.subscriptions.read().await;
        for sub in subscriptions.values() {
            if sub.event_type.is_empty() || sub.event_type == event.event {
                // A dropped receiver just misses the event; its entry goes
                // away when the subscription is closed.
                let _ = sub.events.send(event.clone()).await;
            }
        }
    }

    /// Terminal stream failure: one error to every subscription, then close.
    async fn fail(&self, error: SseError) {
        {
            let subscriptions = self.subscriptions.read().await;
            for sub in subscriptions.values() {
                // Error queues hold exactly one terminal error.
                let _ = sub.errors.try_send(error.clone());
            }
        }
        self.close().await;
    }

    /// Stops the decode task and closes every delivery queue. Idempotent.
    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop.cancel();
        // Dropping the handles closes the queues; receivers observe `None`.
        self.subscriptions.write().await.clear();
    }
}

/// Client-side counterpart of the broker: consumes one streaming response,
/// decodes the wire format incrementally, and distributes completed events to
/// its subscriptions.
pub struct FeedReader {
    inner: Arc<FeedInner>,
}

impl FeedReader {
    /// Issues a GET to `url` with `headers` and starts the decode task over
    /// the response body.
    ///
    /// # Errors
    ///
    /// Returns [`SseError::Connect`] when the request fails or the server
    /// answers with a non-success status.
    pub async fn connect(url: &str, headers: HeaderMap) -> SseResult<Self> {
        let response = reqwest::Client::new()
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|err| SseError::Connect(err.to_string()))?
            .error_for_status()
            .map_err(|err| SseError::Connect(err.to_string()))?;

        Ok(Self::from_byte_stream(response.bytes_stream()))
    }

    /// Starts a feed over an arbitrary chunked byte stream.
    ///
    /// This is the seam `connect` uses underneath; tests and embedders with
    /// their own transport feed frames through it directly.
    pub fn from_byte_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let inner = Arc::new(FeedInner {
            subscriptions: RwLock::new(HashMap::new()),
            stop: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(decode_loop(Arc::clone(&inner), stream));

        Self { inner }
    }

    /// Registers a subscription delivering events whose type equals
    /// `event_type`; an empty filter receives every event.
    ///
    /// # Errors
    ///
    /// Returns [`SseError::FeedClosed`] when the feed was already closed.
    pub async fn subscribe(&self, event_type: impl Into<String>) -> SseResult<Subscription> {
        let event_type = event_type.into();
        let (events_tx, events_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (errors_tx, errors_rx) = mpsc::channel(1);
        let id = Uuid::new_v4();

        // The closed flag is checked under the same write lock `close` clears
        // the registry with, so a handle can never land in a dead feed's map.
        let mut subscriptions = self.inner.subscriptions.write().await;
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(SseError::FeedClosed);
        }
        subscriptions.insert(
            id,
            SubscriptionHandle {
                event_type: event_type.clone(),
                events: events_tx,
                errors: errors_tx,
            },
        );
        drop(subscriptions);

        Ok(Subscription {
            id,
            event_type,
            feed: Arc::clone(&self.inner),
            events: events_rx,
            errors: errors_rx,
        })
    }

    /// Whether the feed has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Signals the decode task to stop and closes every subscription queue.
    ///
    /// The stop signal is only observed between stream reads: an in-flight
    /// read completes (or fails, or hits end-of-stream) before the task
    /// actually exits.
    pub async fn close(&self) {
        self.inner.close().await;
    }
}

/// A consumer-owned, filtered view onto a feed.
///
/// Events arrive in wire order on the delivery queue; the error queue carries
/// at most one terminal error.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    event_type: String,
    feed: Arc<FeedInner>,
    events: mpsc::Receiver<TextEvent>,
    errors: mpsc::Receiver<SseError>,
}

impl Subscription {
    /// The event-type filter; `""` matches every event.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Receives the next event, or `None` once the feed closed.
    pub async fn recv(&mut self) -> Option<TextEvent> {
        self.events.recv().await
    }

    /// Receives the terminal error, or `None` if the feed closed without one.
    pub async fn recv_error(&mut self) -> Option<SseError> {
        self.errors.recv().await
    }

    /// Deregisters the subscription; later events matching its filter are no
    /// longer delivered anywhere.
    pub async fn close(self) {
        self.feed.subscriptions.write().await.remove(&self.id);
    }
}

/// The feed's single decode task: reads the stream chunk by chunk until
/// end-of-stream, a read error, or the stop signal between reads.
async fn decode_loop<S, E>(inner: Arc<FeedInner>, stream: S)
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    futures_util::pin_mut!(stream);
    let mut decoder = StreamDecoder::new();

    loop {
        let chunk = tokio::select! {
            () = inner.stop.cancelled() => break,
            chunk = stream.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for event in decoder.feed(&bytes) {
                    inner.deliver(event).await;
                }
            }
            Some(Err(err)) => {
                tracing::error!("feed stream read failed: {err}");
                inner.fail(SseError::Stream(err.to_string())).await;
                return;
            }
            None => break,
        }
    }

    decoder.finish();
    inner.close().await;
}
