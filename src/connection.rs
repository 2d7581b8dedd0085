// ABOUTME: One live server-side session: outgoing frame queue, heartbeat timer, serve task
// ABOUTME: Writes frames until the peer disconnects, the broker shuts it down, or a write fails
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{SseError, SseResult};
use crate::event::Event;
use crate::transport::FrameSink;

/// Interval between heartbeat frames unless the caller overrides it.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// One live event-stream session belonging to a client identity.
///
/// Created by the broker on a successful connect; the caller learns of final
/// teardown through [`Connection::done`]. The outgoing queue holds a single
/// frame, so a sender awaits until the serve task drains a slow peer — the
/// deliberate simplicity-over-backpressure-isolation trade-off of this
/// protocol.
#[derive(Debug)]
pub struct Connection {
    session_id: Uuid,
    outgoing: mpsc::Sender<Bytes>,
    shutdown: CancellationToken,
    done: CancellationToken,
    closed: Arc<AtomicBool>,
    pending_rx: Option<mpsc::Receiver<Bytes>>,
}

impl Connection {
    /// Builds the session state without starting its serve task.
    ///
    /// The broker registers the session first and only then calls
    /// [`Connection::spawn_serve`], so a peer that cancels immediately can
    /// never deregister before registration happened.
    pub(crate) fn new<S: FrameSink>(sink: &S) -> SseResult<Self> {
        if !sink.supports_streaming() {
            return Err(SseError::StreamingUnsupported(
                "transport does not support on-demand flushing".to_owned(),
            ));
        }

        let (tx, rx) = mpsc::channel(1);
        Ok(Self {
            session_id: Uuid::new_v4(),
            outgoing: tx,
            shutdown: CancellationToken::new(),
            done: CancellationToken::new(),
            closed: Arc::new(AtomicBool::new(false)),
            pending_rx: Some(rx),
        })
    }

    /// Starts the serve task. `on_close` runs on its own spawned task after
    /// the serve loop exits, never on the serve task's stack.
    pub(crate) fn spawn_serve<S, F>(
        &mut self,
        sink: S,
        peer_cancel: CancellationToken,
        heartbeat_interval: Duration,
        on_close: F,
    ) where
        S: FrameSink,
        F: FnOnce(Uuid) + Send + 'static,
    {
        let Some(rx) = self.pending_rx.take() else {
            return;
        };

        tokio::spawn(serve(ServeState {
            session_id: self.session_id,
            sink,
            outgoing: rx,
            heartbeat_tx: self.outgoing.downgrade(),
            peer_cancel,
            shutdown: self.shutdown.clone(),
            done: self.done.clone(),
            closed: Arc::clone(&self.closed),
            heartbeat_interval,
            on_close,
        }));
    }

    /// Globally unique id distinguishing this session from other concurrent
    /// sessions of the same client.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Whether the serve task has exited.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once the serve task has exited for any reason.
    pub async fn done(&self) {
        self.done.cancelled().await;
    }

    /// Enqueues one event for this session.
    ///
    /// Awaits while the queue is full. Events addressed to a session whose
    /// serve task already exited are dropped.
    pub async fn send(&self, event: &Event) {
        if self.outgoing.send(event.encode()).await.is_err() {
            tracing::debug!(session_id = %self.session_id, "dropping event for closed session");
        }
    }

    /// Signals the serve task to terminate.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<Bytes> {
        self.outgoing.clone()
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

struct ServeState<S, F> {
    session_id: Uuid,
    sink: S,
    outgoing: mpsc::Receiver<Bytes>,
    heartbeat_tx: mpsc::WeakSender<Bytes>,
    peer_cancel: CancellationToken,
    shutdown: CancellationToken,
    done: CancellationToken,
    closed: Arc<AtomicBool>,
    heartbeat_interval: Duration,
    on_close: F,
}

/// Single task per session. Waits for the first of peer cancellation,
/// broker shutdown, a heartbeat tick, or an outgoing frame; exits when the
/// peer goes away, a write fails, or the queue closes.
async fn serve<S, F>(mut state: ServeState<S, F>)
where
    S: FrameSink,
    F: FnOnce(Uuid) + Send + 'static,
{
    let mut heartbeat = tokio::time::interval(state.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // An interval's first tick completes immediately; consume it so the
    // first heartbeat fires one full interval after connect.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            () = state.peer_cancel.cancelled() => {
                tracing::debug!(session_id = %state.session_id, "peer disconnected");
                break;
            }
            () = state.shutdown.cancelled() => {
                tracing::debug!(session_id = %state.session_id, "session shut down");
                break;
            }
            _ = heartbeat.tick() => {
                // Enqueued from a spawned task so a full queue never stalls
                // the serve loop itself.
                if let Some(tx) = state.heartbeat_tx.upgrade() {
                    tokio::spawn(async move {
                        let _ = tx.send(Event::Heartbeat.encode()).await;
                    });
                }
            }
            frame = state.outgoing.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                if let Err(err) = state.sink.send_frame(frame).await {
                    tracing::error!(
                        session_id = %state.session_id,
                        "unable to write to client: {err}"
                    );
                    break;
                }
            }
        }
    }

    state.closed.store(true, Ordering::SeqCst);
    state.done.cancel();

    let session_id = state.session_id;
    let on_close = state.on_close;
    tokio::spawn(async move {
        on_close(session_id);
    });
}
