// ABOUTME: Registry of live sessions keyed by client identity, with per-client metadata
// ABOUTME: Fans events out to every session of a client (send) or of every client (broadcast)
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::connection::{Connection, DEFAULT_HEARTBEAT_INTERVAL};
use crate::error::{SseError, SseResult};
use crate::event::Event;
use crate::transport::{stream_headers, FrameSink};

/// Bound on the identity types a broker can key its registry by. Implemented
/// for every comparable, hashable, cloneable type — strings, integers, UUIDs.
pub trait ClientId: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static> ClientId for T {}

/// Opaque per-client metadata bag. Exists while at least one session of the
/// client does; it has no independent lifetime.
pub type ClientMetadata = HashMap<String, serde_json::Value>;

type DisconnectCallback<I> = Arc<dyn Fn(I, Uuid) + Send + Sync>;

struct SessionHandle {
    outgoing: mpsc::Sender<Bytes>,
    shutdown: CancellationToken,
}

struct ClientEntry {
    metadata: ClientMetadata,
    sessions: HashMap<Uuid, SessionHandle>,
}

impl ClientEntry {
    fn new() -> Self {
        Self {
            metadata: ClientMetadata::new(),
            sessions: HashMap::new(),
        }
    }
}

struct BrokerInner<I> {
    clients: Mutex<HashMap<I, ClientEntry>>,
    disconnect_callback: Mutex<Option<DisconnectCallback<I>>>,
    custom_headers: HeaderMap,
}

/// Server-side multiplexer for the push protocol.
///
/// Maps a client identity to the set of live sessions for that client — a
/// client may hold several at once, one per browser tab or device. Cheap to
/// clone; clones share the registry.
///
/// All structural mutation happens under one lock, and the lock is never held
/// across an await: send paths snapshot the queue handles first, then enqueue.
pub struct Broker<I: ClientId> {
    inner: Arc<BrokerInner<I>>,
}

impl<I: ClientId> Clone for Broker<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I: ClientId> Default for Broker<I> {
    fn default() -> Self {
        Self::new(HeaderMap::new())
    }
}

impl<I: ClientId> Broker<I> {
    /// Creates a broker. `custom_headers` are merged with the canonical
    /// event-stream headers on every connect (CORS entries, typically).
    #[must_use]
    pub fn new(custom_headers: HeaderMap) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                clients: Mutex::new(HashMap::new()),
                disconnect_callback: Mutex::new(None),
                custom_headers,
            }),
        }
    }

    /// Opens a session for `client_id` over `sink` with the default 15 s
    /// heartbeat interval.
    ///
    /// `peer_cancel` is the transport's request-abort signal; cancelling it
    /// terminates the session as a peer disconnect.
    ///
    /// # Errors
    ///
    /// Returns [`SseError::StreamingUnsupported`] when the sink cannot flush
    /// frames on demand.
    pub fn connect<S: FrameSink>(
        &self,
        client_id: I,
        sink: S,
        peer_cancel: CancellationToken,
    ) -> SseResult<Connection> {
        self.connect_with_heartbeat_interval(client_id, sink, peer_cancel, DEFAULT_HEARTBEAT_INTERVAL)
    }

    /// Opens a session with a caller-chosen heartbeat interval.
    ///
    /// # Errors
    ///
    /// Returns [`SseError::StreamingUnsupported`] when the sink cannot flush
    /// frames on demand.
    pub fn connect_with_heartbeat_interval<S: FrameSink>(
        &self,
        client_id: I,
        mut sink: S,
        peer_cancel: CancellationToken,
        heartbeat_interval: Duration,
    ) -> SseResult<Connection> {
        let mut conn = Connection::new(&sink)?;
        sink.apply_headers(&stream_headers(&self.inner.custom_headers));

        let session_id = conn.session_id();
        let handle = SessionHandle {
            outgoing: conn.sender(),
            shutdown: conn.shutdown_token(),
        };

        {
            let mut clients = lock(&self.inner.clients);
            clients
                .entry(client_id.clone())
                .or_insert_with(ClientEntry::new)
                .sessions
                .insert(session_id, handle);
        }

        tracing::debug!(client_id = ?client_id, %session_id, "session registered");

        let broker = self.clone();
        conn.spawn_serve(sink, peer_cancel, heartbeat_interval, move |session_id| {
            broker.remove_session(&client_id, session_id);
        });

        Ok(conn)
    }

    /// Whether at least one live session exists for `client_id`.
    #[must_use]
    pub fn is_client_present(&self, client_id: &I) -> bool {
        lock(&self.inner.clients).contains_key(client_id)
    }

    /// Replaces the metadata of `client_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SseError::UnknownClient`] when no live session exists.
    pub fn set_client_metadata(&self, client_id: &I, metadata: ClientMetadata) -> SseResult<()> {
        let mut clients = lock(&self.inner.clients);
        let entry = clients
            .get_mut(client_id)
            .ok_or_else(|| unknown_client(client_id))?;
        entry.metadata = metadata;
        Ok(())
    }

    /// Returns a copy of the metadata of `client_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SseError::UnknownClient`] when no live session exists.
    pub fn get_client_metadata(&self, client_id: &I) -> SseResult<ClientMetadata> {
        let clients = lock(&self.inner.clients);
        let entry = clients
            .get(client_id)
            .ok_or_else(|| unknown_client(client_id))?;
        Ok(entry.metadata.clone())
    }

    /// Enqueues `event` on every session of `client_id`.
    ///
    /// Awaits while a session's queue is full; a permanently stalled peer
    /// stalls the caller (see the crate docs on the backpressure trade-off).
    ///
    /// # Errors
    ///
    /// Returns [`SseError::UnknownClient`] when no live session exists.
    pub async fn send(&self, client_id: &I, event: &Event) -> SseResult<()> {
        let senders: Vec<mpsc::Sender<Bytes>> = {
            let clients = lock(&self.inner.clients);
            let entry = clients
                .get(client_id)
                .ok_or_else(|| unknown_client(client_id))?;
            entry.sessions.values().map(|s| s.outgoing.clone()).collect()
        };

        let frame = event.encode();
        for tx in senders {
            // A session torn down mid-send just misses the event.
            let _ = tx.send(frame.clone()).await;
        }
        Ok(())
    }

    /// Enqueues `event` on every session of every client.
    pub async fn broadcast(&self, event: &Event) {
        let senders: Vec<mpsc::Sender<Bytes>> = {
            let clients = lock(&self.inner.clients);
            clients
                .values()
                .flat_map(|entry| entry.sessions.values().map(|s| s.outgoing.clone()))
                .collect()
        };

        let frame = event.encode();
        for tx in senders {
            let _ = tx.send(frame.clone()).await;
        }
    }

    /// Registers a callback invoked (on its own task) whenever any session
    /// terminates, with the owning identity and the session id.
    pub fn set_disconnect_callback<F>(&self, callback: F)
    where
        F: Fn(I, Uuid) + Send + Sync + 'static,
    {
        *lock(&self.inner.disconnect_callback) = Some(Arc::new(callback));
    }

    /// Signals every live session to terminate and clears the registry.
    ///
    /// The disconnect callback still fires once per session being closed.
    /// Calling this on an empty registry is a no-op.
    pub fn close(&self) {
        let removed: Vec<(I, Uuid)> = {
            let mut clients = lock(&self.inner.clients);
            let removed = clients
                .iter()
                .flat_map(|(id, entry)| {
                    entry.sessions.iter().map(|(session_id, handle)| {
                        handle.shutdown.cancel();
                        (id.clone(), *session_id)
                    })
                })
                .collect();
            clients.clear();
            removed
        };

        for (client_id, session_id) in removed {
            self.fire_disconnect(client_id, session_id);
        }
    }

    /// Deregisters one session; removing the last session of an identity also
    /// drops its metadata. Runs off the serve task's stack, after the lock is
    /// released the disconnect callback fires on its own task.
    fn remove_session(&self, client_id: &I, session_id: Uuid) {
        {
            let mut clients = lock(&self.inner.clients);
            let Some(entry) = clients.get_mut(client_id) else {
                return;
            };
            // A session force-removed by `close` already had its disconnect
            // reported; only an actual removal here gets one.
            if entry.sessions.remove(&session_id).is_none() {
                return;
            }
            if entry.sessions.is_empty() {
                clients.remove(client_id);
            }
        }

        tracing::debug!(client_id = ?client_id, %session_id, "session deregistered");
        self.fire_disconnect(client_id.clone(), session_id);
    }

    fn fire_disconnect(&self, client_id: I, session_id: Uuid) {
        let callback = lock(&self.inner.disconnect_callback).clone();
        if let Some(callback) = callback {
            tokio::spawn(async move {
                callback(client_id, session_id);
            });
        }
    }
}

fn unknown_client<I: ClientId>(client_id: &I) -> SseError {
    SseError::UnknownClient(format!("{client_id:?}"))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
