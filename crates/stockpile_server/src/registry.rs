//! Live session registry and fan-out.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::warn;

/// Identifier of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Returns the raw id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sending side of a session's ordered outbound queue.
#[derive(Debug)]
pub(crate) enum Outbound {
    Unbounded(mpsc::UnboundedSender<Arc<str>>),
    Bounded(mpsc::Sender<Arc<str>>),
}

/// Receiving side of a session's outbound queue, owned by its writer task.
#[derive(Debug)]
pub(crate) enum OutboundReceiver {
    Unbounded(mpsc::UnboundedReceiver<Arc<str>>),
    Bounded(mpsc::Receiver<Arc<str>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryFailure {
    Full,
    Closed,
}

/// Creates an outbound queue, bounded when `capacity` is set.
pub(crate) fn outbound_channel(capacity: Option<usize>) -> (Outbound, OutboundReceiver) {
    match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (Outbound::Bounded(tx), OutboundReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Outbound::Unbounded(tx), OutboundReceiver::Unbounded(rx))
        }
    }
}

impl Outbound {
    fn try_send(&self, line: Arc<str>) -> Result<(), DeliveryFailure> {
        match self {
            Outbound::Unbounded(tx) => tx.send(line).map_err(|_| DeliveryFailure::Closed),
            Outbound::Bounded(tx) => tx.try_send(line).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DeliveryFailure::Full,
                mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
            }),
        }
    }
}

impl OutboundReceiver {
    /// Waits for the next line; `None` once every sender is gone.
    pub(crate) async fn recv(&mut self) -> Option<Arc<str>> {
        match self {
            OutboundReceiver::Unbounded(rx) => rx.recv().await,
            OutboundReceiver::Bounded(rx) => rx.recv().await,
        }
    }
}

/// What the registry keeps for each live session.
#[derive(Debug)]
pub(crate) struct SessionHandle {
    pub(crate) id: SessionId,
    pub(crate) peer: SocketAddr,
    outbound: Outbound,
    close: Arc<Notify>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: SessionId,
        peer: SocketAddr,
        outbound: Outbound,
        close: Arc<Notify>,
    ) -> Self {
        Self {
            id,
            peer,
            outbound,
            close,
        }
    }
}

/// The set of live sessions.
///
/// A session is inserted during its handshake, under the database lock,
/// and removed just before its socket is closed. Fan-out iterates the set
/// under a read guard and only enqueues lines, so it never waits on a
/// socket.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh session id.
    pub fn next_id(&self) -> SessionId {
        SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Returns the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns true if no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Returns the ids of all live sessions.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub(crate) fn insert(&self, handle: SessionHandle) {
        self.sessions.write().insert(handle.id, handle);
    }

    /// Removes a session; returns false if it was already gone.
    pub(crate) fn remove(&self, id: SessionId) -> bool {
        self.sessions.write().remove(&id).is_some()
    }

    /// Queues `line` for every session except `from`.
    ///
    /// Returns the sessions that could not take the line: their queue is
    /// full or their writer has already stopped. The caller evicts them
    /// once the database lock is released.
    pub(crate) fn broadcast(&self, from: SessionId, line: &Arc<str>) -> Vec<SessionId> {
        let sessions = self.sessions.read();
        let mut undeliverable = Vec::new();

        for (id, handle) in sessions.iter() {
            if *id == from {
                continue;
            }
            match handle.outbound.try_send(Arc::clone(line)) {
                Ok(()) => {}
                Err(DeliveryFailure::Full) => {
                    warn!(session = %id, peer = %handle.peer, "slow consumer, outbound queue full");
                    undeliverable.push(*id);
                }
                Err(DeliveryFailure::Closed) => undeliverable.push(*id),
            }
        }

        undeliverable
    }

    /// Removes a session and tells it to close its socket.
    pub(crate) fn evict(&self, id: SessionId) {
        if let Some(handle) = self.sessions.write().remove(&id) {
            handle.close.notify_one();
        }
    }

    /// Tells every live session to close.
    ///
    /// Sessions remove themselves from the registry as they shut down.
    pub fn close_all(&self) {
        for handle in self.sessions.read().values() {
            handle.close.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn register(
        registry: &SessionRegistry,
        capacity: Option<usize>,
    ) -> (SessionId, OutboundReceiver, Arc<Notify>) {
        let id = registry.next_id();
        let (outbound, rx) = outbound_channel(capacity);
        let close = Arc::new(Notify::new());
        registry.insert(SessionHandle::new(id, peer(), outbound, Arc::clone(&close)));
        (id, rx, close)
    }

    #[tokio::test]
    async fn broadcast_skips_sender() {
        let registry = SessionRegistry::new();
        let (a, mut rx_a, _) = register(&registry, None);
        let (_b, mut rx_b, _) = register(&registry, None);
        let (_c, mut rx_c, _) = register(&registry, None);

        let line: Arc<str> = Arc::from("+1|0|ax");
        assert!(registry.broadcast(a, &line).is_empty());

        assert_eq!(rx_b.recv().await.as_deref(), Some("+1|0|ax"));
        assert_eq!(rx_c.recv().await.as_deref(), Some("+1|0|ax"));
        registry.remove(a);
        assert!(rx_a.recv().await.is_none());
    }

    #[tokio::test]
    async fn full_queue_is_reported() {
        let registry = SessionRegistry::new();
        let (a, _rx_a, _) = register(&registry, None);
        let (b, _rx_b, close_b) = register(&registry, Some(1));

        let line: Arc<str> = Arc::from("+1|0|ax");
        assert!(registry.broadcast(a, &line).is_empty());
        assert_eq!(registry.broadcast(a, &line), vec![b]);

        registry.evict(b);
        assert_eq!(registry.ids(), vec![a]);
        // The permit is stored until the session waits for it.
        close_b.notified().await;
    }

    #[tokio::test]
    async fn closed_writer_is_reported() {
        let registry = SessionRegistry::new();
        let (a, _rx_a, _) = register(&registry, None);
        let (b, rx_b, _) = register(&registry, None);
        drop(rx_b);

        let line: Arc<str> = Arc::from("-1|0|ax");
        assert_eq!(registry.broadcast(a, &line), vec![b]);
    }

    #[test]
    fn ids_are_unique_and_ordered() {
        let registry = SessionRegistry::new();
        let first = registry.next_id();
        let second = registry.next_id();
        assert!(second > first);
        assert_eq!(first.to_string(), format!("#{}", first.as_u64()));
        assert!(registry.is_empty());
        assert!(!registry.remove(first));
    }
}
