use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use agora_types::events::{Envelope, ReactionCounts};

/// Items fanned out to every connection.
#[derive(Debug, Clone)]
pub enum Broadcast {
    /// Delivered as-is
    Envelope(Envelope),

    /// The online set changed; each connection renders its own presence
    /// envelope, since member lists are per viewer
    PresenceChanged,
}

/// Tracks live connections and routes envelopes to them.
///
/// Delivery is fire-and-forget: a closed or slow peer never fails the caller.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<Broadcast>,

    /// user_id -> (conn_id -> sender). One user may hold several tabs on
    /// the same session.
    connections: RwLock<HashMap<i64, HashMap<Uuid, mpsc::UnboundedSender<Envelope>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Send an envelope to every connected client.
    pub fn broadcast(&self, envelope: Envelope) {
        let _ = self.inner.broadcast_tx.send(Broadcast::Envelope(envelope));
    }

    pub fn broadcast_reaction(&self, counts: ReactionCounts) {
        self.broadcast(Envelope::Reaction { data: counts });
    }

    pub fn notify_presence(&self) {
        let _ = self.inner.broadcast_tx.send(Broadcast::PresenceChanged);
    }

    /// Register a connection for `user_id`. Returns (conn_id, receiver).
    pub async fn register(&self, user_id: i64) -> (Uuid, mpsc::UnboundedReceiver<Envelope>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .connections
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drop one connection. Returns true when it was the user's last one.
    pub async fn unregister(&self, user_id: i64, conn_id: Uuid) -> bool {
        let mut connections = self.inner.connections.write().await;
        let Some(conns) = connections.get_mut(&user_id) else {
            return false;
        };
        conns.remove(&conn_id);
        if conns.is_empty() {
            connections.remove(&user_id);
            true
        } else {
            false
        }
    }

    /// Drop every connection of `user_id`, e.g. when its session ends. Each
    /// connection's receiver then yields `None` and its socket closes.
    /// Returns how many connections were dropped.
    pub async fn disconnect_user(&self, user_id: i64) -> usize {
        let dropped = self
            .inner
            .connections
            .write()
            .await
            .remove(&user_id)
            .map_or(0, |conns| conns.len());
        if dropped > 0 {
            self.notify_presence();
        }
        dropped
    }

    pub async fn is_connected(&self, user_id: i64, conn_id: Uuid) -> bool {
        self.inner
            .connections
            .read()
            .await
            .get(&user_id)
            .is_some_and(|conns| conns.contains_key(&conn_id))
    }

    /// Send to every connection of `user_id`. Returns how many accepted it.
    pub async fn send_to_user(&self, user_id: i64, envelope: Envelope) -> usize {
        let connections = self.inner.connections.read().await;
        connections.get(&user_id).map_or(0, |conns| {
            conns
                .values()
                .filter(|tx| tx.send(envelope.clone()).is_ok())
                .count()
        })
    }

    pub async fn send_to_connection(&self, user_id: i64, conn_id: Uuid, envelope: Envelope) -> bool {
        let connections = self.inner.connections.read().await;
        connections
            .get(&user_id)
            .and_then(|conns| conns.get(&conn_id))
            .is_some_and(|tx| tx.send(envelope).is_ok())
    }

    /// Ids of users with at least one live connection, ascending.
    pub async fn online_user_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.inner.connections.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
