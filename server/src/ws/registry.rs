//! Connection registry: tracks all active WebSocket connections per user.
//!
//! A user can have multiple concurrent connections (multiple devices/tabs);
//! every push is fanned out to all of them. Delivery is best-effort: a failed
//! send prunes that one connection and never affects its siblings or other
//! users. Durable notification records are the delivery guarantee — callers
//! must not treat a missed push as an error.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use dashmap::DashMap;

use super::ConnectionSender;

/// One live transport session belonging to exactly one user.
#[derive(Clone)]
struct Connection {
    id: u64,
    tx: ConnectionSender,
}

impl Connection {
    /// Ask the writer task to close the socket. Tolerates a writer
    /// that is already gone.
    fn close(&self) {
        let _ = self.tx.send(Message::Close(None));
    }
}

/// In-memory map of user id to that user's live connections.
///
/// All bookkeeping goes through the DashMap's own locking; sends happen on
/// snapshots taken under that protection, so a slow client never blocks
/// registry mutations for other users (socket I/O lives in each connection's
/// writer task behind an unbounded channel).
pub struct ConnectionRegistry {
    connections: DashMap<i64, Vec<Connection>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a connection for a user. Returns the connection id used to
    /// unregister this specific connection later.
    pub fn register(&self, user_id: i64, tx: ConnectionSender) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections
            .entry(user_id)
            .or_default()
            .push(Connection { id, tx });

        tracing::debug!(
            user_id,
            connections = self.count_for_user(user_id),
            "Connection registered"
        );
        id
    }

    /// Remove one specific connection and close its transport.
    /// If the user's set becomes empty the user entry is removed entirely.
    pub fn unregister(&self, user_id: i64, conn_id: u64) {
        let mut closed = None;
        if let Some(mut entry) = self.connections.get_mut(&user_id) {
            if let Some(pos) = entry.iter().position(|c| c.id == conn_id) {
                closed = Some(entry.swap_remove(pos));
            }
        }
        self.drop_if_empty(user_id);

        if let Some(conn) = closed {
            conn.close();
        }
        tracing::debug!(user_id, conn_id, "Connection unregistered");
    }

    /// Remove and close every connection for a user (forced full logout).
    pub fn unregister_all(&self, user_id: i64) {
        let removed = self
            .connections
            .remove(&user_id)
            .map(|(_, conns)| conns)
            .unwrap_or_default();
        for conn in &removed {
            conn.close();
        }
        tracing::debug!(user_id, closed = removed.len(), "All connections unregistered");
    }

    /// Deliver a message to every live connection of one user.
    /// A user with no connections is a silent no-op — the durable store is
    /// the delivery guarantee. Failed connections are pruned afterwards.
    /// Returns the number of successful sends.
    pub fn send_to_user(&self, user_id: i64, msg: &Message) -> usize {
        let targets: Vec<Connection> = match self.connections.get(&user_id) {
            Some(entry) => entry.iter().cloned().collect(),
            None => {
                tracing::debug!(user_id, "No active connection for user");
                return 0;
            }
        };

        let (delivered, dead) = Self::fanout(&targets, msg);
        if !dead.is_empty() {
            self.prune(user_id, &dead);
        }
        tracing::debug!(
            user_id,
            delivered,
            pruned = dead.len(),
            "Sent message to user"
        );
        delivered
    }

    /// Deliver a message to every live connection of every registered user.
    ///
    /// A point-in-time snapshot is taken before iterating: connections added
    /// or removed concurrently may be missed, but a half-mutated map is never
    /// observed. Per-connection failures are isolated and pruned, same as
    /// send_to_user. Returns the number of successful sends.
    pub fn broadcast(&self, msg: &Message) -> usize {
        let snapshot: Vec<(i64, Vec<Connection>)> = self
            .connections
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let total: usize = snapshot.iter().map(|(_, c)| c.len()).sum();
        tracing::debug!(
            sockets = total,
            users = snapshot.len(),
            "Broadcasting to all connections"
        );

        let mut delivered = 0;
        for (user_id, conns) in &snapshot {
            let (ok, dead) = Self::fanout(conns, msg);
            delivered += ok;
            if !dead.is_empty() {
                self.prune(*user_id, &dead);
            }
        }
        delivered
    }

    /// Number of live connections for one user.
    pub fn count_for_user(&self, user_id: i64) -> usize {
        self.connections.get(&user_id).map(|e| e.len()).unwrap_or(0)
    }

    /// Number of live connections across all users.
    pub fn total_count(&self) -> usize {
        self.connections.iter().map(|e| e.value().len()).sum()
    }

    /// Attempt a send on each connection; collect ids whose channel is gone.
    /// Never holds a map guard — operates on an owned snapshot.
    fn fanout(conns: &[Connection], msg: &Message) -> (usize, Vec<u64>) {
        let mut delivered = 0;
        let mut dead = Vec::new();
        for conn in conns {
            if conn.tx.send(msg.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(conn.id);
            }
        }
        (delivered, dead)
    }

    /// Remove dead connections from a user's set, closing each, and drop the
    /// user entry if nothing is left.
    fn prune(&self, user_id: i64, dead: &[u64]) {
        let mut removed = Vec::new();
        if let Some(mut entry) = self.connections.get_mut(&user_id) {
            entry.retain(|c| {
                if dead.contains(&c.id) {
                    removed.push(c.clone());
                    false
                } else {
                    true
                }
            });
        }
        self.drop_if_empty(user_id);

        for conn in &removed {
            conn.close();
        }
    }

    /// Remove the user entry when its connection set is empty — no
    /// empty-set entries persist in the registry.
    fn drop_if_empty(&self, user_id: i64) {
        self.connections.remove_if(&user_id, |_, conns| conns.is_empty());
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn text(s: &str) -> Message {
        Message::Text(s.into())
    }

    fn attach(registry: &ConnectionRegistry, user_id: i64) -> (u64, UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = registry.register(user_id, tx);
        (id, rx)
    }

    fn drain_texts(rx: &mut UnboundedReceiver<Message>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Message::Text(t) = msg {
                out.push(t.as_str().to_string());
            }
        }
        out
    }

    #[test]
    fn register_unregister_replay_is_set_difference() {
        let registry = ConnectionRegistry::new();
        let (a1, _rx_a1) = attach(&registry, 1);
        let (_a2, _rx_a2) = attach(&registry, 1);
        let (_b1, _rx_b1) = attach(&registry, 2);

        assert_eq!(registry.count_for_user(1), 2);
        assert_eq!(registry.count_for_user(2), 1);
        assert_eq!(registry.total_count(), 3);

        registry.unregister(1, a1);
        assert_eq!(registry.count_for_user(1), 1);
        // No cross-user interference
        assert_eq!(registry.count_for_user(2), 1);

        registry.unregister_all(1);
        assert_eq!(registry.count_for_user(1), 0);
        assert_eq!(registry.total_count(), 1);
    }

    #[test]
    fn empty_user_entry_is_removed() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = attach(&registry, 9);
        registry.unregister(9, id);
        assert_eq!(registry.count_for_user(9), 0);
        assert_eq!(registry.total_count(), 0);
        // Sending to the vacated user is a silent no-op
        assert_eq!(registry.send_to_user(9, &text("hello")), 0);
    }

    #[test]
    fn send_reaches_all_connections_of_user() {
        let registry = ConnectionRegistry::new();
        let (_a, mut rx_a) = attach(&registry, 5);
        let (_b, mut rx_b) = attach(&registry, 5);
        let (_c, mut rx_c) = attach(&registry, 6);

        assert_eq!(registry.send_to_user(5, &text("ping")), 2);
        assert_eq!(drain_texts(&mut rx_a), vec!["ping"]);
        assert_eq!(drain_texts(&mut rx_b), vec!["ping"]);
        assert!(drain_texts(&mut rx_c).is_empty());
    }

    #[test]
    fn failed_connection_is_pruned_sibling_survives() {
        let registry = ConnectionRegistry::new();
        let (_a, rx_a) = attach(&registry, 5);
        let (_b, mut rx_b) = attach(&registry, 5);

        // Simulate a dead transport: receiver dropped
        drop(rx_a);

        assert_eq!(registry.send_to_user(5, &text("first")), 1);
        assert_eq!(registry.count_for_user(5), 1);

        // The surviving sibling keeps receiving subsequent messages
        assert_eq!(registry.send_to_user(5, &text("second")), 1);
        assert_eq!(drain_texts(&mut rx_b), vec!["first", "second"]);
    }

    #[test]
    fn pruning_last_connection_removes_user() {
        let registry = ConnectionRegistry::new();
        let (_a, rx_a) = attach(&registry, 7);
        drop(rx_a);

        assert_eq!(registry.send_to_user(7, &text("gone")), 0);
        assert_eq!(registry.count_for_user(7), 0);
        assert_eq!(registry.total_count(), 0);
    }

    #[test]
    fn broadcast_delivers_n_times_m_messages() {
        let registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        for user_id in 1..=3_i64 {
            for _ in 0..2 {
                let (_, rx) = attach(&registry, user_id);
                receivers.push(rx);
            }
        }

        assert_eq!(registry.broadcast(&text("all")), 6);
        for rx in receivers.iter_mut() {
            assert_eq!(drain_texts(rx), vec!["all"]);
        }
    }

    #[test]
    fn broadcast_skips_and_prunes_failed_connections() {
        let registry = ConnectionRegistry::new();
        let mut live = Vec::new();
        let mut dead = Vec::new();
        for user_id in 1..=3_i64 {
            let (_, rx_ok) = attach(&registry, user_id);
            let (_, rx_dead) = attach(&registry, user_id);
            live.push(rx_ok);
            dead.push(rx_dead);
        }
        drop(dead); // k = 3 pre-failed connections

        assert_eq!(registry.broadcast(&text("partial")), 3); // N*M - k
        assert_eq!(registry.total_count(), 3);
        for rx in live.iter_mut() {
            assert_eq!(drain_texts(rx), vec!["partial"]);
        }
    }

    #[test]
    fn unregister_all_closes_transports() {
        let registry = ConnectionRegistry::new();
        let (_a, mut rx_a) = attach(&registry, 4);
        let (_b, mut rx_b) = attach(&registry, 4);

        registry.unregister_all(4);

        assert!(matches!(rx_a.try_recv(), Ok(Message::Close(_))));
        assert!(matches!(rx_b.try_recv(), Ok(Message::Close(_))));
    }
}
