//! Per-connection session state.

use crate::error::{Result, WatchError};
use crate::protocol::{LineAccumulator, Reply};
use crate::subscription::SubscriptionStore;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Session identifier (server-internal).
pub type SessionId = u64;

/// State of one client connection.
///
/// Outbound lines go through a bounded queue drained by the connection's
/// writer task, so sending never blocks the caller.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    inbound: LineAccumulator,
    subscriptions: SubscriptionStore,
    outbound: mpsc::Sender<String>,
    disconnected: bool,
}

impl Session {
    pub fn new(
        id: SessionId,
        peer: SocketAddr,
        outbound: mpsc::Sender<String>,
        max_line_bytes: usize,
    ) -> Self {
        Self {
            id,
            peer,
            inbound: LineAccumulator::new(max_line_bytes),
            subscriptions: SubscriptionStore::new(),
            outbound,
            disconnected: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn subscriptions(&self) -> &SubscriptionStore {
        &self.subscriptions
    }

    pub fn subscriptions_mut(&mut self) -> &mut SubscriptionStore {
        &mut self.subscriptions
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Flag the session for removal at the next sweep. Only the first call logs.
    pub fn mark_disconnected(&mut self, reason: &str) {
        if !self.disconnected {
            debug!("Client disconnected: {} ({})", self.peer, reason);
            self.disconnected = true;
        }
    }

    /// Feed received bytes and return the lines they complete.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.inbound.append(bytes)?;
        Ok(self.inbound.take_lines())
    }

    /// Queue a reply for the client.
    ///
    /// A full queue means the client stopped reading; like a closed socket it
    /// ends the session.
    pub fn send(&mut self, reply: &Reply) -> Result<()> {
        if self.disconnected {
            return Ok(());
        }
        debug!("Sending to {}: {}", self.peer, reply);
        match self.outbound.try_send(reply.to_line()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Client {} is not reading, dropping session", self.peer);
                self.mark_disconnected("outbound queue full");
                Err(WatchError::OutboundFull { session: self.id })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_disconnected("writer closed");
                Err(WatchError::Io {
                    message: format!("connection to {} closed", self.peer),
                    path: None,
                    source: None,
                })
            }
        }
    }
}

/// The live set of sessions, ordered by id.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, Session>,
    next_id: SessionId,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register a new connection and return its id.
    pub fn open(
        &mut self,
        peer: SocketAddr,
        outbound: mpsc::Sender<String>,
        max_line_bytes: usize,
    ) -> SessionId {
        let id = self.next_id;
        self.next_id += 1;
        self.sessions
            .insert(id, Session::new(id, peer, outbound, max_line_bytes));
        id
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    pub fn mark_disconnected(&mut self, id: SessionId, reason: &str) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.mark_disconnected(reason);
        }
    }

    /// Remove every session flagged as disconnected. Dropping a session closes
    /// its outbound queue, which ends its writer task.
    pub fn retire_disconnected(&mut self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_disconnected());
        before - self.sessions.len()
    }

    /// Drop every session.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_open_assigns_increasing_ids() {
        let mut registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let a = registry.open(peer(), tx.clone(), 64);
        let b = registry.open(peer(), tx, 64);
        assert!(b > a);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_retire_disconnected() {
        let mut registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let a = registry.open(peer(), tx.clone(), 64);
        let b = registry.open(peer(), tx, 64);

        registry.mark_disconnected(a, "test");
        assert_eq!(registry.retire_disconnected(), 1);
        assert!(registry.get(a).is_none());
        assert!(registry.get(b).is_some());
    }

    #[test]
    fn test_send_queues_line() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut session = Session::new(1, peer(), tx, 64);
        session.send(&Reply::Success).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "SUCCESS\n");
    }

    #[test]
    fn test_full_queue_disconnects() {
        let (tx, _rx) = mpsc::channel(1);
        let mut session = Session::new(1, peer(), tx, 64);
        session.send(&Reply::Success).unwrap();
        assert!(matches!(
            session.send(&Reply::Fail),
            Err(WatchError::OutboundFull { session: 1 })
        ));
        assert!(session.is_disconnected());

        // Further sends are silently dropped.
        assert!(session.send(&Reply::Fail).is_ok());
    }

    #[test]
    fn test_closed_queue_disconnects() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut session = Session::new(1, peer(), tx, 64);
        assert!(session.send(&Reply::Success).is_err());
        assert!(session.is_disconnected());
    }

    #[test]
    fn test_receive_frames_lines() {
        let (tx, _rx) = mpsc::channel(1);
        let mut session = Session::new(1, peer(), tx, 8);
        assert!(session.receive(b"READ").unwrap().is_empty());
        assert_eq!(session.receive(b" 8 1\n").unwrap(), vec!["READ 8 1"]);
        assert!(session.receive(b"0123456789").is_err());
    }
}
