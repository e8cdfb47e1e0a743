//! Per-socket bookkeeping for the server
//!
//! This module tracks every live connection from accept to close:
//! - Player id assignment and the live-connection cap
//! - Registration state and the verified peer key
//! - The FIFO queue of registered connections waiting for an opponent
//!
//! It knows nothing about sockets; the network layer owns those and refers to
//! connections only by player id.

use crate::game::SessionId;
use log::{debug, info};
use rsa::RsaPublicKey;
use shared::PlayerId;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;

/// Where a connection is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Accepted, no `REGISTER_CLIENT` yet
    Unregistered,
    /// Registered and waiting in the queue for an opponent
    Homeless,
    Paired(SessionId),
    /// Its session ended; the socket stays open until the peer closes it
    Finished,
}

#[derive(Debug)]
pub struct ConnectionState {
    pub player_id: PlayerId,
    pub addr: SocketAddr,
    pub display_name: String,
    /// Set once the handshake has verified the peer's key
    pub peer_key: Option<RsaPublicKey>,
    pub phase: ConnectionPhase,
}

impl ConnectionState {
    pub fn new(player_id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            player_id,
            addr,
            display_name: String::new(),
            peer_key: None,
            phase: ConnectionPhase::Unregistered,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.phase != ConnectionPhase::Unregistered
    }

    pub fn session(&self) -> Option<SessionId> {
        match self.phase {
            ConnectionPhase::Paired(id) => Some(id),
            _ => None,
        }
    }
}

/// All live connections plus the registration queue
pub struct ConnectionManager {
    connections: HashMap<PlayerId, ConnectionState>,
    homeless: VecDeque<PlayerId>,
    next_player_id: PlayerId,
    max_connections: usize,
}

impl ConnectionManager {
    /// Player ids start at 0 and follow accept order; they are never reused.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            homeless: VecDeque::new(),
            next_player_id: 0,
            max_connections,
        }
    }

    /// Returns the new connection's player id, or `None` at capacity
    pub fn add_connection(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        if self.connections.len() >= self.max_connections {
            return None;
        }

        let player_id = self.next_player_id;
        self.next_player_id += 1;

        info!("Connection {} accepted from {}", player_id, addr);
        self.connections
            .insert(player_id, ConnectionState::new(player_id, addr));
        Some(player_id)
    }

    pub fn remove_connection(&mut self, player_id: PlayerId) -> Option<ConnectionState> {
        self.homeless.retain(|id| *id != player_id);
        let removed = self.connections.remove(&player_id);
        if let Some(connection) = &removed {
            info!(
                "Connection {} ({}) removed",
                player_id,
                connection.addr
            );
        }
        removed
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&ConnectionState> {
        self.connections.get(&player_id)
    }

    pub fn get_mut(&mut self, player_id: PlayerId) -> Option<&mut ConnectionState> {
        self.connections.get_mut(&player_id)
    }

    /// Records a completed handshake and queues the connection for pairing.
    /// Returns false when the connection is unknown or already registered.
    pub fn mark_registered(
        &mut self,
        player_id: PlayerId,
        name: String,
        peer_key: RsaPublicKey,
    ) -> bool {
        let Some(connection) = self.connections.get_mut(&player_id) else {
            return false;
        };
        if connection.is_registered() {
            return false;
        }

        connection.display_name = name;
        connection.peer_key = Some(peer_key);
        connection.phase = ConnectionPhase::Homeless;
        self.homeless.push_back(player_id);
        debug!(
            "Connection {} registered, {} waiting for an opponent",
            player_id,
            self.homeless.len()
        );
        true
    }

    /// Pops the two longest-waiting homeless connections, if there are two
    pub fn take_pair(&mut self) -> Option<(PlayerId, PlayerId)> {
        if self.homeless.len() < 2 {
            return None;
        }
        let first = self.homeless.pop_front()?;
        let second = self.homeless.pop_front()?;
        Some((first, second))
    }

    pub fn set_phase(&mut self, player_id: PlayerId, phase: ConnectionPhase) {
        if let Some(connection) = self.connections.get_mut(&player_id) {
            connection.phase = phase;
        }
    }

    pub fn homeless(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.homeless.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::KeyPair;
    use std::net::{IpAddr, Ipv4Addr};

    fn test_addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    fn test_key() -> RsaPublicKey {
        KeyPair::generate(512).unwrap().public_key().clone()
    }

    #[test]
    fn test_ids_follow_accept_order() {
        let mut manager = ConnectionManager::new(4);
        assert_eq!(manager.add_connection(test_addr(1000)), Some(0));
        assert_eq!(manager.add_connection(test_addr(1001)), Some(1));
        assert_eq!(manager.len(), 2);

        let connection = manager.get(1).unwrap();
        assert_eq!(connection.addr, test_addr(1001));
        assert_eq!(connection.phase, ConnectionPhase::Unregistered);
        assert!(connection.peer_key.is_none());
    }

    #[test]
    fn test_capacity() {
        let mut manager = ConnectionManager::new(2);
        manager.add_connection(test_addr(1000));
        manager.add_connection(test_addr(1001));

        assert_eq!(manager.add_connection(test_addr(1002)), None);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_ids_not_reused_after_disconnect() {
        let mut manager = ConnectionManager::new(2);
        manager.add_connection(test_addr(1000));
        manager.add_connection(test_addr(1001));

        assert!(manager.remove_connection(0).is_some());
        assert!(manager.remove_connection(0).is_none());
        assert_eq!(manager.add_connection(test_addr(1002)), Some(2));
    }

    #[test]
    fn test_pairing_is_fifo() {
        let mut manager = ConnectionManager::new(4);
        for port in 1000..1003 {
            manager.add_connection(test_addr(port));
        }
        let key = test_key();

        // register out of accept order: C, A, B
        assert!(manager.mark_registered(2, "C".into(), key.clone()));
        assert_eq!(manager.take_pair(), None);
        assert!(manager.mark_registered(0, "A".into(), key.clone()));
        assert!(manager.mark_registered(1, "B".into(), key));

        assert_eq!(manager.take_pair(), Some((2, 0)));
        assert_eq!(manager.homeless().collect::<Vec<_>>(), vec![1]);
        assert_eq!(manager.take_pair(), None);
    }

    #[test]
    fn test_double_registration_ignored() {
        let mut manager = ConnectionManager::new(2);
        manager.add_connection(test_addr(1000));
        let key = test_key();

        assert!(manager.mark_registered(0, "A".into(), key.clone()));
        assert!(!manager.mark_registered(0, "A again".into(), key.clone()));
        assert!(!manager.mark_registered(7, "ghost".into(), key));

        assert_eq!(manager.get(0).unwrap().display_name, "A");
        assert_eq!(manager.homeless().count(), 1);
    }

    #[test]
    fn test_removed_connection_leaves_queue() {
        let mut manager = ConnectionManager::new(4);
        for port in 1000..1003 {
            manager.add_connection(test_addr(port));
        }
        let key = test_key();
        for id in 0..3 {
            manager.mark_registered(id, format!("p{}", id), key.clone());
        }

        manager.remove_connection(0);
        assert_eq!(manager.take_pair(), Some((1, 2)));
    }

    #[test]
    fn test_session_lookup() {
        let mut manager = ConnectionManager::new(2);
        manager.add_connection(test_addr(1000));
        assert_eq!(manager.get(0).unwrap().session(), None);

        manager.set_phase(0, ConnectionPhase::Paired(9));
        assert_eq!(manager.get(0).unwrap().session(), Some(9));
        assert!(manager.get(0).unwrap().is_registered());
    }
}
