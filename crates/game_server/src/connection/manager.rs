//! Connection manager: the bridge between sockets and the world.
//!
//! The manager is the process's [`ClientSink`]. Sends only enqueue onto the
//! connection's writer channel, so callers never block on a slow socket.

use super::{ClientConnection, ConnectionId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use world_core::{Character, ClientSink, EntityId, LocalSession};

#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, ClientConnection>,
    by_character: DashMap<EntityId, ConnectionId>,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            ..Default::default()
        }
    }

    /// Registers a socket and returns its connection ID.
    pub fn add_connection(&self, remote_addr: SocketAddr, outbound: mpsc::UnboundedSender<Vec<u8>>) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.insert(id, ClientConnection::new(remote_addr, outbound));
        debug!(connection = id, %remote_addr, "connection registered");
        id
    }

    /// Drops a connection and returns the character that was playing on it.
    pub fn remove_connection(&self, connection_id: ConnectionId) -> Option<Arc<Character>> {
        let (_, connection) = self.connections.remove(&connection_id)?;
        let character = connection.character?;
        self.by_character.remove_if(&character.id, |_, conn| *conn == connection_id);
        Some(character)
    }

    /// Binds `character` to a connection. Fails with the connection already
    /// playing the same character, leaving both untouched.
    pub fn bind_character(&self, connection_id: ConnectionId, character: Arc<Character>) -> Result<(), ConnectionId> {
        match self.by_character.entry(character.id) {
            Entry::Occupied(existing) if *existing.get() != connection_id => return Err(*existing.get()),
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(connection_id);
            }
        }
        if let Some(mut connection) = self.connections.get_mut(&connection_id) {
            connection.character = Some(character);
        }
        Ok(())
    }

    /// Undoes [`bind_character`](Self::bind_character), keeping the socket.
    pub fn unbind_character(&self, connection_id: ConnectionId) -> Option<Arc<Character>> {
        let character = self.connections.get_mut(&connection_id)?.character.take()?;
        self.by_character.remove_if(&character.id, |_, conn| *conn == connection_id);
        Some(character)
    }

    pub fn character(&self, connection_id: ConnectionId) -> Option<Arc<Character>> {
        self.connections.get(&connection_id).and_then(|c| c.character.clone())
    }

    pub fn connection_of(&self, character_id: EntityId) -> Option<ConnectionId> {
        self.by_character.get(&character_id).map(|c| *c)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Queues `data` on a connection's writer.
    pub fn send(&self, connection_id: ConnectionId, data: Vec<u8>) -> Result<(), String> {
        let connection = self
            .connections
            .get(&connection_id)
            .ok_or_else(|| format!("connection {} not found", connection_id))?;
        connection
            .outbound
            .send(data)
            .map_err(|_| format!("connection {} writer closed", connection_id))?;
        trace!(connection = connection_id, "queued outbound packet");
        Ok(())
    }
}

impl ClientSink for ConnectionManager {
    fn send_to_connection(&self, connection_id: u64, data: Vec<u8>) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>> {
        Box::pin(async move { self.send(connection_id, data) })
    }

    fn send_to_character(&self, character_id: EntityId, data: Vec<u8>) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>> {
        Box::pin(async move {
            let connection_id = self
                .connection_of(character_id)
                .ok_or_else(|| format!("character {} not connected", character_id))?;
            self.send(connection_id, data)
        })
    }

    fn sessions(&self) -> Pin<Box<dyn Future<Output = Vec<LocalSession>> + Send + '_>> {
        Box::pin(async move {
            self.connections
                .iter()
                .map(|entry| LocalSession {
                    connection_id: *entry.key(),
                    character: entry.value().character.clone(),
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use world_core::{CharacterProfile, Coordinate};

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 4000))
    }

    #[tokio::test]
    async fn send_to_character_uses_bound_connection() {
        let manager = ConnectionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = manager.add_connection(addr(), tx);
        let character = Character::new(CharacterProfile::starter(3, "Ash", 1, Coordinate::default()));
        assert_eq!(manager.bind_character(conn, character), Ok(()));

        manager.send_to_character(3, vec![1, 2, 3]).await.unwrap();
        assert_eq!(rx.recv().await, Some(vec![1, 2, 3]));
        assert!(manager.send_to_character(4, vec![]).await.is_err());
    }

    #[tokio::test]
    async fn closed_writer_is_an_error() {
        let manager = ConnectionManager::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = manager.add_connection(addr(), tx);
        drop(rx);
        assert!(manager.send_to_connection(conn, vec![0]).await.is_err());
    }

    #[tokio::test]
    async fn remove_returns_character_and_clears_index() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = manager.add_connection(addr(), tx);
        let character = Character::new(CharacterProfile::starter(9, "Bo", 1, Coordinate::default()));
        manager.bind_character(conn, character).unwrap();

        let sessions = manager.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].character.is_some());

        let removed = manager.remove_connection(conn).unwrap();
        assert_eq!(removed.id, 9);
        assert_eq!(manager.connection_of(9), None);
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn unbind_frees_character_for_another_connection() {
        let manager = ConnectionManager::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let first = manager.add_connection(addr(), tx1);
        let second = manager.add_connection(addr(), tx2);
        let character = Character::new(CharacterProfile::starter(6, "Lin", 1, Coordinate::default()));
        manager.bind_character(first, character.clone()).unwrap();

        assert_eq!(manager.unbind_character(first).map(|c| c.id), Some(6));
        assert!(manager.character(first).is_none());
        assert_eq!(manager.connection_of(6), None);
        assert_eq!(manager.connection_count(), 2);
        assert!(manager.unbind_character(first).is_none());

        manager.bind_character(second, character).unwrap();
        assert_eq!(manager.connection_of(6), Some(second));
    }

    #[tokio::test]
    async fn second_binding_is_refused() {
        let manager = ConnectionManager::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let first = manager.add_connection(addr(), tx1);
        let second = manager.add_connection(addr(), tx2);
        let character = Character::new(CharacterProfile::starter(5, "Kai", 1, Coordinate::default()));
        manager.bind_character(first, character.clone()).unwrap();
        assert_eq!(manager.bind_character(second, character), Err(first));
        assert!(manager.character(second).is_none());
        assert_eq!(manager.connection_of(5), Some(first));
    }
}
