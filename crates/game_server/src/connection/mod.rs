//! Connection management for client sockets.
//!
//! This module tracks every open socket, the character playing on it and the
//! outbound queue its writer task drains.

pub mod client;
pub mod manager;

pub use client::ClientConnection;
pub use manager::ConnectionManager;

/// Type alias for connection identifiers.
///
/// Connection IDs are unique for the lifetime of the process and are never
/// reused.
pub type ConnectionId = u64;
