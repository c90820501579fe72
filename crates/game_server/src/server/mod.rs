//! Server implementation: accept loops and per-connection tasks.

pub mod connection;
pub mod core;

pub use self::core::GameServer;
