//! Client connection representation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use world_core::Character;

/// An individual client connection to the server.
///
/// `character` stays `None` until the enter-world packet succeeds and is
/// cleared again during teardown.
#[derive(Debug)]
pub struct ClientConnection {
    /// The character played on this connection (None until entered)
    pub character: Option<Arc<Character>>,

    /// The remote network address of the client
    pub remote_addr: SocketAddr,

    /// When this connection was established
    pub connected_at: SystemTime,

    /// Outbound queue drained by the connection's writer task
    pub outbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl ClientConnection {
    pub fn new(remote_addr: SocketAddr, outbound: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            character: None,
            remote_addr,
            connected_at: SystemTime::now(),
            outbound,
        }
    }
}
