//! Per-socket task: frame decoding, sequential handling, writer and teardown.

use crate::connection::ConnectionId;
use crate::error::ServerError;
use crate::messaging::{HandlerContext, PacketRouter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use world_core::wire::decode_frame;

/// Largest amount of undecoded input kept for one socket.
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Serves one client until it disconnects, times out, breaks framing or the
/// server shuts down. Teardown always runs.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: Arc<HandlerContext>,
    router: Arc<PacketRouter>,
    idle_timeout: Option<Duration>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    stream.set_nodelay(true).ok();
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let connection_id = ctx.connections.add_connection(addr, tx);
    info!("🔗 Connection {} from {}", connection_id, addr);

    let writer_task = tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if let Err(e) = writer.write_all(&bytes).await {
                warn!(connection = connection_id, "write failed: {}", e);
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let result = tokio::select! {
        result = read_loop(&mut reader, connection_id, &ctx, &router, idle_timeout) => result,
        _ = shutdown.recv() => Ok(()),
    };

    teardown(&ctx, connection_id).await;
    // the manager dropped the last sender, so the writer drains and exits
    let _ = writer_task.await;
    info!("🔌 Connection {} closed", connection_id);
    result
}

async fn read_loop(
    reader: &mut tokio::net::tcp::OwnedReadHalf,
    connection_id: ConnectionId,
    ctx: &HandlerContext,
    router: &PacketRouter,
    idle_timeout: Option<Duration>,
) -> Result<(), ServerError> {
    let mut pending: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    loop {
        let read = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, reader.read(&mut chunk)).await {
                Ok(read) => read?,
                Err(_) => {
                    debug!(connection = connection_id, "idle timeout");
                    return Ok(());
                }
            },
            None => reader.read(&mut chunk).await?,
        };
        if read == 0 {
            return Ok(());
        }
        pending.extend_from_slice(&chunk[..read]);

        loop {
            match decode_frame(&pending)? {
                Some((frame, used)) => {
                    pending.drain(..used);
                    if let Some(response) = router.route(ctx, connection_id, &frame).await {
                        if let Err(e) = ctx.connections.send(connection_id, response) {
                            warn!(connection = connection_id, "response dropped: {}", e);
                        }
                    }
                }
                None => break,
            }
        }
        if pending.len() > MAX_PENDING_BYTES {
            return Err(ServerError::Protocol(format!("{} bytes without a complete frame", pending.len())));
        }
    }
}

/// Stops reconciliation, then takes the character out of the world and
/// saves it.
pub async fn teardown(ctx: &HandlerContext, connection_id: ConnectionId) {
    if let Some((_, task)) = ctx.reconcile_tasks.remove(&connection_id) {
        task.abort();
    }
    if let Some(character) = ctx.connections.remove_connection(connection_id) {
        ctx.world.leave(&character).await;
    }
}
