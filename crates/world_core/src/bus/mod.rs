//! # Broadcast Bus
//!
//! Publish/subscribe fan-out of serialized packets to every server process.
//!
//! Publishers wrap a packet in an [`Envelope`] and hand it to a
//! [`BusTransport`]. Each process runs one [`BusDispatcher`] that receives
//! every envelope and, for each local session, asks its [`CastNearFilter`]
//! whether the session's character should see it before writing to the
//! socket through a [`ClientSink`].

pub mod envelope;
pub mod filter;
pub mod transport;

pub use envelope::{Anchor, Envelope, EnvelopeType};
pub use filter::{CastNearFilter, SightFilter};
pub use transport::{BusReceiver, BusTransport, LocalBus};

use crate::entity::Character;
use crate::types::EntityId;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// A local socket as seen by the dispatcher.
#[derive(Debug, Clone)]
pub struct LocalSession {
    pub connection_id: u64,
    /// `None` before world entry and during teardown
    pub character: Option<Arc<Character>>,
}

/// Writes bytes to local sockets - implemented by the connection manager
pub trait ClientSink: std::fmt::Debug + Send + Sync {
    /// Queue data for one connection
    fn send_to_connection(&self, connection_id: u64, data: Vec<u8>) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>>;

    /// Queue data for the connection playing `character_id`
    fn send_to_character(&self, character_id: EntityId, data: Vec<u8>) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>>;

    /// Every local session
    fn sessions(&self) -> Pin<Box<dyn Future<Output = Vec<LocalSession>> + Send + '_>>;
}

/// Outcome of delivering one envelope locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub filtered: usize,
    pub failed: usize,
}

/// Subscriber side of the bus for one process.
#[derive(Debug)]
pub struct BusDispatcher {
    sink: Arc<dyn ClientSink>,
    filter: Arc<dyn CastNearFilter>,
}

impl BusDispatcher {
    pub fn new(sink: Arc<dyn ClientSink>, filter: Arc<dyn CastNearFilter>) -> Self {
        Self { sink, filter }
    }

    /// Forwards `envelope` to every local session the filter accepts.
    /// Sessions without a character are skipped silently.
    pub async fn dispatch(&self, envelope: &Envelope) -> DispatchReport {
        let mut report = DispatchReport::default();
        for session in self.sink.sessions().await {
            let Some(character) = session.character else {
                continue;
            };
            if !self.filter.should_deliver(envelope, &character).await {
                report.filtered += 1;
                continue;
            }
            match self.sink.send_to_connection(session.connection_id, envelope.payload.clone()).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(connection = session.connection_id, character = character.id, kind = ?envelope.kind, "bus delivery failed: {}", e);
                }
            }
        }
        trace!(kind = ?envelope.kind, delivered = report.delivered, filtered = report.filtered, "envelope dispatched");
        report
    }

    /// Runs the subscriber loop until the transport closes or shutdown fires.
    pub fn spawn(self: Arc<Self>, mut receiver: BusReceiver, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("📡 Bus subscriber started");
            loop {
                tokio::select! {
                    received = receiver.recv() => match received {
                        Ok(envelope) => {
                            self.dispatch(&envelope).await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("bus subscriber lagged, {} envelopes dropped", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
            debug!("bus subscriber stopped");
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use crate::entity::CharacterProfile;
    use crate::types::{Coordinate, EntityKind, MapKey};

    async fn on_map(id: EntityId, key: MapKey) -> Arc<Character> {
        let c = Character::new(CharacterProfile::starter(id, "c", key.map, Coordinate::default()));
        c.lock_status().await.map = Some(key);
        c
    }

    #[tokio::test]
    async fn dispatch_filters_per_session() {
        let key = MapKey::new(0, 1);
        let sink = Arc::new(RecordingSink::default());
        let seeing = on_map(1, key).await;
        seeing.on_sight.insert(EntityKind::Mob, 50, 4).await;
        sink.attach(10, Some(seeing)).await;
        sink.attach(11, Some(on_map(2, key).await)).await;
        sink.attach(12, None).await;

        let dispatcher = BusDispatcher::new(sink.clone(), Arc::new(SightFilter));
        let env = Envelope::near(0, EnvelopeType::Movement, key, Anchor::Mob { id: 50, pseudo_id: 4 }, vec![0xAA, 0x55, 1, 0, 0x33, 0x55, 0xAA]);
        let report = dispatcher.dispatch(&env).await;

        assert_eq!(report, DispatchReport { delivered: 1, filtered: 1, failed: 0 });
        assert_eq!(sink.opcodes(10).await, vec![0x33]);
        assert!(sink.opcodes(11).await.is_empty());
    }

    #[tokio::test]
    async fn delivery_errors_do_not_stop_fan_out() {
        let key = MapKey::new(0, 1);
        let sink = Arc::new(RecordingSink::default());
        sink.attach(1, Some(on_map(1, key).await)).await;
        sink.attach(2, Some(on_map(2, key).await)).await;
        sink.fail(1).await;

        let dispatcher = BusDispatcher::new(sink.clone(), Arc::new(SightFilter));
        let report = dispatcher
            .dispatch(&Envelope::everyone(0, EnvelopeType::Notice, vec![0xAA, 0x55, 1, 0, 0x0E, 0x55, 0xAA]))
            .await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscriber_loop_delivers_and_stops() {
        let bus = LocalBus::new(16);
        let sink = Arc::new(RecordingSink::default());
        sink.attach(1, Some(on_map(1, MapKey::new(0, 1)).await)).await;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let dispatcher = Arc::new(BusDispatcher::new(sink.clone(), Arc::new(SightFilter)));
        let handle = dispatcher.spawn(bus.subscribe(), shutdown_rx);

        bus.publish(Envelope::everyone(0, EnvelopeType::Notice, vec![0xAA, 0x55, 1, 0, 0x0E, 0x55, 0xAA]))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(sink.opcodes(1).await, vec![0x0E]);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
