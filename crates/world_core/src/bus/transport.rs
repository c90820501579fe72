use super::envelope::Envelope;
use crate::error::WorldError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Receiving half of a bus subscription.
pub type BusReceiver = broadcast::Receiver<Arc<Envelope>>;

/// The single shared topic every server process publishes to and reads
/// from. Delivery to sockets happens on the subscriber side.
#[async_trait]
pub trait BusTransport: Send + Sync + std::fmt::Debug {
    async fn publish(&self, envelope: Envelope) -> Result<(), WorldError>;
    fn subscribe(&self) -> BusReceiver;
}

/// In-process transport. Several servers in one process can share it, which
/// is how shards are tested together.
#[derive(Debug)]
pub struct LocalBus {
    sender: broadcast::Sender<Arc<Envelope>>,
    published: AtomicU64,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[async_trait]
impl BusTransport for LocalBus {
    async fn publish(&self, envelope: Envelope) -> Result<(), WorldError> {
        self.published.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(Arc::new(envelope)).is_err() {
            // no subscriber yet
            trace!("envelope published with no subscribers");
        }
        Ok(())
    }

    fn subscribe(&self) -> BusReceiver {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EnvelopeType;

    #[tokio::test]
    async fn every_subscriber_sees_each_envelope() {
        let bus = LocalBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(Envelope::everyone(0, EnvelopeType::Notice, vec![7])).await.unwrap();

        assert_eq!(a.recv().await.unwrap().payload, vec![7]);
        assert_eq!(b.recv().await.unwrap().payload, vec![7]);
        assert_eq!(bus.published(), 1);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = LocalBus::default();
        assert!(bus.publish(Envelope::everyone(0, EnvelopeType::Notice, vec![])).await.is_ok());
    }
}
