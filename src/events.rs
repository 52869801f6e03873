/// Change notifications emitted by the engine
///
/// Observers (UI/state layer) subscribe and re-read through the store
/// getters; events carry identity only, never payload data. Each event is
/// published at most once per actual content change.
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexerEvent {
    /// The merged asset sequence for a network changed.
    AssetsUpdated { chain_id: String },
    /// The balance map for an account on a network changed.
    BalancesUpdated { address: String, chain_id: String },
}

/// Broadcast channel owned by the engine. Cloneable handle; publishing with
/// no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<IndexerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexerEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: IndexerEvent) {
        // A send error only means nobody is listening right now.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_subscriber() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(IndexerEvent::AssetsUpdated {
            chain_id: "1".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            IndexerEvent::AssetsUpdated {
                chain_id: "1".to_string()
            }
        );
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new(8);
        bus.publish(IndexerEvent::BalancesUpdated {
            address: "0xabc".to_string(),
            chain_id: "1".to_string(),
        });
    }
}
