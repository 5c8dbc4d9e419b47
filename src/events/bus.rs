use tokio::sync::broadcast;

use super::types::DomainEvent;

/// Thin wrapper around a broadcast channel. Constructed once at startup
/// and cloned into every component that needs to publish or subscribe,
/// rather than reached via a global.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        // No receivers is a normal state (e.g. in tests); dropping the
        // event is correct, not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn published_events_reach_subscribers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let requirement_id = Uuid::new_v4();
        bus.publish(DomainEvent::RequirementCreated { requirement_id });

        match rx.recv().await.unwrap() {
            DomainEvent::RequirementCreated { requirement_id: id } => {
                assert_eq!(id, requirement_id)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::AvailabilityCreated { availability_id: Uuid::new_v4() });
    }
}
