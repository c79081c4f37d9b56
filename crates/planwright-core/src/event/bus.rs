//! Broadcast event bus for distributing `PlanEvent` to multiple subscribers.
//!
//! Built on `tokio::sync::broadcast`. Publishing with no active subscribers
//! is a no-op.

use planwright_types::event::PlanEvent;
use tokio::sync::broadcast;

/// Multi-consumer bus for plan execution events.
///
/// Cloning the bus clones the sender, allowing multiple producers and consumers.
pub struct EventBus {
    sender: broadcast::Sender<PlanEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<PlanEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: PlanEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planwright_types::plan::PlanId;

    #[tokio::test]
    async fn publish_and_subscribe_delivers_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let plan_id = PlanId::new();

        bus.publish(PlanEvent::PlanCancelled { plan_id });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.plan_id(), plan_id);
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new(4);
        bus.publish(PlanEvent::PlanCancelled {
            plan_id: PlanId::new(),
        });
    }

    #[tokio::test]
    async fn cloned_bus_shares_channel() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        let clone = bus.clone();
        clone.publish(PlanEvent::PlanCancelled {
            plan_id: PlanId::new(),
        });
        assert!(matches!(rx.recv().await.unwrap(), PlanEvent::PlanCancelled { .. }));
    }
}
