use std::sync::Arc;

use crate::{ChannelName, Delivery, EventChannel, Listener, Registry};

/// In-process channel for deployments where both surfaces live in the same
/// process. Clones share the same listeners.
#[derive(Clone)]
pub struct LocalBus {
    registry: Arc<Registry>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    pub fn is_registered(&self, name: ChannelName) -> bool {
        self.registry.is_registered(name)
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel for LocalBus {
    fn send(&self, name: ChannelName, payload: Vec<u8>) -> Delivery {
        self.registry.dispatch(name, payload)
    }

    fn register(&self, name: ChannelName) -> Listener {
        self.registry.register(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_registered_listener() {
        let bus = LocalBus::new();
        let mut listener = bus.register(ChannelName::StatusUpdate);

        let delivery = bus.send(ChannelName::StatusUpdate, br#"{"status":3}"#.to_vec());

        assert_eq!(delivery, Delivery::Sent);
        assert_eq!(listener.recv().await, Some(br#"{"status":3}"#.to_vec()));
    }

    #[tokio::test]
    async fn send_without_listener_is_silently_dropped() {
        let bus = LocalBus::new();

        let delivery = bus.send(ChannelName::StatusChanged, br#"{"status":3}"#.to_vec());

        assert_eq!(delivery, Delivery::NoListener);
    }

    #[tokio::test]
    async fn messages_are_not_queued_for_late_listeners() {
        let bus = LocalBus::new();
        bus.send(ChannelName::StatusChanged, b"early".to_vec());

        let mut listener = bus.register(ChannelName::StatusChanged);
        bus.send(ChannelName::StatusChanged, b"late".to_vec());

        assert_eq!(listener.recv().await, Some(b"late".to_vec()));
    }

    #[tokio::test]
    async fn channels_are_independent() {
        let bus = LocalBus::new();
        let _updates = bus.register(ChannelName::StatusUpdate);

        assert_eq!(
            bus.send(ChannelName::StatusChanged, b"x".to_vec()),
            Delivery::NoListener
        );
    }

    #[tokio::test]
    async fn unregister_stops_delivery() {
        let bus = LocalBus::new();
        let listener = bus.register(ChannelName::StatusUpdate);
        listener.unregister();

        assert!(!bus.is_registered(ChannelName::StatusUpdate));
        assert_eq!(
            bus.send(ChannelName::StatusUpdate, b"x".to_vec()),
            Delivery::NoListener
        );
    }

    #[tokio::test]
    async fn dropped_listener_is_cleaned_up() {
        let bus = LocalBus::new();
        drop(bus.register(ChannelName::StatusUpdate));

        assert_eq!(
            bus.send(ChannelName::StatusUpdate, b"x".to_vec()),
            Delivery::NoListener
        );
    }
}
