use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{ChannelName, Delivery};

/// Messages buffered per listener before new ones are dropped.
pub const LISTENER_BUFFER: usize = 64;

struct Slot {
    id: u64,
    tx: mpsc::Sender<Vec<u8>>,
}

/// Active listeners of one endpoint, at most one per channel name.
#[derive(Default)]
pub struct Registry {
    listeners: DashMap<ChannelName, Slot>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(self: &Arc<Self>, name: ChannelName) -> Listener {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(LISTENER_BUFFER);

        if self.listeners.insert(name, Slot { id, tx }).is_some() {
            debug!(channel = %name, "Replaced previous listener");
        }

        Listener {
            name,
            id,
            rx,
            registry: Arc::clone(self),
            registered: true,
        }
    }

    /// Hand `payload` to the listener on `name`, if any.
    pub fn dispatch(&self, name: ChannelName, payload: Vec<u8>) -> Delivery {
        let Some(slot) = self.listeners.get(&name) else {
            debug!(channel = %name, "No listener registered, dropping message");
            return Delivery::NoListener;
        };

        match slot.tx.try_send(payload) {
            Ok(()) => Delivery::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(channel = %name, "Listener is not keeping up, dropping message");
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                let id = slot.id;
                drop(slot);
                self.remove(name, id);
                debug!(channel = %name, "Listener went away, dropping message");
                Delivery::NoListener
            }
        }
    }

    pub fn is_registered(&self, name: ChannelName) -> bool {
        self.listeners.contains_key(&name)
    }

    fn remove(&self, name: ChannelName, id: u64) {
        self.listeners.remove_if(&name, |_, slot| slot.id == id);
    }
}

/// Receiving end of a registration.
///
/// Call [`Listener::unregister`] when the surface is torn down. Dropping the
/// listener unregisters it as well.
pub struct Listener {
    name: ChannelName,
    id: u64,
    rx: mpsc::Receiver<Vec<u8>>,
    registry: Arc<Registry>,
    registered: bool,
}

impl Listener {
    pub fn name(&self) -> ChannelName {
        self.name
    }

    /// Next raw payload. Returns `None` once a newer listener took over the
    /// name or this one was unregistered.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    pub fn unregister(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if self.registered {
            self.registered = false;
            self.registry.remove(self.name, self.id);
            self.rx.close();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn newer_listener_replaces_older() {
        let registry = Registry::new();
        let mut first = registry.register(ChannelName::StatusUpdate);
        let mut second = registry.register(ChannelName::StatusUpdate);

        assert_eq!(
            registry.dispatch(ChannelName::StatusUpdate, b"x".to_vec()),
            Delivery::Sent
        );
        assert_eq!(second.recv().await, Some(b"x".to_vec()));
        // the replaced sender was dropped with its slot
        assert_eq!(first.recv().await, None);
    }

    #[tokio::test]
    async fn stale_unregister_keeps_newer_listener() {
        let registry = Registry::new();
        let first = registry.register(ChannelName::StatusChanged);
        let _second = registry.register(ChannelName::StatusChanged);

        first.unregister();
        assert!(registry.is_registered(ChannelName::StatusChanged));
    }

    #[tokio::test]
    async fn full_listener_drops() {
        let registry = Registry::new();
        let _listener = registry.register(ChannelName::StatusUpdate);

        for _ in 0..LISTENER_BUFFER {
            assert_eq!(
                registry.dispatch(ChannelName::StatusUpdate, vec![1]),
                Delivery::Sent
            );
        }
        assert_eq!(
            registry.dispatch(ChannelName::StatusUpdate, vec![1]),
            Delivery::Dropped
        );
    }
}
