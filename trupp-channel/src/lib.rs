//! Named, fire-and-forget message channel between the in-car and the mobile
//! status surfaces.
//!
//! Delivery is best effort: a send reaches whichever listener is registered
//! on the name at that moment, or nobody. Nothing is queued for listeners
//! that register later and senders never wait for the receiver.

mod registry;
pub use registry::*;
mod bus;
pub use bus::*;
mod frame;
pub use frame::*;
mod stream;
pub use stream::*;

pub use tokio_util::sync::CancellationToken;
pub use trupp_core::ChannelName;

/// What happened to a sent message, as far as the sender can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to a listener or to the transport.
    Sent,
    /// No listener or peer; the message was discarded.
    NoListener,
    /// The receiving side is saturated; the message was discarded.
    Dropped,
}

/// One endpoint's view of the channel.
pub trait EventChannel: Send + Sync + 'static {
    /// Send `payload` to whoever listens on `name`. Never blocks.
    fn send(&self, name: ChannelName, payload: Vec<u8>) -> Delivery;

    /// Become the listener for `name`, replacing any previous listener.
    fn register(&self, name: ChannelName) -> Listener;
}
