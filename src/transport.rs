//! Transport interface consumed by the sync logic.
//!
//! The engine does not know how packets move: a named-data forwarder, a UDP
//! multicast group, or an in-memory bus in tests all fit behind
//! [`SyncTransport`]. The logic registers one listener on the sync prefix,
//! fire-and-forgets its own sync packets, and otherwise stays out of the
//! transport's way.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use statesync_proto::{Name, SyncPacket};

use crate::error::TransportError;

/// Callback invoked for every inbound packet matching a registered prefix.
///
/// Runs on the transport's event-processing task; implementations must not
/// block.
pub type PacketHandler = Arc<dyn Fn(SyncPacket) + Send + Sync>;

/// Scoped handle for a registered prefix listener.
///
/// Dropping the handle detaches the listener; the transport stops delivering
/// packets for the prefix.
pub struct RegisteredPrefix {
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl RegisteredPrefix {
    /// Wraps a transport-specific unregistration action.
    #[must_use]
    pub fn new(unregister: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unregister: Some(Box::new(unregister)),
        }
    }

    /// A handle with no detach action, for transports that track listener
    /// lifetimes themselves.
    #[must_use]
    pub fn noop() -> Self {
        Self { unregister: None }
    }
}

impl Drop for RegisteredPrefix {
    fn drop(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

impl fmt::Debug for RegisteredPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredPrefix").finish_non_exhaustive()
    }
}

/// A network face the sync logic can speak through.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Registers `on_packet` for every inbound packet under `prefix`.
    ///
    /// The returned handle keeps the registration alive.
    async fn register_prefix(
        &self,
        prefix: &Name,
        on_packet: PacketHandler,
    ) -> Result<RegisteredPrefix, TransportError>;

    /// Sends a sync packet to the group. Fire-and-forget: delivery is not
    /// acknowledged and failures only matter until the next periodic resend.
    async fn express_interest(&self, packet: SyncPacket) -> Result<(), TransportError>;

    /// Publishes a reply packet. Unused by the suppression engine; present
    /// so request/reply flavors can share the same transport.
    async fn put(&self, packet: SyncPacket) -> Result<(), TransportError>;
}
