//! Integration test common infrastructure.
//!
//! Provides an in-memory multicast bus standing in for a named-data
//! transport: every endpoint hears every packet whose name falls under a
//! prefix it registered, except its own.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use statesync::{
    Name, NodeId, PacketHandler, RegisteredPrefix, SyncPacket, SyncTransport, TransportError,
    VersionVector,
};

/// Sender id used by [`SyncBus::inject`] for packets from "nowhere".
pub const INJECTED: u64 = u64::MAX;

struct Subscription {
    owner: u64,
    prefix: Name,
    handler: PacketHandler,
    active: Arc<AtomicBool>,
}

#[derive(Default)]
struct BusState {
    subscriptions: Vec<Subscription>,
    sent: Vec<(u64, SyncPacket)>,
}

/// A shared multicast segment. Create one per test, then one
/// [`BusEndpoint`] per simulated node.
#[derive(Default, Clone)]
pub struct SyncBus {
    state: Arc<Mutex<BusState>>,
    next_owner: Arc<AtomicU64>,
}

impl SyncBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new endpoint with a unique sender id.
    pub fn endpoint(&self) -> Arc<BusEndpoint> {
        Arc::new(BusEndpoint {
            owner: self.next_owner.fetch_add(1, Ordering::SeqCst),
            state: Arc::clone(&self.state),
        })
    }

    /// Every packet expressed on the bus so far, with its sender id.
    pub fn sent(&self) -> Vec<(u64, SyncPacket)> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Number of packets expressed by `owner`.
    pub fn sent_by(&self, owner: u64) -> usize {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(from, _)| *from == owner)
            .count()
    }

    /// Delivers a packet to every endpoint, as if sent by an unknown peer.
    pub fn inject(&self, packet: SyncPacket) {
        deliver(&self.state, INJECTED, packet);
    }
}

fn deliver(state: &Mutex<BusState>, from: u64, packet: SyncPacket) {
    let handlers: Vec<PacketHandler> = {
        let state = state.lock().unwrap();
        state
            .subscriptions
            .iter()
            .filter(|sub| {
                sub.owner != from
                    && sub.active.load(Ordering::SeqCst)
                    && sub.prefix.is_prefix_of(packet.name())
            })
            .map(|sub| Arc::clone(&sub.handler))
            .collect()
    };
    for handler in handlers {
        handler(packet.clone());
    }
}

/// One node's attachment to the bus.
pub struct BusEndpoint {
    owner: u64,
    state: Arc<Mutex<BusState>>,
}

impl BusEndpoint {
    /// The sender id recorded for this endpoint's packets.
    pub fn id(&self) -> u64 {
        self.owner
    }
}

#[async_trait]
impl SyncTransport for BusEndpoint {
    async fn register_prefix(
        &self,
        prefix: &Name,
        on_packet: PacketHandler,
    ) -> Result<RegisteredPrefix, TransportError> {
        let active = Arc::new(AtomicBool::new(true));
        self.state.lock().unwrap().subscriptions.push(Subscription {
            owner: self.owner,
            prefix: prefix.clone(),
            handler: on_packet,
            active: Arc::clone(&active),
        });
        Ok(RegisteredPrefix::new(move || {
            active.store(false, Ordering::SeqCst);
        }))
    }

    async fn express_interest(&self, packet: SyncPacket) -> Result<(), TransportError> {
        self.state
            .lock()
            .unwrap()
            .sent
            .push((self.owner, packet.clone()));
        deliver(&self.state, self.owner, packet);
        Ok(())
    }

    async fn put(&self, packet: SyncPacket) -> Result<(), TransportError> {
        deliver(&self.state, self.owner, packet);
        Ok(())
    }
}

/// Builds an unsigned sync packet carrying the given entries.
#[allow(dead_code)]
pub fn sync_packet(prefix: &str, entries: &[(&str, u64)]) -> SyncPacket {
    let mut vv = VersionVector::new();
    for (nid, seq) in entries {
        vv.set(NodeId::from(*nid), *seq);
    }
    let prefix: Name = prefix.parse().unwrap();
    SyncPacket::new(prefix.append(vv.encode()).append_number(0))
}
