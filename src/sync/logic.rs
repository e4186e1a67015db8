//! The suppression-based sync state machine.
//!
//! Each instance owns the local version vector and a retransmission timer.
//! Inbound sync packets are merged into local state; when a peer reports us
//! as newer we do not answer immediately but enter a short suppression
//! window, folding every further observation into a recorded aggregate.
//! When the window closes we speak only if local state still holds
//! something nobody else announced. Local publishes bypass suppression and
//! emit at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use statesync_proto::{Name, NodeId, SeqNo, SyncPacket, VersionVector};

use crate::config::{EncodingStrategy, SyncConfig};
use crate::error::Result;
use crate::sched::{Scheduler, TimerHandle};
use crate::security::SecurityOptions;
use crate::sync::merge::{self, MissingDataInfo};
use crate::transport::{PacketHandler, RegisteredPrefix, SyncTransport};

/// Callback invoked when a merge discovers data the host should fetch.
///
/// Called with no internal lock held, once per merge that found gaps.
pub type UpdateCallback = Box<dyn Fn(&[MissingDataInfo]) + Send + Sync>;

/// A running sync instance for one node in one sync group.
///
/// Cheap accessors may be called from any thread; all protocol callbacks
/// run on the async runtime. Dropping the instance detaches the inbound
/// listener and cancels the pending retransmission.
pub struct SyncLogic {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn SyncTransport>,
    sync_prefix: Name,
    id: NodeId,
    security: SecurityOptions,
    config: SyncConfig,
    on_update: UpdateCallback,
    scheduler: Scheduler,
    /// Period until the next routine announcement, in milliseconds.
    retx_dist: Uniform<u64>,
    /// Delay before answering a peer that reported us as newer.
    reply_dist: Uniform<u64>,
    /// Spacing between packets of one multi-packet round.
    spacing_dist: Uniform<u64>,
    state: Mutex<State>,
    retx_timer: Mutex<Option<TimerHandle>>,
    /// When the scheduled retransmission will fire, in scheduler micros.
    next_sync_micros: AtomicU64,
    registration: Mutex<Option<RegisteredPrefix>>,
}

/// Everything guarded by the one state mutex.
struct State {
    vv: VersionVector,
    /// Present only while in the suppression window: the aggregate of all
    /// vectors observed since entering it.
    recorded: Option<VersionVector>,
    rng: StdRng,
}

impl SyncLogic {
    /// Starts a sync instance: registers the inbound listener on
    /// `sync_prefix`, seeds the local entry at zero, and announces
    /// immediately once the registration succeeds.
    pub async fn new(
        transport: Arc<dyn SyncTransport>,
        sync_prefix: Name,
        id: NodeId,
        on_update: UpdateCallback,
        security: SecurityOptions,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;
        security.validate()?;

        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (retx_lo, retx_hi) = config.retx_window();
        let (reply_lo, reply_hi) = config.suppression_window();
        let (space_lo, space_hi) = config.packet_spacing_window();

        let mut vv = VersionVector::new();
        vv.set(id.clone(), 0);

        let inner = Arc::new(Inner {
            transport: Arc::clone(&transport),
            sync_prefix: sync_prefix.clone(),
            id,
            security,
            config,
            on_update,
            scheduler: Scheduler::new(),
            retx_dist: Uniform::new_inclusive(
                retx_lo.as_millis() as u64,
                retx_hi.as_millis() as u64,
            ),
            reply_dist: Uniform::new_inclusive(
                reply_lo.as_millis() as u64,
                reply_hi.as_millis() as u64,
            ),
            spacing_dist: Uniform::new_inclusive(
                space_lo.as_millis() as u64,
                space_hi.as_millis() as u64,
            ),
            state: Mutex::new(State {
                vv,
                recorded: None,
                rng,
            }),
            retx_timer: Mutex::new(None),
            next_sync_micros: AtomicU64::new(0),
            registration: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let handler: PacketHandler = Arc::new(move |packet| {
            if let Some(inner) = weak.upgrade() {
                inner.on_sync_packet(packet);
            }
        });
        let registration = transport.register_prefix(&sync_prefix, handler).await?;
        *lock(&inner.registration) = Some(registration);

        info!(id = %inner.id, prefix = %inner.sync_prefix, "sync instance started");

        // First announcement goes out as soon as we can hear replies.
        Arc::clone(&inner).retx_sync_interest(true, Duration::ZERO);

        Ok(Self { inner })
    }

    /// The local node identity.
    #[must_use]
    pub fn local_id(&self) -> &NodeId {
        &self.inner.id
    }

    /// Current sequence number for `nid`, or for the local node when `None`.
    #[must_use]
    pub fn seq_no(&self, nid: Option<&NodeId>) -> SeqNo {
        let state = self.inner.state();
        state.vv.get(nid.unwrap_or(&self.inner.id))
    }

    /// Raises the sequence number for `nid` (the local node when `None`)
    /// and announces immediately if it changed.
    ///
    /// Lower or equal values are ignored: sequence numbers only move
    /// forward.
    pub fn update_seq_no(&self, seq: SeqNo, nid: Option<NodeId>) {
        let nid = nid.unwrap_or_else(|| self.inner.id.clone());
        let changed = {
            let mut state = self.inner.state();
            let prev = state.vv.get(&nid);
            if seq > prev {
                state.vv.set(nid.clone(), seq);
                true
            } else {
                false
            }
        };

        if changed {
            debug!(node = %nid, seq, "local publish");
            Arc::clone(&self.inner).retx_sync_interest(true, Duration::ZERO);
        }
    }

    /// All node identities currently known, in canonical order.
    #[must_use]
    pub fn session_names(&self) -> Vec<NodeId> {
        self.inner.state().vv.node_ids().cloned().collect()
    }

    /// Human-readable `nid:seq ...` snapshot of the local vector.
    #[must_use]
    pub fn state_str(&self) -> String {
        self.inner.state().vv.to_string()
    }
}

impl Drop for SyncLogic {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.inner.retx_timer).take() {
            timer.cancel();
        }
        lock(&self.inner.registration).take();
        info!(id = %self.inner.id, "sync instance stopped");
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    /// Inbound entry point, called by the transport for every packet under
    /// the sync prefix.
    fn on_sync_packet(self: Arc<Self>, packet: SyncPacket) {
        debug!(packet = %packet, "inbound sync");
        match self.security.verify_local(&packet) {
            Some(true) => self.on_validated(&packet),
            Some(false) => debug!(packet = %packet, "dropping sync with bad signature"),
            None => {
                // Async validator: processing resumes on its continuation.
                let runtime = self.scheduler.runtime().clone();
                runtime.spawn(async move {
                    if self.security.verify(&packet).await {
                        self.on_validated(&packet);
                    } else {
                        debug!(packet = %packet, "dropping sync that failed validation");
                    }
                });
            }
        }
    }

    fn on_validated(self: Arc<Self>, packet: &SyncPacket) {
        let remote = match packet.vector() {
            Ok(vector) => vector,
            Err(error) => {
                debug!(%error, packet = %packet, "dropping malformed sync");
                return;
            }
        };

        let policy = self.config.encoding.policy();
        let (outcome, was_suppressed) = {
            let mut state = self.state();
            let outcome = merge::merge(&mut state.vv, &remote, policy);
            let was_suppressed = match state.recorded.as_mut() {
                Some(recorded) => {
                    for (nid, seq) in remote.iter() {
                        if recorded.get(nid) < seq {
                            recorded.set(nid.clone(), seq);
                        }
                    }
                    true
                }
                None => false,
            };
            (outcome, was_suppressed)
        };

        if !outcome.missing.is_empty() {
            debug!(sessions = outcome.missing.len(), "new data discovered");
            (self.on_update)(&outcome.missing);
        }

        // A packet observed during an open suppression window has been
        // folded into the aggregate; it must not re-arm any timer.
        if was_suppressed {
            return;
        }

        if !outcome.local_newer {
            // Nothing to announce: push our next routine attempt out.
            self.retx_sync_interest(false, Duration::ZERO);
        } else {
            let jitter = {
                let mut state = self.state();
                if state.recorded.is_none() {
                    state.recorded = Some(remote.clone());
                }
                Duration::from_millis(self.reply_dist.sample(&mut state.rng))
            };
            // Pull the timer in only if the jittered reply would beat the
            // currently scheduled fire.
            let deadline = self.next_sync_micros.load(Ordering::Acquire);
            if self.scheduler.now_micros() + (jitter.as_micros() as u64) < deadline {
                self.retx_sync_interest(false, jitter);
            }
        }
    }

    /// Timer tick. With `send`, decide whether to emit this round and leave
    /// the suppression window; in all cases reschedule the next tick after
    /// `delay` (zero means a fresh draw from the retransmission window).
    fn retx_sync_interest(self: Arc<Self>, send: bool, delay: Duration) {
        if send {
            let batch = {
                let mut state = self.state();
                let announce = match &state.recorded {
                    None => true,
                    Some(recorded) => merge::local_newer_than(
                        &state.vv,
                        recorded,
                        self.config.encoding.policy(),
                    ),
                };
                let batch = if announce {
                    Some(self.build_packets(&mut state))
                } else {
                    None
                };
                state.recorded = None;
                batch
            };
            match batch {
                Some(packets) => self.send_packets(packets),
                None => debug!(id = %self.id, "staying silent: peers already announced this state"),
            }
        }

        let delay = if delay.is_zero() {
            let mut state = self.state();
            Duration::from_millis(self.retx_dist.sample(&mut state.rng))
        } else {
            delay
        };

        self.next_sync_micros.store(
            self.scheduler.now_micros() + delay.as_micros() as u64,
            Ordering::Release,
        );

        let weak = Arc::downgrade(&self);
        let timer = self.scheduler.schedule(delay, move || {
            if let Some(inner) = weak.upgrade() {
                inner.retx_sync_interest(true, Duration::ZERO);
            }
        });
        *lock(&self.retx_timer) = Some(timer);
    }

    /// Encodes the local vector per the configured strategy and signs one
    /// packet per encoding. Later packets of a multi-packet round carry a
    /// small spacing delay.
    fn build_packets(&self, state: &mut State) -> Vec<(Duration, SyncPacket)> {
        let cap = self.config.max_chunk_bytes;
        let encodings: Vec<Vec<u8>> = match self.config.encoding {
            EncodingStrategy::Full => vec![state.vv.encode()],
            EncodingStrategy::Chunked => state.vv.encode_chunked(cap),
            EncodingStrategy::MostRecent => vec![state.vv.encode_most_recent(cap)],
            EncodingStrategy::MostRecentAndRandom { extra } => {
                vec![state.vv.encode_most_recent_and_random(cap, extra, &mut state.rng)]
            }
            EncodingStrategy::Random => vec![state.vv.encode_random(cap, &mut state.rng)],
        };

        encodings
            .into_iter()
            .enumerate()
            .map(|(index, bytes)| {
                let unsigned = self.sync_prefix.clone().append(bytes);
                let packet = SyncPacket::new(self.security.finish_name(unsigned));
                let spacing = if index == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(self.spacing_dist.sample(&mut state.rng))
                };
                (spacing, packet)
            })
            .collect()
    }

    fn send_packets(&self, packets: Vec<(Duration, SyncPacket)>) {
        let transport = Arc::clone(&self.transport);
        self.scheduler.runtime().spawn(async move {
            for (spacing, packet) in packets {
                if !spacing.is_zero() {
                    tokio::time::sleep(spacing).await;
                }
                debug!(packet = %packet, "outbound sync");
                if let Err(error) = transport.express_interest(packet).await {
                    warn!(%error, "failed to send sync packet");
                }
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
