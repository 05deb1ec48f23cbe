/*
    Copyright © 2026, the mirror_sync authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! [`InstructionSyncChannel`]: the outbound replication protocol from a
//! primary to one mirror.
//!
//! A sync channel owns one transport channel and one [`InstructionChain`], and
//! serializes its work through two ordered task queues:
//! - the *send runner*, through which every [`sync`](InstructionSyncChannel::sync)
//!   body executes one at a time; this is what makes the
//!   backfill-then-forward sequence atomic with respect to the sync clock;
//! - the *chain runner*, through which every chain mutation (heartbeat ticks,
//!   baseline resets, the closing clear) executes off the transport's I/O
//!   threads.
//!
//! A channel value is single-use: it is created for one connection attempt,
//! and reconnection after a close constructs a fresh channel, restarting the
//! whole negotiation.

use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use crate::core::ControlUnit;
use crate::instruction::Instruction;
use crate::messages::{
    DecodeError, HelloReply, SyncHello, TagClock, TAG_EXECUTE_CLOCK, TAG_EXECUTE_INSTRUCTION,
    TAG_SYNC,
};
use crate::networking::{ApiError, Channel, ControlApi, Transport};
use crate::replication::chain::InstructionChain;
use crate::storage::{Storage, StorageError};
use crate::task_runner::TaskRunner;
use crate::types::{Clock, CoreMeta};

/// Outcome of [`InstructionSyncChannel::connect`].
#[derive(Debug)]
pub enum ConnectOutcome {
    /// The handshake completed and the channel is live.
    Ok,
    /// The mirror explicitly declined pairing (for example, it already follows
    /// another primary). Callers should not blindly retry.
    Refused,
    /// A transport or protocol failure. The caller may retry with a fresh
    /// channel.
    Error(ChannelError),
}

/// A failure local to one primary↔mirror pairing. Every variant closes the
/// channel it occurred on and never propagates to other mirrors' channels.
#[derive(Debug)]
pub enum ChannelError {
    /// The transport channel is gone (never opened, or closed under us).
    Closed,
    /// The channel closed or disconnected while waiting for the handshake ack.
    HandshakeInterrupted,
    /// A control RPC failed.
    Api(ApiError),
    /// Snapshot transfer (or another storage operation) failed hard.
    Storage(StorageError),
    /// The remote sent a tag that is not valid inbound on this channel.
    ProtocolViolation { tag: u8 },
    /// The remote sent a frame that could not be decoded.
    Decode(DecodeError),
}

impl Display for ChannelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Closed => write!(f, "channel closed"),
            ChannelError::HandshakeInterrupted => write!(f, "channel closed during handshake"),
            ChannelError::Api(err) => write!(f, "{}", err),
            ChannelError::Storage(err) => write!(f, "{}", err),
            ChannelError::ProtocolViolation { tag } => {
                write!(f, "protocol violation: unexpected inbound tag {}", tag)
            }
            ChannelError::Decode(err) => write!(f, "{}", err),
        }
    }
}

pub struct InstructionSyncChannel<T: Transport, S: Storage, A: ControlApi> {
    inner: Arc<ChannelInner<T, S, A>>,
}

impl<T: Transport, S: Storage, A: ControlApi> Clone for InstructionSyncChannel<T, S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ChannelInner<T: Transport, S: Storage, A: ControlApi> {
    primary: CoreMeta,
    mirror: CoreMeta,
    transport: Arc<T>,
    storage: Arc<S>,
    api: Arc<A>,
    channel: Mutex<Option<Arc<T::Channel>>>,
    control_unit: Mutex<Option<Arc<dyn ControlUnit>>>,
    chain: Mutex<InstructionChain>,
    send_runner: TaskRunner,
    chain_runner: TaskRunner,
    /// Highest clock confirmed delivered to this mirror. Mutated only from the
    /// send runner (and once, during `connect`, before any `sync` can run).
    sync_clock: AtomicU64,
    closed: AtomicBool,
}

impl<T: Transport, S: Storage, A: ControlApi> InstructionSyncChannel<T, S, A> {
    /// Create a channel addressing `mirror`, starting from the primary's local
    /// `clock`. The channel is inert until [`connect`](Self::connect) runs.
    pub fn new(
        primary: CoreMeta,
        mirror: CoreMeta,
        clock: Clock,
        transport: Arc<T>,
        storage: Arc<S>,
        api: Arc<A>,
    ) -> Self {
        let chain = InstructionChain::new(clock, format!("{}-instruction-chain", mirror.label));
        Self {
            inner: Arc::new(ChannelInner {
                primary,
                send_runner: TaskRunner::new(format!("{}-send-runner", mirror.label)),
                chain_runner: TaskRunner::new(format!("{}-chain-runner", mirror.label)),
                mirror,
                transport,
                storage,
                api,
                channel: Mutex::new(None),
                control_unit: Mutex::new(None),
                chain: Mutex::new(chain),
                sync_clock: AtomicU64::new(clock.int()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Establish the transport channel and run the pairing handshake. Blocks
    /// the calling thread until the handshake completes or fails; acceptable
    /// because it happens off the hot write path, at mirror-registration time.
    ///
    /// On [`ConnectOutcome::Ok`], the sync clock has been seeded from the
    /// mirror's *reported* applied clock, not from the naive local assumption,
    /// because a previously-connected mirror may have advanced further than
    /// this primary's bookkeeping shows after a restart.
    pub fn connect(&self) -> ConnectOutcome {
        match self.inner.try_connect() {
            Ok(true) => {
                log::info!(
                    "Connected mirror {}, sync clock: {}.",
                    self.inner.mirror,
                    self.inner.sync_clock.load(Ordering::SeqCst)
                );
                ConnectOutcome::Ok
            }
            Ok(false) => {
                log::info!("Mirror {} refused pairing.", self.inner.mirror);
                ConnectOutcome::Refused
            }
            Err(err) => {
                log::warn!("Connect to mirror {} failed: {}.", self.inner.mirror, err);
                self.inner.close();
                ConnectOutcome::Error(err)
            }
        }
    }

    /// Bind a coordinator to this channel, exactly once. No-op if the channel
    /// is already closed or already bound. On success the unit is notified of
    /// the new live mirror (from the chain runner, like every other callback).
    pub fn assign_control_unit(&self, unit: Arc<dyn ControlUnit>) {
        if self.is_closed() {
            return;
        }
        let mut slot = self.inner.control_unit.lock().unwrap();
        if slot.is_none() {
            *slot = Some(Arc::clone(&unit));
            drop(slot);
            let inner = Arc::clone(&self.inner);
            self.inner
                .chain_runner
                .follow(move || unit.on_mirror_connect(&inner.mirror));
        }
    }

    /// The core replication operation: enqueue `instruction` for delivery to
    /// the mirror, backfilling any gap first. Never blocks; all invocations on
    /// one channel execute one at a time, in submission order, on the send
    /// runner. No-op if the channel is closed.
    ///
    /// Any failure inside the queued sequence closes the channel: a
    /// half-applied backfill is not safely resumable mid-sequence, so the
    /// channel is torn down and reconnection restarts the negotiation.
    pub fn sync(&self, instruction: Instruction) {
        if self.is_closed() {
            return;
        }
        log::debug!(
            "Sync instruction to {}, clock: {}.",
            self.inner.mirror.label,
            instruction.clock
        );
        let inner = Arc::clone(&self.inner);
        self.inner.send_runner.follow(move || {
            if inner.is_closed() {
                return;
            }
            if let Err(err) = inner.sync_in_order(&instruction) {
                log::error!("Sync to {} error: {}.", inner.mirror.label, err);
                inner.close();
            }
        });
    }

    /// Informational: tell the mirror how far this primary has executed,
    /// independent of the per-instruction stream. No-op if closed.
    pub fn executed(&self, clock: Clock) {
        if self.is_closed() {
            return;
        }
        if let Some(channel) = self.inner.channel() {
            let _ = channel.send(TagClock::new(TAG_EXECUTE_CLOCK, clock).encode(), false);
        }
    }

    /// Idempotent; safe to call from any thread. The chain is drained
    /// (discarded) from the chain queue's point of view before the close is
    /// complete, though this call returns immediately.
    pub fn close(&self) {
        self.inner.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn mirror(&self) -> &CoreMeta {
        &self.inner.mirror
    }

    /// Highest clock confirmed delivered to this mirror.
    pub fn sync_clock(&self) -> Clock {
        Clock::new(self.inner.sync_clock.load(Ordering::SeqCst))
    }
}

impl<T: Transport, S: Storage, A: ControlApi> ChannelInner<T, S, A> {
    /// `Ok(true)`: connected. `Ok(false)`: the mirror explicitly refused.
    fn try_connect(self: &Arc<Self>) -> Result<bool, ChannelError> {
        let channel = self
            .transport
            .open(&self.mirror.location)
            .map_err(ChannelError::Api)?;
        *self.channel.lock().unwrap() = Some(Arc::clone(&channel));

        // A one-shot "future" the handshake blocks on: completed by the first
        // inbound message (the mirror's ack), or failed by an early close.
        let (handshake, handshake_done) = mpsc::channel::<Result<(), ChannelError>>();
        {
            let handshake = handshake.clone();
            channel.set_close_listener(Box::new(move || {
                let _ = handshake.send(Err(ChannelError::HandshakeInterrupted));
            }));
        }

        let hello = SyncHello::new(
            channel.id(),
            self.primary.clone(),
            Clock::new(self.sync_clock.load(Ordering::SeqCst)),
        );
        match self
            .api
            .connect_mirror(&self.mirror.location, hello)
            .map_err(ChannelError::Api)?
        {
            HelloReply::Rejected => {
                channel.close();
                return Ok(false);
            }
            HelloReply::Accepted => {}
        }

        channel.set_message_listener(Box::new(move |_| {
            let _ = handshake.send(Ok(()));
        }));
        channel
            .send(self.mirror.label.as_bytes().to_vec(), true)
            .map_err(|_| ChannelError::Closed)?;
        handshake_done
            .recv()
            .map_err(|_| ChannelError::HandshakeInterrupted)??;

        // Handshake done: take over the channel with the steady-state
        // listeners before anything else can arrive.
        let weak = Arc::downgrade(self);
        channel.set_message_listener(Box::new(move |message| {
            if let Some(inner) = weak.upgrade() {
                inner.on_message(message);
            }
        }));
        let weak = Arc::downgrade(self);
        channel.set_close_listener(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_close();
            }
        }));

        let applied = self
            .api
            .ask_clock(&self.mirror.location, self.mirror.unit_id, self.mirror.core_id)
            .map_err(ChannelError::Api)?;
        self.sync_clock.store(applied.int(), Ordering::SeqCst);
        let inner = Arc::clone(self);
        self.chain_runner
            .follow(move || inner.chain.lock().unwrap().reset(applied, false));
        Ok(true)
    }

    /// The body of one `sync` call. Runs on the send runner only.
    fn sync_in_order(self: &Arc<Self>, instruction: &Instruction) -> Result<(), ChannelError> {
        let channel = self.channel().ok_or(ChannelError::Closed)?;
        let mut sync_clock = self.sync_clock.load(Ordering::SeqCst);

        // Close any gap between what the mirror has confirmed and the
        // instruction about to be forwarded.
        while sync_clock + 1 < instruction.clock.int() {
            sync_clock += 1;
            match self.storage.reappear_instruction(Clock::new(sync_clock)) {
                Some(mut encoded) => {
                    encoded[0] = TAG_EXECUTE_INSTRUCTION;
                    channel.send(encoded, false).map_err(|_| ChannelError::Closed)?;
                }
                None => {
                    // The log has been compacted past this clock: fall back to
                    // a full snapshot transfer, then re-seed from the mirror's
                    // own report. This bounds recovery cost when history has
                    // been pruned.
                    log::info!(
                        "Instruction {} compacted, transferring snapshot to {}.",
                        sync_clock,
                        self.mirror
                    );
                    self.storage
                        .transfer_to(&self.mirror)
                        .map_err(ChannelError::Storage)?;
                    sync_clock = self
                        .api
                        .ask_clock(&self.mirror.location, self.mirror.unit_id, self.mirror.core_id)
                        .map_err(ChannelError::Api)?
                        .int();
                }
            }
            self.sync_clock.store(sync_clock, Ordering::SeqCst);
            // Instructions already known-applied need not be re-ordered.
            let inner = Arc::clone(self);
            let baseline = Clock::new(sync_clock);
            self.chain_runner
                .follow(move || inner.chain.lock().unwrap().reset(baseline, false));
        }

        // Register before forwarding so the ack cannot race the registration.
        let unit = self.control_unit.lock().unwrap().clone();
        let mirror = self.mirror.clone();
        self.chain
            .lock()
            .unwrap()
            .follow(instruction.clone(), move |instruction| {
                if let Some(unit) = &unit {
                    unit.on_synced(&mirror, instruction);
                }
            });
        channel
            .send(instruction.encode(), true)
            .map_err(|_| ChannelError::Closed)?;
        self.sync_clock
            .store(instruction.clock.int(), Ordering::SeqCst);
        Ok(())
    }

    /// Inbound messages on an established channel. Runs on the transport's
    /// threads: O(1) dispatch only.
    fn on_message(self: &Arc<Self>, message: &[u8]) {
        match TagClock::decode(message) {
            Ok(frame) if frame.tag == TAG_SYNC => {
                // The heartbeat carries the clock the mirror has applied up
                // to. Confirmation is absolute: a heartbeat for a replayed
                // instruction must not push the baseline past clocks the
                // per-gap-step resets already accounted for.
                let inner = Arc::clone(self);
                self.chain_runner
                    .follow(move || inner.chain.lock().unwrap().tick_to(frame.clock));
            }
            Ok(frame) => {
                log::error!(
                    "Channel to {}: {}.",
                    self.mirror,
                    ChannelError::ProtocolViolation { tag: frame.tag }
                );
                self.close();
            }
            Err(err) => {
                log::error!("Channel to {}: {}.", self.mirror, ChannelError::Decode(err));
                self.close();
            }
        }
    }

    /// Transport close notification. A disconnected mirror's in-flight buffer
    /// is stale once reconnection restarts the clock handshake, so the chain
    /// is cleared without executing.
    fn on_close(self: &Arc<Self>) {
        self.closed.store(true, Ordering::SeqCst);
        log::info!("Channel to {} closed.", self.mirror);
        let inner = Arc::clone(self);
        self.chain_runner
            .follow(move || inner.chain.lock().unwrap().clear(false));
        if let Some(unit) = self.control_unit.lock().unwrap().clone() {
            let inner = Arc::clone(self);
            self.chain_runner
                .follow(move || unit.on_mirror_close(&inner.mirror));
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let channel = self.channel.lock().unwrap().clone();
        if let Some(channel) = channel {
            if !channel.is_closed() {
                // The transport fires the close listener, which drives
                // on_close exactly once.
                channel.close();
            }
        }
    }

    fn is_closed(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return true;
        }
        match self.channel.lock().unwrap().as_ref() {
            Some(channel) => channel.is_closed(),
            None => true,
        }
    }

    fn channel(&self) -> Option<Arc<T::Channel>> {
        self.channel.lock().unwrap().clone()
    }
}
