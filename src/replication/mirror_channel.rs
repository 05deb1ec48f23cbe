/*
    Copyright © 2026, the mirror_sync authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! [`MirrorChannel`]: the receiving-mirror end of a sync channel.
//!
//! Once the mirror host's control RPC has accepted a primary's
//! [`SyncHello`](crate::messages::SyncHello), it adopts the identified
//! transport channel through [`MirrorChannel::accept`]. From then on the
//! mirror orders every inbound instruction frame through its own
//! [`InstructionChain`], applies each one to local storage exactly once, in
//! strictly increasing clock order, and acknowledges each application with a
//! `SYNC` heartbeat carrying the applied clock.
//!
//! Live forwards and replayed backfill instructions are accepted identically;
//! the clock is derived from the decoded instruction, never from the tag.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::instruction::Instruction;
use crate::messages::{TagClock, TAG_EXECUTE_CLOCK, TAG_EXECUTE_INSTRUCTION, TAG_INSTRUCTION, TAG_SYNC};
use crate::networking::Channel;
use crate::replication::chain::InstructionChain;
use crate::storage::Storage;
use crate::task_runner::TaskRunner;
use crate::types::{Clock, CoreMeta};

pub struct MirrorChannel<C: Channel, S: Storage> {
    inner: Arc<MirrorInner<C, S>>,
}

impl<C: Channel, S: Storage> Clone for MirrorChannel<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct MirrorInner<C: Channel, S: Storage> {
    primary: CoreMeta,
    channel: Arc<C>,
    storage: Arc<S>,
    chain: Mutex<InstructionChain>,
    execute_runner: TaskRunner,
    /// Highest clock applied to local state through this channel.
    applied: AtomicU64,
    /// The primary's last reported execution progress (EXECUTE_CLOCK notices).
    primary_clock: AtomicU64,
}

impl<C: Channel, S: Storage> MirrorChannel<C, S> {
    /// Adopt an accepted transport channel from `primary`. The chain baseline
    /// is seeded from the storage's applied clock; the primary's in-band hello
    /// is answered with a heartbeat, completing the handshake on its side.
    pub fn accept(primary: CoreMeta, channel: Arc<C>, storage: Arc<S>) -> Self {
        let applied = storage.clocked();
        let chain = InstructionChain::new(applied, format!("{}-mirror-chain", primary.label));
        let inner = Arc::new(MirrorInner {
            execute_runner: TaskRunner::new(format!("{}-execute-runner", primary.label)),
            chain: Mutex::new(chain),
            channel: Arc::clone(&channel),
            storage,
            applied: AtomicU64::new(applied.int()),
            primary_clock: AtomicU64::new(0),
            primary,
        });

        // The first inbound message is the primary's handshake hello: swap in
        // the steady-state listener, then ack so the primary unblocks.
        let weak = Arc::downgrade(&inner);
        channel.set_message_listener(Box::new(move |_hello| {
            if let Some(inner) = weak.upgrade() {
                inner.greet();
            }
        }));
        let weak = Arc::downgrade(&inner);
        channel.set_close_listener(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_close();
            }
        }));

        Self { inner }
    }

    pub fn primary(&self) -> &CoreMeta {
        &self.inner.primary
    }

    /// Highest clock applied to local state through this channel.
    pub fn applied_clock(&self) -> Clock {
        Clock::new(self.inner.applied.load(Ordering::SeqCst))
    }

    /// The primary's last reported execution progress, for monitoring and
    /// backpressure decisions.
    pub fn primary_clock(&self) -> Clock {
        Clock::new(self.inner.primary_clock.load(Ordering::SeqCst))
    }

    /// Notify the channel that a state snapshot has been installed out of
    /// band. Everything at or below `clock` is superseded by the snapshot;
    /// instructions buffered above it stay pending and apply once the stream
    /// reaches them.
    pub fn snapshot_installed(&self, clock: Clock) {
        let inner = Arc::clone(&self.inner);
        self.inner.execute_runner.follow(move || {
            inner.applied.store(clock.int(), Ordering::SeqCst);
            let mut chain = inner.chain.lock().unwrap();
            chain.reset(clock, false);
            while chain.has_next() {
                chain.tick();
            }
        });
    }

    pub fn close(&self) {
        self.inner.channel.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.channel.is_closed()
    }
}

impl<C: Channel, S: Storage> MirrorInner<C, S> {
    fn greet(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.channel.set_message_listener(Box::new(move |message| {
            if let Some(inner) = weak.upgrade() {
                inner.on_message(message);
            }
        }));
        let ack = TagClock::new(TAG_SYNC, Clock::new(self.applied.load(Ordering::SeqCst)));
        if self.channel.send(ack.encode(), true).is_err() {
            self.channel.close();
        }
    }

    /// Inbound frames. Runs on the transport's threads: O(1) dispatch or a
    /// hand-off to the execute runner only.
    fn on_message(self: &Arc<Self>, message: &[u8]) {
        match message.first().copied() {
            Some(TAG_INSTRUCTION) | Some(TAG_EXECUTE_INSTRUCTION) => {
                match Instruction::decode(message) {
                    Ok(instruction) => {
                        let inner = Arc::clone(self);
                        self.execute_runner.follow(move || inner.execute(instruction));
                    }
                    Err(err) => {
                        log::error!("Channel from {}: {}.", self.primary, err);
                        self.channel.close();
                    }
                }
            }
            Some(TAG_EXECUTE_CLOCK) => match TagClock::decode(message) {
                Ok(frame) => {
                    self.primary_clock.store(frame.clock.int(), Ordering::SeqCst);
                }
                Err(err) => {
                    log::error!("Channel from {}: {}.", self.primary, err);
                    self.channel.close();
                }
            },
            tag => {
                log::error!(
                    "Channel from {}: protocol violation, unexpected inbound tag {:?}.",
                    self.primary,
                    tag
                );
                self.channel.close();
            }
        }
    }

    /// Runs on the execute runner. Registers the instruction and drives the
    /// chain forward as long as the next clock is buffered, so an in-order
    /// stream applies immediately, while an instruction from the future waits
    /// for the gap to fill.
    fn execute(self: &Arc<Self>, instruction: Instruction) {
        let weak = Arc::downgrade(self);
        let mut chain = self.chain.lock().unwrap();
        chain.follow(instruction, move |instruction| {
            if let Some(inner) = weak.upgrade() {
                inner.apply(instruction);
            }
        });
        while chain.has_next() {
            chain.tick();
        }
    }

    /// Apply one instruction to local state and ack it. Called by the chain,
    /// strictly in clock order, each clock at most once.
    fn apply(&self, instruction: &Instruction) {
        if let Err(err) = self.storage.execute(instruction) {
            log::error!(
                "Execute instruction {} from {} failed: {}.",
                instruction.clock,
                self.primary,
                err
            );
            self.channel.close();
            return;
        }
        self.applied.store(instruction.clock.int(), Ordering::SeqCst);
        let ack = TagClock::new(TAG_SYNC, instruction.clock);
        let _ = self.channel.send(ack.encode(), true);
    }

    fn on_close(self: &Arc<Self>) {
        log::info!("Channel from {} closed.", self.primary);
        let inner = Arc::clone(self);
        self.execute_runner
            .follow(move || inner.chain.lock().unwrap().clear(false));
    }
}
