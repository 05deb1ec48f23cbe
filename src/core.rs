/*
    Copyright © 2026, the mirror_sync authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The primary-side coordination surface: the [`ControlUnit`] callback trait
//! and the [`Core`] that owns one partition's sync channels.
//!
//! A `Core` is built from a [`CoreSpec`] using the builder pattern:
//!
//! ```ignore
//! let core =
//!     CoreSpec::builder()
//!     .meta(meta)
//!     .transport(transport)
//!     .storage(storage)
//!     .control_api(api)
//!     .control_unit(unit)
//!     .clock(recovered_clock)
//!     .build()
//!     .start();
//! ```
//!
//! ### Required setters
//!
//! - `.meta(...)`: this primary's [`CoreMeta`].
//! - `.transport(...)`: the [`Transport`](crate::networking::Transport)
//!   implementation.
//! - `.storage(...)`: the [`Storage`](crate::storage::Storage) implementation,
//!   shared read-only by every sync channel.
//! - `.control_api(...)`: the [`ControlApi`](crate::networking::ControlApi)
//!   implementation.
//! - `.control_unit(...)`: the user's [`ControlUnit`], the callback sink for
//!   mirror lifecycle and sync confirmations.
//! - `.clock(...)`: the starting clock, recovered from local storage.
//!
//! The `Core` assigns clocks and fans instructions out; persisting each
//! instruction to the local log and executing it locally remain the caller's
//! job (they own the storage implementation). Quorum and write-acknowledgement
//! policy live entirely in the user's `ControlUnit`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use typed_builder::TypedBuilder;

use crate::instruction::Instruction;
use crate::networking::{ControlApi, Transport};
use crate::replication::sync_channel::{ConnectOutcome, InstructionSyncChannel};
use crate::storage::Storage;
use crate::types::{Clock, CoreId, CoreMeta};

/// The callback sink a primary's sync channels report into. Implementations
/// decide write-acknowledgement and quorum policy; this crate only guarantees
/// when and in what order the callbacks fire.
///
/// All three methods are called from the channels' internal task queues,
/// never from the transport's I/O threads, so implementations may do real
/// work, but work that blocks delays further callbacks from that mirror.
pub trait ControlUnit: Send + Sync + 'static {
    /// A sync channel to `mirror` completed its handshake and was bound.
    fn on_mirror_connect(&self, mirror: &CoreMeta);

    /// The channel to `mirror` closed; the mirror should be considered
    /// degraded until a fresh channel reconnects.
    fn on_mirror_close(&self, mirror: &CoreMeta);

    /// `mirror` confirmed application of `instruction`. Fired strictly in
    /// increasing clock order per mirror.
    fn on_synced(&self, mirror: &CoreMeta, instruction: &Instruction);
}

/// Stores all parameters and trait implementations required to run a primary
/// core. Build one with `CoreSpec::builder()`, then call
/// [`start`](CoreSpec::start).
#[derive(TypedBuilder)]
pub struct CoreSpec<T: Transport, S: Storage, A: ControlApi, U: ControlUnit> {
    #[builder(setter(doc = "Set this primary's identity. Required."))]
    meta: CoreMeta,
    #[builder(setter(doc = "Set the networking provider. Required."))]
    transport: T,
    #[builder(setter(doc = "Set the instruction log / state storage. Required."))]
    storage: S,
    #[builder(setter(doc = "Set the control RPC implementation. Required."))]
    control_api: A,
    #[builder(setter(doc = "Set the callback sink for mirror lifecycle and sync confirmations. Required."))]
    control_unit: U,
    #[builder(setter(doc = "Set the starting clock, recovered from local storage. Required."))]
    clock: Clock,
}

impl<T: Transport, S: Storage, A: ControlApi, U: ControlUnit> CoreSpec<T, S, A, U> {
    pub fn start(self) -> Core<T, S, A, U> {
        Core {
            meta: self.meta,
            transport: Arc::new(self.transport),
            storage: Arc::new(self.storage),
            api: Arc::new(self.control_api),
            unit: Arc::new(self.control_unit),
            clock: AtomicU64::new(self.clock.int()),
            channels: Mutex::new(HashMap::new()),
        }
    }
}

/// A partition's primary: assigns clocks and drives every registered mirror
/// toward the local instruction log through one sync channel each.
pub struct Core<T: Transport, S: Storage, A: ControlApi, U: ControlUnit> {
    meta: CoreMeta,
    transport: Arc<T>,
    storage: Arc<S>,
    api: Arc<A>,
    unit: Arc<U>,
    clock: AtomicU64,
    channels: Mutex<HashMap<CoreId, InstructionSyncChannel<T, S, A>>>,
}

impl<T: Transport, S: Storage, A: ControlApi, U: ControlUnit> Core<T, S, A, U> {
    pub fn meta(&self) -> &CoreMeta {
        &self.meta
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// The highest clock assigned so far.
    pub fn clock(&self) -> Clock {
        Clock::new(self.clock.load(Ordering::SeqCst))
    }

    /// Assign the next clock. Strictly increasing, no gaps, no duplicates.
    pub fn next_clock(&self) -> Clock {
        Clock::new(self.clock.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Build, connect, and bind a fresh sync channel to `mirror`. On
    /// [`ConnectOutcome::Ok`] the channel replaces (and closes) any stale
    /// channel to the same core; on any other outcome nothing is registered
    /// and the caller decides whether to retry.
    pub fn connect_mirror(&self, mirror: CoreMeta) -> ConnectOutcome {
        let channel = InstructionSyncChannel::new(
            self.meta.clone(),
            mirror.clone(),
            self.clock(),
            Arc::clone(&self.transport),
            Arc::clone(&self.storage),
            Arc::clone(&self.api),
        );
        match channel.connect() {
            ConnectOutcome::Ok => {
                channel.assign_control_unit(Arc::clone(&self.unit) as Arc<dyn ControlUnit>);
                let stale = self
                    .channels
                    .lock()
                    .unwrap()
                    .insert(mirror.core_id, channel);
                if let Some(stale) = stale {
                    stale.close();
                }
                ConnectOutcome::Ok
            }
            outcome => outcome,
        }
    }

    /// Close and forget the channel to `core_id`, if any.
    pub fn drop_mirror(&self, core_id: CoreId) {
        if let Some(channel) = self.channels.lock().unwrap().remove(&core_id) {
            channel.close();
        }
    }

    /// Hand `instruction` to every registered mirror's sync channel. The
    /// caller has already persisted it to the local log (so gap recovery can
    /// replay it) and assigned its clock via [`next_clock`](Self::next_clock).
    pub fn sync(&self, instruction: &Instruction) {
        let channels: Vec<_> = self.channels.lock().unwrap().values().cloned().collect();
        for channel in channels {
            channel.sync(instruction.clone());
        }
    }

    /// Tell every mirror how far this primary has executed.
    pub fn executed(&self, clock: Clock) {
        let channels: Vec<_> = self.channels.lock().unwrap().values().cloned().collect();
        for channel in channels {
            channel.executed(clock);
        }
    }

    /// Snapshot of the per-mirror confirmed clocks, for monitoring and
    /// truncation decisions.
    pub fn sync_clocks(&self) -> HashMap<CoreId, Clock> {
        self.channels
            .lock()
            .unwrap()
            .iter()
            .map(|(core_id, channel)| (*core_id, channel.sync_clock()))
            .collect()
    }
}
