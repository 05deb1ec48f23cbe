/*
    Copyright © 2026, the mirror_sync authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! An in-memory [`Storage`]: a clock-keyed instruction log with controllable
//! compaction, plus a snapshot checkpoint that `transfer_to` ships directly
//! into a registered peer's storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mirror_sync::instruction::Instruction;
use mirror_sync::storage::{Storage, StorageError};
use mirror_sync::types::{Clock, CoreMeta, Location};

#[derive(Clone)]
pub(crate) struct MemStorage {
    inner: Arc<MemStorageInner>,
}

struct MemStorageInner {
    log: Mutex<BTreeMap<u64, Vec<u8>>>,
    applied: Mutex<Vec<Instruction>>,
    applied_clock: AtomicU64,
    /// The durable checkpoint a snapshot transfer ships: (clock, state).
    snapshot: Mutex<Option<(Clock, Vec<Instruction>)>>,
    peers: Mutex<HashMap<Location, MemStorage>>,
    snapshot_hook: Mutex<Option<Arc<dyn Fn(Clock) + Send + Sync>>>,
    transfers: AtomicUsize,
    /// Clock at which execute() fails, 0 for never.
    fail_execute_at: AtomicU64,
}

impl MemStorage {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(MemStorageInner {
                log: Mutex::new(BTreeMap::new()),
                applied: Mutex::new(Vec::new()),
                applied_clock: AtomicU64::new(0),
                snapshot: Mutex::new(None),
                peers: Mutex::new(HashMap::new()),
                snapshot_hook: Mutex::new(None),
                transfers: AtomicUsize::new(0),
                fail_execute_at: AtomicU64::new(0),
            }),
        }
    }

    /// Append an instruction to the log, as the write path would before
    /// handing it to replication.
    pub(crate) fn persist(&self, instruction: &Instruction) {
        self.inner
            .log
            .lock()
            .unwrap()
            .insert(instruction.clock.int(), instruction.encode());
    }

    /// Drop every logged instruction with clock below `clock`.
    pub(crate) fn compact_below(&self, clock: u64) {
        let mut log = self.inner.log.lock().unwrap();
        let kept = log.split_off(&clock);
        *log = kept;
    }

    pub(crate) fn set_snapshot(&self, clock: Clock, state: Vec<Instruction>) {
        *self.inner.snapshot.lock().unwrap() = Some((clock, state));
    }

    pub(crate) fn register_peer(&self, location: Location, peer: MemStorage) {
        self.inner.peers.lock().unwrap().insert(location, peer);
    }

    /// Hook run after a snapshot lands in this storage, with the snapshot's
    /// clock. The mirror host wires this to its channel.
    pub(crate) fn set_snapshot_hook(&self, hook: impl Fn(Clock) + Send + Sync + 'static) {
        *self.inner.snapshot_hook.lock().unwrap() = Some(Arc::new(hook));
    }

    pub(crate) fn fail_execute_at(&self, clock: u64) {
        self.inner.fail_execute_at.store(clock, Ordering::SeqCst);
    }

    /// Clocks of every instruction applied to this storage, in application
    /// order.
    pub(crate) fn applied_clocks(&self) -> Vec<u64> {
        self.inner
            .applied
            .lock()
            .unwrap()
            .iter()
            .map(|instruction| instruction.clock.int())
            .collect()
    }

    pub(crate) fn transfers(&self) -> usize {
        self.inner.transfers.load(Ordering::SeqCst)
    }

    fn install_snapshot(&self, clock: Clock, state: Vec<Instruction>) {
        *self.inner.applied.lock().unwrap() = state;
        self.inner.applied_clock.store(clock.int(), Ordering::SeqCst);
        let hook = self.inner.snapshot_hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(clock);
        }
    }
}

impl Storage for MemStorage {
    fn reappear_instruction(&self, clock: Clock) -> Option<Vec<u8>> {
        self.inner.log.lock().unwrap().get(&clock.int()).cloned()
    }

    fn transfer_to(&self, mirror: &CoreMeta) -> Result<(), StorageError> {
        let (clock, state) = self
            .inner
            .snapshot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| StorageError::new("no snapshot checkpoint"))?;
        let target = self
            .inner
            .peers
            .lock()
            .unwrap()
            .get(&mirror.location)
            .cloned()
            .ok_or_else(|| StorageError::new(format!("no transfer route to {}", mirror)))?;
        target.install_snapshot(clock, state);
        self.inner.transfers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn execute(&self, instruction: &Instruction) -> Result<(), StorageError> {
        let fail_at = self.inner.fail_execute_at.load(Ordering::SeqCst);
        if fail_at != 0 && fail_at == instruction.clock.int() {
            return Err(StorageError::new(format!(
                "injected failure at clock {}",
                fail_at
            )));
        }
        self.inner.applied.lock().unwrap().push(instruction.clone());
        self.inner
            .applied_clock
            .store(instruction.clock.int(), Ordering::SeqCst);
        Ok(())
    }

    fn clocked(&self) -> Clock {
        Clock::new(self.inner.applied_clock.load(Ordering::SeqCst))
    }
}
