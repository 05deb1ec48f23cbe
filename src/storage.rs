/*
    Copyright © 2026, the mirror_sync authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines the [`Storage`] trait, which specifies the required interface for
//! the instruction log and local state storage provided by the user.
//!
//! On a primary, storage serves the read path of gap recovery: point lookups
//! of historical instructions and full snapshot transfers. On a mirror,
//! storage is the thing instructions execute against. Point lookups must
//! support concurrent callers, since every sync channel of a primary shares
//! one storage handle, and no caller holds a storage-wide lock across
//! [`transfer_to`](Storage::transfer_to), which can be slow.

use std::fmt::{self, Display, Formatter};

use crate::instruction::Instruction;
use crate::types::{Clock, CoreMeta};

pub trait Storage: Send + Sync + 'static {
    /// Look up the encoded form of the instruction at `clock`, for replay to a
    /// lagging mirror. Returns `None` when the instruction has already been
    /// compacted out of the log; the caller then falls back to
    /// [`transfer_to`](Storage::transfer_to).
    ///
    /// The returned bytes are the instruction's wire frame
    /// ([`Instruction::encode`]); byte 0 is a retaggable tag byte.
    fn reappear_instruction(&self, clock: Clock) -> Option<Vec<u8>>;

    /// Transfer a full state snapshot to the given mirror, blocking until the
    /// snapshot has landed (or failed). After a successful transfer the mirror
    /// reports an applied clock at or above every instruction the snapshot
    /// incorporated.
    fn transfer_to(&self, mirror: &CoreMeta) -> Result<(), StorageError>;

    /// Apply a replicated instruction to local state. Called on a mirror, in
    /// strictly increasing clock order, each clock exactly once.
    fn execute(&self, instruction: &Instruction) -> Result<(), StorageError>;

    /// The highest clock applied to local state.
    fn clocked(&self) -> Clock;
}

/// A storage-level failure. Snapshot transfer failures and instruction
/// execution failures are hard errors: they close the channel they occurred
/// on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageError(String);

impl StorageError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "storage error: {}", self.0)
    }
}
