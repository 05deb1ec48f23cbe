/*
    Copyright © 2026, the mirror_sync authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! "Inert" types shared across the replication protocol: identifiers for
//! units, cores, and channels, the logical [`Clock`], network [`Location`]s,
//! and the [`CoreMeta`] replica identity.
//!
//! These types follow the newtype pattern: they are sent around and inspected,
//! but have no active behavior of their own.

use std::fmt::{self, Display, Formatter};
use std::ops::{Add, AddAssign};

use borsh::{BorshDeserialize, BorshSerialize};

/// Position of an instruction in a partition's replicated log.
///
/// Clocks are assigned by the partition's primary, strictly increasing with no
/// gaps. Clock 0 is the origin ("nothing applied yet"); the first instruction
/// of a partition carries clock 1.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Clock(u64);

impl Clock {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// The clock before any instruction has been applied.
    pub const fn init() -> Self {
        Self(0)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl Display for Clock {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for Clock {
    type Output = Clock;

    fn add(self, rhs: u64) -> Self::Output {
        Clock(self.0.add(rhs))
    }
}

impl AddAssign<u64> for Clock {
    fn add_assign(&mut self, rhs: u64) {
        self.0.add_assign(rhs)
    }
}

/// Id of a processing unit, i.e., one replicated data partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct UnitId(u64);

impl UnitId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for UnitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Id of one replica (core) of a unit, unique within the unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct CoreId(u64);

impl CoreId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for CoreId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Id of one transport channel instance, drawn at random when the channel is
/// opened and echoed in the connection handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct ChannelId(u64);

impl ChannelId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Network location of a replica endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Location {
    pub host: String,
    pub port: u16,
}

impl Location {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Identity of one replica endpoint of one unit: which unit, which core, where
/// it lives on the network, and a human-readable label for logs.
///
/// Immutable once constructed. Shared by reference between the primary's
/// bookkeeping and every sync channel addressing that mirror.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct CoreMeta {
    pub unit_id: UnitId,
    pub core_id: CoreId,
    pub location: Location,
    pub label: String,
}

impl CoreMeta {
    pub fn new(
        unit_id: UnitId,
        core_id: CoreId,
        location: Location,
        label: impl Into<String>,
    ) -> Self {
        Self {
            unit_id,
            core_id,
            location,
            label: label.into(),
        }
    }
}

impl Display for CoreMeta {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}/{})", self.label, self.unit_id, self.core_id)
    }
}
