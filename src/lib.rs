/*
    Copyright © 2026, the mirror_sync authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! mirror_sync is the replication core of a partitioned, replicated data
//! store. It takes a locally-produced, clock-ordered stream of write
//! [instructions](crate::instruction::Instruction) on a partition's primary
//! and reliably, in order, and with bounded recovery cost, drives every mirror
//! replica of that partition to the same state, across reconnects, message
//! loss, and log truncation.
//!
//! The crate provides:
//! - the per-mirror [sync channel](crate::replication::InstructionSyncChannel)
//!   running the outbound backfill + forward protocol,
//! - the [instruction chain](crate::replication::InstructionChain) enforcing
//!   strict clock-ordered execution,
//! - the [mirror channel](crate::replication::MirrorChannel) applying the
//!   inbound stream on a mirror,
//! - the [core](crate::core::Core) coordinating one partition's channels.
//!
//! Everything else is pluggable: networking through the
//! [`Transport`](crate::networking::Transport)/[`Channel`](crate::networking::Channel)
//! traits, the instruction log and local state through
//! [`Storage`](crate::storage::Storage), and the connection-time RPCs through
//! [`ControlApi`](crate::networking::ControlApi). There is no global state;
//! every dependency is passed into constructors.
//!
//! mirror_sync logs through the [log](https://docs.rs/log/latest/log/) crate.
//! To get these messages printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! This crate deliberately does not do leader election or quorum
//! write-acknowledgement policy: it assumes a designated primary per partition
//! already exists and that an external mechanism supplies the set of mirrors.
//! Its only job is to keep the mirrors consistent with the primary's
//! instruction log once that topology is given.

pub mod types;

pub mod instruction;

pub mod messages;

pub mod networking;

pub mod storage;

pub(crate) mod task_runner;

pub mod replication;

pub mod core;
