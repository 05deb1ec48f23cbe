/*
    Copyright © 2026, the mirror_sync authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The replication pipeline: the in-order [`InstructionChain`], the
//! primary-side [`InstructionSyncChannel`], and the mirror-side
//! [`MirrorChannel`].

pub mod chain;
pub mod mirror_channel;
pub mod sync_channel;

pub use chain::InstructionChain;
pub use mirror_channel::MirrorChannel;
pub use sync_channel::{ChannelError, ConnectOutcome, InstructionSyncChannel};
