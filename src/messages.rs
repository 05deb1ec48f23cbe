/*
    Copyright © 2026, the mirror_sync authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Control frames of the sync protocol.
//!
//! Every message exchanged on an established sync channel is an opaque byte
//! frame whose first byte is a tag:
//! - [`TAG_SYNC`]: a heartbeat ack from mirror to primary, "I have applied up
//!   to clock X". Carried by a [`TagClock`] frame.
//! - [`TAG_EXECUTE_CLOCK`]: a progress notice from primary to mirror, "I have
//!   executed up to clock X". Carried by a [`TagClock`] frame.
//! - [`TAG_EXECUTE_INSTRUCTION`]: a replayed historical instruction; the tag
//!   prefixes the instruction's own encoding.
//! - [`TAG_INSTRUCTION`]: a live forwarded instruction in its native encoding.
//!
//! The connection handshake request ([`SyncHello`]) does not travel on the
//! channel itself; it is carried by the [control RPC](crate::networking::ControlApi).

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{ChannelId, Clock, CoreMeta};

/// Heartbeat ack, mirror → primary.
pub const TAG_SYNC: u8 = 1;
/// Execution progress notice, primary → mirror.
pub const TAG_EXECUTE_CLOCK: u8 = 2;
/// A replayed historical instruction, primary → mirror.
pub const TAG_EXECUTE_INSTRUCTION: u8 = 3;
/// A live forwarded instruction, primary → mirror.
pub const TAG_INSTRUCTION: u8 = 4;

/// A small tag + clock control frame. Not persisted; transient wire-only.
///
/// Wire form: `[tag: u8][clock: u64 BE]`, 9 bytes exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagClock {
    pub tag: u8,
    pub clock: Clock,
}

impl TagClock {
    pub fn new(tag: u8, clock: Clock) -> Self {
        Self { tag, clock }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(9);
        bytes.push(self.tag);
        bytes.extend_from_slice(&self.clock.to_be_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<TagClock, DecodeError> {
        if bytes.len() < 9 {
            return Err(DecodeError::TruncatedFrame {
                expected: 9,
                got: bytes.len(),
            });
        }
        let clock = {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[1..9]);
            Clock::from_be_bytes(buf)
        };
        Ok(TagClock {
            tag: bytes[0],
            clock,
        })
    }
}

/// Handshake request sent by a primary that wants to pair a sync channel with
/// a mirror: which transport channel to adopt, who the primary is, and the
/// clock it intends to start streaming from.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SyncHello {
    pub channel_id: ChannelId,
    pub primary: CoreMeta,
    pub clock: Clock,
}

impl SyncHello {
    pub fn new(channel_id: ChannelId, primary: CoreMeta, clock: Clock) -> Self {
        Self {
            channel_id,
            primary,
            clock,
        }
    }
}

/// The mirror's answer to a [`SyncHello`].
///
/// `Rejected` is an explicit, well-formed refusal (for example, the mirror is
/// already paired with another primary for this unit), distinguished from a
/// transport failure, which surfaces as an [`ApiError`](crate::networking::ApiError).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HelloReply {
    Accepted,
    Rejected,
}

/// A frame that could not be decoded.
#[derive(Debug)]
pub enum DecodeError {
    TruncatedFrame { expected: usize, got: usize },
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TruncatedFrame { expected, got } => {
                write!(f, "truncated frame: expected at least {} bytes, got {}", expected, got)
            }
        }
    }
}
