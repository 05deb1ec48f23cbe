/*
    Copyright © 2026, the mirror_sync authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! [`Instruction`]: the serializable unit of replicated work, and its wire
//! encoding.
//!
//! An instruction is produced exactly once per write by a unit's primary, in
//! strictly increasing clock order with no gaps and no duplicates. It is
//! immutable after creation, and eligible for log truncation only once every
//! live mirror has confirmed a clock at or above its own (or a snapshot
//! transfer has superseded it). Truncation itself is the storage layer's
//! business, not this crate's.

use crate::messages::{DecodeError, TAG_INSTRUCTION};
use crate::types::Clock;

/// One clock-ordered unit of replicated state change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub clock: Clock,
    pub opcode: u8,
    pub payload: Vec<u8>,
}

impl Instruction {
    pub fn new(clock: Clock, opcode: u8, payload: Vec<u8>) -> Self {
        Self {
            clock,
            opcode,
            payload,
        }
    }

    /// Encode into the instruction wire frame:
    ///
    /// ```text
    /// [tag: u8 = INSTRUCTION][clock: u64 BE][opcode: u8][payload...]
    /// ```
    ///
    /// Byte 0 is a tag so that the stored encoding can be retagged in place
    /// (see [`TAG_EXECUTE_INSTRUCTION`](crate::messages::TAG_EXECUTE_INSTRUCTION))
    /// when it is replayed to a lagging mirror.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(10 + self.payload.len());
        bytes.push(TAG_INSTRUCTION);
        bytes.extend_from_slice(&self.clock.to_be_bytes());
        bytes.push(self.opcode);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Decode an instruction frame. Accepts any tag byte at position 0: the
    /// receiver treats live and replayed instruction frames identically and
    /// derives the clock from the decoded instruction.
    pub fn decode(bytes: &[u8]) -> Result<Instruction, DecodeError> {
        if bytes.len() < 10 {
            return Err(DecodeError::TruncatedFrame {
                expected: 10,
                got: bytes.len(),
            });
        }
        let clock = {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[1..9]);
            Clock::from_be_bytes(buf)
        };
        Ok(Instruction {
            clock,
            opcode: bytes[9],
            payload: bytes[10..].to_vec(),
        })
    }
}
