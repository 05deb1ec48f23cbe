/*
    Copyright © 2026, the mirror_sync authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! [`InstructionChain`]: the per-mirror in-order execution pipeline.
//!
//! The chain is a reorder buffer keyed by clock plus a baseline marking
//! "everything at or below this has been handled". Entries registered with
//! [`follow`](InstructionChain::follow) execute strictly in increasing clock
//! order, one at a time, no clock skipped relative to the baseline, no matter
//! in what order the registrations arrive. This is what lets network messages
//! race without corrupting mirror state.
//!
//! Registration never executes. Execution is driven by the events that move
//! the baseline: a [`tick`](InstructionChain::tick) or
//! [`tick_to`](InstructionChain::tick_to) confirming durably-handled clocks,
//! a [`reset`](InstructionChain::reset) jumping the baseline after gap
//! recovery, or a draining [`clear`](InstructionChain::clear).

use std::collections::BTreeMap;

use crate::instruction::Instruction;
use crate::types::Clock;

struct Entry {
    instruction: Instruction,
    on_executed: Box<dyn FnOnce(&Instruction) + Send>,
}

impl Entry {
    fn execute(self) {
        (self.on_executed)(&self.instruction)
    }
}

pub struct InstructionChain {
    label: String,
    baseline: Clock,
    buffer: BTreeMap<Clock, Entry>,
    closed: bool,
}

impl InstructionChain {
    pub fn new(baseline: Clock, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            baseline,
            buffer: BTreeMap::new(),
            closed: false,
        }
    }

    /// Register `instruction` for execution once the baseline reaches
    /// `instruction.clock - 1`. The callback runs when it is this
    /// instruction's turn; it is the callback's job to apply the payload (on a
    /// mirror) or to report confirmation upward (on a primary).
    ///
    /// No-op when the chain is closed, or for clocks the baseline has already
    /// passed, or for a clock that is already registered.
    pub fn follow(
        &mut self,
        instruction: Instruction,
        on_executed: impl FnOnce(&Instruction) + Send + 'static,
    ) {
        if self.closed || instruction.clock <= self.baseline {
            return;
        }
        self.buffer.entry(instruction.clock).or_insert(Entry {
            instruction,
            on_executed: Box::new(on_executed),
        });
    }

    /// An external confirmation that clock `baseline + 1` has been durably
    /// handled: advance the baseline by exactly one and execute the entry
    /// buffered at the new baseline, if any.
    pub fn tick(&mut self) {
        if self.closed {
            return;
        }
        self.baseline += 1;
        if let Some(entry) = self.buffer.remove(&self.baseline) {
            entry.execute();
        }
    }

    /// An external confirmation that every clock at or below `clock` has been
    /// durably handled: advance the baseline there, executing the entries
    /// passed over in ascending clock order. Confirmations are absolute, so
    /// one arriving late (behind a baseline already moved by gap recovery)
    /// never drags the baseline backwards and never re-executes anything.
    pub fn tick_to(&mut self, clock: Clock) {
        if self.closed {
            return;
        }
        while self.baseline < clock {
            self.tick();
        }
    }

    /// Whether the entry at `baseline + 1` is buffered, i.e., whether a
    /// [`tick`](InstructionChain::tick) would execute something.
    pub fn has_next(&self) -> bool {
        !self.closed && self.buffer.contains_key(&(self.baseline + 1))
    }

    /// Forcibly set the baseline to `clock`. Buffered entries at or below the
    /// new baseline are executed in ascending clock order when
    /// `execute_skipped` is true, discarded otherwise (discarding is safe when
    /// a snapshot transfer already incorporated their effect). Entries above
    /// the new baseline stay buffered.
    pub fn reset(&mut self, clock: Clock, execute_skipped: bool) {
        if self.closed {
            return;
        }
        log::debug!("Reset chain {} to clock {}.", self.label, clock);
        let above = self.buffer.split_off(&(clock + 1));
        let skipped = std::mem::replace(&mut self.buffer, above);
        if execute_skipped {
            for (_, entry) in skipped {
                entry.execute();
            }
        }
        self.baseline = clock;
    }

    /// Terminal: drain the chain, executing (ascending) or discarding
    /// everything buffered, then mark it non-acceptive. Subsequent calls are
    /// no-ops. When executing, the baseline ends at the highest executed
    /// clock; when discarding, it stays where it was.
    pub fn clear(&mut self, execute_remaining: bool) {
        if self.closed {
            return;
        }
        log::debug!(
            "Clear chain {}, execute remaining: {}.",
            self.label,
            execute_remaining
        );
        let buffer = std::mem::take(&mut self.buffer);
        if execute_remaining {
            for (clock, entry) in buffer {
                entry.execute();
                self.baseline = clock;
            }
        }
        self.closed = true;
    }

    pub fn baseline(&self) -> Clock {
        self.baseline
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
