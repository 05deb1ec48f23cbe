/*
    Copyright © 2026, the mirror_sync authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A [`ControlUnit`] that records every callback it receives, for asserting
//! on callback order and content.

use std::sync::{Arc, Mutex};

use mirror_sync::core::ControlUnit;
use mirror_sync::instruction::Instruction;
use mirror_sync::types::{CoreId, CoreMeta};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum UnitEvent {
    Connect(CoreId),
    Close(CoreId),
    Synced(CoreId, u64),
}

#[derive(Clone, Default)]
pub(crate) struct RecordingUnit {
    events: Arc<Mutex<Vec<UnitEvent>>>,
}

impl RecordingUnit {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn events(&self) -> Vec<UnitEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Clocks confirmed for `core`, in confirmation order.
    pub(crate) fn synced(&self, core: CoreId) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UnitEvent::Synced(c, clock) if c == core => Some(clock),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn connected(&self, core: CoreId) -> bool {
        self.events().contains(&UnitEvent::Connect(core))
    }

    pub(crate) fn closed(&self, core: CoreId) -> bool {
        self.events().contains(&UnitEvent::Close(core))
    }
}

impl ControlUnit for RecordingUnit {
    fn on_mirror_connect(&self, mirror: &CoreMeta) {
        self.events
            .lock()
            .unwrap()
            .push(UnitEvent::Connect(mirror.core_id));
    }

    fn on_mirror_close(&self, mirror: &CoreMeta) {
        self.events
            .lock()
            .unwrap()
            .push(UnitEvent::Close(mirror.core_id));
    }

    fn on_synced(&self, mirror: &CoreMeta, instruction: &Instruction) {
        self.events.lock().unwrap().push(UnitEvent::Synced(
            mirror.core_id,
            instruction.clock.int(),
        ));
    }
}
