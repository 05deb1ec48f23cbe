/*
    Copyright © 2026, the mirror_sync authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait definitions for pluggable networking: the point-to-point [`Channel`],
//! the [`Transport`] that opens channels, and the [`ControlApi`] RPC surface
//! used during connection setup.
//!
//! mirror_sync does not establish TCP connections, frame bytes, or speak TLS.
//! Networking providers plug in through these traits, and everything is passed
//! into constructors explicitly; there is no process-wide provider registry.
//!
//! Delivery on one [`Channel`] instance is ordered and reliable; no ordering
//! is guaranteed across separate channel instances.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use crate::messages::{HelloReply, SyncHello};
use crate::types::{ChannelId, Clock, CoreId, Location, UnitId};

/// Called with every message that arrives on a channel. Runs on the
/// transport's own thread(s) and must not block: O(1) dispatch or a hand-off
/// to a task queue only.
pub type MessageListener = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Called exactly once when a channel closes, whether locally or by the
/// remote end. Runs on the transport's own thread(s) and must not block.
pub type CloseListener = Box<dyn Fn() + Send + Sync>;

/// An established, ordered, reliable byte-message channel to one remote peer.
pub trait Channel: Send + Sync + 'static {
    fn id(&self) -> ChannelId;

    /// Send a message without blocking. `flush` hints that the message should
    /// reach the wire immediately rather than ride a later batch.
    fn send(&self, message: Vec<u8>, flush: bool) -> Result<(), ChannelClosed>;

    /// Close the channel. Idempotent; safe to call from any thread. The close
    /// listener fires exactly once, on the first call.
    fn close(&self);

    fn is_closed(&self) -> bool;

    fn remote_location(&self) -> Location;

    /// Replace the message listener. Messages arriving while no listener is
    /// installed are dropped.
    fn set_message_listener(&self, listener: MessageListener);

    /// Replace the close listener.
    fn set_close_listener(&self, listener: CloseListener);
}

/// Opens [`Channel`]s to remote peers.
pub trait Transport: Send + Sync + 'static {
    type Channel: Channel;

    fn open(&self, location: &Location) -> Result<Arc<Self::Channel>, ApiError>;
}

/// The out-of-band control RPC surface consumed during [`connect`]
/// (crate::replication::InstructionSyncChannel::connect) and during gap
/// recovery re-seeding.
pub trait ControlApi: Send + Sync + 'static {
    /// Ask the mirror at `location` to pair the identified transport channel
    /// with this primary. `Ok(Rejected)` is an explicit refusal; `Err(_)` is a
    /// transport or protocol failure.
    fn connect_mirror(&self, location: &Location, hello: SyncHello) -> Result<HelloReply, ApiError>;

    /// Query a mirror's currently-applied clock.
    fn ask_clock(&self, location: &Location, unit: UnitId, core: CoreId) -> Result<Clock, ApiError>;
}

/// The channel was closed before or during a send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelClosed;

impl Display for ChannelClosed {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "channel closed")
    }
}

/// A control RPC or channel-open failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiError(String);

impl ApiError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "control api error: {}", self.0)
    }
}
