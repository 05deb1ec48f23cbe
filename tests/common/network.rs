/*
    Copyright © 2026, the mirror_sync authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! An in-process transport. Channels come in linked pairs; a send on one end
//! is delivered synchronously to the listener installed on the other end.
//! Mirror hosts registered on the [`MockNet`] accept pairing requests by
//! adopting the peer end into a [`MirrorChannel`], the way a real mirror
//! process would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use mirror_sync::messages::{HelloReply, SyncHello};
use mirror_sync::networking::{
    ApiError, Channel, ChannelClosed, CloseListener, ControlApi, MessageListener, Transport,
};
use mirror_sync::replication::MirrorChannel;
use mirror_sync::storage::Storage;
use mirror_sync::types::{ChannelId, Clock, CoreId, CoreMeta, Location, UnitId};

use crate::common::storage::MemStorage;

pub(crate) struct MockNet {
    hosts: Mutex<HashMap<Location, Arc<MirrorHost>>>,
    /// Primary-side channel ends, in the order they were opened.
    opened: Mutex<Vec<Arc<MockChannel>>>,
}

impl MockNet {
    pub(crate) fn new() -> Arc<MockNet> {
        Arc::new(MockNet {
            hosts: Mutex::new(HashMap::new()),
            opened: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn add_host(&self, meta: CoreMeta, storage: MemStorage) -> Arc<MirrorHost> {
        let host = Arc::new(MirrorHost {
            location: meta.location.clone(),
            meta,
            storage,
            reject: AtomicBool::new(false),
            pending: Mutex::new(HashMap::new()),
            mirrors: Mutex::new(Vec::new()),
            adopted: Mutex::new(Vec::new()),
        });
        self.hosts
            .lock()
            .unwrap()
            .insert(host.location.clone(), Arc::clone(&host));
        host
    }

    pub(crate) fn host(&self, location: &Location) -> Option<Arc<MirrorHost>> {
        self.hosts.lock().unwrap().get(location).cloned()
    }

    /// The primary-side end of the most recently opened channel.
    pub(crate) fn last_opened(&self) -> Arc<MockChannel> {
        Arc::clone(self.opened.lock().unwrap().last().unwrap())
    }
}

/// One mirror process: its identity, its storage, and the channels it has
/// adopted from connecting primaries.
pub(crate) struct MirrorHost {
    pub(crate) location: Location,
    pub(crate) meta: CoreMeta,
    pub(crate) storage: MemStorage,
    reject: AtomicBool,
    pending: Mutex<HashMap<ChannelId, Arc<MockChannel>>>,
    mirrors: Mutex<Vec<MirrorChannel<MockChannel, MemStorage>>>,
    adopted: Mutex<Vec<Arc<MockChannel>>>,
}

impl MirrorHost {
    pub(crate) fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub(crate) fn mirror(&self, index: usize) -> MirrorChannel<MockChannel, MemStorage> {
        self.mirrors.lock().unwrap()[index].clone()
    }

    /// The mirror-side end of the channel adopted `index`-th, for injecting
    /// frames toward the primary.
    pub(crate) fn wire(&self, index: usize) -> Arc<MockChannel> {
        Arc::clone(&self.adopted.lock().unwrap()[index])
    }
}

#[derive(Clone)]
pub(crate) struct MockTransport {
    net: Arc<MockNet>,
}

impl MockTransport {
    pub(crate) fn new(net: Arc<MockNet>) -> Self {
        Self { net }
    }
}

impl Transport for MockTransport {
    type Channel = MockChannel;

    fn open(&self, location: &Location) -> Result<Arc<MockChannel>, ApiError> {
        let host = self
            .net
            .host(location)
            .ok_or_else(|| ApiError::new(format!("no route to {}", location)))?;
        let id = ChannelId::new(rand::random());
        let (local, peer) = MockChannel::pair(id, location.clone());
        host.pending.lock().unwrap().insert(id, peer);
        self.net.opened.lock().unwrap().push(Arc::clone(&local));
        Ok(local)
    }
}

#[derive(Clone)]
pub(crate) struct MockApi {
    net: Arc<MockNet>,
}

impl MockApi {
    pub(crate) fn new(net: Arc<MockNet>) -> Self {
        Self { net }
    }
}

impl ControlApi for MockApi {
    fn connect_mirror(&self, location: &Location, hello: SyncHello) -> Result<HelloReply, ApiError> {
        let host = self
            .net
            .host(location)
            .ok_or_else(|| ApiError::new(format!("no host at {}", location)))?;
        let pending = host.pending.lock().unwrap().remove(&hello.channel_id);
        if host.reject.load(Ordering::SeqCst) {
            return Ok(HelloReply::Rejected);
        }
        let channel =
            pending.ok_or_else(|| ApiError::new(format!("unknown channel {}", hello.channel_id)))?;
        let mirror = MirrorChannel::accept(
            hello.primary,
            Arc::clone(&channel),
            Arc::new(host.storage.clone()),
        );
        {
            let mirror = mirror.clone();
            host.storage
                .set_snapshot_hook(move |clock| mirror.snapshot_installed(clock));
        }
        host.adopted.lock().unwrap().push(channel);
        host.mirrors.lock().unwrap().push(mirror);
        Ok(HelloReply::Accepted)
    }

    fn ask_clock(&self, location: &Location, _unit: UnitId, _core: CoreId) -> Result<Clock, ApiError> {
        let host = self
            .net
            .host(location)
            .ok_or_else(|| ApiError::new(format!("no host at {}", location)))?;
        Ok(host.storage.clocked())
    }
}

pub(crate) struct MockChannel {
    id: ChannelId,
    remote: Location,
    closed: AtomicBool,
    peer: Mutex<Weak<MockChannel>>,
    message_listener: Mutex<Option<Arc<MessageListener>>>,
    close_listener: Mutex<Option<Arc<CloseListener>>>,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl MockChannel {
    fn pair(id: ChannelId, remote: Location) -> (Arc<MockChannel>, Arc<MockChannel>) {
        let end = |remote| {
            Arc::new(MockChannel {
                id,
                remote,
                closed: AtomicBool::new(false),
                peer: Mutex::new(Weak::new()),
                message_listener: Mutex::new(None),
                close_listener: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
            })
        };
        let local = end(remote);
        let peer = end(Location::new("primary", 0));
        *local.peer.lock().unwrap() = Arc::downgrade(&peer);
        *peer.peer.lock().unwrap() = Arc::downgrade(&local);
        (local, peer)
    }

    /// Every frame sent from this end, in order.
    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    fn fire_close_listener(&self) {
        let listener = self.close_listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener();
        }
    }
}

impl Channel for MockChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn send(&self, message: Vec<u8>, _flush: bool) -> Result<(), ChannelClosed> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelClosed);
        }
        let peer = self.peer.lock().unwrap().upgrade().ok_or(ChannelClosed)?;
        if peer.closed.load(Ordering::SeqCst) {
            return Err(ChannelClosed);
        }
        self.sent.lock().unwrap().push(message.clone());
        // Clone the listener out so delivery never holds the slot lock:
        // listeners are allowed to replace themselves.
        let listener = peer.message_listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener(&message);
        }
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.fire_close_listener();
        if let Some(peer) = self.peer.lock().unwrap().upgrade() {
            if !peer.closed.swap(true, Ordering::SeqCst) {
                peer.fire_close_listener();
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn remote_location(&self) -> Location {
        self.remote.clone()
    }

    fn set_message_listener(&self, listener: MessageListener) {
        *self.message_listener.lock().unwrap() = Some(Arc::new(listener));
    }

    fn set_close_listener(&self, listener: CloseListener) {
        *self.close_listener.lock().unwrap() = Some(Arc::new(listener));
    }
}
