//! Outbound contract towards the network layer.
//!
//! The core never blocks on I/O: every call here is expected to hand the data
//! off and return immediately.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{entity::EntityId, visibility::ViewerDelta};

/// A message that has already been serialized by the caller.
pub type Payload = Arc<[u8]>;

/// Hint for the transport when it has to shed load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum PacketPriority {
    /// May be dropped under congestion.
    Low,
    /// The default.
    #[default]
    Normal,
    /// Deltas and anything the client cannot recover from losing.
    High,
}

/// Sink for everything the simulation sends to connected players.
pub trait Transport: Send + Sync {
    /// Hands a player's per-tick visibility delta to the network layer.
    fn send_delta(&self, viewer: EntityId, delta: ViewerDelta);

    /// Hands a pre-serialized message to the network layer.
    fn send(&self, viewer: EntityId, payload: Payload, priority: PacketPriority);
}

/// A transport that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send_delta(&self, _viewer: EntityId, _delta: ViewerDelta) {}

    fn send(&self, _viewer: EntityId, _payload: Payload, _priority: PacketPriority) {}
}
