// Seam between editor sessions and whatever carries updates between
// replicas. Sessions only see `DocumentRoom`; the in-process `LocalBackend`
// is one implementation.

pub mod local;

use std::sync::Arc;

use quire_common::types::{ConnectionId, DocumentId};
use tokio::sync::broadcast;

use crate::engine::presence::PresenceHub;
use crate::engine::replica::{ReplicaError, UpdateToken};

pub use local::{LocalBackend, RoomOptions};

/// An update fanned out to every connection of a room.
#[derive(Debug, Clone)]
pub struct RoomUpdate {
    pub sender: ConnectionId,
    pub update: UpdateToken,
}

/// One shared document as seen by its connections.
pub trait DocumentRoom: Send + Sync {
    fn document_id(&self) -> DocumentId;

    /// Allocates a connection id that is unique within the room. It doubles
    /// as the joining replica's CRDT client id.
    fn join(&self) -> ConnectionId;

    /// Merges `update` into the room's authoritative state and fans it out.
    fn publish(&self, sender: ConnectionId, update: UpdateToken) -> Result<(), ReplicaError>;

    fn subscribe(&self) -> broadcast::Receiver<RoomUpdate>;

    /// Everything the room holds that a replica with `state_vector` lacks.
    fn sync_from(&self, state_vector: &[u8]) -> Result<UpdateToken, ReplicaError>;

    fn snapshot_text(&self) -> String;

    fn presence(&self) -> &PresenceHub;
}

pub type RoomHandle = Arc<dyn DocumentRoom>;

pub trait ReplicationBackend: Send + Sync {
    /// Returns the room for `document_id`, creating it on first use.
    fn connect(&self, document_id: DocumentId) -> RoomHandle;
}
