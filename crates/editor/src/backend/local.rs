use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use quire_common::types::{ConnectionId, DocumentId};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{DocumentRoom, ReplicationBackend, RoomHandle, RoomUpdate};
use crate::config::PresenceConfig;
use crate::engine::presence::{PresenceHub, DEFAULT_PRESENCE_TIMEOUT};
use crate::engine::replica::{Replica, ReplicaError, UpdateToken};

pub const DEFAULT_UPDATE_BUFFER: usize = 256;

/// Client id of the room's own authoritative replica. It never edits.
const AUTHORITY_CLIENT_ID: ConnectionId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomOptions {
    /// Updates buffered per subscriber before it is considered lagging.
    pub update_buffer: usize,
    pub presence_timeout: Duration,
    /// Interval of the background presence sweep. `None` leaves sweeping to
    /// the caller.
    pub presence_sweep_interval: Option<Duration>,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            update_buffer: DEFAULT_UPDATE_BUFFER,
            presence_timeout: DEFAULT_PRESENCE_TIMEOUT,
            presence_sweep_interval: None,
        }
    }
}

impl From<&PresenceConfig> for RoomOptions {
    fn from(config: &PresenceConfig) -> Self {
        Self {
            update_buffer: config.update_buffer,
            presence_timeout: config.timeout(),
            presence_sweep_interval: Some(config.sweep_interval()),
        }
    }
}

/// In-process backend: every room lives in this process's memory.
#[derive(Default)]
pub struct LocalBackend {
    rooms: Mutex<HashMap<DocumentId, Arc<LocalRoom>>>,
    options: RoomOptions,
}

impl LocalBackend {
    pub fn new(options: RoomOptions) -> Self {
        Self { rooms: Mutex::new(HashMap::new()), options }
    }

    pub fn room_count(&self) -> usize {
        lock(&self.rooms).len()
    }
}

impl ReplicationBackend for LocalBackend {
    fn connect(&self, document_id: DocumentId) -> RoomHandle {
        let mut rooms = lock(&self.rooms);
        let room = rooms
            .entry(document_id)
            .or_insert_with(|| {
                info!(document_id = %document_id, "room opened");
                Arc::new(LocalRoom::new(document_id, self.options))
            })
            .clone();
        room
    }
}

pub struct LocalRoom {
    document_id: DocumentId,
    authority: Mutex<Replica>,
    updates_tx: broadcast::Sender<RoomUpdate>,
    presence: PresenceHub,
    next_connection_id: AtomicU64,
}

impl LocalRoom {
    pub fn new(document_id: DocumentId, options: RoomOptions) -> Self {
        let (updates_tx, _) = broadcast::channel(options.update_buffer.max(1));
        let presence = PresenceHub::new(options.presence_timeout);
        if let Some(every) = options.presence_sweep_interval {
            if presence.spawn_reaper(every).is_none() {
                warn!(%document_id, "no runtime for the presence reaper, sweep manually");
            }
        }
        Self {
            document_id,
            authority: Mutex::new(Replica::new(AUTHORITY_CLIENT_ID)),
            updates_tx,
            presence,
            next_connection_id: AtomicU64::new(AUTHORITY_CLIENT_ID + 1),
        }
    }
}

impl DocumentRoom for LocalRoom {
    fn document_id(&self) -> DocumentId {
        self.document_id
    }

    fn join(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    fn publish(&self, sender: ConnectionId, update: UpdateToken) -> Result<(), ReplicaError> {
        // Merge and send under one lock so subscribers see updates in the
        // order the authority merged them.
        let authority = lock(&self.authority);
        authority.apply_remote_update(&update)?;
        let receivers = self.updates_tx.send(RoomUpdate { sender, update }).unwrap_or(0);
        debug!(document_id = %self.document_id, sender, receivers, "update published");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomUpdate> {
        self.updates_tx.subscribe()
    }

    fn sync_from(&self, state_vector: &[u8]) -> Result<UpdateToken, ReplicaError> {
        lock(&self.authority).diff_since(state_vector)
    }

    fn snapshot_text(&self) -> String {
        lock(&self.authority).snapshot_text()
    }

    fn presence(&self) -> &PresenceHub {
        &self.presence
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
