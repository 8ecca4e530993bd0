// Ephemeral presence: who is connected to a document and where their cursor
// is. Entries are advisory, never persisted, and disappear only when their
// owner stops sending heartbeats.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use quire_common::types::ConnectionId;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_PRESENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Display colors handed out to participants, indexed by connection id.
pub const PRESENCE_PALETTE: [&str; 19] = [
    "#E74C3C", "#C0392B", "#8E44AD", "#6C5CE7", "#2E86AB", "#1E3A8A", "#059669", "#047857",
    "#D97706", "#B45309", "#DC2626", "#7C2D12", "#92400E", "#78350F", "#374151", "#1F2937",
    "#0D9488", "#7C3AED", "#5B21B6",
];

/// Deterministic palette color for a connection.
pub fn color_for(connection_id: ConnectionId) -> &'static str {
    PRESENCE_PALETTE[(connection_id % PRESENCE_PALETTE.len() as u64) as usize]
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresenceKind {
    #[default]
    Human,
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceUser {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub kind: PresenceKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CursorPosition {
    pub line: u32,
    pub ch: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectionRange {
    pub anchor: CursorPosition,
    pub head: CursorPosition,
}

/// What a participant publishes about itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceState {
    pub user: PresenceUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionRange>,
}

/// What observers see about a participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceEntry {
    pub connection_id: ConnectionId,
    pub color: String,
    #[serde(flatten)]
    pub state: PresenceState,
}

/// Every live entry, ordered by connection id.
pub type PresenceSnapshot = Arc<Vec<PresenceEntry>>;

struct Tracked {
    entry: PresenceEntry,
    last_seen: Instant,
}

struct HubInner {
    entries: RwLock<HashMap<ConnectionId, Tracked>>,
    changes: watch::Sender<PresenceSnapshot>,
    timeout: Duration,
}

/// Per-document presence host shared by every connection to the document.
#[derive(Clone)]
pub struct PresenceHub {
    inner: Arc<HubInner>,
}

impl PresenceHub {
    pub fn new(timeout: Duration) -> Self {
        let (changes, _) = watch::channel(Arc::new(Vec::new()));
        Self { inner: Arc::new(HubInner { entries: RwLock::new(HashMap::new()), changes, timeout }) }
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Records `state` for `connection_id`. Every call doubles as a heartbeat.
    pub async fn publish(&self, connection_id: ConnectionId, state: PresenceState) {
        self.publish_at(connection_id, state, Instant::now()).await;
    }

    pub async fn publish_at(&self, connection_id: ConnectionId, state: PresenceState, now: Instant) {
        let mut guard = self.inner.entries.write().await;
        let entry = PresenceEntry { connection_id, color: color_for(connection_id).to_owned(), state };
        let changed = guard.get(&connection_id).map_or(true, |tracked| tracked.entry != entry);
        guard.insert(connection_id, Tracked { entry, last_seen: now });
        if changed {
            self.notify(&guard);
        }
    }

    /// Drops entries whose last heartbeat is older than the timeout and
    /// returns the connections that were removed.
    pub async fn sweep_expired(&self, now: Instant) -> Vec<ConnectionId> {
        let mut guard = self.inner.entries.write().await;
        let timeout = self.inner.timeout;
        let mut expired: Vec<ConnectionId> = guard
            .iter()
            .filter(|(_, tracked)| now.saturating_duration_since(tracked.last_seen) > timeout)
            .map(|(id, _)| *id)
            .collect();
        if expired.is_empty() {
            return expired;
        }

        expired.sort_unstable();
        for id in &expired {
            guard.remove(id);
        }
        debug!(expired = ?expired, "presence entries timed out");
        self.notify(&guard);
        expired
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        self.inner.changes.borrow().clone()
    }

    /// Observes every participant except `observer`.
    pub fn observe_others(&self, observer: ConnectionId) -> PresenceObserver {
        PresenceObserver { changes: self.inner.changes.subscribe(), observer }
    }

    /// Spawns a task that sweeps expired entries every `every`. The task ends
    /// once the last handle to the hub is dropped. Returns `None` when called
    /// outside a Tokio runtime.
    pub fn spawn_reaper(&self, every: Duration) -> Option<JoinHandle<()>> {
        let runtime = Handle::try_current().ok()?;
        let hub: Weak<HubInner> = Arc::downgrade(&self.inner);
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let Some(inner) = hub.upgrade() else {
                    break;
                };
                PresenceHub { inner }.sweep_expired(Instant::now()).await;
            }
        });
        Some(task)
    }

    fn notify(&self, entries: &HashMap<ConnectionId, Tracked>) {
        let mut snapshot: Vec<PresenceEntry> =
            entries.values().map(|tracked| tracked.entry.clone()).collect();
        snapshot.sort_by_key(|entry| entry.connection_id);
        self.inner.changes.send_replace(Arc::new(snapshot));
    }
}

/// Continuously updating view of the other participants of a document.
pub struct PresenceObserver {
    changes: watch::Receiver<PresenceSnapshot>,
    observer: ConnectionId,
}

impl PresenceObserver {
    /// The current set of other participants.
    pub fn current(&self) -> Vec<PresenceEntry> {
        let snapshot = self.changes.borrow().clone();
        snapshot.iter().filter(|entry| entry.connection_id != self.observer).cloned().collect()
    }

    /// Waits for the next change and returns the new set of other
    /// participants, or `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<Vec<PresenceEntry>> {
        self.changes.changed().await.ok()?;
        Some(self.current())
    }
}
