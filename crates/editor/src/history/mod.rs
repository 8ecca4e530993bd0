// Per-replica undo/redo over the shared text.
//
// Only transactions whose origin is undoable (local keystrokes and accepted
// proposals) are captured. Remote merges are never on the stack, and undoing
// a local edit reverts only the items that edit created or deleted, so
// concurrent remote edits survive.

use quire_common::crdt::origin::EditOrigin;
use tracing::debug;
use yrs::undo::{Options, UndoManager};

use crate::engine::replica::{Replica, UpdateToken};

pub struct History {
    manager: UndoManager<()>,
}

impl History {
    /// Attaches a history to `replica`. Edits made before this call are not
    /// undoable.
    pub fn new(replica: &Replica) -> Self {
        // Every transaction is its own undo step.
        let options = Options { capture_timeout_millis: 0, ..Default::default() };
        let mut manager =
            UndoManager::with_scope_and_options(replica.doc(), replica.text(), options);
        for origin in EditOrigin::ALL.into_iter().filter(|origin| origin.is_undoable()) {
            manager.include_origin(origin.as_str());
        }
        Self { manager }
    }

    /// Reverts the most recent own edit. Returns the update to broadcast, or
    /// `None` when there is nothing to undo.
    pub fn undo(&mut self, replica: &Replica) -> Option<UpdateToken> {
        let before = replica.current_vector();
        if !self.manager.undo_blocking() {
            return None;
        }
        debug!(client_id = replica.client_id(), "undo applied");
        Some(replica.diff_since_vector(&before))
    }

    /// Reapplies the most recently undone edit.
    pub fn redo(&mut self, replica: &Replica) -> Option<UpdateToken> {
        let before = replica.current_vector();
        if !self.manager.redo_blocking() {
            return None;
        }
        debug!(client_id = replica.client_id(), "redo applied");
        Some(replica.diff_since_vector(&before))
    }

    pub fn can_undo(&self) -> bool {
        self.manager.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.manager.can_redo()
    }

    pub fn clear(&mut self) {
        self.manager.clear();
    }
}
