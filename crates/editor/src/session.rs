// One participant connected to one document: a local replica with its own
// undo history and proposal stager, wired to a backend room.

use std::ops::Range;

use quire_common::protocol::agent::{ToolCall, EDIT_BUSY_RESULT, EDIT_STAGED_RESULT};
use quire_common::types::{ConnectionId, DocumentId, Participant};
use thiserror::Error;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;
use tracing::{debug, info, warn};

use crate::backend::{ReplicationBackend, RoomHandle, RoomUpdate};
use crate::engine::presence::{
    CursorPosition, PresenceKind, PresenceObserver, PresenceState, PresenceUser, SelectionRange,
};
use crate::engine::replica::{Replica, ReplicaError, UpdateToken};
use crate::history::History;
use crate::proposal::{
    AcceptedProposal, EditProposal, ProposalComparison, ProposalError, ProposalStager,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Replica(#[from] ReplicaError),
    #[error(transparent)]
    Proposal(#[from] ProposalError),
}

pub struct Session {
    room: RoomHandle,
    connection_id: ConnectionId,
    participant: Participant,
    kind: PresenceKind,
    replica: Replica,
    history: History,
    proposals: ProposalStager,
    updates: Receiver<RoomUpdate>,
}

impl Session {
    /// Joins the room for `document_id` and brings a fresh replica up to
    /// date with it.
    pub fn connect(
        backend: &dyn ReplicationBackend,
        document_id: DocumentId,
        participant: Participant,
    ) -> Result<Self, SessionError> {
        let room = backend.connect(document_id);
        let connection_id = room.join();
        // Subscribe before the initial sync so nothing published in between
        // is missed. Duplicates are harmless.
        let updates = room.subscribe();

        let replica = Replica::new(connection_id);
        let initial = room.sync_from(&replica.state_vector())?;
        replica.apply_remote_update(&initial)?;
        let history = History::new(&replica);

        info!(
            document_id = %document_id,
            connection_id,
            participant = %participant.id,
            "session connected"
        );
        Ok(Self {
            room,
            connection_id,
            participant,
            kind: PresenceKind::Human,
            replica,
            history,
            proposals: ProposalStager::new(),
            updates,
        })
    }

    pub fn with_kind(mut self, kind: PresenceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn document_id(&self) -> DocumentId {
        self.room.document_id()
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    pub fn text(&self) -> String {
        self.replica.snapshot_text()
    }

    /// Applies a local edit and publishes it to the room.
    pub fn edit(&mut self, range: Range<u32>, new_text: &str) -> Result<UpdateToken, SessionError> {
        let update = self.replica.apply_local_edit(range, new_text)?;
        self.room.publish(self.connection_id, update.clone())?;
        Ok(update)
    }

    /// Undoes this participant's most recent edit. Returns `false` when there
    /// was nothing to undo.
    pub fn undo(&mut self) -> Result<bool, SessionError> {
        match self.history.undo(&self.replica) {
            Some(update) => {
                self.room.publish(self.connection_id, update)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn redo(&mut self) -> Result<bool, SessionError> {
        match self.history.redo(&self.replica) {
            Some(update) => {
                self.room.publish(self.connection_id, update)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Merges every remote update already delivered, without waiting.
    /// Returns how many merges were applied.
    pub fn pull(&mut self) -> Result<usize, SessionError> {
        let mut applied = 0;
        loop {
            match self.updates.try_recv() {
                Ok(message) if message.sender == self.connection_id => {}
                Ok(message) => {
                    self.replica.apply_remote_update(&message.update)?;
                    applied += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    self.resync(skipped)?;
                    applied += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        Ok(applied)
    }

    /// Waits for the next remote change and merges it. Returns `false` once
    /// the room is gone.
    pub async fn next_remote(&mut self) -> Result<bool, SessionError> {
        loop {
            match self.updates.recv().await {
                Ok(message) if message.sender == self.connection_id => continue,
                Ok(message) => {
                    self.replica.apply_remote_update(&message.update)?;
                    return Ok(true);
                }
                Err(RecvError::Lagged(skipped)) => {
                    self.resync(skipped)?;
                    return Ok(true);
                }
                Err(RecvError::Closed) => return Ok(false),
            }
        }
    }

    fn resync(&mut self, skipped: u64) -> Result<(), SessionError> {
        warn!(connection_id = self.connection_id, skipped, "session lagged behind room, resyncing");
        let diff = self.room.sync_from(&self.replica.state_vector())?;
        self.replica.apply_remote_update(&diff)?;
        Ok(())
    }

    /// Announces identity and cursor to the other participants. Doubles as a
    /// heartbeat.
    pub async fn publish_presence(
        &self,
        cursor: Option<CursorPosition>,
        selection: Option<SelectionRange>,
    ) {
        let state = PresenceState {
            user: PresenceUser {
                name: self.participant.name.clone(),
                avatar_url: self.participant.avatar_url.clone(),
                kind: self.kind,
            },
            cursor,
            selection,
        };
        self.room.presence().publish(self.connection_id, state).await;
    }

    pub fn observe_others(&self) -> PresenceObserver {
        self.room.presence().observe_others(self.connection_id)
    }

    pub fn stage_proposal(
        &mut self,
        origin: &str,
        proposed_text: String,
    ) -> Result<&EditProposal, ProposalError> {
        let live = self.replica.snapshot_text();
        self.proposals.stage(proposed_text, origin, live)
    }

    pub fn pending_proposal(&self) -> Option<&EditProposal> {
        self.proposals.pending()
    }

    pub fn proposal_comparison(&self) -> Result<ProposalComparison, ProposalError> {
        self.proposals.comparison(&self.replica.snapshot_text())
    }

    /// Applies the pending proposal locally and publishes it.
    pub fn accept_proposal(&mut self) -> Result<AcceptedProposal, SessionError> {
        let accepted = self.proposals.accept(&self.replica)?;
        self.room.publish(self.connection_id, accepted.update.clone())?;
        Ok(accepted)
    }

    pub fn reject_proposal(&mut self) -> Result<EditProposal, ProposalError> {
        self.proposals.reject()
    }

    /// Runs an agent tool call against this session and returns the result
    /// text reported back to the agent.
    pub fn handle_tool_call(&mut self, agent: &str, call: ToolCall) -> &'static str {
        match call {
            ToolCall::EditFile { new_file } => match self.stage_proposal(agent, new_file) {
                Ok(proposal) => {
                    debug!(proposal_id = %proposal.id, agent, "tool call staged an edit");
                    EDIT_STAGED_RESULT
                }
                Err(error) => {
                    warn!(%error, agent, "tool call edit not staged");
                    EDIT_BUSY_RESULT
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LocalBackend, RoomOptions};
    use crate::proposal::ProposalState;

    fn participant(name: &str) -> Participant {
        Participant { id: format!("id-{name}"), name: name.into(), avatar_url: None }
    }

    fn pair() -> (Session, Session) {
        let backend = LocalBackend::default();
        let document_id = DocumentId::new();
        let a = Session::connect(&backend, document_id, participant("ada")).unwrap();
        let b = Session::connect(&backend, document_id, participant("grace")).unwrap();
        (a, b)
    }

    #[test]
    fn edits_flow_between_sessions() {
        let (mut a, mut b) = pair();
        a.edit(0..0, "\\begin{document}").unwrap();
        assert_eq!(b.pull().unwrap(), 1);
        assert_eq!(b.text(), "\\begin{document}");

        b.edit(16..16, "\n\\end{document}").unwrap();
        a.pull().unwrap();
        assert_eq!(a.text(), "\\begin{document}\n\\end{document}");
    }

    #[test]
    fn own_updates_are_not_merged_twice() {
        let (mut a, _b) = pair();
        a.edit(0..0, "x").unwrap();
        assert_eq!(a.pull().unwrap(), 0);
        assert_eq!(a.text(), "x");
    }

    #[test]
    fn late_joiner_receives_existing_text() {
        let backend = LocalBackend::default();
        let document_id = DocumentId::new();
        let mut a = Session::connect(&backend, document_id, participant("ada")).unwrap();
        a.edit(0..0, "already here").unwrap();

        let late = Session::connect(&backend, document_id, participant("late")).unwrap();
        assert_eq!(late.text(), "already here");
        assert_ne!(late.connection_id(), a.connection_id());
    }

    #[test]
    fn lagging_session_resyncs_from_room() {
        let backend = LocalBackend::new(RoomOptions { update_buffer: 2, ..Default::default() });
        let document_id = DocumentId::new();
        let mut a = Session::connect(&backend, document_id, participant("ada")).unwrap();
        let mut b = Session::connect(&backend, document_id, participant("grace")).unwrap();

        for i in 0..10u32 {
            a.edit(i..i, "z").unwrap();
        }
        b.pull().unwrap();
        assert_eq!(b.text(), "zzzzzzzzzz");
    }

    #[test]
    fn undo_is_broadcast_to_peers() {
        let (mut a, mut b) = pair();
        a.edit(0..0, "oops").unwrap();
        b.pull().unwrap();

        assert!(a.undo().unwrap());
        b.pull().unwrap();
        assert_eq!(b.text(), "");
        assert!(!b.undo().unwrap());
    }

    #[test]
    fn tool_call_stages_then_reports_busy() {
        let (mut a, _b) = pair();
        let call = ToolCall::EditFile { new_file: "\\section{Agent}".into() };
        assert_eq!(a.handle_tool_call("assistant", call.clone()), EDIT_STAGED_RESULT);
        assert_eq!(a.handle_tool_call("assistant", call), EDIT_BUSY_RESULT);
        assert_eq!(a.text(), "");
    }

    #[test]
    fn accepted_proposal_reaches_peers() {
        let (mut a, mut b) = pair();
        a.edit(0..0, "draft").unwrap();
        b.pull().unwrap();

        a.stage_proposal("assistant", "final".into()).unwrap();
        let accepted = a.accept_proposal().unwrap();
        assert_eq!(accepted.proposal.state, ProposalState::Accepted);

        b.pull().unwrap();
        assert_eq!(b.text(), "final");
        assert!(a.pending_proposal().is_none());
    }

    #[tokio::test]
    async fn next_remote_waits_for_peer_edit() {
        let (mut a, mut b) = pair();
        a.edit(0..0, "ping").unwrap();
        assert!(b.next_remote().await.unwrap());
        assert_eq!(b.text(), "ping");
    }

    #[tokio::test]
    async fn presence_is_visible_to_others_only() {
        let (a, b) = pair();
        let observer = b.observe_others();

        a.publish_presence(Some(CursorPosition { line: 2, ch: 4 }), None).await;
        b.publish_presence(None, None).await;

        let others = observer.current();
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].connection_id, a.connection_id());
        assert_eq!(others[0].state.user.name, "ada");
    }
}
