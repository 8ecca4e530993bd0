// Human-in-the-loop staging of agent edits.
//
// An agent never writes to the document. Its full replacement text is held
// here until a human accepts it (applied as one transaction) or rejects it
// (discarded). At most one proposal is pending per editor.

use chrono::{DateTime, Utc};
use quire_common::crdt::origin::EditOrigin;
use quire_common::diff::lines::{line_hunks, DiffHunk, DEFAULT_CONTEXT_LINES};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::engine::replica::{Replica, UpdateToken};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditProposal {
    pub id: Uuid,
    /// Agent or tool that produced the proposal.
    pub origin: String,
    pub proposed_text: String,
    /// Live text at the moment the proposal was staged.
    pub base_text: String,
    pub staged_at: DateTime<Utc>,
    pub state: ProposalState,
}

/// Side-by-side view of a pending proposal against the live document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProposalComparison {
    pub proposal_id: Uuid,
    pub origin: String,
    pub base: String,
    pub live: String,
    pub proposed: String,
    /// Changes accepting would make to the live text.
    pub proposed_changes: Vec<DiffHunk>,
    /// Changes made by humans since the proposal was staged.
    pub live_changes: Vec<DiffHunk>,
    /// The live text moved on after staging; accepting overwrites those
    /// changes wherever the proposal touches them.
    pub stale: bool,
}

#[derive(Debug, Clone)]
pub struct AcceptedProposal {
    pub proposal: EditProposal,
    pub update: UpdateToken,
    pub stale: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProposalError {
    #[error("proposal {pending_id} from `{origin}` is still awaiting review")]
    Conflict { pending_id: Uuid, origin: String },
    #[error("no proposal is awaiting review")]
    NoPending,
}

#[derive(Debug, Default)]
pub struct ProposalStager {
    pending: Option<EditProposal>,
}

impl ProposalStager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&EditProposal> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Holds `proposed_text` for review. `live_text` is the document as it is
    /// right now and becomes the proposal's base.
    pub fn stage(
        &mut self,
        proposed_text: impl Into<String>,
        origin: impl Into<String>,
        live_text: impl Into<String>,
    ) -> Result<&EditProposal, ProposalError> {
        if let Some(pending) = &self.pending {
            return Err(ProposalError::Conflict {
                pending_id: pending.id,
                origin: pending.origin.clone(),
            });
        }

        let proposal = EditProposal {
            id: Uuid::new_v4(),
            origin: origin.into(),
            proposed_text: proposed_text.into(),
            base_text: live_text.into(),
            staged_at: Utc::now(),
            state: ProposalState::Pending,
        };
        info!(
            proposal_id = %proposal.id,
            origin = %proposal.origin,
            proposed_bytes = proposal.proposed_text.len(),
            "proposal staged"
        );
        Ok(&*self.pending.insert(proposal))
    }

    pub fn comparison(&self, live_text: &str) -> Result<ProposalComparison, ProposalError> {
        let pending = self.pending.as_ref().ok_or(ProposalError::NoPending)?;
        Ok(ProposalComparison {
            proposal_id: pending.id,
            origin: pending.origin.clone(),
            base: pending.base_text.clone(),
            live: live_text.to_owned(),
            proposed: pending.proposed_text.clone(),
            proposed_changes: line_hunks(live_text, &pending.proposed_text, DEFAULT_CONTEXT_LINES),
            live_changes: line_hunks(&pending.base_text, live_text, DEFAULT_CONTEXT_LINES),
            stale: pending.base_text != live_text,
        })
    }

    /// Applies the staged text to `replica` as a single proposal-origin
    /// transaction and clears the pending slot.
    pub fn accept(&mut self, replica: &Replica) -> Result<AcceptedProposal, ProposalError> {
        let mut proposal = self.pending.take().ok_or(ProposalError::NoPending)?;
        let stale = replica.snapshot_text() != proposal.base_text;
        let update = replica.replace_all(&proposal.proposed_text, EditOrigin::Proposal);
        proposal.state = ProposalState::Accepted;

        info!(proposal_id = %proposal.id, origin = %proposal.origin, stale, "proposal accepted");
        Ok(AcceptedProposal { proposal, update, stale })
    }

    /// Discards the pending proposal. The document is not touched.
    pub fn reject(&mut self) -> Result<EditProposal, ProposalError> {
        let mut proposal = self.pending.take().ok_or(ProposalError::NoPending)?;
        proposal.state = ProposalState::Rejected;
        info!(proposal_id = %proposal.id, origin = %proposal.origin, "proposal rejected");
        Ok(proposal)
    }
}
