// One participant's local copy of the shared document text.
//
// Every mutation runs in a yrs transaction tagged with an `EditOrigin`, and
// every local mutation hands back the delta as an `UpdateToken` so the caller
// can broadcast it. Merging is delegated to yrs: there is no failure mode for
// concurrent edits, only for malformed input.
//
// yrs drops deletions that target a client it has never seen, so a remote
// update whose deletes run past the local state vector is parked and merged
// again once the state vector covers them.

use std::convert::Infallible;
use std::ops::Range;
use std::sync::{Mutex, PoisonError};

use quire_common::crdt::origin::EditOrigin;
use quire_common::diff::patch::{apply_patch_ops, diff_to_patch_ops};
use quire_common::types::ConnectionId;
use thiserror::Error;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Doc, GetString, Options, ReadTxn, StateVector, Text, TextRef, Transact, TransactionMut, Update,
};

/// Name of the shared text type. Browser clients bind their editor to the
/// same name, so it must not change.
pub const TEXT_NAME: &str = "codemirror";

/// Opaque, serialisable description of a change (yrs v1 update encoding).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateToken(Vec<u8>);

impl UpdateToken {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<u8>> for UpdateToken {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplicaError {
    #[error("edit range {start}..{end} is not valid for a document of {len} bytes")]
    InvalidRange { start: u32, end: u32, len: u32 },
    #[error("malformed update: {0}")]
    MalformedUpdate(String),
    #[error("malformed state vector: {0}")]
    MalformedStateVector(String),
}

pub struct Replica {
    doc: Doc,
    text: TextRef,
    client_id: ConnectionId,
    parked: Mutex<Vec<ParkedUpdate>>,
}

/// A merged update whose deletions reach past the local state.
struct ParkedUpdate {
    token: UpdateToken,
    needs: StateVector,
}

impl ParkedUpdate {
    fn is_ready(&self, known: &StateVector) -> bool {
        self.needs.iter().all(|(client, clock)| known.get(client) >= *clock)
    }
}

impl Replica {
    /// Creates an empty replica. `client_id` must be unique among the
    /// replicas of one document.
    pub fn new(client_id: ConnectionId) -> Self {
        let doc = Doc::with_options(Options { client_id, ..Default::default() });
        let text = doc.get_or_insert_text(TEXT_NAME);
        Self { doc, text, client_id, parked: Mutex::new(Vec::new()) }
    }

    /// Creates a replica and merges a full state snapshot into it.
    pub fn from_state(client_id: ConnectionId, state: &[u8]) -> Result<Self, ReplicaError> {
        let replica = Self::new(client_id);
        replica.apply_remote_update(&UpdateToken::from_bytes(state.to_vec()))?;
        Ok(replica)
    }

    pub fn client_id(&self) -> ConnectionId {
        self.client_id
    }

    /// Replaces the UTF-8 byte `range` with `new_text` in one transaction.
    pub fn apply_local_edit(
        &self,
        range: Range<u32>,
        new_text: &str,
    ) -> Result<UpdateToken, ReplicaError> {
        self.capture(EditOrigin::Local, |txn, text| {
            let current = text.get_string(&*txn);
            validate_range(&current, &range)?;
            if range.end > range.start {
                text.remove_range(txn, range.start, range.end - range.start);
            }
            if !new_text.is_empty() {
                text.insert(txn, range.start, new_text);
            }
            Ok(())
        })
    }

    /// Merges an update produced by any replica of the same document, in any
    /// delivery order. Re-applying an already merged update is a no-op.
    pub fn apply_remote_update(&self, update: &UpdateToken) -> Result<(), ReplicaError> {
        let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(needs) = self.merge(update)? {
            if !parked.iter().any(|entry| entry.token == *update) {
                parked.push(ParkedUpdate { token: update.clone(), needs });
            }
        }
        if parked.is_empty() {
            return Ok(());
        }

        let known = self.current_vector();
        let (ready, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut *parked).into_iter().partition(|entry| entry.is_ready(&known));
        *parked = waiting;
        for entry in ready {
            if let Ok(Some(needs)) = self.merge(&entry.token) {
                parked.push(ParkedUpdate { token: entry.token, needs });
            }
        }
        Ok(())
    }

    /// Number of merged updates still waiting on changes not seen yet.
    pub fn parked_len(&self) -> usize {
        self.parked.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Merges `update` and returns the clocks its deletions still wait for,
    /// or `None` when every deletion landed.
    fn merge(&self, update: &UpdateToken) -> Result<Option<StateVector>, ReplicaError> {
        let decoded = Update::decode_v1(update.as_bytes())
            .map_err(|error| ReplicaError::MalformedUpdate(error.to_string()))?;
        let deletes = decoded.delete_set().clone();
        let mut txn = self.doc.transact_mut_with(EditOrigin::Remote.as_str());
        txn.apply_update(decoded)
            .map_err(|error| ReplicaError::MalformedUpdate(error.to_string()))?;

        let known = txn.state_vector();
        let mut needs = StateVector::default();
        for (client, ranges) in deletes.iter() {
            let end = ranges.iter().map(|range| range.end).max().unwrap_or(0);
            if end > known.get(client) {
                needs.set_max(*client, end);
            }
        }
        Ok((!needs.is_empty()).then_some(needs))
    }

    /// Rewrites the whole text to `new_text` with the smallest character
    /// diff, inside a single transaction tagged with `origin`.
    pub fn replace_all(&self, new_text: &str, origin: EditOrigin) -> UpdateToken {
        let outcome: Result<UpdateToken, Infallible> = self.capture(origin, |txn, text| {
            let current = text.get_string(&*txn);
            let ops = diff_to_patch_ops(&current, new_text);
            apply_patch_ops(txn, text, &ops);
            Ok(())
        });
        match outcome {
            Ok(token) => token,
            Err(never) => match never {},
        }
    }

    pub fn snapshot_text(&self) -> String {
        self.text.get_string(&self.doc.transact())
    }

    /// Length of the text in UTF-8 bytes.
    pub fn len(&self) -> u32 {
        self.snapshot_text().len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encoded state vector describing everything this replica has seen.
    pub fn state_vector(&self) -> Vec<u8> {
        self.doc.transact().state_vector().encode_v1()
    }

    /// Full document state as a single update.
    pub fn encode_state(&self) -> UpdateToken {
        UpdateToken(self.doc.transact().encode_state_as_update_v1(&StateVector::default()))
    }

    /// Everything this replica has that a peer with `state_vector` lacks.
    pub fn diff_since(&self, state_vector: &[u8]) -> Result<UpdateToken, ReplicaError> {
        let sv = StateVector::decode_v1(state_vector)
            .map_err(|error| ReplicaError::MalformedStateVector(error.to_string()))?;
        Ok(self.diff_since_vector(&sv))
    }

    pub(crate) fn diff_since_vector(&self, sv: &StateVector) -> UpdateToken {
        UpdateToken(self.doc.transact().encode_diff_v1(sv))
    }

    pub(crate) fn current_vector(&self) -> StateVector {
        self.doc.transact().state_vector()
    }

    pub(crate) fn doc(&self) -> &Doc {
        &self.doc
    }

    pub(crate) fn text(&self) -> &TextRef {
        &self.text
    }

    fn capture<E, F>(&self, origin: EditOrigin, edit: F) -> Result<UpdateToken, E>
    where
        F: FnOnce(&mut TransactionMut, &TextRef) -> Result<(), E>,
    {
        let before = self.current_vector();
        {
            let mut txn = self.doc.transact_mut_with(origin.as_str());
            edit(&mut txn, &self.text)?;
        }
        Ok(self.diff_since_vector(&before))
    }
}

fn validate_range(text: &str, range: &Range<u32>) -> Result<(), ReplicaError> {
    let len = text.len() as u32;
    let invalid = range.start > range.end
        || range.end > len
        || !text.is_char_boundary(range.start as usize)
        || !text.is_char_boundary(range.end as usize);
    if invalid {
        return Err(ReplicaError::InvalidRange { start: range.start, end: range.end, len });
    }
    Ok(())
}
