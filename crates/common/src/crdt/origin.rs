use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction origin attached to every mutation of a replica's text.
///
/// The label is stored verbatim in the yrs transaction origin bytes, so it
/// must stay stable: undo tracking matches on these exact bytes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EditOrigin {
    /// A keystroke-level edit made by this replica's own user.
    Local,
    /// An update merged from another replica.
    Remote,
    /// An accepted agent proposal applied by this replica.
    Proposal,
}

impl EditOrigin {
    pub const ALL: [EditOrigin; 3] = [Self::Local, Self::Remote, Self::Proposal];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "quire.local",
            Self::Remote => "quire.remote",
            Self::Proposal => "quire.proposal",
        }
    }

    /// Whether edits with this origin belong on the local undo stack.
    pub const fn is_undoable(self) -> bool {
        matches!(self, Self::Local | Self::Proposal)
    }
}

impl fmt::Display for EditOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
