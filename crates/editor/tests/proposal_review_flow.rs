use quire_common::protocol::agent::{ToolCall, EDIT_BUSY_RESULT, EDIT_STAGED_RESULT};
use quire_common::types::{DocumentId, Participant};
use quire_editor::backend::LocalBackend;
use quire_editor::engine::presence::PresenceKind;
use quire_editor::proposal::{ProposalError, ProposalState};
use quire_editor::session::{Session, SessionError};
use serde_json::json;

const PAPER: &str = "\\documentclass{article}\n\\begin{document}\nDraft abstract.\n\\end{document}\n";

fn participant(name: &str) -> Participant {
    Participant { id: format!("user-{name}"), name: name.to_owned(), avatar_url: None }
}

struct Room {
    owner: Session,
    coauthor: Session,
}

fn room_with_paper() -> Room {
    let backend = LocalBackend::default();
    let document_id = DocumentId::new();
    let mut owner = Session::connect(&backend, document_id, participant("owner")).unwrap();
    let mut coauthor = Session::connect(&backend, document_id, participant("coauthor")).unwrap();
    owner.edit(0..0, PAPER).unwrap();
    coauthor.pull().unwrap();
    Room { owner, coauthor }
}

fn agent_call(new_file: &str) -> ToolCall {
    ToolCall::from_value(json!({
        "toolCallId": "call-7",
        "toolName": "editFile",
        "args": { "newFile": new_file },
    }))
    .unwrap()
}

#[test]
fn agent_edit_is_invisible_until_accepted() {
    let Room { mut owner, mut coauthor } = room_with_paper();
    let proposed = PAPER.replace("Draft abstract.", "A concise abstract.");

    assert_eq!(owner.handle_tool_call("assistant", agent_call(&proposed)), EDIT_STAGED_RESULT);
    assert_eq!(owner.text(), PAPER);
    assert_eq!(coauthor.pull().unwrap(), 0);

    let comparison = owner.proposal_comparison().unwrap();
    assert!(!comparison.stale);
    assert_eq!(comparison.proposed_changes.len(), 1);

    owner.accept_proposal().unwrap();
    assert_eq!(owner.text(), proposed);

    // Peers receive the whole proposal as a single update.
    assert_eq!(coauthor.pull().unwrap(), 1);
    assert_eq!(coauthor.text(), proposed);
}

#[test]
fn second_agent_edit_is_refused_while_one_is_pending() {
    let Room { mut owner, .. } = room_with_paper();

    assert_eq!(owner.handle_tool_call("assistant", agent_call("first")), EDIT_STAGED_RESULT);
    assert_eq!(owner.handle_tool_call("assistant", agent_call("second")), EDIT_BUSY_RESULT);

    let pending = owner.pending_proposal().expect("first proposal still pending");
    assert_eq!(pending.proposed_text, "first");
    assert!(matches!(
        owner.stage_proposal("assistant", "third".into()),
        Err(ProposalError::Conflict { .. })
    ));
}

#[test]
fn reject_changes_nothing_anywhere() {
    let Room { mut owner, mut coauthor } = room_with_paper();
    let before = owner.replica().state_vector();

    owner.handle_tool_call("assistant", agent_call("\\section{Gone}"));
    let rejected = owner.reject_proposal().unwrap();

    assert_eq!(rejected.state, ProposalState::Rejected);
    assert_eq!(owner.text(), PAPER);
    assert_eq!(owner.replica().state_vector(), before);
    assert_eq!(coauthor.pull().unwrap(), 0);
    assert!(matches!(owner.reject_proposal(), Err(ProposalError::NoPending)));
}

#[test]
fn accept_without_pending_is_an_error() {
    let Room { mut owner, .. } = room_with_paper();
    assert!(matches!(
        owner.accept_proposal(),
        Err(SessionError::Proposal(ProposalError::NoPending))
    ));
}

#[test]
fn coauthor_edits_during_review_mark_proposal_stale() {
    let Room { mut owner, mut coauthor } = room_with_paper();
    let proposed = PAPER.replace("Draft abstract.", "Agent abstract.");
    owner.handle_tool_call("assistant", agent_call(&proposed));

    coauthor.edit(0..0, "% reviewed\n").unwrap();
    owner.pull().unwrap();

    let comparison = owner.proposal_comparison().unwrap();
    assert!(comparison.stale);
    assert_eq!(comparison.live_changes.len(), 1);

    let accepted = owner.accept_proposal().unwrap();
    assert!(accepted.stale);
    coauthor.pull().unwrap();
    assert_eq!(owner.text(), proposed);
    assert_eq!(coauthor.text(), proposed);
}

#[test]
fn accepted_proposal_can_be_undone_by_its_acceptor() {
    let Room { mut owner, mut coauthor } = room_with_paper();
    owner.handle_tool_call("assistant", agent_call("\\section{Replaced}\n"));
    owner.accept_proposal().unwrap();

    assert!(owner.undo().unwrap());
    coauthor.pull().unwrap();
    assert_eq!(owner.text(), PAPER);
    assert_eq!(coauthor.text(), PAPER);
}

#[test]
fn undo_never_reverts_a_peer_edit() {
    let Room { mut owner, mut coauthor } = room_with_paper();
    let end = owner.replica().len();
    owner.edit(end..end, "% owner\n").unwrap();
    coauthor.pull().unwrap();
    coauthor.edit(0..0, "% coauthor\n").unwrap();
    owner.pull().unwrap();

    assert!(owner.undo().unwrap());
    assert!(owner.undo().unwrap());
    assert!(!owner.undo().unwrap());
    coauthor.pull().unwrap();

    assert_eq!(owner.text(), "% coauthor\n");
    assert_eq!(coauthor.text(), owner.text());
}

#[tokio::test]
async fn agent_presence_is_labelled() {
    let backend = LocalBackend::default();
    let document_id = DocumentId::new();
    let human = Session::connect(&backend, document_id, participant("human")).unwrap();
    let agent = Session::connect(&backend, document_id, participant("assistant"))
        .unwrap()
        .with_kind(PresenceKind::Agent);

    let mut observer = human.observe_others();
    agent.publish_presence(None, None).await;

    let others = observer.next().await.expect("presence hub alive");
    assert_eq!(others.len(), 1);
    assert_eq!(others[0].state.user.kind, PresenceKind::Agent);
}
