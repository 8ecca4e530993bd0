use yrs::{Text, TextRef, TransactionMut};

use super::myers::{edit_script, Edit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextPatchOp {
    Insert { index: u32, text: String },
    Delete { index: u32, len: u32 },
}

/// Computes a patch-style diff from `old_text` to `new_text`.
///
/// Operations use UTF-8 byte offsets into `old_text` to match `yrs::Text`
/// indexing, and are sorted by ascending offset.
pub fn diff_to_patch_ops(old_text: &str, new_text: &str) -> Vec<TextPatchOp> {
    if old_text == new_text {
        return Vec::new();
    }

    let old_chars: Vec<char> = old_text.chars().collect();
    let new_chars: Vec<char> = new_text.chars().collect();
    let edits = edit_script(&old_chars, &new_chars);
    edits_to_patch_ops(&old_chars, &new_chars, &edits)
}

/// Applies precomputed patch operations inside an existing transaction.
///
/// Offsets refer to the text as it was before any op ran, so the ops are
/// applied back to front and never need index adjustment.
pub fn apply_patch_ops(txn: &mut TransactionMut, ytext: &TextRef, patch_ops: &[TextPatchOp]) {
    for patch_op in patch_ops.iter().rev() {
        match patch_op {
            TextPatchOp::Delete { index, len } => ytext.remove_range(txn, *index, *len),
            TextPatchOp::Insert { index, text } => ytext.insert(txn, *index, text),
        }
    }
}

fn edits_to_patch_ops(old_chars: &[char], new_chars: &[char], edits: &[Edit]) -> Vec<TextPatchOp> {
    let mut patch_ops = Vec::new();
    let mut old_index_bytes = 0u32;

    for edit in edits {
        match *edit {
            Edit::Equal { old, .. } => {
                old_index_bytes += old_chars[old].len_utf8() as u32;
            }
            Edit::Delete(old) => {
                let char_len = old_chars[old].len_utf8() as u32;
                match patch_ops.last_mut() {
                    Some(TextPatchOp::Delete { index, len })
                        if *index + *len == old_index_bytes =>
                    {
                        *len += char_len;
                    }
                    _ => {
                        patch_ops
                            .push(TextPatchOp::Delete { index: old_index_bytes, len: char_len });
                    }
                }
                old_index_bytes += char_len;
            }
            Edit::Insert(new) => {
                let ch = new_chars[new];
                match patch_ops.last_mut() {
                    Some(TextPatchOp::Insert { index, text }) if *index == old_index_bytes => {
                        text.push(ch);
                    }
                    _ => {
                        patch_ops.push(TextPatchOp::Insert {
                            index: old_index_bytes,
                            text: ch.to_string(),
                        });
                    }
                }
            }
        }
    }

    patch_ops
}
