// Line-oriented hunks for side-by-side review of a proposed replacement.

use serde::{Deserialize, Serialize};

use super::myers::{edit_script, Edit};

pub const DEFAULT_CONTEXT_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineChangeKind {
    Context,
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: LineChangeKind,
    /// Line content without its trailing newline.
    pub text: String,
}

/// A contiguous region of change, in unified-diff coordinates (1-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    pub old_start: usize,
    pub old_lines: usize,
    pub new_start: usize,
    pub new_lines: usize,
    pub lines: Vec<DiffLine>,
}

impl DiffHunk {
    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_lines, self.new_start, self.new_lines
        )
    }

    pub fn added_lines(&self) -> usize {
        self.lines.iter().filter(|line| line.kind == LineChangeKind::Added).count()
    }

    pub fn removed_lines(&self) -> usize {
        self.lines.iter().filter(|line| line.kind == LineChangeKind::Removed).count()
    }
}

/// Groups the line changes between `old_text` and `new_text` into hunks with
/// `context` unchanged lines around each change.
pub fn line_hunks(old_text: &str, new_text: &str, context: usize) -> Vec<DiffHunk> {
    let old_lines: Vec<&str> = old_text.split_inclusive('\n').collect();
    let new_lines: Vec<&str> = new_text.split_inclusive('\n').collect();
    let edits = edit_script(&old_lines, &new_lines);

    // Position in each side before the edit at the same index.
    let mut positions = Vec::with_capacity(edits.len());
    let (mut old_pos, mut new_pos) = (0usize, 0usize);
    for edit in &edits {
        positions.push((old_pos, new_pos));
        match edit {
            Edit::Equal { .. } => {
                old_pos += 1;
                new_pos += 1;
            }
            Edit::Insert(_) => new_pos += 1,
            Edit::Delete(_) => old_pos += 1,
        }
    }

    let changed: Vec<usize> = edits
        .iter()
        .enumerate()
        .filter(|(_, edit)| !matches!(edit, Edit::Equal { .. }))
        .map(|(idx, _)| idx)
        .collect();

    let Some((&first, rest)) = changed.split_first() else {
        return Vec::new();
    };

    let mut groups = Vec::new();
    let (mut group_start, mut group_end) = (first, first);
    for &idx in rest {
        if idx - group_end - 1 > 2 * context {
            groups.push((group_start, group_end));
            group_start = idx;
        }
        group_end = idx;
    }
    groups.push((group_start, group_end));

    groups
        .into_iter()
        .map(|(start, end)| {
            let from = start.saturating_sub(context);
            let to = (end + context + 1).min(edits.len());
            build_hunk(&edits[from..to], positions[from], &old_lines, &new_lines)
        })
        .collect()
}

/// Renders hunks in unified-diff form (`@@` headers, ` `/`+`/`-` prefixes).
pub fn render_unified(hunks: &[DiffHunk]) -> String {
    let mut out = String::new();
    for hunk in hunks {
        out.push_str(&hunk.header());
        out.push('\n');
        for line in &hunk.lines {
            let marker = match line.kind {
                LineChangeKind::Context => ' ',
                LineChangeKind::Added => '+',
                LineChangeKind::Removed => '-',
            };
            out.push(marker);
            out.push_str(&line.text);
            out.push('\n');
        }
    }
    out
}

fn build_hunk(
    edits: &[Edit],
    (old_pos, new_pos): (usize, usize),
    old_lines: &[&str],
    new_lines: &[&str],
) -> DiffHunk {
    let mut lines = Vec::with_capacity(edits.len());
    let (mut old_count, mut new_count) = (0usize, 0usize);

    for edit in edits {
        let (kind, raw) = match *edit {
            Edit::Equal { old, .. } => {
                old_count += 1;
                new_count += 1;
                (LineChangeKind::Context, old_lines[old])
            }
            Edit::Delete(old) => {
                old_count += 1;
                (LineChangeKind::Removed, old_lines[old])
            }
            Edit::Insert(new) => {
                new_count += 1;
                (LineChangeKind::Added, new_lines[new])
            }
        };
        lines.push(DiffLine { kind, text: strip_newline(raw).to_owned() });
    }

    DiffHunk {
        old_start: if old_count == 0 { old_pos } else { old_pos + 1 },
        old_lines: old_count,
        new_start: if new_count == 0 { new_pos } else { new_pos + 1 },
        new_lines: new_count,
        lines,
    }
}

fn strip_newline(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
