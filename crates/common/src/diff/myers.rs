// Myers shortest-edit-script over arbitrary comparable sequences.
//
// Shared by the character-level patcher (CRDT replacement) and the
// line-level hunk builder (proposal comparison).

/// Upper bound on the edit distance explored before falling back to a
/// coarse delete-all/insert-all script for the differing middle section.
pub const MAX_EDIT_DISTANCE: usize = 2_048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edit {
    Equal { old: usize, new: usize },
    Insert(usize),
    Delete(usize),
}

/// Computes an edit script turning `old` into `new`.
///
/// Indices in the returned edits refer to positions in the input slices.
pub(crate) fn edit_script<T: PartialEq>(old: &[T], new: &[T]) -> Vec<Edit> {
    let prefix = old.iter().zip(new.iter()).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut edits = Vec::with_capacity(old.len().max(new.len()));
    edits.extend((0..prefix).map(|i| Edit::Equal { old: i, new: i }));

    let middle = myers(old_mid, new_mid).unwrap_or_else(|| coarse(old_mid.len(), new_mid.len()));
    edits.extend(middle.into_iter().map(|edit| shift(edit, prefix)));

    let old_tail = old.len() - suffix;
    let new_tail = new.len() - suffix;
    edits.extend((0..suffix).map(|i| Edit::Equal { old: old_tail + i, new: new_tail + i }));
    edits
}

fn shift(edit: Edit, by: usize) -> Edit {
    match edit {
        Edit::Equal { old, new } => Edit::Equal { old: old + by, new: new + by },
        Edit::Insert(new) => Edit::Insert(new + by),
        Edit::Delete(old) => Edit::Delete(old + by),
    }
}

fn coarse(old_len: usize, new_len: usize) -> Vec<Edit> {
    (0..old_len).map(Edit::Delete).chain((0..new_len).map(Edit::Insert)).collect()
}

/// Returns `None` when the edit distance exceeds [`MAX_EDIT_DISTANCE`].
fn myers<T: PartialEq>(old: &[T], new: &[T]) -> Option<Vec<Edit>> {
    let old_len = old.len();
    let new_len = new.len();

    if old_len == 0 {
        return Some((0..new_len).map(Edit::Insert).collect());
    }
    if new_len == 0 {
        return Some((0..old_len).map(Edit::Delete).collect());
    }

    let max = old_len + new_len;
    let offset = max as isize;
    let mut v = vec![0isize; 2 * max + 1];
    // trace[d] holds the window k in [-d, d] of `v` as it stood before round d.
    let mut trace: Vec<Vec<isize>> = Vec::new();

    for d in 0..=max.min(MAX_EDIT_DISTANCE) {
        let d_isize = d as isize;
        trace.push(v[(offset - d_isize) as usize..=(offset + d_isize) as usize].to_vec());

        let mut k = -d_isize;
        while k <= d_isize {
            let mut x = if k == -d_isize
                || (k != d_isize && v[(k - 1 + offset) as usize] < v[(k + 1 + offset) as usize])
            {
                v[(k + 1 + offset) as usize]
            } else {
                v[(k - 1 + offset) as usize] + 1
            };
            let mut y = x - k;

            while x < old_len as isize
                && y < new_len as isize
                && old[x as usize] == new[y as usize]
            {
                x += 1;
                y += 1;
            }

            v[(k + offset) as usize] = x;

            if x >= old_len as isize && y >= new_len as isize {
                return Some(backtrack(old_len, new_len, &trace, d));
            }

            k += 2;
        }
    }

    None
}

fn backtrack(old_len: usize, new_len: usize, trace: &[Vec<isize>], solved_d: usize) -> Vec<Edit> {
    let mut edits = Vec::new();
    let mut x = old_len as isize;
    let mut y = new_len as isize;

    for d in (0..=solved_d).rev() {
        let window = &trace[d];
        let d_isize = d as isize;
        let at = |k: isize| window[(k + d_isize) as usize];
        let k = x - y;

        let prev_k = if d == 0 {
            0
        } else if k == -d_isize || (k != d_isize && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = if d == 0 { 0 } else { at(prev_k) };
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            edits.push(Edit::Equal { old: (x - 1) as usize, new: (y - 1) as usize });
            x -= 1;
            y -= 1;
        }

        if d == 0 {
            break;
        }

        if x == prev_x {
            edits.push(Edit::Insert((y - 1) as usize));
            y -= 1;
        } else {
            edits.push(Edit::Delete((x - 1) as usize));
            x -= 1;
        }
    }

    edits.reverse();
    edits
}
