use proptest::prelude::*;
use quire_common::crdt::origin::EditOrigin;
use quire_editor::engine::replica::{Replica, UpdateToken};

const OPS_PER_RUN: usize = 2_000;

#[derive(Debug, Clone)]
struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        self.state
    }

    fn next_usize(&mut self, upper_exclusive: usize) -> usize {
        if upper_exclusive == 0 {
            return 0;
        }
        ((self.next_u64() >> 16) as usize) % upper_exclusive
    }
}

/// Updates produced but not yet delivered to every replica.
struct Outbox {
    pending: Vec<(usize, UpdateToken)>,
}

impl Outbox {
    fn new() -> Self {
        Self { pending: Vec::new() }
    }

    fn push(&mut self, author: usize, update: UpdateToken) {
        self.pending.push((author, update));
    }

    /// Delivers one random pending update to one random non-author replica,
    /// sometimes twice.
    fn deliver_random(&mut self, replicas: &[Replica], rng: &mut Lcg) {
        if self.pending.is_empty() {
            return;
        }
        let (author, update) = self.pending[rng.next_usize(self.pending.len())].clone();
        let mut target = rng.next_usize(replicas.len());
        if target == author {
            target = (target + 1) % replicas.len();
        }
        replicas[target].apply_remote_update(&update).expect("update should merge");
        if rng.next_usize(8) == 0 {
            replicas[target].apply_remote_update(&update).expect("duplicate should merge");
        }
    }

    /// Delivers everything to everyone in a shuffled order.
    fn flush(&mut self, replicas: &[Replica], rng: &mut Lcg) {
        let mut pending = std::mem::take(&mut self.pending);
        for i in (1..pending.len()).rev() {
            pending.swap(i, rng.next_usize(i + 1));
        }
        for replica in replicas {
            for (_, update) in &pending {
                replica.apply_remote_update(update).expect("update should merge");
            }
        }
    }
}

fn random_insert_text(rng: &mut Lcg, max_len: usize) -> String {
    let len = 1 + rng.next_usize(max_len.max(1));
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        let ch = match rng.next_usize(40) {
            0..=25 => char::from(b'a' + rng.next_usize(26) as u8),
            26..=31 => char::from(b'0' + rng.next_usize(10) as u8),
            32 => ' ',
            33 => '\n',
            34 => '\\',
            35 => '{',
            36 => '}',
            37 => 'é',
            38 => '∑',
            _ => '$',
        };
        out.push(ch);
    }
    out
}

/// Byte offsets that fall on character boundaries, including the end.
fn boundaries(text: &str) -> Vec<u32> {
    text.char_indices().map(|(idx, _)| idx as u32).chain(std::iter::once(text.len() as u32)).collect()
}

fn apply_random_edit(replica: &Replica, rng: &mut Lcg, max_insert_len: usize) -> UpdateToken {
    let text = replica.snapshot_text();
    let cuts = boundaries(&text);

    let start_idx = rng.next_usize(cuts.len());
    let end_idx = if rng.next_usize(3) == 0 {
        start_idx
    } else {
        start_idx + rng.next_usize((cuts.len() - start_idx).min(12))
    };
    let replacement =
        if rng.next_usize(4) == 0 { String::new() } else { random_insert_text(rng, max_insert_len) };

    replica
        .apply_local_edit(cuts[start_idx]..cuts[end_idx], &replacement)
        .expect("boundary-aligned edit should apply")
}

fn run_randomized_convergence(seed: u64, clients: usize, ops: usize) {
    assert!(clients >= 2, "at least two replicas are required");

    let replicas =
        (0..clients).map(|idx| Replica::new((idx + 1) as u64)).collect::<Vec<_>>();
    let mut rng = Lcg::new(seed);
    let mut outbox = Outbox::new();

    for _ in 0..ops {
        match rng.next_usize(6) {
            0..=3 => {
                let actor = rng.next_usize(clients);
                let update = apply_random_edit(&replicas[actor], &mut rng, 12);
                outbox.push(actor, update);
            }
            4 => {
                // Whole-text replacement, as an accepted proposal does.
                let actor = rng.next_usize(clients);
                let mut text = replicas[actor].snapshot_text();
                text.push_str(&random_insert_text(&mut rng, 6));
                let update = replicas[actor].replace_all(&text, EditOrigin::Proposal);
                outbox.push(actor, update);
            }
            _ => outbox.deliver_random(&replicas, &mut rng),
        }
    }

    outbox.flush(&replicas, &mut rng);

    let expected = replicas[0].snapshot_text();
    for (idx, replica) in replicas.iter().enumerate().skip(1) {
        assert_eq!(
            replica.snapshot_text(),
            expected,
            "convergence mismatch for seed={seed}, clients={clients}, ops={ops}, client={idx}"
        );
    }
}

#[test]
fn delivery_order_does_not_change_result() {
    let author = Replica::new(1);
    let updates: Vec<UpdateToken> = ["\\section{A}\n", "body\n", "\\end\n"]
        .iter()
        .map(|chunk| {
            let end = author.len();
            author.apply_local_edit(end..end, chunk).expect("append")
        })
        .collect();

    let forward = Replica::new(2);
    let backward = Replica::new(3);
    for update in &updates {
        forward.apply_remote_update(update).expect("merge");
    }
    for update in updates.iter().rev() {
        backward.apply_remote_update(update).expect("merge");
    }

    assert_eq!(forward.snapshot_text(), author.snapshot_text());
    assert_eq!(backward.snapshot_text(), author.snapshot_text());
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 4,
        max_shrink_iters: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn replicas_converge_under_random_edits_and_delivery(seed in any::<u64>(), clients in 2usize..6) {
        run_randomized_convergence(seed, clients, OPS_PER_RUN);
    }

    #[test]
    fn merging_an_update_twice_equals_merging_it_once(
        prefix in "[a-z ]{0,20}",
        insert in "[a-z\\\\{}]{1,10}",
    ) {
        let author = Replica::new(1);
        let base = author.apply_local_edit(0..0, &prefix).expect("seed");
        let end = author.len();
        let update = author.apply_local_edit(end..end, &insert).expect("append");

        let once = Replica::new(2);
        let twice = Replica::new(3);
        for replica in [&once, &twice] {
            replica.apply_remote_update(&base).expect("merge base");
            replica.apply_remote_update(&update).expect("merge update");
        }
        twice.apply_remote_update(&update).expect("merge duplicate");

        prop_assert_eq!(once.snapshot_text(), twice.snapshot_text());
        prop_assert_eq!(once.state_vector(), twice.state_vector());
    }
}
