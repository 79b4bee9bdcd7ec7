//! Alternative selection.
//!
//! The visit counter (and, for `Shuffle`, the derived permutation) live in
//! [`crate::store::Store::node_state`] keyed by the alternative's own
//! [`crate::ast::NodeId`] — the same mechanism non-temporary local state
//! uses.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::ast::{AlternativeBlock, AlternativeMode, NodeId, NodeKind};
use crate::value::Value;

use super::{enter_body, Interpreter, Next};

const COUNTER_FIELD: &str = "c";
const PERMUTATION_FIELD: &str = "permutation";

pub(crate) fn eval_alternative(interp: &mut Interpreter, beat: NodeId, alt: &AlternativeBlock, next: Next) {
    let branch_count = alt.branches.len();
    if branch_count == 0 {
        return next(interp);
    }

    let fields = interp
        .store
        .node_state_or_init(alt.id, std::collections::BTreeMap::new);
    let c = match fields.get(COUNTER_FIELD) {
        Some(Value::Integer(c)) => *c,
        _ => 0,
    };

    let (chosen, new_c) = match alt.mode {
        AlternativeMode::Sequence => {
            let idx = (c as usize).min(branch_count - 1);
            (Some(idx), c + 1)
        },
        AlternativeMode::Cycle => {
            let idx = (c as usize) % branch_count;
            (Some(idx), c + 1)
        },
        AlternativeMode::Once => {
            let idx = if (c as usize) < branch_count { Some(c as usize) } else { None };
            (idx, c + 1)
        },
        AlternativeMode::Pick => {
            let idx = rand::thread_rng().gen_range(0..branch_count);
            (Some(idx), c + 1)
        },
        AlternativeMode::Shuffle => {
            let idx = shuffle_pick(interp, alt.id, c, branch_count);
            (Some(idx), c + 1)
        },
    };

    let fields = interp.store.node_state.get_mut(&alt.id).expect("just initialized above");
    fields.set(COUNTER_FIELD, Value::Integer(new_c));

    match chosen {
        Some(index) => enter_body(interp, beat, alt.id, NodeKind::Alternative, Some(index), None, next),
        None => next(interp),
    }
}

/// Re-runs selection for a resumed alternative scope without
/// incrementing the visit counter again: the saved counter already reflects
/// this visit (it was bumped when the scope was first entered, before the
/// save happened), so the branch is re-derived from `counter - 1`.
pub(crate) fn reenter_alternative(interp: &mut Interpreter, beat: NodeId, alt: &AlternativeBlock, next: Next) {
    let branch_count = alt.branches.len();
    if branch_count == 0 {
        return next(interp);
    }

    let c = match interp.store.node_state.get(&alt.id).and_then(|f| f.get(COUNTER_FIELD)) {
        Some(Value::Integer(c)) => (*c - 1).max(0),
        _ => 0,
    };

    let chosen = match alt.mode {
        AlternativeMode::Sequence => Some((c as usize).min(branch_count - 1)),
        AlternativeMode::Cycle => Some((c as usize) % branch_count),
        AlternativeMode::Once => {
            if (c as usize) < branch_count {
                Some(c as usize)
            } else {
                None
            }
        },
        AlternativeMode::Pick => Some(rand::thread_rng().gen_range(0..branch_count)),
        AlternativeMode::Shuffle => Some(shuffle_pick_readonly(interp, alt.id, c, branch_count)),
    };

    match chosen {
        Some(index) => enter_body(interp, beat, alt.id, NodeKind::Alternative, Some(index), None, next),
        None => next(interp),
    }
}

/// Like [`shuffle_pick`], but never generates a fresh permutation: on resume
/// the permutation for the current epoch was already stored, so this only reads it.
fn shuffle_pick_readonly(interp: &Interpreter, id: NodeId, c: i64, branch_count: usize) -> usize {
    let within_epoch = (c as usize) % branch_count;
    match interp.store.node_state.get(&id).and_then(|f| f.get(PERMUTATION_FIELD)) {
        Some(Value::Array(items)) => match items.get(within_epoch) {
            Some(Value::Integer(i)) => *i as usize,
            _ => within_epoch,
        },
        _ => within_epoch,
    }
}

/// Derives `Shuffle`'s permutation: a fresh random permutation
/// is generated at the start of each "epoch" of `N` visits and stored
/// alongside the counter; `branch[permutation[c mod N]]` is chosen.
fn shuffle_pick(interp: &mut Interpreter, id: NodeId, c: i64, branch_count: usize) -> usize {
    let within_epoch = (c as usize) % branch_count;
    if within_epoch == 0 {
        let mut permutation: Vec<i64> = (0..branch_count as i64).collect();
        permutation.shuffle(&mut rand::thread_rng());
        let fields = interp.store.node_state.get_mut(&id).expect("initialized by caller");
        fields.set(
            PERMUTATION_FIELD,
            Value::Array(permutation.iter().map(|i| Value::Integer(*i)).collect()),
        );
    }

    let fields = interp.store.node_state.get(&id).expect("initialized by caller");
    match fields.get(PERMUTATION_FIELD) {
        Some(Value::Array(items)) => match items.get(within_epoch) {
            Some(Value::Integer(i)) => *i as usize,
            _ => within_epoch,
        },
        _ => within_epoch,
    }
}
