//! Restorer and its fallback.
//!
//! Rebuilds a `Store` and a live `ScopeStack`/`InsertionArena` from a
//! [`SaveData`] blob against a (possibly edited) script. Three things can
//! have moved since the save was taken: state field declarations, node
//! identities (a small edit can renumber trailing offsets within a
//! section), and whole beats. The first two are tolerated (delta
//! reapplication, the "section offset" trick below); the third, when it
//! breaks a saved scope's identity past recovery, drops to the fallback:
//! clear the stack, remember the outermost beat that still resolves, and
//! let `resume()` restart there.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::ast::{Node, NodeId, NodeKind, Script};
use crate::error::{Error, RestoreError, RuntimeError};
use crate::expr::ExpressionEvaluator;
use crate::host::{Host, InlineTag, Options};
use crate::interpreter::Interpreter;
use crate::lens::{Lens, ROOT_NODE_ID};
use crate::scope::{
    ChoiceOption, CollectedOptions, InsertionArena, InsertionId, RuntimeInsertion, RuntimeScope,
    ScopeId, ScopeStack,
};
use crate::store::{Fields, PathReader, Store};
use crate::value::Value;

use super::{BeatRef, ChoiceOptionRecord, InsertionRecord, NodeRef, SaveData, ScopeRecord, SAVE_VERSION};

impl Interpreter {
    /// `restore(blob)`. Host-visible failures are limited to a
    /// save format newer than this build supports; anything
    /// else that can't be resolved against the live script falls back
    /// silently rather than erroring, per the `RestoreError`
    /// propagation policy.
    pub fn restore(
        script: Rc<Script>,
        evaluator: Rc<dyn ExpressionEvaluator>,
        options: Options,
        host: Box<dyn Host>,
        data: &SaveData,
    ) -> Result<Interpreter, Error> {
        restore(script, evaluator, options, host, data)
    }

    /// Convenience wrapper parsing the JSON-shape blob `save_json` produces.
    pub fn restore_json(
        script: Rc<Script>,
        evaluator: Rc<dyn ExpressionEvaluator>,
        options: Options,
        host: Box<dyn Host>,
        json: &str,
    ) -> Result<Interpreter, Error> {
        let data: SaveData =
            serde_json::from_str(json).map_err(|e| Error::Restore(e.to_string()))?;
        restore(script, evaluator, options, host, &data)
    }
}

pub fn restore(
    script: Rc<Script>,
    evaluator: Rc<dyn ExpressionEvaluator>,
    options: Options,
    host: Box<dyn Host>,
    data: &SaveData,
) -> Result<Interpreter, Error> {
    if data.version > SAVE_VERSION {
        return Err(Error::Restore(format!(
            "save version {} is newer than the {} this runtime supports",
            data.version, SAVE_VERSION
        )));
    }

    let store = build_store(&script, evaluator.as_ref(), data)?;
    let lens = Lens::build(&script);
    let function_names = options.function_names();

    match rebuild(&lens, &store, evaluator.as_ref(), &function_names, data) {
        Ok((stack, insertions, next_scope_id, next_insertion_id)) => Ok(Interpreter {
            script,
            store,
            stack: ScopeStack { frames: stack },
            insertions,
            next_scope_id,
            next_insertion_id,
            evaluator,
            options,
            host: Some(host),
            finished: false,
            fallback_beat: None,
        }),
        Err(err) => {
            log::debug!("restore fallback: {err}");
            Ok(Interpreter {
                script,
                store,
                stack: ScopeStack::new(),
                insertions: InsertionArena::new(),
                next_scope_id: 0,
                next_insertion_id: 0,
                evaluator,
                options,
                host: Some(host),
                finished: false,
                fallback_beat: outermost_identifiable_beat(&lens, data),
            })
        },
    }
}

/// Step 1: reinitialize top-level state and characters from
/// declared defaults, then apply saved deltas. Characters present in the
/// save but not in the script are created on demand; state fields absent
/// from the script are dropped (silent). Node-state entries are kept only
/// for ids that still resolve to an `Alternative` node — the only kind that
/// currently uses the node-state map — anything else is a stale id from a
/// script edit and is dropped the same way.
fn build_store(script: &Script, evaluator: &dyn ExpressionEvaluator, data: &SaveData) -> Result<Store, RuntimeError> {
    let fresh = Store::from_script(script, evaluator)?;
    let lens = Lens::build(script);

    let mut store = Store::empty();
    store.top_level = Fields::restore(fresh.top_level.initial, data.state.clone());

    for (name, fields) in fresh.characters {
        let delta = data.characters.get(&name).cloned().unwrap_or_default();
        store.characters.insert(name, Fields::restore(fields.initial, delta));
    }
    for (name, delta) in &data.characters {
        store
            .characters
            .entry(name.clone())
            .or_insert_with(|| Fields::restore(BTreeMap::new(), delta.clone()));
    }

    for (id_str, delta) in &data.node_state {
        let Some(id) = NodeId::from_save_string(id_str) else { continue };
        if lens.kind_of(id) == Some(NodeKind::Alternative) {
            store.node_state.insert(id, Fields::restore(BTreeMap::new(), delta.clone()));
        }
    }

    Ok(store)
}

/// Steps 2–4: rebuilds the scope stack and the insertion
/// arena. Any unresolvable or kind-mismatched node anywhere in the blob
/// aborts the whole rebuild — the caller drops to the fallback rather than
/// returning a partially-reconstructed stack.
fn rebuild(
    lens: &Lens<'_>,
    store: &Store,
    evaluator: &dyn ExpressionEvaluator,
    function_names: &[String],
    data: &SaveData,
) -> Result<(Vec<RuntimeScope>, InsertionArena, u64, u64), RestoreError> {
    let mut max_scope_id: Option<u64> = None;
    let stack = resolve_scope_stack(lens, store, evaluator, function_names, &data.stack, &mut max_scope_id)?;

    let mut arena = InsertionArena::new();
    for (id, rec) in &data.insertions {
        let origin = resolve_node(lens, &rec.origin)?;
        let options = resolve_options(lens, rec)?;
        let stack_snapshot = match &options {
            CollectedOptions::Collected(_) => {
                Some(resolve_scope_stack(lens, store, evaluator, function_names, &rec.stack, &mut max_scope_id)?)
            },
            CollectedOptions::Pending => None,
        };
        arena.insert(RuntimeInsertion { id: InsertionId(*id), origin, options, stack_snapshot });
    }

    let next_scope_id = max_scope_id.map(|m| m + 1).unwrap_or(0);
    let next_insertion_id = data.insertions.keys().max().map(|m| m + 1).unwrap_or(0);
    Ok((stack, arena, next_scope_id, next_insertion_id))
}

fn resolve_options(lens: &Lens<'_>, rec: &InsertionRecord) -> Result<CollectedOptions, RestoreError> {
    match &rec.options {
        None => Ok(CollectedOptions::Pending),
        Some(opts) => {
            let mut resolved = Vec::with_capacity(opts.len());
            for o in opts {
                resolved.push(resolve_choice_option(lens, o)?);
            }
            Ok(CollectedOptions::Collected(resolved))
        },
    }
}

fn resolve_scope_stack(
    lens: &Lens<'_>,
    store: &Store,
    evaluator: &dyn ExpressionEvaluator,
    function_names: &[String],
    records: &[ScopeRecord],
    max_scope_id: &mut Option<u64>,
) -> Result<Vec<RuntimeScope>, RestoreError> {
    let mut scopes: Vec<RuntimeScope> = Vec::with_capacity(records.len());
    for rec in records {
        // Innermost-first, matching `ScopeStack::locals_innermost_first` — the
        // same ordering `eval_state_decl` builds its `PathReader` from.
        let locals_so_far: Vec<&Fields> = scopes.iter().rev().filter_map(|s| s.local_state.as_ref()).collect();
        let scope = resolve_scope(lens, store, evaluator, function_names, &locals_so_far, rec)?;
        *max_scope_id = Some(max_scope_id.map_or(scope.id.0, |m| m.max(scope.id.0)));
        scopes.push(scope);
    }
    Ok(scopes)
}

/// Step 3: resolves one scope record. `body_index` and
/// `branch` aren't part of the save record — both are
/// recomputed here by locating `body_head` inside the live body, per the
/// doc comments on [`crate::scope::RuntimeScope::body_index`] and
/// `::branch`.
fn resolve_scope(
    lens: &Lens<'_>,
    store: &Store,
    evaluator: &dyn ExpressionEvaluator,
    function_names: &[String],
    locals_so_far: &[&Fields],
    rec: &ScopeRecord,
) -> Result<RuntimeScope, RestoreError> {
    let (beat_live, beat_saved) = resolve_beat(lens, &rec.beat)?;
    let node_live = resolve_node_near(lens, &rec.node, beat_saved, beat_live)?;

    let mut scope = RuntimeScope::new(ScopeId(rec.id), beat_live, node_live, rec.node.kind);
    scope.insertion = rec.insertion_id.map(InsertionId);
    scope.nested_beats = rec
        .nested_beats
        .iter()
        .filter_map(|b| lens.beat_by_path(&b.path))
        .map(|b| b.id)
        .collect();

    if let Some(head_ref) = &rec.body_head {
        let head_live = resolve_node_near(lens, head_ref, beat_saved, beat_live)?;
        let (body, branch) = locate_body(lens, node_live, rec.node.kind, head_live)?;
        let index = body
            .iter()
            .position(|n| n.id() == head_live)
            .ok_or(RestoreError::UnresolvableNode { expected_kind: head_ref.kind, saved_id: head_live })?;

        scope.body_head = Some(head_live);
        scope.body_index = index + 1;
        scope.branch = branch;

        if let Some(delta) = &rec.local_state {
            scope.local_state =
                Some(reconstruct_local_state(store, evaluator, function_names, locals_so_far, body, index, delta));
        }
    }

    Ok(scope)
}

/// Finds the enclosing beat for a scope record: dotted path
/// first, then id. Returns `(live id, saved id)` — the pair feeds the
/// section-offset computation for the rest of the scope's node ids.
fn resolve_beat(lens: &Lens<'_>, beat_ref: &BeatRef) -> Result<(NodeId, NodeId), RestoreError> {
    let saved_id =
        NodeId::from_save_string(&beat_ref.id).ok_or_else(|| RestoreError::UnknownBeatPath(beat_ref.path.clone()))?;
    if saved_id == ROOT_NODE_ID {
        return Ok((ROOT_NODE_ID, ROOT_NODE_ID));
    }
    if let Some(beat) = lens.beat_by_path(&beat_ref.path) {
        return Ok((beat.id, saved_id));
    }
    if lens.kind_of(saved_id) == Some(NodeKind::BeatDecl) {
        return Ok((saved_id, saved_id));
    }
    Err(RestoreError::UnknownBeatPath(beat_ref.path.clone()))
}

/// Resolves a node id recorded relative to a scope's enclosing beat,
/// tolerating a constant offset between the saved and live beat id within
/// the same section. Falls back to the saved id unshifted before giving
/// up, since an edit that didn't touch this section leaves ids untouched.
fn resolve_node_near(
    lens: &Lens<'_>,
    node_ref: &NodeRef,
    beat_saved: NodeId,
    beat_live: NodeId,
) -> Result<NodeId, RestoreError> {
    let saved_id = NodeId::from_save_string(&node_ref.id)
        .ok_or(RestoreError::UnresolvableNode { expected_kind: node_ref.kind, saved_id: beat_saved })?;

    if saved_id == beat_saved {
        if beat_live == ROOT_NODE_ID {
            return Ok(ROOT_NODE_ID);
        }
        return check_kind(lens, beat_live, node_ref.kind, saved_id);
    }

    if saved_id.section == beat_saved.section {
        let offset = beat_live.offset as i64 - beat_saved.offset as i64;
        let shifted = (saved_id.offset as i64 + offset).max(0) as u32;
        let candidate = NodeId::new(beat_live.section, shifted);
        if let Ok(resolved) = check_kind(lens, candidate, node_ref.kind, saved_id) {
            return Ok(resolved);
        }
    }

    check_kind(lens, saved_id, node_ref.kind, saved_id)
}

/// Resolves a node id with no beat context to shift against (insertion
/// origins, choice option source nodes) — direct id lookup only.
fn resolve_node(lens: &Lens<'_>, node_ref: &NodeRef) -> Result<NodeId, RestoreError> {
    let saved_id = NodeId::from_save_string(&node_ref.id).ok_or(RestoreError::UnresolvableNode {
        expected_kind: node_ref.kind,
        saved_id: NodeId::new(u32::MAX, u32::MAX),
    })?;
    check_kind(lens, saved_id, node_ref.kind, saved_id)
}

fn check_kind(lens: &Lens<'_>, id: NodeId, expected: NodeKind, saved_id: NodeId) -> Result<NodeId, RestoreError> {
    match lens.kind_of(id) {
        Some(kind) if kind == expected => Ok(id),
        Some(found) => Err(RestoreError::KindMismatch { saved_id, expected, found }),
        None => Err(RestoreError::UnresolvableNode { expected_kind: expected, saved_id }),
    }
}

/// Locates the live body a scope's `body_head` sits in, and for
/// `Conditional`/`Alternative` the branch it belongs to — derived by
/// scanning branches in order for the one containing `head`, since branch
/// selection isn't part of the save record either.
fn locate_body<'s>(
    lens: &Lens<'s>,
    node: NodeId,
    kind: NodeKind,
    head: NodeId,
) -> Result<(&'s [Node], Option<usize>), RestoreError> {
    match kind {
        NodeKind::Conditional | NodeKind::Alternative => {
            let mut idx = 0usize;
            loop {
                match lens.body_for(node, kind, Some(idx)) {
                    Some(body) if body.iter().any(|n| n.id() == head) => return Ok((body, Some(idx))),
                    Some(_) => idx += 1,
                    None => return Err(RestoreError::UnresolvableNode { expected_kind: kind, saved_id: head }),
                }
            }
        },
        _ => {
            let body = lens
                .body_for(node, kind, None)
                .ok_or(RestoreError::UnresolvableNode { expected_kind: kind, saved_id: head })?;
            Ok((body, None))
        },
    }
}

/// Re-derives a restored scope's temporary local state. The declared default
/// isn't itself saved, so this walks backward from `body_head` for the
/// last temporary `StateDecl` in the body and re-evaluates its field
/// expressions against the already-restored outer locals chain — exactly
/// the reader a live `eval_state_decl` would have built at the moment this
/// scope first declared it. A field whose expression can no longer
/// evaluate (e.g. it referenced a binding since removed) is simply dropped
/// from the declared defaults; the saved delta still applies on top.
fn reconstruct_local_state(
    store: &Store,
    evaluator: &dyn ExpressionEvaluator,
    function_names: &[String],
    locals_so_far: &[&Fields],
    body: &[Node],
    head_index: usize,
    delta: &BTreeMap<String, Value>,
) -> Fields {
    let declared = body[..=head_index].iter().rev().find_map(|n| match n {
        Node::StateDecl(d) if d.temporary => Some(d),
        _ => None,
    });

    let declared_fields = declared
        .map(|decl| {
            let reader = PathReader { store, locals: locals_so_far.to_vec(), function_names };
            let mut fields = BTreeMap::new();
            for (name, expr) in &decl.fields.fields {
                if let Ok(v) = evaluator.eval(expr, &reader) {
                    fields.insert(name.clone(), v);
                }
            }
            fields
        })
        .unwrap_or_default();

    Fields::restore(declared_fields, delta.clone())
}

fn resolve_choice_option(lens: &Lens<'_>, rec: &ChoiceOptionRecord) -> Result<ChoiceOption, RestoreError> {
    let source_option = resolve_node(lens, &rec.source_node)?;
    let tags = rec
        .tags
        .iter()
        .map(|t| InlineTag { offset: t.offset, value: t.value.clone(), closing: t.closing })
        .collect();
    Ok(ChoiceOption {
        display_text: rec.display_text.clone(),
        tags,
        enabled: rec.enabled,
        source_option,
        insertion: rec.insertion_id.map(InsertionId),
    })
}

/// Fallback beat selection: the outermost saved scope whose
/// enclosing beat still resolves, by dotted path. The root pseudo-beat
/// doesn't count as "a beat" to restart at — if every real beat on the
/// stack fails to resolve, this returns `None` and `resume()` falls
/// through to the script's first declared beat instead.
fn outermost_identifiable_beat(lens: &Lens<'_>, data: &SaveData) -> Option<String> {
    for rec in &data.stack {
        if let Ok((beat_live, _)) = resolve_beat(lens, &rec.beat) {
            if beat_live == ROOT_NODE_ID {
                continue;
            }
            if let Some(path) = lens.dotted_path(beat_live) {
                return Some(path.to_string());
            }
        }
    }
    None
}
