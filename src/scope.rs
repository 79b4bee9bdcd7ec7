//! The Scope Stack and the insertion lifecycle that flattens choices.
//!
//! `RuntimeInsertion` holds a scope-stack snapshot, and a scope can point
//! back at an insertion — a graph with cycles. Live insertions are kept in
//! an id-keyed arena owned by the
//! [`crate::interpreter::Interpreter`]; scopes only carry the integer id.

use std::collections::BTreeMap;

use crate::ast::{NodeId, NodeKind};
use crate::store::Fields;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct InsertionId(pub u64);

/// One frame of the Scope Stack.
///
/// Invariant: `body_head` is always an id drawn from `node`'s own body (or
/// `None` before the first step / after the last), enforced by the body
/// walker in [`crate::interpreter`].
#[derive(Debug, Clone)]
pub struct RuntimeScope {
    pub id: ScopeId,
    /// The enclosing beat's id, for the "beat walk" invariant checked by
    /// tests.
    pub beat: NodeId,
    /// The AST node this scope is attached to: a beat body, block, choice,
    /// or option body.
    pub node: NodeId,
    pub node_kind: NodeKind,
    /// The instruction pointer within `node`'s body; `None` before the
    /// first step and after the last.
    pub body_head: Option<NodeId>,
    /// Count of body elements already consumed (so `body_head` is always
    /// `body[body_index - 1]`). Not part of the save record; recomputed by the body-resumer on
    /// restore by locating `body_head` inside the live body.
    pub body_index: usize,
    /// Which branch of a [`crate::ast::ConditionalBlock`] or
    /// [`crate::ast::AlternativeBlock`] this scope is walking, when `node`
    /// is one of those. Like `body_index`, this is a live-execution
    /// convenience, not a save-record field: restore re-derives it by
    /// scanning branches for the one containing the saved `body_head`.
    pub branch: Option<usize>,
    /// Nested beat declarations encountered while walking this scope's
    /// body, for save records.
    pub nested_beats: Vec<NodeId>,
    /// Non-temporary state lives in `Store::node_state`; temporary state
    /// lives only here, popped with the scope.
    pub local_state: Option<Fields>,
    /// The insertion this scope is attached to while being collected into,
    /// if any.
    pub insertion: Option<InsertionId>,
}

impl RuntimeScope {
    pub fn new(id: ScopeId, beat: NodeId, node: NodeId, node_kind: NodeKind) -> Self {
        RuntimeScope {
            id,
            beat,
            node,
            node_kind,
            body_head: None,
            body_index: 0,
            branch: None,
            nested_beats: Vec::new(),
            local_state: None,
            insertion: None,
        }
    }
}

/// A runtime choice option, as presented to the host.
#[derive(Debug, Clone)]
pub struct ChoiceOption {
    pub display_text: String,
    pub tags: Vec<crate::host::InlineTag>,
    pub enabled: bool,
    pub source_option: NodeId,
    /// Non-owning back-reference: which [`RuntimeInsertion`] (by id) this
    /// option's body came from flattened in from, if any.
    pub insertion: Option<InsertionId>,
}

/// Either a collected option list, or a marker that collection hasn't
/// reached this insertion's target choice yet.
#[derive(Debug, Clone)]
pub enum CollectedOptions {
    Pending,
    Collected(Vec<ChoiceOption>),
}

impl CollectedOptions {
    pub fn is_pending(&self) -> bool {
        matches!(self, CollectedOptions::Pending)
    }
}

/// A pending or completed insertion.
///
/// Created the moment an insertion node is first processed during Phase 1
/// collection; `options` stays `Pending` and `stack_snapshot`
/// stays `None` until the target beat's choice block is reached.
#[derive(Debug, Clone)]
pub struct RuntimeInsertion {
    pub id: InsertionId,
    pub origin: NodeId,
    pub options: CollectedOptions,
    pub stack_snapshot: Option<Vec<RuntimeScope>>,
}

impl RuntimeInsertion {
    pub fn new(id: InsertionId, origin: NodeId) -> Self {
        RuntimeInsertion {
            id,
            origin,
            options: CollectedOptions::Pending,
            stack_snapshot: None,
        }
    }
}

/// An ordered sequence of runtime scopes: the Scope Stack.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    pub frames: Vec<RuntimeScope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack { frames: Vec::new() }
    }

    pub fn push(&mut self, scope: RuntimeScope) {
        self.frames.push(scope);
    }

    pub fn pop(&mut self) -> Option<RuntimeScope> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&RuntimeScope> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut RuntimeScope> {
        self.frames.last_mut()
    }

    pub fn replace(&mut self, frames: Vec<RuntimeScope>) {
        self.frames = frames;
    }

    /// Clears the attached insertion of every scope on the stack, not only
    /// the top, so the early-exit rule no longer fires anywhere on the path.
    pub fn clear_all_insertions(&mut self) {
        for frame in &mut self.frames {
            frame.insertion = None;
        }
    }

    /// Local state frames innermost-first, used to build a
    /// [`crate::store::PathReader`].
    pub fn locals_innermost_first(&self) -> Vec<&Fields> {
        self.frames
            .iter()
            .rev()
            .filter_map(|f| f.local_state.as_ref())
            .collect()
    }

    /// Local state frames outer-to-inner, the order
    /// [`crate::store::Store::write_path`] expects (it walks innermost-first
    /// itself via an internal `.rev()`).
    pub fn locals_outer_to_inner_mut(&mut self) -> Vec<&mut Fields> {
        self.frames
            .iter_mut()
            .filter_map(|f| f.local_state.as_mut())
            .collect()
    }
}

/// Id-keyed arena of live insertions, owned exclusively by the Interpreter.
#[derive(Debug, Clone, Default)]
pub struct InsertionArena {
    pub insertions: BTreeMap<InsertionId, RuntimeInsertion>,
}

impl InsertionArena {
    pub fn new() -> Self {
        InsertionArena::default()
    }

    pub fn insert(&mut self, insertion: RuntimeInsertion) {
        self.insertions.insert(insertion.id, insertion);
    }

    pub fn get(&self, id: InsertionId) -> Option<&RuntimeInsertion> {
        self.insertions.get(&id)
    }

    pub fn get_mut(&mut self, id: InsertionId) -> Option<&mut RuntimeInsertion> {
        self.insertions.get_mut(&id)
    }
}
