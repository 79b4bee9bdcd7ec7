//! Continuation Core and the `Interpreter`
//! that owns every other live runtime component.
//!
//! The body walker is written in continuation-passing style throughout:
//! every step takes an owned `Next` and either calls it once, abandons it
//! (parked awaiting a host callback), or abandons it permanently (a
//! transition tail-replaces the whole stack). No native `async` is used
//! anywhere in this crate — continuations are plain boxed
//! closures over `&mut Interpreter`, trampolined at host boundaries
//! in [`crate::trampoline`].

pub mod alternative;
pub mod choice;
pub mod eval;
pub mod transition;

use std::rc::Rc;

use log::{debug, trace};

use crate::ast::{BeatDecl, NodeId, NodeKind, Script};
use crate::error::RuntimeError;
use crate::expr::ExpressionEvaluator;
use crate::host::{Advance, DialogueEvent, FinishOutcome, Host, InlineTag, Options, Select};
use crate::lens::Lens;
use crate::scope::{ChoiceOption, InsertionArena, InsertionId, RuntimeScope, ScopeId, ScopeStack};
use crate::store::Store;
use crate::trampoline::Trampoline;

/// One step of continued work over the interpreter. Internal
/// continuations (between statements of the same body) are plain
/// `FnOnce(&mut Interpreter)`; only continuations actually handed to a host
/// callback are wrapped in a [`Trampoline`] (see [`Host`], [`Advance`],
/// [`Select`]).
pub type Next = Box<dyn FnOnce(&mut Interpreter)>;

/// The single-threaded cooperative engine. Owns the Store, Scope Stack, the insertion arena,
/// and the two monotonic id counters; everything
/// else (the Script, the expression evaluator, the host) is handed in at
/// construction.
pub struct Interpreter {
    pub(crate) script: Rc<Script>,
    pub(crate) store: Store,
    pub(crate) stack: ScopeStack,
    pub(crate) insertions: InsertionArena,
    pub(crate) next_scope_id: u64,
    pub(crate) next_insertion_id: u64,
    pub(crate) evaluator: Rc<dyn ExpressionEvaluator>,
    pub(crate) options: Options,
    /// Taken out for the duration of a host callback so the callback can
    /// receive `&mut Interpreter` without aliasing `self.host` (the
    /// standard pattern for "owned callback needs mutable access back to
    /// its owner" in safe Rust).
    pub(crate) host: Option<Box<dyn Host>>,
    pub(crate) finished: bool,
    /// Fallback beat recorded by a failed restore, consumed
    /// the next time `resume()` finds an empty stack.
    pub(crate) fallback_beat: Option<String>,
}

impl Interpreter {
    /// `start(script, ...)`: builds the Store from the script's
    /// declarations and runs from the first beat (or `options.beat`) until
    /// the first suspension.
    pub fn start(
        script: Rc<Script>,
        evaluator: Rc<dyn ExpressionEvaluator>,
        options: Options,
        host: Box<dyn Host>,
    ) -> Result<Interpreter, RuntimeError> {
        let store = Store::from_script(&script, evaluator.as_ref())?;
        let starting_beat = options.beat.clone();
        let mut interp = Interpreter {
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
            fallback_beat: None,
        };

        let lens = interp.lens();
        let target = match &starting_beat {
            Some(name) => lens
                .beat_by_path(name)
                .ok_or_else(|| RuntimeError::UnknownBeat(name.clone()))?,
            None => lens
                .root_beats()
                .first()
                .ok_or_else(|| RuntimeError::UnknownBeat("<no beats declared>".into()))?,
        };
        let target_id = target.id;
        drop(lens);

        transition::whole_stack_transition(&mut interp, target_id);
        Ok(interp)
    }

    /// Builds a fresh [`Lens`] over this interpreter's script. Cheap (an
    /// index build over however many nodes the script has); callers needing
    /// it across a `&mut self` borrow should clone `self.script` first (see
    /// call sites in [`transition`] and [`choice`]).
    pub(crate) fn lens(&self) -> Lens<'_> {
        Lens::build(&self.script)
    }

    pub(crate) fn fresh_scope_id(&mut self) -> ScopeId {
        let id = ScopeId(self.next_scope_id);
        self.next_scope_id += 1;
        id
    }

    pub(crate) fn fresh_insertion_id(&mut self) -> InsertionId {
        let id = InsertionId(self.next_insertion_id);
        self.next_insertion_id += 1;
        id
    }

    pub fn strict_access(&self) -> bool {
        self.options.strict_access
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Read accessor for host inspection. MUST only be called
    /// while no continuation is outstanding — this crate has no way to enforce that at the type level
    /// since it's a property of when the host chooses to call it.
    pub fn get_character(&self, name: &str) -> Option<&crate::store::Fields> {
        self.store.characters.get(name)
    }

    pub fn get_field(&self, name: &str) -> Option<&crate::value::Value> {
        self.store.top_level.get(name)
    }

    pub fn set_field(&mut self, name: &str, value: crate::value::Value) -> Result<(), RuntimeError> {
        let mut locals: Vec<&mut crate::store::Fields> = Vec::new();
        self.store
            .write_path(&[name.to_string()], &mut locals, value, self.options.strict_access)
    }

    /// Takes the host out for the duration of a callback, so `self` can be
    /// passed to it mutably.
    fn take_host(&mut self) -> Box<dyn Host> {
        self.host.take().expect("host contract: host present during a step")
    }

    fn restore_host(&mut self, host: Box<dyn Host>) {
        self.host = Some(host);
    }

    /// Invokes the host dialogue callback. `next` is trampolined.
    pub(crate) fn emit_dialogue(&mut self, character: Option<String>, text: String, tags: Vec<InlineTag>, next: Next) {
        trace!("dialogue: {:?} {:?}", character, text);
        let trampoline: Trampoline<Interpreter> = Trampoline::new();
        let for_advance = trampoline.clone();
        let target: crate::trampoline::Target<Interpreter, ()> = Box::new(move |i, ()| next(i));
        let advance = Advance {
            trampoline: for_advance,
            target,
        };

        let mut host = self.take_host();
        host.on_dialogue(
            self,
            DialogueEvent {
                character: character.as_deref(),
                text: &text,
                tags: &tags,
            },
            advance,
        );
        self.restore_host(host);
        trampoline.settle_and_drain(self);
    }

    /// Invokes the host choice callback.
    pub(crate) fn emit_choice(&mut self, options: Vec<ChoiceOption>, next: Box<dyn FnOnce(&mut Interpreter, usize)>) {
        trace!("choice: {} option(s)", options.len());
        let trampoline: Trampoline<Interpreter, usize> = Trampoline::new();
        let for_select = trampoline.clone();
        let target: crate::trampoline::Target<Interpreter, usize> = Box::new(move |i, idx| next(i, idx));
        let select = Select {
            trampoline: for_select,
            target,
        };

        let mut host = self.take_host();
        host.on_choice(self, &options, select);
        self.restore_host(host);
        trampoline.settle_and_drain(self);
    }

    /// Fires the finish trigger exactly once.
    pub(crate) fn fire_finish(&mut self, outcome: FinishOutcome) {
        if self.finished {
            return;
        }
        self.finished = true;
        debug!("run finished: {:?}", outcome);
        let mut host = self.take_host();
        host.on_finish(self, outcome);
        self.restore_host(host);
    }
}

/// Enters a body-bearing node's body as a new [`RuntimeScope`], with `next`
/// invoked once the body completes or the early-exit rule fires.
pub(crate) fn enter_body(
    interp: &mut Interpreter,
    beat: NodeId,
    node: NodeId,
    kind: NodeKind,
    branch: Option<usize>,
    insertion: Option<InsertionId>,
    next: Next,
) {
    let id = interp.fresh_scope_id();
    let mut scope = RuntimeScope::new(id, beat, node, kind);
    scope.branch = branch;
    scope.insertion = insertion;
    if kind == NodeKind::BeatDecl {
        trace!("enter beat body: {node}");
    }
    interp.stack.push(scope);
    advance(interp, next);
}

/// The body walker's `advance()`:
/// 1. If the currently attached insertion has been filled, pop and invoke
///    the parent `next` without evaluating anything else in this body.
/// 2. Else if there is a next body element, step to it and evaluate it.
/// 3. Else pop and invoke the parent `next`.
pub(crate) fn advance(interp: &mut Interpreter, next: Next) {
    let Some(top) = interp.stack.top() else {
        next(interp);
        return;
    };

    if let Some(ins_id) = top.insertion {
        let filled = interp
            .insertions
            .get(ins_id)
            .map(|ins| !ins.options.is_pending())
            .unwrap_or(false);
        if filled {
            interp.stack.pop();
            next(interp);
            return;
        }
    }

    let beat = top.beat;
    let node = top.node;
    let kind = top.node_kind;
    let branch = top.branch;
    let index = top.body_index;

    let script = Rc::clone(&interp.script);
    let lens = Lens::build(&script);
    let body = lens.body_for(node, kind, branch);
    let stepped = body.and_then(|b| b.get(index)).cloned();
    drop(lens);

    match stepped {
        Some(stmt) => {
            let stmt_id = stmt.id();
            if let Some(top_mut) = interp.stack.top_mut() {
                top_mut.body_head = Some(stmt_id);
                top_mut.body_index = index + 1;
            }
            let resume_body: Next = Box::new(move |i| advance(i, next));
            eval::eval_node(interp, beat, &stmt, resume_body);
        },
        None => {
            interp.stack.pop();
            next(interp);
        },
    }
}

/// Looks up a live AST node for dispatch convenience shared by several
/// modules (save/restore kind-checks, choice resolution).
pub(crate) fn node_kind(script: &Script, id: NodeId) -> Option<NodeKind> {
    Lens::build(script).kind_of(id)
}

/// Aborts the current step and unwinds: fires
/// the finish trigger with an error outcome, intentionally abandoning
/// whatever continuation the caller held.
pub(crate) fn fail(interp: &mut Interpreter, err: RuntimeError) {
    interp.fire_finish(FinishOutcome::Error(err));
}
