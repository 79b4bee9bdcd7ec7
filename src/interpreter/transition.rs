//! Transition & Call Dispatcher.

use crate::ast::{Call, NodeKind, Transition};
use crate::error::RuntimeError;
use crate::host::FinishOutcome;
use crate::lens::{TransitionTarget, ROOT_NODE_ID};
use crate::scope::InsertionArena;
use crate::store::PathReader;
use crate::value::Value;

use super::{enter_body, fail, Interpreter, Next};

/// `-> Target`: pops every scope, resets both id counters,
/// allocates a fresh finish trigger, and enters the target beat's body with
/// the trigger as the outermost `next`. Any continuation the caller held is
/// intentionally abandoned — there is no return from a transition.
pub(crate) fn eval_transition(interp: &mut Interpreter, beat: crate::ast::NodeId, t: &Transition) {
    let resolved = {
        let lens = interp.lens();
        lens.resolve_transition_target(beat, &t.target).map(|tt| match tt {
            TransitionTarget::Finish => Resolved::Finish,
            TransitionTarget::Root => Resolved::Beat(ROOT_NODE_ID),
            TransitionTarget::Beat(b) => Resolved::Beat(b.id),
        })
    };

    match resolved {
        Some(Resolved::Finish) => {
            interp.stack = crate::scope::ScopeStack::new();
            interp.fire_finish(FinishOutcome::Completed);
        },
        Some(Resolved::Beat(id)) => whole_stack_transition(interp, id),
        None => fail(interp, RuntimeError::UnknownBeat(t.target.clone())),
    }
}

enum Resolved {
    Finish,
    Beat(crate::ast::NodeId),
}

/// Implements the "pop everything, reset counters, fresh finish trigger"
/// machinery shared by the initial `start()` entry and every later `->`
/// transition.
pub(crate) fn whole_stack_transition(interp: &mut Interpreter, target_beat: crate::ast::NodeId) {
    interp.stack = crate::scope::ScopeStack::new();
    interp.insertions = InsertionArena::new();
    interp.next_scope_id = 0;
    interp.next_insertion_id = 0;

    let finish: Next = Box::new(|i| i.fire_finish(FinishOutcome::Completed));
    enter_body(interp, target_beat, target_beat, NodeKind::BeatDecl, None, None, finish);
}

/// `Target(...)`: a subroutine call. Resolves like a
/// transition; if it resolves to a beat, the callee's body runs with the
/// caller's own `next` as continuation (the callee's scope pops naturally
/// when its body completes, and the caller resumes). If `Target` isn't a
/// beat, falls through to a host-registered function.
pub(crate) fn eval_call(interp: &mut Interpreter, beat: crate::ast::NodeId, c: &Call, next: Next) {
    let resolved = {
        let lens = interp.lens();
        lens.resolve_transition_target(beat, &c.target)
    };

    match resolved {
        Some(TransitionTarget::Beat(target)) => {
            let target_id = target.id;
            enter_body(interp, target_id, target_id, NodeKind::BeatDecl, None, None, next);
        },
        Some(TransitionTarget::Root) => {
            enter_body(interp, ROOT_NODE_ID, ROOT_NODE_ID, NodeKind::BeatDecl, None, None, next);
        },
        Some(TransitionTarget::Finish) => {
            interp.fire_finish(FinishOutcome::Completed);
        },
        None => call_host_function(interp, c, next),
    }
}

fn call_host_function(interp: &mut Interpreter, c: &Call, next: Next) {
    let function_names = interp.options.function_names();
    let args: Result<Vec<Value>, RuntimeError> = {
        let locals = interp.stack.locals_innermost_first();
        let reader = PathReader {
            store: &interp.store,
            locals,
            function_names: &function_names,
        };
        c.args.iter().map(|a| interp.evaluator.eval(a, &reader)).collect()
    };
    let args = match args {
        Ok(a) => a,
        Err(e) => return fail(interp, e),
    };

    let result = {
        let host_fn = interp.options.functions.get(&c.target);
        host_fn.map(|f| f(&args))
    };

    match result {
        Some(Ok(_value)) => next(interp),
        Some(Err(e)) => fail(interp, e),
        None => fail(interp, RuntimeError::UnknownBeat(c.target.clone())),
    }
}
