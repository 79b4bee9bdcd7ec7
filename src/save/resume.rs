//! Resume dispatch: rebuilding the live continuation chain.
//!
//! Used on both paths that can no longer hold the original Rust closures —
//! restoring a save blob, and selection dispatch for an insertion-sourced
//! choice option — by re-descending `frames` outermost to
//! innermost and simulating the continuations that would have existed had
//! execution reached that position naturally.

use std::rc::Rc;

use crate::ast::{Node, NodeKind};
use crate::interpreter::{self, alternative, choice, eval, Interpreter, Next};
use crate::lens::Lens;
use crate::scope::RuntimeScope;

/// `resume(scope index, next)`. `frames` is the full target
/// stack, outermost first; `index` is the current position. Pushes
/// `frames[index]` before recursing or dispatching so `Interpreter::stack`
/// always reflects the position being resumed, matching what a live walk
/// would have on top of the stack at each depth.
pub(crate) fn resume_frames(interp: &mut Interpreter, frames: Vec<RuntimeScope>, index: usize, next: Next) {
    if index >= frames.len() {
        return next(interp);
    }

    let frame = frames[index].clone();
    let is_leaf = index == frames.len() - 1;
    interp.stack.push(frame.clone());

    if is_leaf {
        leaf_resume(interp, frame, next);
        return;
    }

    let continue_outer: Next = Box::new(move |i| interpreter::advance(i, next));
    resume_frames(interp, frames, index + 1, continue_outer);
}

/// Leaf case: dispatch by the in-flight statement's own kind.
/// A scope whose body was never entered (`body_head` is `None`) has nothing
/// to re-dispatch — just start the body walker fresh.
fn leaf_resume(interp: &mut Interpreter, frame: RuntimeScope, next: Next) {
    let Some(body_head) = frame.body_head else {
        return interpreter::advance(interp, next);
    };

    let script = Rc::clone(&interp.script);
    let lens = Lens::build(&script);
    let stmt = match lens.get(body_head) {
        Some(crate::lens::Indexed::Node(n)) => Some((*n).clone()),
        _ => None,
    };
    let kind = lens.kind_of(body_head);
    drop(lens);

    // The paused statement itself still needs to run, but once it resolves
    // this leaf's own body isn't done — whatever comes after `body_head` in
    // the same scope still has to be walked (and the scope popped) before
    // `next` fires, exactly as a live `advance()` would. Re-wrap `next`
    // through the body walker rather than handing it to the statement
    // directly, or the rest of this frame's body (and every enclosing
    // frame's epilogue) gets skipped. The fallback arm below already gets
    // this for free from a bare `advance(next)`, so it keeps `next` unwrapped.
    match (kind, stmt) {
        (Some(NodeKind::Choice), Some(Node::Choice(block))) => {
            let continue_body: Next = Box::new(move |i| interpreter::advance(i, next));
            choice::eval_choice(interp, frame.beat, &block, continue_body);
        },
        (Some(NodeKind::Alternative), Some(Node::Alternative(block))) => {
            let continue_body: Next = Box::new(move |i| interpreter::advance(i, next));
            alternative::reenter_alternative(interp, frame.beat, &block, continue_body);
        },
        (Some(NodeKind::Text) | Some(NodeKind::Dialogue), Some(node)) => {
            let continue_body: Next = Box::new(move |i| interpreter::advance(i, next));
            eval::eval_node(interp, frame.beat, &node, continue_body);
        },
        // The statement at `body_head` isn't one of the suspending kinds
        // above, so nothing needs re-dispatching — `body_index` already
        // points past it. A single `advance(next)` continues this frame
        // exactly like the live walker would; wrapping it again here would
        // advance the parent frame twice.
        _ => interpreter::advance(interp, next),
    }
}

impl Interpreter {
    /// Public entry point the host calls once after [`crate::save::restore::restore`].
    /// With a populated stack, re-descends
    /// it to fire the events a natural walk would have produced from this
    /// position. With an empty stack and a recorded fallback beat, starts
    /// fresh at that beat instead.
    pub fn resume(&mut self) {
        let frames = std::mem::take(&mut self.stack.frames);
        if frames.is_empty() {
            if let Some(beat_path) = self.fallback_beat.take() {
                let target = self.lens().beat_by_path(&beat_path).map(|b| b.id).or_else(|| self.lens().root_beats().first().map(|b| b.id));
                if let Some(id) = target {
                    crate::interpreter::transition::whole_stack_transition(self, id);
                }
            }
            return;
        }

        let finish: Next = Box::new(|i| i.fire_finish(crate::host::FinishOutcome::Completed));
        resume_frames(self, frames, 0, finish);
    }
}
