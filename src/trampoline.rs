//! The sync/async trampoline.
//!
//! Every continuation handed to a host-facing callback (dialogue, choice)
//! is wrapped here. If the host invokes it synchronously (before returning
//! from the callback), the wrapped call is queued rather than run
//! immediately; once the callback returns, the engine drains the queue
//! iteratively. This converts recursive synchronous callback chains of
//! unbounded depth into iteration without reaching for native async: the
//! host controls timing and may not have any.
//!
//! `Arg` carries whatever the resumption needs beyond `&mut I` itself — unit
//! for a dialogue advance, a chosen index for a choice selection.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A boxed, one-shot unit of continued work over the interpreter. `'static`
/// because a host is free to stash this past the stack frame that produced
/// it.
pub type Target<I, Arg> = Box<dyn FnOnce(&mut I, Arg)>;

struct Inner<I, Arg> {
    synchronous: bool,
    queue: VecDeque<(Target<I, Arg>, Arg)>,
}

/// The sync/async wrapper. Cloning shares the same
/// underlying queue and mode flag — every continuation derived from one
/// host interaction drains through the same trampoline.
pub struct Trampoline<I, Arg = ()> {
    inner: Rc<RefCell<Inner<I, Arg>>>,
}

impl<I, Arg> Clone for Trampoline<I, Arg> {
    fn clone(&self) -> Self {
        Trampoline {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<I, Arg> Trampoline<I, Arg> {
    /// Creates a trampoline starting in synchronous mode: calls made before
    /// the host returns from its callback are queued, not run.
    pub fn new() -> Self {
        Trampoline {
            inner: Rc::new(RefCell::new(Inner {
                synchronous: true,
                queue: VecDeque::new(),
            })),
        }
    }

    /// Invokes `target` against the interpreter, following the wrapper's
    /// call behavior: queue it if still synchronous, else run it
    /// immediately and drain anything it or later calls enqueue.
    pub fn call(&self, interpreter: &mut I, arg: Arg, target: Target<I, Arg>) {
        let still_synchronous = self.inner.borrow().synchronous;
        if still_synchronous {
            self.inner.borrow_mut().queue.push_back((target, arg));
        } else {
            target(interpreter, arg);
            self.drain(interpreter);
        }
    }

    /// Flips the wrapper to asynchronous mode and drains the queue. Called
    /// once the enclosing code has handed the wrapped continuation to a
    /// host callback and that callback has returned.
    pub fn settle_and_drain(&self, interpreter: &mut I) {
        self.inner.borrow_mut().synchronous = false;
        self.drain(interpreter);
    }

    fn drain(&self, interpreter: &mut I) {
        loop {
            let next = self.inner.borrow_mut().queue.pop_front();
            match next {
                Some((target, arg)) => target(interpreter, arg),
                None => break,
            }
        }
    }
}

impl<I, Arg> Default for Trampoline<I, Arg> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(i32);

    #[test]
    fn synchronous_calls_queue_instead_of_recursing() {
        let trampoline: Trampoline<Counter> = Trampoline::new();
        let mut counter = Counter(0);

        // Simulate a deeply "recursive" synchronous caller: each call
        // enqueues the next instead of calling it inline.
        for _ in 0..10_000 {
            trampoline.call(&mut counter, (), Box::new(|c: &mut Counter, _| c.0 += 1));
        }

        assert_eq!(counter.0, 0, "still synchronous: nothing has run yet");
        trampoline.settle_and_drain(&mut counter);
        assert_eq!(counter.0, 10_000);
    }

    #[test]
    fn asynchronous_call_runs_immediately_after_settle() {
        let trampoline: Trampoline<Counter> = Trampoline::new();
        let mut counter = Counter(0);
        trampoline.settle_and_drain(&mut counter);
        trampoline.call(&mut counter, (), Box::new(|c, _| c.0 += 1));
        assert_eq!(counter.0, 1);
    }

    #[test]
    fn arg_is_threaded_through_to_target() {
        let trampoline: Trampoline<Counter, i32> = Trampoline::new();
        let mut counter = Counter(0);
        trampoline.call(&mut counter, 7, Box::new(|c, arg| c.0 = arg));
        trampoline.settle_and_drain(&mut counter);
        assert_eq!(counter.0, 7);
    }
}
