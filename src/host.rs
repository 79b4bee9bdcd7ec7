//! Host-facing API surface: callback traits, continuations, and
//! the `Options` configuration bag.

use crate::error::RuntimeError;
use crate::expr::HostFunction;
use crate::interpreter::Interpreter;
use crate::scope::ChoiceOption;
use crate::trampoline::{Target, Trampoline};

/// One inline tag found in a text template, ordered by offset in the plain
/// (marker-stripped) text handed to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineTag {
    pub offset: usize,
    pub value: String,
    pub closing: bool,
}

/// What [`Host::on_dialogue`] receives.
pub struct DialogueEvent<'a> {
    pub character: Option<&'a str>,
    pub text: &'a str,
    pub tags: &'a [InlineTag],
}

/// Terminal state of a run, delivered exactly once to [`Host::on_finish`].
#[derive(Debug)]
pub enum FinishOutcome {
    Completed,
    Error(RuntimeError),
}

/// A one-shot dialogue-advance continuation. Consuming `self` on [`Advance::call`] makes a second call
/// a compile error rather than a runtime one — strictly stronger than the
/// contract requires.
pub struct Advance {
    pub(crate) trampoline: Trampoline<Interpreter>,
    pub(crate) target: Target<Interpreter, ()>,
}

impl Advance {
    pub fn call(self, interpreter: &mut Interpreter) {
        self.trampoline.call(interpreter, (), self.target);
    }
}

/// A one-shot choice-selection continuation.
pub struct Select {
    pub(crate) trampoline: Trampoline<Interpreter, usize>,
    pub(crate) target: Target<Interpreter, usize>,
}

impl Select {
    pub fn call(self, interpreter: &mut Interpreter, index: usize) {
        self.trampoline.call(interpreter, index, self.target);
    }
}

/// The three suspension-point callbacks a host implements.
///
/// Each method receives `&mut Interpreter` so it may call the supplied
/// continuation immediately, before returning. To invoke it
/// later, store the continuation and call it from wherever the host next
/// has a `&mut Interpreter` in hand — typically the next turn of the
/// host's own event loop.
pub trait Host {
    fn on_dialogue(&mut self, interpreter: &mut Interpreter, event: DialogueEvent<'_>, advance: Advance);
    fn on_choice(&mut self, interpreter: &mut Interpreter, options: &[ChoiceOption], select: Select);
    fn on_finish(&mut self, interpreter: &mut Interpreter, outcome: FinishOutcome);
}

/// Start-time configuration.
#[derive(Default)]
pub struct Options {
    pub functions: std::collections::HashMap<String, HostFunction>,
    pub strict_access: bool,
    pub translations: std::collections::HashMap<String, String>,
    /// Beat to start from; defaults to the script's first top-level beat.
    pub beat: Option<String>,
}

impl Options {
    pub fn new() -> Self {
        Options::default()
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_access = strict;
        self
    }

    pub fn starting_beat(mut self, beat: impl Into<String>) -> Self {
        self.beat = Some(beat.into());
        self
    }

    pub fn register_function(mut self, name: impl Into<String>, f: HostFunction) -> Self {
        self.functions.insert(name.into(), f);
        self
    }

    pub(crate) fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }
}
