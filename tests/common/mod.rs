//! Shared script-construction helpers and a recording test host, used by
//! both the scenario tests and the property tests.
//!
//! Scripts here are built by hand rather than parsed from source text —
//! there is no parser in this crate — mirroring the style of the small
//! fixture helpers already used in `src/lens.rs`'s own unit tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use loreline::ast::{
    AlternativeBlock, AlternativeMode, AssignOp, Assignment, BeatDecl, Call, CharacterDecl,
    ChoiceBlock, ChoiceEntry, ChoiceOptionDecl, InsertionDecl, Node, NodeId, Path, StateDecl,
    StateFields, Template, TemplatePart, Transition,
};
use loreline::expr::Expr;
use loreline::host::{Advance, DialogueEvent, FinishOutcome, Host, Select};
use loreline::interpreter::Interpreter;
use loreline::scope::ChoiceOption;

pub fn nid(offset: u32) -> NodeId {
    NodeId::new(0, offset)
}

pub fn beat(id: u32, name: &str, body: Vec<Node>) -> BeatDecl {
    BeatDecl {
        id: nid(id),
        name: name.to_string(),
        body,
        nested: Vec::new(),
    }
}

pub fn character(name: &str) -> CharacterDecl {
    CharacterDecl {
        name: name.to_string(),
        fields: StateFields::default(),
    }
}

pub fn top_state(id: u32, fields: Vec<(&str, Expr)>) -> StateDecl {
    StateDecl {
        id: nid(id),
        temporary: false,
        fields: StateFields {
            fields: fields.into_iter().map(|(n, e)| (n.to_string(), e)).collect(),
        },
    }
}

pub fn text(id: u32, s: impl Into<String>) -> Node {
    Node::Text {
        id: nid(id),
        template: Template::plain(s),
    }
}

/// A template of the form `$path suffix`, e.g. `text_with_path(id, &["beans"], " left")`
/// renders as the current value of `beans` followed by `" left"`.
pub fn text_with_path(id: u32, path: &[&str], suffix: &str) -> Node {
    Node::Text {
        id: nid(id),
        template: Template {
            parts: vec![
                TemplatePart::Expression(Expr::path(path)),
                TemplatePart::Raw(suffix.to_string()),
            ],
        },
    }
}

pub fn dialogue(id: u32, character: &str, s: impl Into<String>) -> Node {
    Node::Dialogue {
        id: nid(id),
        character: character.to_string(),
        template: Template::plain(s),
    }
}

pub fn assign(id: u32, name: &str, op: AssignOp, value: Expr) -> Node {
    Node::Assignment(Assignment {
        id: nid(id),
        path: Path::single(name),
        op,
        value,
    })
}

pub fn transition(id: u32, target: &str) -> Node {
    Node::Transition(Transition {
        id: nid(id),
        target: target.to_string(),
    })
}

pub fn call(id: u32, target: &str) -> Node {
    Node::Call(Call {
        id: nid(id),
        target: target.to_string(),
        args: Vec::new(),
    })
}

pub fn option(id: u32, text: &str, body: Vec<Node>) -> ChoiceEntry {
    ChoiceEntry::Option(ChoiceOptionDecl {
        id: nid(id),
        text: Template::plain(text),
        guard: None,
        body,
    })
}

pub fn insertion(id: u32, target: &str) -> ChoiceEntry {
    ChoiceEntry::Insertion(InsertionDecl {
        id: nid(id),
        target: target.to_string(),
    })
}

pub fn choice(id: u32, entries: Vec<ChoiceEntry>) -> Node {
    Node::Choice(ChoiceBlock { id: nid(id), entries })
}

pub fn alternative(id: u32, mode: AlternativeMode, branches: Vec<Vec<Node>>) -> Node {
    Node::Alternative(AlternativeBlock { id: nid(id), mode, branches })
}

/// One observed host callback, flattened to the fields the tests assert on.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Dialogue { character: Option<String>, text: String },
    Choice { options: Vec<String> },
    Finish(FinishKind),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinishKind {
    Completed,
    Error(String),
}

/// A [`Host`] that resolves every suspension synchronously and in source
/// order, recording the event stream for assertion.
///
/// Dialogue always auto-advances unless `pause_after_dialogue` names the
/// 1-indexed event count at which to stop — the continuation is simply
/// dropped, leaving the interpreter parked exactly as a host that hasn't
/// gotten around to calling it yet would. Choice auto-selects from a
/// scripted queue; once the queue is empty, a choice event pauses the same
/// way.
pub struct RecordingHost {
    events: Rc<RefCell<Vec<Event>>>,
    selections: RefCell<VecDeque<usize>>,
    pause_after_dialogue: Option<usize>,
}

pub fn recording_host(selections: Vec<usize>, pause_after_dialogue: Option<usize>) -> (RecordingHost, Rc<RefCell<Vec<Event>>>) {
    let events = Rc::new(RefCell::new(Vec::new()));
    let host = RecordingHost {
        events: events.clone(),
        selections: RefCell::new(selections.into_iter().collect()),
        pause_after_dialogue,
    };
    (host, events)
}

impl Host for RecordingHost {
    fn on_dialogue(&mut self, interpreter: &mut Interpreter, event: DialogueEvent<'_>, advance: Advance) {
        self.events.borrow_mut().push(Event::Dialogue {
            character: event.character.map(|s| s.to_string()),
            text: event.text.to_string(),
        });
        let count = self.events.borrow().len();
        if Some(count) == self.pause_after_dialogue {
            return;
        }
        advance.call(interpreter);
    }

    fn on_choice(&mut self, interpreter: &mut Interpreter, options: &[ChoiceOption], select: Select) {
        self.events.borrow_mut().push(Event::Choice {
            options: options.iter().map(|o| o.display_text.clone()).collect(),
        });
        if let Some(idx) = self.selections.borrow_mut().pop_front() {
            select.call(interpreter, idx);
        }
    }

    fn on_finish(&mut self, _interpreter: &mut Interpreter, outcome: FinishOutcome) {
        let kind = match outcome {
            FinishOutcome::Completed => FinishKind::Completed,
            FinishOutcome::Error(e) => FinishKind::Error(e.to_string()),
        };
        self.events.borrow_mut().push(Event::Finish(kind));
    }
}
