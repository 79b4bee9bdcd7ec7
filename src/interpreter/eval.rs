//! Statement evaluators.
//!
//! Every evaluator has the shape `(interp, beat, node, next)` and follows
//! the same step contract: call `next` at most once, synchronously
//! or after a host round-trip, or abandon it entirely (transition, error).

use crate::ast::{
    Assignment, AssignOp, ConditionalBlock, Node, NodeId, StateDecl, Template, TemplatePart,
};
use crate::error::RuntimeError;
use crate::expr::{eval_binary, BinaryOp};
use crate::host::InlineTag;
use crate::store::{Fields, PathReader};
use crate::value::Value;

use super::{alternative, choice, enter_body, fail, transition, Interpreter, Next};

pub(crate) fn eval_node(interp: &mut Interpreter, beat: NodeId, node: &Node, next: Next) {
    match node {
        Node::Text { template, .. } => eval_text(interp, None, template, next),
        Node::Dialogue { character, template, .. } => {
            if !interp.store.characters.contains_key(character) {
                return fail(interp, RuntimeError::UnknownCharacter(character.clone()));
            }
            eval_text(interp, Some(character.clone()), template, next);
        },
        Node::Assignment(a) => eval_assignment(interp, a, next),
        Node::Conditional(c) => eval_conditional(interp, beat, c, next),
        Node::Alternative(a) => alternative::eval_alternative(interp, beat, a, next),
        Node::Call(c) => transition::eval_call(interp, beat, c, next),
        Node::Transition(t) => transition::eval_transition(interp, beat, t),
        Node::StateDecl(s) => eval_state_decl(interp, s, next),
        Node::Choice(c) => choice::eval_choice(interp, beat, c, next),
        Node::BeatDecl(b) => {
            // A beat declared inline in a body only registers itself (scope
            // records carry `nested_beats`); it does not run.
            if let Some(top) = interp.stack.top_mut() {
                top.nested_beats.push(b.id);
            }
            next(interp);
        },
    }
}

/// Renders a text template against the current local-state chain: plain
/// text with interpolations substituted and tag markers stripped, plus the
/// ordered tag list.
pub(crate) fn render_template(interp: &Interpreter, template: &Template) -> Result<(String, Vec<InlineTag>), RuntimeError> {
    let locals = interp.stack.locals_innermost_first();
    let function_names = interp.options.function_names();
    let reader = PathReader {
        store: &interp.store,
        locals,
        function_names: &function_names,
    };

    let mut text = String::new();
    let mut tags = Vec::new();
    for part in &template.parts {
        match part {
            TemplatePart::Raw(s) => text.push_str(s),
            TemplatePart::Expression(expr) => {
                let value = interp.evaluator.eval(expr, &reader)?;
                text.push_str(&interp.store.display_value(&value));
            },
            TemplatePart::Tag { name, closing } => {
                tags.push(InlineTag {
                    offset: text.len(),
                    value: name.clone(),
                    closing: *closing,
                });
            },
        }
    }
    Ok((text, tags))
}

fn eval_text(interp: &mut Interpreter, character: Option<String>, template: &Template, next: Next) {
    match render_template(interp, template) {
        Ok((text, tags)) => interp.emit_dialogue(character, text, tags, next),
        Err(e) => fail(interp, e),
    }
}

fn eval_assignment(interp: &mut Interpreter, a: &Assignment, next: Next) {
    let rhs = {
        let function_names = interp.options.function_names();
        let locals = interp.stack.locals_innermost_first();
        let reader = PathReader {
            store: &interp.store,
            locals,
            function_names: &function_names,
        };
        interp.evaluator.eval(&a.value, &reader)
    };
    let rhs = match rhs {
        Ok(v) => v,
        Err(e) => return fail(interp, e),
    };

    let new_value = match a.op {
        AssignOp::Set => rhs,
        _ => {
            let current = {
                let function_names = interp.options.function_names();
                let locals = interp.stack.locals_innermost_first();
                interp.store.read_path(&a.path.segments, &locals, &function_names)
            };
            let current = match current {
                Some(v) => v,
                None => {
                    return fail(
                        interp,
                        RuntimeError::UndefinedBinding(a.path.segments.join(".")),
                    )
                },
            };
            let op = match a.op {
                AssignOp::AddAssign => BinaryOp::Add,
                AssignOp::SubAssign => BinaryOp::Sub,
                AssignOp::MulAssign => BinaryOp::Mul,
                AssignOp::DivAssign => BinaryOp::Div,
                AssignOp::Set => unreachable!("handled above"),
            };
            match eval_binary(op, current, rhs) {
                Ok(v) => v,
                Err(e) => return fail(interp, e),
            }
        },
    };

    if let Err(e) = write_path(interp, &a.path.segments, new_value) {
        return fail(interp, e);
    }
    next(interp);
}

/// Splits the borrow of `interp` across `store`/`stack`/`options` so the
/// write path can walk the live local-state chain mutably
/// without a self-referential method on `Interpreter`.
fn write_path(interp: &mut Interpreter, segments: &[String], value: Value) -> Result<(), RuntimeError> {
    let Interpreter { store, stack, options, .. } = interp;
    let mut locals: Vec<&mut Fields> = stack.locals_outer_to_inner_mut();
    store.write_path(segments, &mut locals, value, options.strict_access)
}

fn eval_conditional(interp: &mut Interpreter, beat: NodeId, c: &ConditionalBlock, next: Next) {
    let function_names = interp.options.function_names();
    let chosen = {
        let locals = interp.stack.locals_innermost_first();
        let reader = PathReader {
            store: &interp.store,
            locals,
            function_names: &function_names,
        };
        let mut chosen = None;
        for (index, (condition, _)) in c.branches.iter().enumerate() {
            let enter = match condition {
                None => true,
                Some(expr) => match interp.evaluator.eval(expr, &reader) {
                    Ok(v) => v.truthy(),
                    Err(e) => return fail(interp, e),
                },
            };
            if enter {
                chosen = Some(index);
                break;
            }
        }
        chosen
    };

    match chosen {
        Some(index) => enter_body(interp, beat, c.id, crate::ast::NodeKind::Conditional, Some(index), None, next),
        None => next(interp),
    }
}

/// Local state declaration: temporary state lives only on the
/// enclosing scope; non-temporary state lives in `Store::node_state`, keyed
/// by this declaration's id, and is never re-initialized once present.
fn eval_state_decl(interp: &mut Interpreter, decl: &StateDecl, next: Next) {
    let function_names = interp.options.function_names();
    let fields = {
        let locals = interp.stack.locals_innermost_first();
        let reader = PathReader {
            store: &interp.store,
            locals,
            function_names: &function_names,
        };
        let mut fields = std::collections::BTreeMap::new();
        for (name, expr) in &decl.fields.fields {
            match interp.evaluator.eval(expr, &reader) {
                Ok(v) => {
                    fields.insert(name.clone(), v);
                },
                Err(e) => return fail(interp, e),
            }
        }
        fields
    };

    if decl.temporary {
        if let Some(top) = interp.stack.top_mut() {
            top.local_state = Some(Fields::from_declared(fields));
        }
    } else {
        interp.store.node_state_or_init(decl.id, || fields);
    }
    next(interp);
}
