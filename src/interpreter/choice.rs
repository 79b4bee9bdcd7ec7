//! Choice & Insertion Collector.
//!
//! Two phases: collect walks every entry of a choice block in source order,
//! recursively (not a loop) because an insertion entry can suspend on a
//! host dialogue callback mid-collection — the remaining entries are owned
//! by the continuation that resumes once the inserted beat's nested choice
//! fills the insertion. Present hands the finished list to the host, unless
//! this choice is itself being collected into an enclosing insertion, in
//! which case the list is stashed on that insertion and control returns to
//! the body walker (the early-exit rule in [`super::advance`] takes it from
//! there).

use crate::ast::{ChoiceBlock, ChoiceEntry, ChoiceOptionDecl, NodeId, NodeKind};
use crate::error::RuntimeError;
use crate::scope::{ChoiceOption, CollectedOptions, RuntimeInsertion, RuntimeScope};
use crate::store::PathReader;

use super::{enter_body, fail, Interpreter, Next};

pub(crate) fn eval_choice(interp: &mut Interpreter, beat: NodeId, choice: &ChoiceBlock, next: Next) {
    let entries = choice.entries.clone();
    collect(
        interp,
        beat,
        entries,
        0,
        Vec::new(),
        Box::new(move |i, options| present(i, beat, options, next)),
    );
}

type CollectNext = Box<dyn FnOnce(&mut Interpreter, Vec<ChoiceOption>)>;

/// Phase 1: walks `entries` from `index` onward, appending to
/// `acc`. Calls `collected` once every entry has been visited.
fn collect(
    interp: &mut Interpreter,
    beat: NodeId,
    entries: Vec<ChoiceEntry>,
    index: usize,
    mut acc: Vec<ChoiceOption>,
    collected: CollectNext,
) {
    let Some(entry) = entries.get(index).cloned() else {
        return collected(interp, acc);
    };

    match entry {
        ChoiceEntry::Option(opt) => match build_choice_option(interp, &opt) {
            Ok(choice_opt) => {
                acc.push(choice_opt);
                collect(interp, beat, entries, index + 1, acc, collected);
            },
            Err(e) => fail(interp, e),
        },
        ChoiceEntry::Insertion(ins) => {
            let target_id = {
                let lens = interp.lens();
                lens.resolve_target(beat, &ins.target).map(|b| b.id)
            };
            let Some(target_id) = target_id else {
                return fail(interp, RuntimeError::UnknownBeat(ins.target.clone()));
            };

            let insertion_id = interp.fresh_insertion_id();
            interp.insertions.insert(RuntimeInsertion::new(insertion_id, ins.id));

            let resume_collection: Next = Box::new(move |i| {
                // An option already carrying an insertion id bubbled up from a
                // deeper nested insertion; its snapshot is the deepest one and
                // must survive intact, or selecting it would replay from the
                // wrong depth and drop the enclosing beats' remaining body.
                let appended = match i.insertions.get(insertion_id) {
                    Some(RuntimeInsertion { options: CollectedOptions::Collected(opts), .. }) => opts
                        .iter()
                        .cloned()
                        .map(|mut o| {
                            if o.insertion.is_none() {
                                o.insertion = Some(insertion_id);
                            }
                            o
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                acc.extend(appended);
                collect(i, beat, entries, index + 1, acc, collected);
            });

            enter_body(interp, target_id, target_id, NodeKind::BeatDecl, None, Some(insertion_id), resume_collection);
        },
    }
}

fn build_choice_option(interp: &Interpreter, opt: &ChoiceOptionDecl) -> Result<ChoiceOption, RuntimeError> {
    let function_names = interp.options.function_names();
    let locals = interp.stack.locals_innermost_first();
    let reader = PathReader {
        store: &interp.store,
        locals,
        function_names: &function_names,
    };

    let enabled = match &opt.guard {
        Some(expr) => interp.evaluator.eval(expr, &reader)?.truthy(),
        None => true,
    };
    let (display_text, tags) = super::eval::render_template(interp, &opt.text)?;

    Ok(ChoiceOption {
        display_text,
        tags,
        enabled,
        source_option: opt.id,
        insertion: None,
    })
}

/// Phase 2. If the current scope is itself attached to a
/// pending insertion, this choice is the insertion's target and the list
/// belongs to that insertion, not the host.
fn present(interp: &mut Interpreter, beat: NodeId, options: Vec<ChoiceOption>, next: Next) {
    if let Some(ins_id) = interp.stack.top().and_then(|s| s.insertion) {
        let pending = interp.insertions.get(ins_id).map(|ins| ins.options.is_pending()).unwrap_or(false);
        if pending {
            let snapshot = interp.stack.frames.clone();
            if let Some(ins) = interp.insertions.get_mut(ins_id) {
                ins.stack_snapshot = Some(snapshot);
                ins.options = CollectedOptions::Collected(options);
            }
            return next(interp);
        }
    }

    let for_dispatch = options.clone();
    interp.emit_choice(
        options,
        Box::new(move |i, index| dispatch_selection(i, beat, index, for_dispatch, next)),
    );
}

/// Selection dispatch: a plain option resumes the body walker
/// normally; an option sourced from an insertion replaces the whole stack
/// with the insertion's snapshot, clears every attached insertion on it (so
/// the early-exit rule can't fire again for this path), and rebuilds the
/// continuation chain through [`crate::save::resume::resume`] so each
/// inserted beat's epilogue still runs in order once the option's own body
/// completes.
fn dispatch_selection(interp: &mut Interpreter, beat: NodeId, index: usize, options: Vec<ChoiceOption>, next: Next) {
    let Some(opt) = options.get(index).cloned() else {
        return fail(
            interp,
            RuntimeError::HostContractError(format!("choice selection index {index} out of range")),
        );
    };

    let has_enclosing_choice = {
        let lens = interp.lens();
        lens.enclosing_choice(opt.source_option).is_some()
    };
    if !has_enclosing_choice {
        return fail(interp, RuntimeError::EvaluationError("selected option has no enclosing choice".into()));
    }

    match opt.insertion {
        None => {
            enter_body(interp, beat, opt.source_option, NodeKind::ChoiceOption, None, None, next);
        },
        Some(ins_id) => {
            let snapshot = interp
                .insertions
                .get(ins_id)
                .and_then(|ins| ins.stack_snapshot.clone())
                .unwrap_or_default();
            let option_scope_beat = snapshot.last().map(|s| s.beat).unwrap_or(beat);

            interp.stack.replace(Vec::new());
            let id = interp.fresh_scope_id();
            let option_scope = RuntimeScope::new(id, option_scope_beat, opt.source_option, NodeKind::ChoiceOption);

            let mut frames = snapshot;
            for frame in &mut frames {
                frame.insertion = None;
            }
            frames.push(option_scope);

            crate::save::resume::resume_frames(interp, frames, 0, next);
        },
    }
}
