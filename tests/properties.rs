//! Proptest-based universal invariants and algebraic laws over the
//! interpreter's execution model.
//!
//! Scenario-style fixed fixtures already cover insertion flattening order
//! and epilogue correctness in `scenarios.rs` — those need specific
//! insertion topologies that are more legible as literal examples than as
//! generated cases. What follows instead generates over the small
//! parameters a hand-built script family exposes (repeat counts, option
//! counts, selected index, random state mutations): fuzz over small
//! generated inputs against a fixed harness, not over whole generated
//! programs.

mod common;

use std::rc::Rc;

use proptest::prelude::*;

use loreline::ast::{AlternativeMode, AssignOp, Script};
use loreline::expr::{Expr, ReferenceEvaluator};
use loreline::host::Options;
use loreline::interpreter::Interpreter;
use loreline::value::Value;

use common::*;

fn start(script: Script, host: RecordingHost) -> Interpreter {
    let script = Rc::new(script);
    let evaluator = Rc::new(ReferenceEvaluator);
    Interpreter::start(script, evaluator, Options::new(), Box::new(host)).expect("script starts")
}

fn cycle_script(mode: AlternativeMode) -> Script {
    Script {
        beats: vec![beat(
            0,
            "Loop",
            vec![
                alternative(1, mode, vec![vec![text(2, "A")], vec![text(3, "B")], vec![text(4, "C")]]),
                transition(5, "Loop"),
            ],
        )],
        ..Default::default()
    }
}

fn dialogue_texts(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Dialogue { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

proptest! {
    /// Invariant 1 — determinism without randomness: a script built only from
    /// `Cycle` (no `Pick`/`Shuffle`, no host-registered nondeterministic
    /// function) produces byte-identical dialogue sequences across two
    /// independent runs for the same visit count.
    #[test]
    fn determinism_without_randomness(visits in 1u32..12) {
        let mut collect = |_: u32| {
            let (host, events) = recording_host(Vec::new(), Some(visits as usize));
            let _interp = start(cycle_script(AlternativeMode::Cycle), host);
            dialogue_texts(&events.borrow())
        };
        let first = collect(0);
        let second = collect(0);
        prop_assert_eq!(first, second);
    }

    /// Law 8 — Cycle's branch index equals (prior visits) mod N; Sequence
    /// clamps to the last branch once prior visits >= N.
    #[test]
    fn alternative_cycle_index_matches_prior_visits_mod_n(visits in 1u32..12) {
        let (host, events) = recording_host(Vec::new(), Some(visits as usize));
        let _interp = start(cycle_script(AlternativeMode::Cycle), host);
        let texts = dialogue_texts(&events.borrow());

        let expected: Vec<&str> = (0..visits as usize)
            .map(|visit| match visit % 3 {
                0 => "A",
                1 => "B",
                _ => "C",
            })
            .collect();
        prop_assert_eq!(texts, expected);
    }

    #[test]
    fn alternative_sequence_clamps_after_n_visits(visits in 1u32..12) {
        let (host, events) = recording_host(Vec::new(), Some(visits as usize));
        let _interp = start(cycle_script(AlternativeMode::Sequence), host);
        let texts = dialogue_texts(&events.borrow());

        let expected: Vec<&str> = (0..visits as usize)
            .map(|visit| match visit.min(2) {
                0 => "A",
                1 => "B",
                _ => "C",
            })
            .collect();
        prop_assert_eq!(texts, expected);
    }

    /// Law 5 — save/restore idempotence: saving at a choice quiescent point
    /// and restoring into a fresh interpreter before delivering the same
    /// selection produces the identical subsequent event stream a single
    /// uninterrupted run would have produced.
    #[test]
    fn save_restore_idempotence_at_choice(option_count in 2usize..6, selected in 0usize..6) {
        let selected = selected % option_count;

        let make_script = |count: usize| {
            let options: Vec<_> = (0..count)
                .map(|i| {
                    let id_base = 10 + (i as u32) * 2;
                    option(id_base, &format!("Option{i}"), vec![text(id_base + 1, format!("Chose {i}"))])
                })
                .collect();
            Script {
                beats: vec![beat(0, "Main", vec![choice(1, options)])],
                ..Default::default()
            }
        };

        // Baseline: one uninterrupted run with the selection supplied up front.
        let (baseline_host, baseline_events) = recording_host(vec![selected], None);
        let _baseline = start(make_script(option_count), baseline_host);
        let baseline_tail = baseline_events.borrow().clone();

        // Save at the choice, restore into a fresh interpreter, then resume
        // and deliver the same selection.
        let (pause_host, pause_events) = recording_host(Vec::new(), None);
        let interp = start(make_script(option_count), pause_host);
        prop_assert_eq!(pause_events.borrow().len(), 1, "must pause exactly at the choice");

        let saved = interp.save();
        drop(interp);

        let (resume_host, resume_events) = recording_host(vec![selected], None);
        let script2 = Rc::new(make_script(option_count));
        let evaluator = Rc::new(ReferenceEvaluator);
        let mut restored = Interpreter::restore(script2, evaluator, Options::new(), Box::new(resume_host), &saved)
            .expect("restores cleanly against the identical script");
        restored.resume();

        prop_assert_eq!(resume_events.borrow().clone(), baseline_tail);
    }

    /// Invariant 3 — scope ids are monotonically increasing within a
    /// session: a save taken at any quiescent point lists scope ids in
    /// strictly increasing order outermost to innermost, since ids are
    /// handed out in push order and the stack is never reordered.
    #[test]
    fn scope_ids_strictly_increase_outer_to_inner(depth in 1usize..5) {
        let mut beats = Vec::new();
        for level in 0..depth {
            let name = format!("Level{level}");
            let next_call = if level + 1 < depth {
                call(level as u32 * 10 + 1, &format!("Level{}", level + 1))
            } else {
                choice(level as u32 * 10 + 1, vec![option(level as u32 * 10 + 2, "Stop", vec![])])
            };
            beats.push(beat(level as u32 * 10, &name, vec![next_call]));
        }

        let script = Script { beats, ..Default::default() };
        let (host, events) = recording_host(Vec::new(), None);
        let interp = start(script, host);
        prop_assert_eq!(events.borrow().len(), 1, "must pause at the innermost choice");

        let saved = interp.save();
        let ids: Vec<u64> = saved.stack.iter().map(|s| s.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        prop_assert_eq!(&ids, &sorted);
        for window in ids.windows(2) {
            prop_assert!(window[0] < window[1], "scope ids must strictly increase: {ids:?}");
        }
    }

    /// Invariant 4 / delta round-trip: for any integer mutation applied to a
    /// declared top-level field, `restore(save_of(S))` observes the mutated
    /// value, and an unmutated field is never present in the delta.
    #[test]
    fn delta_round_trip_preserves_mutated_field(mutation in -1000i64..1000) {
        let script = || Script {
            beats: vec![beat(
                0,
                "Main",
                vec![assign(2, "x", AssignOp::AddAssign, Expr::int(mutation))],
            )],
            top_level_state: vec![top_state(1, vec![("x", Expr::int(0)), ("untouched", Expr::int(42))])],
            ..Default::default()
        };

        let evaluator = Rc::new(ReferenceEvaluator);
        let (host, _events) = recording_host(Vec::new(), None);
        let interp = Interpreter::start(Rc::new(script()), evaluator.clone(), Options::new(), Box::new(host)).unwrap();

        let saved = interp.save();
        prop_assert!(
            !saved.state.contains_key("untouched"),
            "a field equal to its declared default must be omitted from the delta"
        );
        if mutation == 0 {
            prop_assert!(!saved.state.contains_key("x"));
        } else {
            prop_assert_eq!(saved.state.get("x"), Some(&Value::Integer(mutation)));
        }
        drop(interp);

        let (host2, _events2) = recording_host(Vec::new(), None);
        let interp2 = Interpreter::restore(Rc::new(script()), evaluator, Options::new(), Box::new(host2), &saved)
            .expect("restores cleanly against the identical script");
        prop_assert_eq!(interp2.get_field("x"), Some(&Value::Integer(mutation)));
        prop_assert_eq!(interp2.get_field("untouched"), Some(&Value::Integer(42)));
    }
}
