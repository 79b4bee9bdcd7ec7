//! # Loreline
//! This crate is the continuation-driven runtime core for Loreline, an
//! interactive-fiction scripting language: beats, dialogue, branching
//! choices (with insertion flattening), local and node-keyed state, and a
//! save/restore path tolerant of small script edits.
//!
//! This crate does not parse Loreline source. It consumes an already-built
//! [`ast::Script`] — produced by a lexer/parser living elsewhere — and runs
//! it. Embedders provide that `Script`, an [`expr::ExpressionEvaluator`]
//! (or the default [`expr::ReferenceEvaluator`]), and a [`host::Host`]
//! implementation to receive dialogue/choice/finish callbacks.
//!
//! ## Running a script
//! ```ignore
//! use std::rc::Rc;
//! use loreline::expr::ReferenceEvaluator;
//! use loreline::host::{Host, Options};
//! use loreline::interpreter::Interpreter;
//!
//! struct MyHost;
//! impl Host for MyHost {
//!     fn on_dialogue(&mut self, interp: &mut Interpreter, event: loreline::host::DialogueEvent, advance: loreline::host::Advance) {
//!         println!("{:?}: {}", event.character, event.text);
//!         advance.call(interp);
//!     }
//!     fn on_choice(&mut self, interp: &mut Interpreter, options: &[loreline::scope::ChoiceOption], select: loreline::host::Select) {
//!         select.call(interp, 0);
//!     }
//!     fn on_finish(&mut self, _interp: &mut Interpreter, outcome: loreline::host::FinishOutcome) {
//!         println!("finished: {:?}", outcome);
//!     }
//! }
//!
//! # fn run(script: Rc<loreline::ast::Script>) -> Result<(), loreline::RuntimeError> {
//! let evaluator = Rc::new(ReferenceEvaluator);
//! let interp = Interpreter::start(script, evaluator, Options::default(), Box::new(MyHost))?;
//! # let _ = interp;
//! # Ok(())
//! # }
//! ```
//!
//! ## Component map
//! - [`ast`] — the node-kind set a parser hands us.
//! - [`lens`] — the AST Index: id lookup and dotted beat paths, built once
//!   per script.
//! - [`store`] — the Value & State Store, with the delta-encoded `Fields`
//!   container save/restore relies on.
//! - [`scope`] — the Scope Stack and the insertion arena.
//! - [`interpreter`] — the Continuation Core: the body walker, choice
//!   collection/presentation, alternative selection, transitions.
//! - [`trampoline`] — the sync/async boundary at every host callback.
//! - [`save`] — serializer, restorer, and resume dispatch.
//! - [`host`] — the callback contract a host implements.
//! - [`error`] — the error taxonomy a host can observe.

pub mod ast;
pub mod error;
pub mod expr;
pub mod host;
pub mod interpreter;
pub mod lens;
pub mod save;
pub mod scope;
pub mod store;
pub mod trampoline;
pub mod value;

pub use error::{Error, RuntimeError};
pub use host::{Host, Options};
pub use interpreter::Interpreter;
pub use save::SaveData;
