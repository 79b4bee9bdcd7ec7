//! Error taxonomy. Kinds, not language types — `RuntimeError` is
//! the one enum a host actually sees; `RestoreError` never escapes
//! [`crate::save::restore`], which recovers it locally.

use crate::ast::{NodeId, NodeKind};

/// Errors the runtime can signal back through a host-visible channel: the
/// finish callback's error outcome, carried here as a `Result`.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("undefined binding: {0}")]
    UndefinedBinding(String),

    #[error("unknown beat: {0}")]
    UnknownBeat(String),

    #[error("unknown character: {0}")]
    UnknownCharacter(String),

    #[error("evaluation error: {0}")]
    EvaluationError(String),

    #[error("host contract violated: {0}")]
    HostContractError(String),
}

/// The crate-level error type. `Parse` wraps whatever the collaborator
/// parser produced; this crate never constructs it itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A save blob a restorer refuses outright. Unlike [`RestoreError`], this
    /// is host-visible — there's no per-scope fallback to fall back to when
    /// the whole blob is from a newer format.
    #[error("cannot restore save data: {0}")]
    Restore(String),
}

/// Internal-only: why a saved scope failed to resolve during restore.
/// Always handled by [`crate::save::restore`]'s fallback and never
/// surfaced to the host.
#[derive(Debug)]
pub(crate) enum RestoreError {
    UnresolvableNode { expected_kind: NodeKind, saved_id: NodeId },
    KindMismatch { saved_id: NodeId, expected: NodeKind, found: NodeKind },
    UnknownBeatPath(String),
}

impl std::fmt::Display for RestoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestoreError::UnresolvableNode { expected_kind, saved_id } => {
                write!(f, "node {saved_id} (expected {expected_kind}) no longer exists")
            },
            RestoreError::KindMismatch { saved_id, expected, found } => {
                write!(f, "node {saved_id} changed kind: expected {expected}, found {found}")
            },
            RestoreError::UnknownBeatPath(path) => write!(f, "unknown beat path: {path}"),
        }
    }
}
