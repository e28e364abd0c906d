use thiserror::Error;

use crate::chunks::LogKind;

// TAPE ERROR
// ================================================================================================

/// Errors surfaced by the fallible tape operations.
///
/// Domain errors of elementary operators are not represented here: they are
/// raised from inside overloaded operators, which have no error channel, and
/// abort the differentiation session (see `descent-expr`).
#[derive(Debug, Error)]
pub enum TapeError {
    /// A chunk allocation or a vector growth failed. The tape remains in its
    /// last consistent state; the partial statement is not visible because
    /// `reserve` is the commitment point.
    #[error("failed to allocate {additional} more records for the {log} log")]
    Allocation {
        log: LogKind,
        additional: usize,
        #[source]
        source: std::collections::TryReserveError,
    },

    /// A sweep was requested while the tape is still recording.
    #[error("cannot evaluate a tape that is recording; call set_passive first")]
    EvaluateWhileRecording,

    /// `evaluate(from, to)` requires `from >= to` (and the converse for
    /// forward sweeps).
    #[error("tape positions are ordered against the sweep direction")]
    PositionOrder,

    /// An external-function record was asked to run a callback it does not
    /// carry.
    #[error("external function record has no {0} callback")]
    MissingCallback(&'static str),

    /// An external-function callback signaled failure; the error is surfaced
    /// as-is.
    #[error("external function callback failed")]
    UserCallback(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Raises an allocation failure from a path with no error channel (the store
/// family is called from overloaded operators).
#[cold]
#[inline(never)]
pub(crate) fn escalate_allocation(err: TapeError) -> ! {
    panic!("{err}");
}
