//! Tapes and index managers of the descent AD engine.
//!
//! Recording tapes log every assignment of an expression to an active scalar
//! and later replay the log backward (adjoints) or forward (tangents):
//!
//! - [`JacobianTape`] stores the pre-multiplied partial derivatives of each
//!   statement, so sweeps are pure multiply-accumulate scans.
//! - [`PrimalValueTape`] stores one [`StatementHandle`] per expression shape
//!   plus operand identifiers and constants, and recomputes partials during
//!   sweeps from a primal vector; this permits primal re-evaluation at new
//!   inputs.
//! - [`Forward`] is the tapeless forward mode: tangents ride inline on the
//!   scalars and nothing is logged.
//!
//! Both recording tapes are parameterized by an [`IndexManager`] deciding
//! identifier lifetime, and by a gradient type, which is a plain real in
//! scalar mode or a [`Direction`](descent_core::Direction) in vector mode.
//! Opaque user derivative code enters the tape through
//! [`ExternalFunctionHelper`].
//!
//! Active scalars reach their tape through a zero-sized kind declared with
//! [`declare_tape!`], which binds one tape instance per thread.

mod adjoints;
mod bindings;
mod chunks;
mod errors;
mod external;
mod forward;
mod indices;
mod interface;
mod jacobian;
mod primal;
mod stats;

pub use adjoints::AdjointVector;
pub use bindings::TapeKind;
pub use chunks::{ChunkedLog, ForwardCursor, LogKind, LogPosition, ReverseCursor};
pub use errors::TapeError;
pub use external::{
    AdjointAccess, Callback, DefaultSynchronization, ExternalFunctionHelper,
    ExternalFunctionRecord, ForwardFunc, PrimalFunc, ReverseFunc, Synchronization, UserData,
};
pub use forward::Forward;
pub use indices::{IndexManager, LinearIndexManager, ReuseCountIndexManager, ReuseIndexManager};
pub use interface::ReverseTape;
pub use jacobian::{JacobianPosition, JacobianTape};
pub use primal::{PrimalPosition, PrimalValueTape, StatementHandle};
pub use stats::{LogStatistics, TapeStatistics};

// Re-exported for the `declare_tape!` expansion and one-stop imports.
pub use descent_core::{Identifier, PASSIVE_INDEX};
pub use descent_expr::{Active, AdKind, ExprNode};
