use core::fmt::Debug;

use descent_core::{Gradient, Identifier, Real};
use descent_expr::{Active, AdKind, ExprNode};

use crate::errors::TapeError;
use crate::external::ExternalFunctionRecord;
use crate::stats::TapeStatistics;

// REVERSE TAPE INTERFACE
// ================================================================================================

/// The public contract shared by the recording tapes.
///
/// A recording session is `set_active` → `register_input*` → computation →
/// `register_output*` → `set_passive`; an evaluation seeds output gradients
/// and runs `evaluate` (reverse) or seeds input tangents and runs
/// `evaluate_forward`. Recording and evaluation must not overlap: the sweep
/// reads the logs the recorder writes.
///
/// Sweep bounds are [`Position`](Self::Position) snapshots; `from` is the
/// higher position for both directions (a reverse sweep walks `from` down to
/// `to`, a forward sweep walks `to` up to `from`).
pub trait ReverseTape: Sized {
    type Real: Real;
    type Gradient: Gradient<Self::Real>;
    type Position: Copy + Debug + PartialEq + PartialOrd;

    /// True for tapes that maintain a primal vector (primal-value tapes).
    const STORES_PRIMALS: bool;

    /// True if primal updates may bypass the tape (see the corresponding
    /// kind-level constant); tapes that replay statements from stored
    /// primals must observe every value change.
    const ALLOW_JACOBIAN_OPTIMIZATION: bool;

    fn new() -> Self;

    // ACTIVITY
    // --------------------------------------------------------------------------------------------

    /// Starts recording.
    fn set_active(&mut self);

    /// Stops recording; stores deactivate their left-hand sides instead.
    fn set_passive(&mut self);

    fn is_active(&self) -> bool;

    // RECORDING
    // --------------------------------------------------------------------------------------------

    /// Records the assignment of an expression: evaluates its primal into
    /// `lhs_value`, appends a statement, and updates `lhs_id` per the index
    /// manager's policy.
    fn store_expr<E>(&mut self, lhs_value: &mut Self::Real, lhs_id: &mut Identifier, rhs: &E)
    where
        E: ExprNode,
        E::Kind: AdKind<Real = Self::Real, Data = Identifier>;

    /// Records the assignment of one active scalar to another.
    fn store_copy(
        &mut self,
        lhs_value: &mut Self::Real,
        lhs_id: &mut Identifier,
        rhs_value: Self::Real,
        rhs_id: Identifier,
    );

    /// Records the assignment of a passive value.
    fn store_passive(&mut self, lhs_value: &mut Self::Real, lhs_id: &mut Identifier, rhs: Self::Real);

    /// Releases an identifier when its scalar dies.
    fn free_identifier(&mut self, id: &mut Identifier);

    // REGISTRATION
    // --------------------------------------------------------------------------------------------

    /// Marks a scalar as an independent variable.
    fn register_input<K>(&mut self, value: &mut Active<K>)
    where
        K: AdKind<Real = Self::Real, Data = Identifier>,
    {
        let (value, id) = value.parts_mut();
        self.register_input_id(*value, id);
    }

    /// Ensures a scalar owns its identifier exclusively so its adjoint can be
    /// seeded without leaking into copies.
    fn register_output<K>(&mut self, value: &mut Active<K>)
    where
        K: AdKind<Real = Self::Real, Data = Identifier>,
    {
        let (value, id) = value.parts_mut();
        self.register_output_id(*value, id);
    }

    /// Registers an external-function output with a fresh identifier and
    /// returns the primal previously stored under it (primal-value tapes).
    fn register_external_output<K>(&mut self, value: &mut Active<K>) -> Self::Real
    where
        K: AdKind<Real = Self::Real, Data = Identifier>,
    {
        let (value, id) = value.parts_mut();
        self.register_external_output_id(*value, id)
    }

    fn register_input_id(&mut self, value: Self::Real, id: &mut Identifier);

    fn register_output_id(&mut self, value: Self::Real, id: &mut Identifier);

    fn register_external_output_id(&mut self, value: Self::Real, id: &mut Identifier) -> Self::Real;

    // GRADIENT ACCESS
    // --------------------------------------------------------------------------------------------

    fn gradient_at(&self, id: Identifier) -> Self::Gradient;

    fn set_gradient_at(&mut self, id: Identifier, gradient: Self::Gradient);

    /// Zeros the adjoint vector.
    fn clear_adjoints(&mut self);

    // POSITIONS AND TRUNCATION
    // --------------------------------------------------------------------------------------------

    fn position(&self) -> Self::Position;

    fn zero_position(&self) -> Self::Position;

    /// Discards everything recorded after `pos` and clears the adjoints.
    /// External-function records beyond the position are dropped, releasing
    /// their state.
    fn reset_to(&mut self, pos: Self::Position);

    /// Clears the whole tape.
    fn reset(&mut self);

    // EVALUATION
    // --------------------------------------------------------------------------------------------

    /// Reverse (adjoint) sweep from `from` down to `to`.
    fn evaluate_between(&mut self, from: Self::Position, to: Self::Position)
        -> Result<(), TapeError>;

    /// Reverse sweep over the whole tape.
    fn evaluate(&mut self) -> Result<(), TapeError> {
        let (from, to) = (self.position(), self.zero_position());
        self.evaluate_between(from, to)
    }

    /// Forward (tangent) sweep from `to` up to `from`.
    fn evaluate_forward_between(
        &mut self,
        from: Self::Position,
        to: Self::Position,
    ) -> Result<(), TapeError>;

    /// Forward sweep over the whole tape.
    fn evaluate_forward(&mut self) -> Result<(), TapeError> {
        let (from, to) = (self.position(), self.zero_position());
        self.evaluate_forward_between(from, to)
    }

    // EXTERNAL FUNCTIONS
    // --------------------------------------------------------------------------------------------

    /// Appends an external-function record at the current position.
    fn push_external_function(
        &mut self,
        record: ExternalFunctionRecord<Self::Real>,
    ) -> Result<(), TapeError>;

    // INSPECTION
    // --------------------------------------------------------------------------------------------

    /// Counts and byte sizes of every log and of the index manager.
    fn statistics(&self) -> TapeStatistics;
}
