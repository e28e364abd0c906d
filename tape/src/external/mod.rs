//! External-function records: opaque, user-implemented derivative code
//! spliced into the tape.

use core::fmt;
use core::marker::PhantomData;

use descent_core::{Gradient, Identifier, Real};

use crate::adjoints::AdjointVector;
use crate::errors::TapeError;

pub mod helper;

pub use helper::{
    DefaultSynchronization, ExternalFunctionHelper, ForwardFunc, PrimalFunc, ReverseFunc,
    Synchronization, UserData,
};

// ADJOINT ACCESS
// ================================================================================================

/// The tape-side state an external-function callback may touch during a
/// sweep: adjoints (or tangents) lane by lane, and, on primal-value tapes,
/// the primal vector.
pub trait AdjointAccess<R: Real> {
    /// Number of derivative lanes per adjoint slot.
    fn vector_size(&self) -> usize;

    fn adjoint(&self, id: Identifier, lane: usize) -> R;

    fn update_adjoint(&mut self, id: Identifier, lane: usize, update: R);

    fn reset_adjoint(&mut self, id: Identifier, lane: usize);

    /// True if the evaluating tape maintains a primal vector.
    fn has_primals(&self) -> bool {
        false
    }

    fn primal(&self, _id: Identifier) -> R {
        R::ZERO
    }

    fn set_primal(&mut self, _id: Identifier, _value: R) {}
}

// EXTERNAL FUNCTION RECORD
// ================================================================================================

/// Boxed sweep callback of an external-function record. A failure is
/// surfaced from `evaluate` as [`TapeError::UserCallback`].
pub type Callback<R> = Box<dyn FnMut(&mut dyn AdjointAccess<R>) -> Result<(), TapeError>>;

/// A spliced-in external function.
///
/// The record owns its per-invocation state (primal and identifier
/// snapshots, user data) through the boxed callbacks; truncating the tape
/// past the record drops it and releases that state.
pub struct ExternalFunctionRecord<R: Real> {
    reverse: Option<Callback<R>>,
    forward: Option<Callback<R>>,
    primal: Option<Callback<R>>,
}

impl<R: Real> ExternalFunctionRecord<R> {
    pub fn new(
        reverse: Option<Callback<R>>,
        forward: Option<Callback<R>>,
        primal: Option<Callback<R>>,
    ) -> Self {
        Self { reverse, forward, primal }
    }

    pub(crate) fn call_reverse(&mut self, access: &mut dyn AdjointAccess<R>) -> Result<(), TapeError> {
        let callback = self.reverse.as_mut().ok_or(TapeError::MissingCallback("reverse"))?;
        callback(access)
    }

    pub(crate) fn call_forward(&mut self, access: &mut dyn AdjointAccess<R>) -> Result<(), TapeError> {
        let callback = self.forward.as_mut().ok_or(TapeError::MissingCallback("forward"))?;
        callback(access)
    }

    pub(crate) fn call_primal(&mut self, access: &mut dyn AdjointAccess<R>) -> Result<(), TapeError> {
        let callback = self.primal.as_mut().ok_or(TapeError::MissingCallback("primal"))?;
        callback(access)
    }
}

impl<R: Real> fmt::Debug for ExternalFunctionRecord<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalFunctionRecord")
            .field("reverse", &self.reverse.is_some())
            .field("forward", &self.forward.is_some())
            .field("primal", &self.primal.is_some())
            .finish()
    }
}

/// One entry of a tape's external-function log: the record plus the inner
/// log positions at the moment it was pushed, so sweeps know where to pause.
#[derive(Debug)]
pub(crate) struct ExternalEntry<R: Real, P> {
    pub record: ExternalFunctionRecord<R>,
    pub inner: P,
}

// ACCESS IMPLEMENTATIONS
// ================================================================================================

/// Adjoint-only access, used by Jacobian tapes.
pub(crate) struct GradientAccess<'a, R: Real, G: Gradient<R>> {
    adjoints: &'a mut AdjointVector<G>,
    _real: PhantomData<R>,
}

impl<'a, R: Real, G: Gradient<R>> GradientAccess<'a, R, G> {
    pub fn new(adjoints: &'a mut AdjointVector<G>) -> Self {
        Self { adjoints, _real: PhantomData }
    }
}

impl<R: Real, G: Gradient<R>> AdjointAccess<R> for GradientAccess<'_, R, G> {
    fn vector_size(&self) -> usize {
        G::DIM
    }

    fn adjoint(&self, id: Identifier, lane: usize) -> R {
        self.adjoints.get(id).lane(lane)
    }

    fn update_adjoint(&mut self, id: Identifier, lane: usize, update: R) {
        let mut slot = self.adjoints.get(id);
        slot.set_lane(lane, slot.lane(lane) + update);
        self.adjoints.set(id, slot);
    }

    fn reset_adjoint(&mut self, id: Identifier, lane: usize) {
        let mut slot = self.adjoints.get(id);
        slot.set_lane(lane, R::ZERO);
        self.adjoints.set(id, slot);
    }
}

/// Adjoint-and-primal access, used by primal-value tapes.
pub(crate) struct PrimalGradientAccess<'a, R: Real, G: Gradient<R>> {
    adjoints: &'a mut AdjointVector<G>,
    primals: &'a mut [R],
    _real: PhantomData<R>,
}

impl<'a, R: Real, G: Gradient<R>> PrimalGradientAccess<'a, R, G> {
    pub fn new(adjoints: &'a mut AdjointVector<G>, primals: &'a mut [R]) -> Self {
        Self { adjoints, primals, _real: PhantomData }
    }
}

impl<R: Real, G: Gradient<R>> AdjointAccess<R> for PrimalGradientAccess<'_, R, G> {
    fn vector_size(&self) -> usize {
        G::DIM
    }

    fn adjoint(&self, id: Identifier, lane: usize) -> R {
        self.adjoints.get(id).lane(lane)
    }

    fn update_adjoint(&mut self, id: Identifier, lane: usize, update: R) {
        let mut slot = self.adjoints.get(id);
        slot.set_lane(lane, slot.lane(lane) + update);
        self.adjoints.set(id, slot);
    }

    fn reset_adjoint(&mut self, id: Identifier, lane: usize) {
        let mut slot = self.adjoints.get(id);
        slot.set_lane(lane, R::ZERO);
        self.adjoints.set(id, slot);
    }

    fn has_primals(&self) -> bool {
        true
    }

    fn primal(&self, id: Identifier) -> R {
        self.primals[id as usize]
    }

    fn set_primal(&mut self, id: Identifier, value: R) {
        self.primals[id as usize] = value;
    }
}
