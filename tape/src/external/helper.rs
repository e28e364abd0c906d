//! Assembles external-function records from user code.
//!
//! The protocol for one spliced-in call is:
//!
//! 1. `add_input` for every argument the user function reads.
//! 2. Run the primal: either `call_primal` with a plain floating-point
//!    function, or `call_primal_with_ad` wrapping code written against the
//!    active type (recording is suspended around it).
//! 3. `add_output` for every result; each output receives a fresh
//!    identifier.
//! 4. `add_to_tape` with the reverse callback (and optional forward and
//!    primal callbacks); ownership of the collected state moves to the tape.

use core::any::Any;
use core::cell::RefCell;
use core::mem;
use std::rc::Rc;

use descent_core::{Identifier, PASSIVE_INDEX, Real};
use descent_expr::{Active, AdKind};
use smallvec::SmallVec;
use tracing::debug;

use super::{AdjointAccess, Callback, ExternalFunctionRecord};
use crate::bindings::TapeKind;
use crate::errors::TapeError;
use crate::interface::ReverseTape;

// CALLBACK SIGNATURES
// ================================================================================================

/// Reverse callback: adds the contributions of `output_adjoints` into
/// `input_adjoints` through the function's own Jacobian.
pub type ReverseFunc<R> =
    fn(inputs: &[R], input_adjoints: &mut [R], outputs: &[R], output_adjoints: &[R], data: &mut UserData);

/// Forward callback: propagates `input_tangents` to `output_tangents` and
/// may recompute `outputs`.
pub type ForwardFunc<R> =
    fn(inputs: &[R], input_tangents: &[R], outputs: &mut [R], output_tangents: &mut [R], data: &mut UserData);

/// Primal callback: recomputes `outputs` from `inputs`.
pub type PrimalFunc<R> = fn(inputs: &[R], outputs: &mut [R], data: &mut UserData);

// USER DATA
// ================================================================================================

/// Type-erased per-invocation payload handed to every callback.
///
/// Values are retrieved by the index `add` returned, with the stored type
/// checked at access time.
#[derive(Default)]
pub struct UserData {
    items: Vec<Box<dyn Any>>,
}

impl UserData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value and returns its index.
    pub fn add<T: Any>(&mut self, value: T) -> usize {
        self.items.push(Box::new(value));
        self.items.len() - 1
    }

    /// Reads a stored value; `None` if the index or the type do not match.
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.items.get(index)?.downcast_ref()
    }

    pub fn get_mut<T: Any>(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)?.downcast_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// SYNCHRONIZATION
// ================================================================================================

/// Phase barriers for external functions whose primal or derivative code is
/// entered by several cooperating threads.
///
/// The contract: shared state (snapshots, buffers, user data) is prepared and
/// torn down inside `serialize` by exactly one thread, every thread passes
/// the same sequence of `synchronize` barriers, and the user function itself
/// runs on all threads between them.
pub trait Synchronization {
    fn serialize(f: impl FnOnce());

    fn synchronize();
}

/// The single-threaded instantiation: `serialize` just runs the closure and
/// the barriers are free.
pub struct DefaultSynchronization;

impl Synchronization for DefaultSynchronization {
    #[inline(always)]
    fn serialize(f: impl FnOnce()) {
        f();
    }

    #[inline(always)]
    fn synchronize() {}
}

// EVAL DATA
// ================================================================================================

type IdBuf = SmallVec<[Identifier; 8]>;

struct EvalData<R: Real> {
    input_ids: IdBuf,
    output_ids: IdBuf,
    input_values: SmallVec<[R; 8]>,
    output_values: SmallVec<[R; 8]>,
    old_primals: SmallVec<[R; 8]>,
    user_data: UserData,
    reverse: Option<ReverseFunc<R>>,
    forward: Option<ForwardFunc<R>>,
    primal: Option<PrimalFunc<R>>,
}

impl<R: Real> Default for EvalData<R> {
    fn default() -> Self {
        Self {
            input_ids: IdBuf::new(),
            output_ids: IdBuf::new(),
            input_values: SmallVec::new(),
            output_values: SmallVec::new(),
            old_primals: SmallVec::new(),
            user_data: UserData::new(),
            reverse: None,
            forward: None,
            primal: None,
        }
    }
}

impl<R: Real> EvalData<R> {
    /// Reloads snapshots from the primal vector and restores the outputs'
    /// pre-call primals, so that statements below the record see the state
    /// they were recorded under.
    fn renew_primals_for_reverse(&mut self, access: &mut dyn AdjointAccess<R>) {
        if !access.has_primals() {
            return;
        }
        for (i, id) in self.output_ids.iter().enumerate() {
            self.output_values[i] = access.primal(*id);
        }
        for (i, id) in self.output_ids.iter().enumerate() {
            access.set_primal(*id, self.old_primals[i]);
        }
        for (i, id) in self.input_ids.iter().enumerate() {
            self.input_values[i] = access.primal(*id);
        }
    }

    fn run_reverse(&mut self, access: &mut dyn AdjointAccess<R>) {
        let reverse = self.reverse.expect("record pushed without a reverse callback");
        self.renew_primals_for_reverse(access);

        let m = self.input_ids.len();
        let n = self.output_ids.len();
        let mut input_adjoints = vec![R::ZERO; m];
        let mut output_adjoints = vec![R::ZERO; n];

        for lane in 0..access.vector_size() {
            for (i, id) in self.output_ids.iter().enumerate() {
                output_adjoints[i] = access.adjoint(*id, lane);
                access.reset_adjoint(*id, lane);
            }
            input_adjoints.fill(R::ZERO);

            reverse(
                &self.input_values,
                &mut input_adjoints,
                &self.output_values,
                &output_adjoints,
                &mut self.user_data,
            );

            for (i, id) in self.input_ids.iter().enumerate() {
                access.update_adjoint(*id, lane, input_adjoints[i]);
            }
        }
    }

    fn run_forward(&mut self, access: &mut dyn AdjointAccess<R>) {
        let forward = self.forward.expect("record pushed without a forward callback");
        if access.has_primals() {
            for (i, id) in self.input_ids.iter().enumerate() {
                self.input_values[i] = access.primal(*id);
            }
        }

        let m = self.input_ids.len();
        let n = self.output_ids.len();
        let mut input_tangents = vec![R::ZERO; m];
        let mut output_tangents = vec![R::ZERO; n];

        for lane in 0..access.vector_size() {
            for (i, id) in self.input_ids.iter().enumerate() {
                input_tangents[i] = access.adjoint(*id, lane);
            }
            output_tangents.fill(R::ZERO);

            forward(
                &self.input_values,
                &input_tangents,
                &mut self.output_values,
                &mut output_tangents,
                &mut self.user_data,
            );

            for (i, id) in self.output_ids.iter().enumerate() {
                access.reset_adjoint(*id, lane);
                access.update_adjoint(*id, lane, output_tangents[i]);
            }
        }

        if access.has_primals() {
            for (i, id) in self.output_ids.iter().enumerate() {
                access.set_primal(*id, self.output_values[i]);
            }
        }
    }

    fn run_primal(&mut self, access: &mut dyn AdjointAccess<R>) {
        let primal = self.primal.expect("record pushed without a primal callback");
        if access.has_primals() {
            for (i, id) in self.input_ids.iter().enumerate() {
                self.input_values[i] = access.primal(*id);
            }
        }

        let mut outputs = vec![R::ZERO; self.output_ids.len()];
        primal(&self.input_values, &mut outputs, &mut self.user_data);

        for (i, id) in self.output_ids.iter().enumerate() {
            self.output_values[i] = outputs[i];
            if access.has_primals() {
                access.set_primal(*id, outputs[i]);
            }
        }
    }
}

// EXTERNAL FUNCTION HELPER
// ================================================================================================

/// Builds one external-function record against the thread-local tape of the
/// kind `K`.
///
/// The helper is reusable: `add_to_tape` hands the collected state to the
/// tape and leaves the helper empty for the next invocation.
pub struct ExternalFunctionHelper<K, S = DefaultSynchronization>
where
    K: TapeKind + AdKind<Data = Identifier>,
    S: Synchronization,
{
    data: EvalData<K::Real>,
    _sync: core::marker::PhantomData<S>,
}

impl<K, S> ExternalFunctionHelper<K, S>
where
    K: TapeKind + AdKind<Data = Identifier>,
    S: Synchronization,
{
    pub fn new() -> Self {
        Self { data: EvalData::default(), _sync: core::marker::PhantomData }
    }

    /// Declares an input of the external function, snapshotting its primal
    /// and identifier.
    ///
    /// On primal-value tapes a passive input is registered as a temporary
    /// independent variable so the sweep can reload its value.
    pub fn add_input(&mut self, input: &Active<K>) {
        let recording = K::with_tape(|tape| tape.is_active());
        let mut id = K::data_identifier(input.data());

        // Active scalars must not be created or dropped while the tape is
        // borrowed, so the temporary lives outside the with_tape closures.
        if recording && <K::Tape as ReverseTape>::STORES_PRIMALS && id == PASSIVE_INDEX {
            let mut temp = input.clone();
            K::with_tape(|tape| tape.register_input(&mut temp));
            id = K::data_identifier(temp.data());
        }

        S::serialize(|| {
            if recording {
                self.data.input_ids.push(id);
            }
            self.data.input_values.push(input.value());
        });
    }

    /// Runs the primal through a plain floating-point function and stores it
    /// as the record's primal callback.
    pub fn call_primal(&mut self, func: PrimalFunc<K::Real>, outputs: &mut [&mut Active<K>]) {
        S::serialize(|| self.data.primal = Some(func));
        S::synchronize();

        let mut computed = vec![<K::Real as Real>::ZERO; outputs.len()];
        func(&self.data.input_values, &mut computed, &mut self.data.user_data);

        S::synchronize();
        S::serialize(|| {
            for (output, value) in outputs.iter_mut().zip(computed) {
                output.set_value(value);
            }
        });
        S::synchronize();
    }

    /// Runs primal code written against the active type with recording
    /// suspended; the produced scalars carry no dependency edges.
    pub fn call_primal_with_ad<T>(&mut self, func: impl FnOnce() -> T) -> T {
        let was_active = K::with_tape(|tape| {
            let active = tape.is_active();
            if active {
                tape.set_passive();
            }
            active
        });

        let result = func();
        S::synchronize();

        if was_active {
            K::with_tape(|tape| tape.set_active());
        }
        result
    }

    /// Declares an output: assigns it a fresh identifier and snapshots the
    /// primal it replaces.
    pub fn add_output(&mut self, output: &mut Active<K>) {
        let mut registered = None;
        K::with_tape(|tape| {
            if tape.is_active() {
                let old = tape.register_external_output(output);
                registered = Some((K::data_identifier(output.data()), old));
            }
        });
        S::serialize(|| {
            if let Some((id, old_primal)) = registered {
                self.data.output_ids.push(id);
                self.data.old_primals.push(old_primal);
            }
            self.data.output_values.push(output.value());
        });
    }

    /// Stores arbitrary extra state for the callbacks; returns its index.
    pub fn add_user_data<T: Any>(&mut self, value: T) -> usize {
        self.data.user_data.add(value)
    }

    /// Appends the external-function record to the tape and transfers the
    /// collected state to it.
    pub fn add_to_tape(
        &mut self,
        reverse: ReverseFunc<K::Real>,
        forward: Option<ForwardFunc<K::Real>>,
        primal: Option<PrimalFunc<K::Real>>,
    ) -> Result<(), TapeError> {
        let mut data = mem::take(&mut self.data);

        if !K::with_tape(|tape| tape.is_active()) {
            return Ok(());
        }

        data.reverse = Some(reverse);
        data.forward = forward;
        if primal.is_some() {
            data.primal = primal;
        }
        debug!(
            inputs = data.input_ids.len(),
            outputs = data.output_ids.len(),
            "recording external function"
        );

        let has_forward = data.forward.is_some();
        let has_primal = data.primal.is_some();
        let shared = Rc::new(RefCell::new(data));

        let reverse_cb = {
            let shared = Rc::clone(&shared);
            Box::new(move |access: &mut dyn AdjointAccess<K::Real>| {
                shared.borrow_mut().run_reverse(access);
                Ok(())
            }) as Callback<K::Real>
        };
        let forward_cb = has_forward.then(|| {
            let shared = Rc::clone(&shared);
            Box::new(move |access: &mut dyn AdjointAccess<K::Real>| {
                shared.borrow_mut().run_forward(access);
                Ok(())
            }) as Callback<K::Real>
        });
        let primal_cb = has_primal.then(|| {
            let shared = Rc::clone(&shared);
            Box::new(move |access: &mut dyn AdjointAccess<K::Real>| {
                shared.borrow_mut().run_primal(access);
                Ok(())
            }) as Callback<K::Real>
        });

        let record = ExternalFunctionRecord::new(Some(reverse_cb), forward_cb, primal_cb);
        K::with_tape(|tape| tape.push_external_function(record))
    }
}

impl<K, S> Default for ExternalFunctionHelper<K, S>
where
    K: TapeKind + AdKind<Data = Identifier>,
    S: Synchronization,
{
    fn default() -> Self {
        Self::new()
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::UserData;

    #[test]
    fn user_data_is_typed_by_slot() {
        let mut data = UserData::new();
        let a = data.add(3.5f64);
        let b = data.add("label");
        assert_eq!(data.get::<f64>(a), Some(&3.5));
        assert_eq!(data.get::<&str>(b), Some(&"label"));
        assert_eq!(data.get::<f64>(b), None);

        *data.get_mut::<f64>(a).unwrap() = 4.0;
        assert_eq!(data.get::<f64>(a), Some(&4.0));
    }
}
