//! Thread-local tape bindings.
//!
//! Each recorded kind owns one tape instance per thread; the [`declare_tape!`]
//! macro declares the zero-sized kind, wires its [`AdKind`] hooks to that
//! instance, and exposes it through [`TapeKind::with_tape`]. Distinct threads
//! that want to differentiate must each declare (or instantiate) their own
//! kind's tape — the binding is never shared across threads.

use descent_expr::AdKind;

use crate::interface::ReverseTape;

// TAPE KIND
// ================================================================================================

/// A kind backed by a thread-local recording tape.
pub trait TapeKind: AdKind {
    type Tape: ReverseTape<Real = Self::Real, Gradient = Self::Gradient>;

    /// Runs `f` with exclusive access to this thread's tape.
    ///
    /// The tape is guarded by a `RefCell`: do not construct, clone, or drop
    /// active scalars of this kind inside `f` (their lifecycle hooks would
    /// re-enter the tape); use the scalar-level API outside the closure
    /// instead.
    fn with_tape<T>(f: impl FnOnce(&mut Self::Tape) -> T) -> T;
}

// DECLARATION MACRO
// ================================================================================================

/// Declares a zero-sized tape kind bound to a thread-local tape instance.
///
/// ```ignore
/// declare_tape!(pub struct Rev64: JacobianTape<f64, f64, LinearIndexManager>);
///
/// type Var = Active<Rev64>;
/// ```
///
/// The kind names exactly one `(tape flavor, index manager)` pair, so copy
/// semantics cannot be mixed within one program variable family.
#[macro_export]
macro_rules! declare_tape {
    ($(#[$meta:meta])* $vis:vis struct $name:ident : $tape:ty) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
        $vis struct $name;

        impl $crate::TapeKind for $name {
            type Tape = $tape;

            fn with_tape<T>(f: impl FnOnce(&mut Self::Tape) -> T) -> T {
                ::std::thread_local! {
                    static TAPE: ::core::cell::RefCell<$tape> =
                        ::core::cell::RefCell::new(<$tape as $crate::ReverseTape>::new());
                }
                TAPE.with(|tape| f(&mut tape.borrow_mut()))
            }
        }

        impl $crate::AdKind for $name {
            type Real = <$tape as $crate::ReverseTape>::Real;
            type Data = $crate::Identifier;
            type Gradient = <$tape as $crate::ReverseTape>::Gradient;

            const ALLOW_JACOBIAN_OPTIMIZATION: bool =
                <$tape as $crate::ReverseTape>::ALLOW_JACOBIAN_OPTIMIZATION;

            fn store_expr<E: $crate::ExprNode<Kind = Self>>(
                value: &mut Self::Real,
                data: &mut Self::Data,
                rhs: &E,
            ) {
                <Self as $crate::TapeKind>::with_tape(|tape| {
                    $crate::ReverseTape::store_expr(tape, value, data, rhs)
                });
            }

            fn store_copy(
                value: &mut Self::Real,
                data: &mut Self::Data,
                rhs: &$crate::Active<Self>,
            ) {
                <Self as $crate::TapeKind>::with_tape(|tape| {
                    $crate::ReverseTape::store_copy(tape, value, data, rhs.value(), *rhs.data())
                });
            }

            fn store_passive(value: &mut Self::Real, data: &mut Self::Data, rhs: Self::Real) {
                <Self as $crate::TapeKind>::with_tape(|tape| {
                    $crate::ReverseTape::store_passive(tape, value, data, rhs)
                });
            }

            fn free_data(data: &mut Self::Data) {
                if *data != $crate::PASSIVE_INDEX {
                    <Self as $crate::TapeKind>::with_tape(|tape| {
                        $crate::ReverseTape::free_identifier(tape, data)
                    });
                }
            }

            #[inline(always)]
            fn data_identifier(data: &Self::Data) -> $crate::Identifier {
                *data
            }

            fn gradient(data: &Self::Data) -> Self::Gradient {
                <Self as $crate::TapeKind>::with_tape(|tape| {
                    $crate::ReverseTape::gradient_at(tape, *data)
                })
            }

            fn set_gradient(data: &mut Self::Data, gradient: Self::Gradient) {
                <Self as $crate::TapeKind>::with_tape(|tape| {
                    $crate::ReverseTape::set_gradient_at(tape, *data, gradient)
                });
            }
        }
    };
}
