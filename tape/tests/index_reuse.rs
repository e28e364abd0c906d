//! Identifier-reuse safety: programs that reassign, clone and drop active
//! scalars must produce the same gradients under every index manager and
//! both tape flavors.

use descent_core::Identifier;
use descent_expr::{Active, AdKind, ElementaryFunctions};
use descent_tape::{
    JacobianTape, LinearIndexManager, PrimalValueTape, ReuseCountIndexManager, ReuseIndexManager,
    ReverseTape, TapeKind, declare_tape,
};
use descent_test_utils::{assert_close, gradient_central_difference};
use proptest::prelude::*;

declare_tape!(struct JacobianLinear: JacobianTape<f64, f64, LinearIndexManager>);
declare_tape!(struct JacobianReuse: JacobianTape<f64, f64, ReuseIndexManager>);
declare_tape!(struct JacobianCounted: JacobianTape<f64, f64, ReuseCountIndexManager>);
declare_tape!(struct PrimalLinear: PrimalValueTape<f64, f64, LinearIndexManager>);
declare_tape!(struct PrimalReuse: PrimalValueTape<f64, f64, ReuseIndexManager>);
declare_tape!(struct PrimalCounted: PrimalValueTape<f64, f64, ReuseCountIndexManager>);

/// Records `program` over the given inputs and returns the input gradients.
fn gradient_of<K, F>(inputs: &[f64], program: F) -> Vec<f64>
where
    K: TapeKind + AdKind<Real = f64, Data = Identifier, Gradient = f64>,
    F: FnOnce(&[Active<K>]) -> Active<K>,
{
    K::with_tape(|tape| {
        tape.reset();
        tape.set_active();
    });

    let mut variables: Vec<Active<K>> = inputs.iter().map(|v| Active::new(*v)).collect();
    K::with_tape(|tape| {
        for variable in variables.iter_mut() {
            tape.register_input(variable);
        }
    });

    let mut output = program(&variables);
    K::with_tape(|tape| {
        tape.register_output(&mut output);
        tape.set_passive();
    });

    output.set_gradient(1.0);
    K::with_tape(|tape| tape.evaluate()).unwrap();

    variables.iter().map(|v| v.gradient()).collect()
}

/// Runs one program through all six (tape, manager) combinations and checks
/// that every gradient agrees with the linear Jacobian reference.
macro_rules! assert_all_kinds_agree {
    ($inputs:expr, $program:expr) => {{
        let inputs: &[f64] = $inputs;
        let reference = gradient_of::<JacobianLinear, _>(inputs, $program);
        let others = [
            gradient_of::<JacobianReuse, _>(inputs, $program),
            gradient_of::<JacobianCounted, _>(inputs, $program),
            gradient_of::<PrimalLinear, _>(inputs, $program),
            gradient_of::<PrimalReuse, _>(inputs, $program),
            gradient_of::<PrimalCounted, _>(inputs, $program),
        ];
        for gradients in &others {
            assert_eq!(reference.len(), gradients.len());
            for (left, right) in reference.iter().zip(gradients) {
                // copy statements may reorder the accumulation, so agreement
                // is up to rounding, not bitwise
                assert_close!(*left, *right, 1e-13);
            }
        }
        reference
    }};
}

#[test]
fn reassignment_chain_is_manager_independent() {
    let reference = assert_all_kinds_agree!(&[3.0], |vars| {
        let mut t = vars[0].clone();
        t = (&t * &t).into();
        t = (&t * &t).into();
        t
    });
    assert_close!(reference[0], 108.0);
}

#[test]
fn clones_share_then_detach() {
    let reference = assert_all_kinds_agree!(&[2.0], |vars| {
        let a = vars[0].clone();
        let b = a.clone();
        // the product reads both holders of a shared identifier
        (&a * &b + &vars[0]).into()
    });
    // d/dx (x^2 + x)
    assert_close!(reference[0], 5.0);
}

#[test]
fn dropped_scalars_release_identifiers_safely() {
    let reference = assert_all_kinds_agree!(&[1.2, 0.7], |vars| {
        let sum: Active<_> = (&vars[0] + &vars[1]).into();
        let scaled: Active<_> = (&sum * 2.0).into();
        drop(sum);
        // a fresh scalar may pick up the dropped identifier
        let shifted: Active<_> = (&vars[1] * &vars[1]).into();
        (&scaled + &shifted).into()
    });
    assert_close!(reference[0], 2.0);
    assert_close!(reference[1], 2.0 + 2.0 * 0.7);
}

#[test]
fn self_referential_updates_use_the_old_operand() {
    let reference = assert_all_kinds_agree!(&[1.1, 2.3], |vars| {
        let mut accumulator = vars[0].clone();
        accumulator *= &vars[1];
        accumulator += &vars[0];
        let snapshot = accumulator.clone();
        accumulator *= &snapshot;
        accumulator
    });
    // a = (x*y + x)^2; da/dx = 2 (x y + x)(y + 1), da/dy = 2 (x y + x) x
    let inner = 1.1 * 2.3 + 1.1;
    assert_close!(reference[0], 2.0 * inner * (2.3 + 1.0));
    assert_close!(reference[1], 2.0 * inner * 1.1);
}

#[test]
fn gradients_survive_interleaved_registration_and_reuse() {
    let reference = assert_all_kinds_agree!(&[0.4, 0.9, 1.6], |vars| {
        let mut partial: Active<_> = ((&vars[0]).sin() + &vars[1]).into();
        let temp: Active<_> = (&vars[2] * &partial).into();
        partial = ((&temp).sqrt() * 2.0).into();
        drop(temp);
        partial
    });

    let fd = gradient_central_difference(
        |x| 2.0 * (x[2] * (x[0].sin() + x[1])).sqrt(),
        &[0.4, 0.9, 1.6],
    );
    for (ad, fd) in reference.iter().zip(fd) {
        assert_close!(*ad, fd, descent_test_utils::fd_tolerance());
    }
}

// RANDOMIZED PROGRAMS
// ================================================================================================

/// Horner evaluation with a running reassigned accumulator; every iteration
/// frees and reacquires identifiers under the reuse managers.
fn horner<K>(variables: &[Active<K>], coefficients: &[f64]) -> Active<K>
where
    K: TapeKind + AdKind<Real = f64, Data = Identifier, Gradient = f64>,
{
    let x = &variables[0];
    let mut accumulator = Active::<K>::new(0.0);
    for coefficient in coefficients {
        accumulator = (&accumulator * x + *coefficient).into();
    }
    accumulator
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_polynomials_agree_across_managers(
        coefficients in prop::collection::vec(-2.0..2.0f64, 1..6),
        x in 0.2..1.5f64,
    ) {
        let reference =
            gradient_of::<JacobianLinear, _>(&[x], |vars| horner(vars, &coefficients));
        let reuse = gradient_of::<JacobianCounted, _>(&[x], |vars| horner(vars, &coefficients));
        let primal = gradient_of::<PrimalCounted, _>(&[x], |vars| horner(vars, &coefficients));
        prop_assert!((reference[0] - reuse[0]).abs() <= 1e-13 * reference[0].abs().max(1.0));
        prop_assert!((reference[0] - primal[0]).abs() <= 1e-13 * reference[0].abs().max(1.0));

        let fd = gradient_central_difference(
            |p| coefficients.iter().fold(0.0, |acc, c| acc * p[0] + c),
            &[x],
        );
        let scale = reference[0].abs().max(1.0);
        prop_assert!((reference[0] - fd[0]).abs() <= descent_test_utils::fd_tolerance() * scale);
    }
}
