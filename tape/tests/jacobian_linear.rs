//! End-to-end differentiation through the Jacobian tape with the linear
//! index manager.

use descent_expr::{Active, ElementaryFunctions, pow};
use descent_tape::{
    JacobianTape, LinearIndexManager, ReverseTape, TapeError, TapeKind, declare_tape,
};
use descent_test_utils::assert_close;
use rstest::rstest;

declare_tape!(struct Rev: JacobianTape<f64, f64, LinearIndexManager>);

type Var = Active<Rev>;

fn start_recording() {
    Rev::with_tape(|tape| {
        tape.reset();
        tape.set_active();
    });
}

fn stop_recording() {
    Rev::with_tape(|tape| tape.set_passive());
}

#[test]
fn quadratic_with_a_constant_factor() {
    start_recording();
    let mut x = Var::from(10.0);
    Rev::with_tape(|tape| tape.register_input(&mut x));

    let mut y: Var = (42.0 * &x * &x).into();
    Rev::with_tape(|tape| tape.register_output(&mut y));
    stop_recording();

    y.set_gradient(1.0);
    Rev::with_tape(|tape| tape.evaluate()).unwrap();

    assert_close!(y.value(), 4200.0);
    assert_close!(x.gradient(), 840.0);
}

#[rstest]
#[case(0.5)]
#[case(2.0)]
#[case(-10.0)]
fn scaling_by_a_passive_factor(#[case] factor: f64) {
    start_recording();
    let mut x = Var::from(7.0);
    Rev::with_tape(|tape| tape.register_input(&mut x));

    let mut y: Var = (factor * &x).into();
    Rev::with_tape(|tape| tape.register_output(&mut y));
    stop_recording();

    y.set_gradient(1.0);
    Rev::with_tape(|tape| tape.evaluate()).unwrap();
    assert_close!(x.gradient(), factor);
}

#[test]
fn power_with_two_active_operands() {
    start_recording();
    let mut x = Var::from(2.0);
    let mut y = Var::from(3.0);
    Rev::with_tape(|tape| {
        tape.register_input(&mut x);
        tape.register_input(&mut y);
    });

    let mut z: Var = pow(&x, &y).into();
    Rev::with_tape(|tape| tape.register_output(&mut z));
    stop_recording();

    z.set_gradient(1.0);
    Rev::with_tape(|tape| tape.evaluate()).unwrap();

    assert_close!(z.value(), 8.0);
    assert_close!(x.gradient(), 12.0);
    assert_close!(y.gradient(), 2f64.ln() * 8.0);
}

#[test]
fn product_of_transcendentals() {
    start_recording();
    let mut x = Var::from(0.5);
    Rev::with_tape(|tape| tape.register_input(&mut x));

    let mut y: Var = ((&x).sin() * (&x).exp()).into();
    Rev::with_tape(|tape| tape.register_output(&mut y));
    stop_recording();

    y.set_gradient(1.0);
    Rev::with_tape(|tape| tape.evaluate()).unwrap();

    let expected = (0.5f64.cos() + 0.5f64.sin()) * 0.5f64.exp();
    assert_close!(x.gradient(), expected);
}

#[test]
fn reassignment_chain() {
    start_recording();
    let mut x = Var::from(3.0);
    Rev::with_tape(|tape| tape.register_input(&mut x));

    let mut t = x.clone();
    t = (&t * &t).into();
    t = (&t * &t).into();
    Rev::with_tape(|tape| tape.register_output(&mut t));
    stop_recording();

    t.set_gradient(1.0);
    Rev::with_tape(|tape| tape.evaluate()).unwrap();

    // d(x^4)/dx = 4 x^3
    assert_close!(t.value(), 81.0);
    assert_close!(x.gradient(), 108.0);
}

#[test]
fn forward_and_reverse_sweeps_are_dual() {
    start_recording();
    let mut x = Var::from(0.7);
    Rev::with_tape(|tape| tape.register_input(&mut x));

    let mut y: Var = ((&x).tanh() + (&x * &x) / 2.0).into();
    Rev::with_tape(|tape| tape.register_output(&mut y));
    stop_recording();

    y.set_gradient(1.0);
    Rev::with_tape(|tape| tape.evaluate()).unwrap();
    let reverse = x.gradient();

    Rev::with_tape(|tape| tape.clear_adjoints());
    x.set_gradient(1.0);
    Rev::with_tape(|tape| tape.evaluate_forward()).unwrap();
    let forward = y.gradient();

    // the sweeps combine the same stored partials; only the accumulation
    // order may differ
    assert_close!(reverse, forward, 1e-15);
}

#[test]
fn repeated_evaluation_is_idempotent() {
    start_recording();
    let mut x = Var::from(1.3);
    Rev::with_tape(|tape| tape.register_input(&mut x));

    let mut y: Var = ((&x).cos() * &x).into();
    Rev::with_tape(|tape| tape.register_output(&mut y));
    stop_recording();

    let mut gradients = [0.0; 2];
    for slot in &mut gradients {
        Rev::with_tape(|tape| tape.clear_adjoints());
        y.set_gradient(1.0);
        Rev::with_tape(|tape| tape.evaluate()).unwrap();
        *slot = x.gradient();
    }
    assert_eq!(gradients[0], gradients[1]);
    assert_close!(gradients[0], 1.3f64.cos() - 1.3 * 1.3f64.sin());
}

#[test]
fn reset_and_rerecord_yields_identical_adjoints() {
    start_recording();
    let checkpoint = Rev::with_tape(|tape| tape.position());

    let record_once = || {
        let mut x = Var::from(2.0);
        Rev::with_tape(|tape| tape.register_input(&mut x));
        let mut y: Var = ((&x).ln() + &x * 3.0).into();
        Rev::with_tape(|tape| tape.register_output(&mut y));
        stop_recording();
        y.set_gradient(1.0);
        Rev::with_tape(|tape| tape.evaluate()).unwrap();
        x.gradient()
    };

    let first = record_once();

    Rev::with_tape(|tape| {
        tape.reset_to(checkpoint);
        tape.set_active();
    });
    let second = record_once();

    assert_eq!(first, second);
    assert_close!(first, 0.5 + 3.0);
}

#[test]
fn linearity_of_the_adjoint() {
    start_recording();
    let mut w = Var::from(0.8);
    Rev::with_tape(|tape| tape.register_input(&mut w));

    let u: Var = ((&w).sin()).into();
    let v: Var = (&w * &w).into();
    let mut combined: Var = (2.5 * &u - 4.0 * &v).into();
    Rev::with_tape(|tape| tape.register_output(&mut combined));
    stop_recording();

    combined.set_gradient(1.0);
    Rev::with_tape(|tape| tape.evaluate()).unwrap();

    let expected = 2.5 * 0.8f64.cos() - 4.0 * 2.0 * 0.8;
    assert_close!(w.gradient(), expected);
}

#[test]
fn passive_operands_leave_no_jacobian_entries() {
    start_recording();
    let mut x = Var::from(4.0);
    Rev::with_tape(|tape| tape.register_input(&mut x));

    let before = Rev::with_tape(|tape| tape.statistics());
    let _shifted: Var = (&x + 1.0).into();
    let after = Rev::with_tape(|tape| tape.statistics());
    stop_recording();

    assert_eq!(after.statements.entries, before.statements.entries + 1);
    assert_eq!(after.operand_data.entries, before.operand_data.entries + 1);
}

#[test]
fn additive_passive_updates_skip_the_tape() {
    start_recording();
    let mut x = Var::from(4.0);
    Rev::with_tape(|tape| tape.register_input(&mut x));

    let mut y: Var = (&x * 2.0).into();
    let before = Rev::with_tape(|tape| tape.statistics());
    y += 10.0;
    y -= 0.5;
    let after = Rev::with_tape(|tape| tape.statistics());
    stop_recording();

    assert_eq!(before.statements.entries, after.statements.entries);
    assert_close!(y.value(), 17.5);

    y.set_gradient(1.0);
    Rev::with_tape(|tape| tape.evaluate()).unwrap();
    assert_close!(x.gradient(), 2.0);
}

#[test]
fn compound_assignment_records_through_the_left_hand_side() {
    start_recording();
    let mut x = Var::from(1.5);
    Rev::with_tape(|tape| tape.register_input(&mut x));

    let mut y: Var = (&x * &x).into();
    y *= &x;
    Rev::with_tape(|tape| tape.register_output(&mut y));
    stop_recording();

    y.set_gradient(1.0);
    Rev::with_tape(|tape| tape.evaluate()).unwrap();

    // y = x^3
    assert_close!(y.value(), 1.5f64.powi(3));
    assert_close!(x.gradient(), 3.0 * 1.5 * 1.5);
}

#[test]
fn evaluation_against_an_external_adjoint_buffer() {
    use descent_tape::AdjointVector;

    start_recording();
    let mut x = Var::from(3.0);
    Rev::with_tape(|tape| tape.register_input(&mut x));
    let mut y: Var = (&x * &x).into();
    Rev::with_tape(|tape| {
        tape.register_output(&mut y);
        tape.set_passive();
    });

    let mut buffer = AdjointVector::new();
    buffer.set(*y.data(), 1.0);
    Rev::with_tape(|tape| {
        let (from, to) = (tape.position(), tape.zero_position());
        tape.evaluate_with(from, to, &mut buffer)
    })
    .unwrap();

    assert_close!(buffer.get(*x.data()), 6.0);
    // the tape's own adjoint vector was not involved
    assert_close!(x.gradient(), 0.0);
}

#[test]
fn evaluating_while_recording_is_rejected() {
    start_recording();
    let err = Rev::with_tape(|tape| tape.evaluate()).unwrap_err();
    assert!(matches!(err, TapeError::EvaluateWhileRecording));
    stop_recording();
}

#[test]
fn misordered_positions_are_rejected() {
    start_recording();
    let mut x = Var::from(1.0);
    Rev::with_tape(|tape| tape.register_input(&mut x));
    let _y: Var = (&x * &x).into();
    stop_recording();

    let err = Rev::with_tape(|tape| {
        let (from, to) = (tape.zero_position(), tape.position());
        tape.evaluate_between(from, to)
    })
    .unwrap_err();
    assert!(matches!(err, TapeError::PositionOrder));
}

#[test]
fn statistics_report_the_recorded_session() {
    start_recording();
    let mut x = Var::from(2.0);
    Rev::with_tape(|tape| tape.register_input(&mut x));
    let mut y: Var = ((&x).exp() * &x).into();
    Rev::with_tape(|tape| tape.register_output(&mut y));
    stop_recording();

    let stats = Rev::with_tape(|tape| tape.statistics());
    assert_eq!(stats.tape_name, "JacobianTape");
    assert!(!stats.active);
    assert!(stats.statements.entries >= 3);
    assert!(stats.operand_data.entries >= 2);
    assert!(stats.max_live_identifier >= 2);
    assert!(stats.constants.is_none());

    let rendered = stats.to_string();
    assert!(rendered.contains("Tape statistics (JacobianTape)"));
    assert!(rendered.contains("Statements"));
}
