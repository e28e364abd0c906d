//! Behavior specific to the primal-value tapes: statement replay, old-primal
//! restoration, and primal re-evaluation at new inputs.

use descent_expr::{Active, ElementaryFunctions};
use descent_tape::{
    LinearIndexManager, PrimalValueTape, ReuseCountIndexManager, ReverseTape, TapeKind,
    declare_tape,
};
use descent_test_utils::assert_close;

declare_tape!(struct PrimalLinear: PrimalValueTape<f64, f64, LinearIndexManager>);
declare_tape!(struct PrimalCounted: PrimalValueTape<f64, f64, ReuseCountIndexManager>);

type Var = Active<PrimalLinear>;
type CountedVar = Active<PrimalCounted>;

#[test]
fn gradients_replay_the_recorded_shapes() {
    PrimalLinear::with_tape(|tape| {
        tape.reset();
        tape.set_active();
    });
    let mut x = Var::from(0.5);
    PrimalLinear::with_tape(|tape| tape.register_input(&mut x));

    let mut y: Var = ((&x).sin() * (&x).exp()).into();
    PrimalLinear::with_tape(|tape| {
        tape.register_output(&mut y);
        tape.set_passive();
    });

    y.set_gradient(1.0);
    PrimalLinear::with_tape(|tape| tape.evaluate()).unwrap();

    let expected = (0.5f64.cos() + 0.5f64.sin()) * 0.5f64.exp();
    assert_close!(x.gradient(), expected);
}

#[test]
fn mixed_operands_are_promoted_and_restored() {
    PrimalLinear::with_tape(|tape| {
        tape.reset();
        tape.set_active();
    });
    let mut x = Var::from(2.0);
    PrimalLinear::with_tape(|tape| tape.register_input(&mut x));

    // passive operands travel through the constant log
    let mut y: Var = ((3.0 * &x + 1.0) / 2.0).into();
    PrimalLinear::with_tape(|tape| {
        tape.register_output(&mut y);
        tape.set_passive();
    });

    y.set_gradient(1.0);
    PrimalLinear::with_tape(|tape| tape.evaluate()).unwrap();
    assert_close!(y.value(), 3.5);
    assert_close!(x.gradient(), 1.5);

    // a second sweep sees the same promoted constants
    PrimalLinear::with_tape(|tape| tape.clear_adjoints());
    y.set_gradient(1.0);
    PrimalLinear::with_tape(|tape| tape.evaluate()).unwrap();
    assert_close!(x.gradient(), 1.5);
}

#[test]
fn passive_leaves_are_promoted_into_reserved_slots() {
    PrimalLinear::with_tape(|tape| {
        tape.reset();
        tape.set_active();
    });
    let mut x = Var::from(2.5);
    PrimalLinear::with_tape(|tape| tape.register_input(&mut x));

    // an unregistered scalar participates with identifier 0; its value rides
    // in the constant log under a temporary identifier
    let passive = Var::from(4.0);
    let mut y: Var = (&x * &passive).into();
    PrimalLinear::with_tape(|tape| {
        tape.register_output(&mut y);
        tape.set_passive();
    });

    for _ in 0..2 {
        PrimalLinear::with_tape(|tape| tape.clear_adjoints());
        y.set_gradient(1.0);
        PrimalLinear::with_tape(|tape| tape.evaluate()).unwrap();
        assert_close!(x.gradient(), 4.0);
    }
}

#[test]
fn reassignment_restores_old_primals_across_sweeps() {
    PrimalCounted::with_tape(|tape| {
        tape.reset();
        tape.set_active();
    });
    let mut x = CountedVar::from(3.0);
    PrimalCounted::with_tape(|tape| tape.register_input(&mut x));

    // after detaching from the shared clone, the accumulator keeps its
    // identifier, so every update overwrites the primal slot the previous
    // statement reads; the sweep must roll those slots back
    let mut t = x.clone();
    t *= &x;
    t *= &x;
    t *= &x;
    PrimalCounted::with_tape(|tape| {
        tape.register_output(&mut t);
        tape.set_passive();
    });

    for _ in 0..2 {
        PrimalCounted::with_tape(|tape| tape.clear_adjoints());
        t.set_gradient(1.0);
        PrimalCounted::with_tape(|tape| tape.evaluate()).unwrap();
        assert_close!(x.gradient(), 108.0);
    }
}

#[test]
fn primal_reevaluation_at_new_inputs() {
    PrimalLinear::with_tape(|tape| {
        tape.reset();
        tape.set_active();
    });
    let mut x = Var::from(0.5);
    PrimalLinear::with_tape(|tape| tape.register_input(&mut x));

    let mut y: Var = ((&x).sin() * &x).into();
    PrimalLinear::with_tape(|tape| {
        tape.register_output(&mut y);
        tape.set_passive();
    });

    let x_id = *x.data();
    let y_id = *y.data();

    // move the input and replay the primal computation
    PrimalLinear::with_tape(|tape| {
        tape.set_primal(x_id, 1.2);
        tape.evaluate_primal()
    })
    .unwrap();
    let replayed = PrimalLinear::with_tape(|tape| tape.primal(y_id));
    assert_close!(replayed, 1.2f64.sin() * 1.2);

    // gradients now refer to the new point
    PrimalLinear::with_tape(|tape| tape.clear_adjoints());
    y.set_gradient(1.0);
    PrimalLinear::with_tape(|tape| tape.evaluate()).unwrap();
    assert_close!(x.gradient(), 1.2f64.sin() + 1.2 * 1.2f64.cos());
}

#[test]
fn forward_sweep_recomputes_primals_and_tangents() {
    PrimalLinear::with_tape(|tape| {
        tape.reset();
        tape.set_active();
    });
    let mut x = Var::from(2.0);
    PrimalLinear::with_tape(|tape| tape.register_input(&mut x));

    let mut y: Var = ((&x).sqrt() + &x).into();
    PrimalLinear::with_tape(|tape| {
        tape.register_output(&mut y);
        tape.set_passive();
    });

    let x_id = *x.data();
    let y_id = *y.data();

    x.set_gradient(1.0);
    PrimalLinear::with_tape(|tape| tape.evaluate_forward()).unwrap();
    assert_close!(y.gradient(), 0.5 / 2.0f64.sqrt() + 1.0);

    // moving the input and sweeping forward refreshes the outputs
    PrimalLinear::with_tape(|tape| {
        tape.clear_adjoints();
        tape.set_primal(x_id, 9.0)
    });
    x.set_gradient(1.0);
    PrimalLinear::with_tape(|tape| tape.evaluate_forward()).unwrap();
    let refreshed = PrimalLinear::with_tape(|tape| tape.primal(y_id));
    assert_close!(refreshed, 12.0);
    assert_close!(y.gradient(), 0.5 / 3.0 + 1.0);
}

#[test]
fn passive_overwrites_stay_restorable_under_the_linear_manager() {
    PrimalLinear::with_tape(|tape| {
        tape.reset();
        tape.set_active();
    });
    let mut x = Var::from(1.0);
    PrimalLinear::with_tape(|tape| tape.register_input(&mut x));

    let before = PrimalLinear::with_tape(|tape| tape.statistics());
    let mut v: Var = (&x * 2.0).into();
    v.assign(5.0);
    let after = PrimalLinear::with_tape(|tape| tape.statistics());
    PrimalLinear::with_tape(|tape| tape.set_passive());

    // the passive overwrite itself is recorded so the slot can be rolled back
    assert_eq!(after.statements.entries, before.statements.entries + 2);
    assert_close!(v.value(), 5.0);
}

#[test]
fn passive_overwrites_deactivate_under_the_reuse_manager() {
    PrimalCounted::with_tape(|tape| {
        tape.reset();
        tape.set_active();
    });
    let mut x = CountedVar::from(1.0);
    PrimalCounted::with_tape(|tape| tape.register_input(&mut x));

    let mut v: CountedVar = (&x * 2.0).into();
    let before = PrimalCounted::with_tape(|tape| tape.statistics());
    v.assign(5.0);
    let after = PrimalCounted::with_tape(|tape| tape.statistics());
    PrimalCounted::with_tape(|tape| tape.set_passive());

    assert_eq!(after.statements.entries, before.statements.entries);
    assert_close!(v.value(), 5.0);
    assert_eq!(*v.data(), 0);
}

#[test]
fn additive_passive_updates_are_recorded() {
    PrimalLinear::with_tape(|tape| {
        tape.reset();
        tape.set_active();
    });
    let mut x = Var::from(2.0);
    PrimalLinear::with_tape(|tape| tape.register_input(&mut x));

    // the replay reads primals by identifier, so even a passive shift must
    // land on the tape
    let mut y: Var = (&x * &x).into();
    let before = PrimalLinear::with_tape(|tape| tape.statistics());
    y += 10.0;
    let after = PrimalLinear::with_tape(|tape| tape.statistics());

    let mut z: Var = ((&y).sqrt()).into();
    PrimalLinear::with_tape(|tape| {
        tape.register_output(&mut z);
        tape.set_passive();
    });

    assert_eq!(after.statements.entries, before.statements.entries + 1);

    z.set_gradient(1.0);
    PrimalLinear::with_tape(|tape| tape.evaluate()).unwrap();
    // z = sqrt(x^2 + 10); dz/dx = x / sqrt(x^2 + 10)
    assert_close!(x.gradient(), 2.0 / 14.0f64.sqrt());
}

#[test]
fn statistics_include_the_primal_vector() {
    PrimalLinear::with_tape(|tape| {
        tape.reset();
        tape.set_active();
    });
    let mut x = Var::from(2.0);
    PrimalLinear::with_tape(|tape| tape.register_input(&mut x));
    let mut y: Var = (&x * &x).into();
    PrimalLinear::with_tape(|tape| {
        tape.register_output(&mut y);
        tape.set_passive();
    });

    let stats = PrimalLinear::with_tape(|tape| tape.statistics());
    assert_eq!(stats.tape_name, "PrimalValueTape");
    assert!(stats.primal_slots.is_some());
    assert!(stats.constants.is_some());
    assert!(stats.operand_data.entries >= 2);
    assert!(stats.to_string().contains("Primal slots"));
}
