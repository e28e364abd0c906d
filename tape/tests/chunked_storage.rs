//! Long recordings with deliberately tiny chunks: sweeps must walk chunk
//! boundaries and reserve-time gaps transparently.
//!
//! The tape under test is a standalone instance with its own chunk sizes, so
//! the statements are stored through the explicit-tape API rather than the
//! thread-local binding.

use descent_expr::Active;
use descent_tape::{JacobianTape, LinearIndexManager, ReverseTape, declare_tape};
use descent_test_utils::{assert_close, central_difference, fd_tolerance};

declare_tape!(struct Rev: JacobianTape<f64, f64, LinearIndexManager>);

type Var = Active<Rev>;

const ITERATIONS: usize = 25;

fn iterated(x: f64) -> f64 {
    let mut current = 1.0;
    for _ in 0..ITERATIONS {
        current = current * x + 0.5;
    }
    current
}

#[test]
fn sweeps_cross_chunk_boundaries() {
    let mut tape = JacobianTape::<f64, f64, LinearIndexManager>::with_chunk_sizes(4, 3);
    tape.set_active();

    let mut x = Var::from(1.1);
    tape.register_input(&mut x);

    let mut current = Var::from(1.0);
    for _ in 0..ITERATIONS {
        let update = &current * &x + 0.5;
        let mut next = Var::from(0.0);
        {
            let (value, id) = next.parts_mut();
            tape.store_expr(value, id, update.node());
        }
        current = next;
    }
    tape.register_output(&mut current);
    tape.set_passive();

    let stats = tape.statistics();
    assert!(stats.statements.chunks > 1);
    assert!(stats.operand_data.chunks > 1);

    tape.set_gradient_at(*current.data(), 1.0);
    tape.evaluate().unwrap();
    let reverse = tape.gradient_at(*x.data());

    let reference = central_difference(iterated, 1.1);
    assert_close!(reverse, reference, fd_tolerance());

    // the forward sweep reads the same chunked rows front to back
    tape.clear_adjoints();
    tape.set_gradient_at(*x.data(), 1.0);
    tape.evaluate_forward().unwrap();
    let forward = tape.gradient_at(*current.data());
    assert_close!(forward, reverse, 1e-13);
}

#[test]
fn truncation_rewinds_across_chunks() {
    let mut tape = JacobianTape::<f64, f64, LinearIndexManager>::with_chunk_sizes(4, 3);
    tape.set_active();

    let mut x = Var::from(2.0);
    tape.register_input(&mut x);

    let mut y = Var::from(0.0);
    {
        let (value, id) = y.parts_mut();
        let doubled = &x * 2.0;
        tape.store_expr(value, id, doubled.node());
    }
    let checkpoint = tape.position();

    let mut current = Var::from(1.0);
    for _ in 0..ITERATIONS {
        let update = &current * &x;
        let mut next = Var::from(0.0);
        {
            let (value, id) = next.parts_mut();
            tape.store_expr(value, id, update.node());
        }
        current = next;
    }
    assert!(tape.statistics().statements.chunks > 1);

    tape.reset_to(checkpoint);
    tape.set_passive();
    assert_eq!(tape.position(), checkpoint);

    // the surviving prefix still differentiates
    tape.set_gradient_at(*y.data(), 1.0);
    tape.evaluate().unwrap();
    assert_close!(tape.gradient_at(*x.data()), 2.0);
}
