//! Gradients of every elementary operator against central finite
//! differences, plus the calculus identities built from them.

use descent_expr::{Active, ElementaryFunctions, atan2, max, min, pow};
use descent_tape::{JacobianTape, LinearIndexManager, ReverseTape, TapeKind, declare_tape};
use descent_test_utils::{assert_close, central_difference, fd_tolerance};

declare_tape!(struct Rev: JacobianTape<f64, f64, LinearIndexManager>);

type Var = Active<Rev>;

fn reverse_gradient<F>(f: F, x0: f64) -> f64
where
    F: FnOnce(&Var) -> Var,
{
    Rev::with_tape(|tape| {
        tape.reset();
        tape.set_active();
    });
    let mut x = Var::from(x0);
    Rev::with_tape(|tape| tape.register_input(&mut x));

    let mut y: Var = f(&x);
    Rev::with_tape(|tape| {
        tape.register_output(&mut y);
        tape.set_passive();
    });

    y.set_gradient(1.0);
    Rev::with_tape(|tape| tape.evaluate()).unwrap();
    x.gradient()
}

fn reverse_gradient2<F>(f: F, x0: f64, y0: f64) -> (f64, f64)
where
    F: FnOnce(&Var, &Var) -> Var,
{
    Rev::with_tape(|tape| {
        tape.reset();
        tape.set_active();
    });
    let mut x = Var::from(x0);
    let mut y = Var::from(y0);
    Rev::with_tape(|tape| {
        tape.register_input(&mut x);
        tape.register_input(&mut y);
    });

    let mut z: Var = f(&x, &y);
    Rev::with_tape(|tape| {
        tape.register_output(&mut z);
        tape.set_passive();
    });

    z.set_gradient(1.0);
    Rev::with_tape(|tape| tape.evaluate()).unwrap();
    (x.gradient(), y.gradient())
}

/// Checks a unary operator at several points against finite differences.
macro_rules! check_unary {
    ($($name:ident : |$x:ident| $active:expr, |$p:ident| $passive:expr, [$($point:expr),+];)*) => {
        $(
            #[test]
            fn $name() {
                for point in [$($point),+] {
                    let ad = reverse_gradient(|$x| ($active).into(), point);
                    let fd = central_difference(|$p: f64| $passive, point);
                    assert_close!(ad, fd, fd_tolerance());
                }
            }
        )*
    };
}

check_unary! {
    negation_gradient: |x| -x, |p| -p, [0.3, -1.7];
    sqrt_gradient: |x| x.sqrt(), |p| p.sqrt(), [0.25, 4.0, 10.0];
    exp_gradient: |x| x.exp(), |p| p.exp(), [-1.0, 0.0, 1.5];
    ln_gradient: |x| x.ln(), |p| p.ln(), [0.1, 1.0, 7.0];
    log10_gradient: |x| x.log10(), |p| p.log10(), [0.5, 2.0, 100.0];
    sin_gradient: |x| x.sin(), |p| p.sin(), [-0.9, 0.0, 1.2];
    cos_gradient: |x| x.cos(), |p| p.cos(), [-0.4, 0.8];
    tan_gradient: |x| x.tan(), |p| p.tan(), [-0.6, 0.6];
    asin_gradient: |x| x.asin(), |p| p.asin(), [-0.5, 0.3];
    acos_gradient: |x| x.acos(), |p| p.acos(), [-0.5, 0.3];
    atan_gradient: |x| x.atan(), |p| p.atan(), [-2.0, 0.5];
    sinh_gradient: |x| x.sinh(), |p| p.sinh(), [-1.0, 0.7];
    cosh_gradient: |x| x.cosh(), |p| p.cosh(), [-1.0, 0.7];
    tanh_gradient: |x| x.tanh(), |p| p.tanh(), [-0.9, 1.4];
    atanh_gradient: |x| x.atanh(), |p| p.atanh(), [-0.6, 0.4];
    abs_gradient: |x| x.abs(), |p| p.abs(), [-2.5, 3.5];
}

macro_rules! check_binary {
    ($($name:ident : |$x:ident, $y:ident| $active:expr, |$px:ident, $py:ident| $passive:expr, [$(($ax:expr, $ay:expr)),+];)*) => {
        $(
            #[test]
            fn $name() {
                for (ax, ay) in [$(($ax, $ay)),+] {
                    let (dx, dy) = reverse_gradient2(|$x, $y| ($active).into(), ax, ay);
                    let fdx = central_difference(|$px: f64| { let $py = ay; $passive }, ax);
                    let fdy = central_difference(|$py: f64| { let $px = ax; $passive }, ay);
                    assert_close!(dx, fdx, fd_tolerance());
                    assert_close!(dy, fdy, fd_tolerance());
                }
            }
        )*
    };
}

check_binary! {
    addition_gradient: |x, y| x + y, |px, py| px + py, [(1.0, 2.0), (-0.5, 3.5)];
    subtraction_gradient: |x, y| x - y, |px, py| px - py, [(1.0, 2.0), (4.5, -2.0)];
    multiplication_gradient: |x, y| x * y, |px, py| px * py, [(3.0, 5.0), (-1.5, 0.5)];
    division_gradient: |x, y| x / y, |px, py| px / py, [(1.0, 4.0), (-3.0, 2.5)];
    pow_gradient: |x, y| pow(x, y), |px, py| px.powf(py), [(2.0, 3.0), (1.5, -0.5)];
    atan2_gradient: |x, y| atan2(x, y), |px, py| px.atan2(py), [(1.0, 2.0), (-0.7, 0.4)];
    min_gradient: |x, y| min(x, y), |px, py| px.min(py), [(1.0, 2.0), (5.0, -1.0)];
    max_gradient: |x, y| max(x, y), |px, py| px.max(py), [(1.0, 2.0), (5.0, -1.0)];
}

#[test]
fn mixed_passive_operands_match_finite_differences() {
    let ad = reverse_gradient(|x| (3.0 * x + 1.0).into(), 2.0);
    assert_close!(ad, 3.0);

    let ad = reverse_gradient(|x| (10.0 / x).into(), 2.0);
    assert_close!(ad, -2.5);

    let ad = reverse_gradient(|x| (x.powf(3.0)).into(), 2.0);
    assert_close!(ad, 12.0);

    // a negative base is fine when the exponent is passive
    let ad = reverse_gradient(|x| (x.powf(2.0)).into(), -3.0);
    assert_close!(ad, -6.0);

    let ad = reverse_gradient(|x| (min(x, 0.0)).into(), 1.0);
    assert_close!(ad, 0.0);

    let ad = reverse_gradient(|x| (max(x, 0.0)).into(), 1.0);
    assert_close!(ad, 1.0);
}

#[test]
fn chain_rule_through_compositions() {
    let ad = reverse_gradient(|x| ((x.sin() * x.sin() + x.cos() * x.cos()).sqrt()).into(), 0.8);
    let fd = central_difference(|p: f64| (p.sin() * p.sin() + p.cos() * p.cos()).sqrt(), 0.8);
    assert_close!(ad, fd, fd_tolerance());
    // the identity sin^2 + cos^2 = 1 has derivative 0
    assert_close!(ad, 0.0, 1e-10);
}

#[test]
fn deep_composition_matches_finite_differences() {
    let ad = reverse_gradient(|x| (((x.exp() + 1.0).ln() * 0.5).tanh()).into(), 0.9);
    let fd = central_difference(|p: f64| ((p.exp() + 1.0).ln() * 0.5).tanh(), 0.9);
    assert_close!(ad, fd, fd_tolerance());
}

#[test]
fn expression_comparisons_use_primal_values() {
    Rev::with_tape(|tape| {
        tape.reset();
        tape.set_active();
    });
    let mut x = Var::from(2.0);
    Rev::with_tape(|tape| tape.register_input(&mut x));

    assert!(x > 1.0);
    assert!(x == 2.0);
    assert!(1.0 < x);

    let doubled = &x * 2.0;
    assert!(doubled > 3.9);
    assert!(doubled.value() == 4.0);
    assert!(!doubled.is_nan());
    assert!(doubled.is_finite());
    assert_eq!(doubled.floor(), 4.0);
    Rev::with_tape(|tape| tape.set_passive());
}
