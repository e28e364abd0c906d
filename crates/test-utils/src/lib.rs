//! Shared helpers for the descent test suites: finite-difference reference
//! derivatives and tolerance-aware assertions.

// FINITE DIFFERENCES
// ================================================================================================

/// Default relative step for central differences: the optimal balance point
/// between truncation and rounding error is near the cube root of machine
/// epsilon.
pub fn default_step() -> f64 {
    f64::EPSILON.cbrt()
}

/// Tolerance for comparing an AD derivative against a central-difference
/// estimate of a well-conditioned function.
pub fn fd_tolerance() -> f64 {
    f64::EPSILON.sqrt() * 100.0
}

/// Central-difference estimate of `df/dx` at `x`.
pub fn central_difference<F>(f: F, x: f64) -> f64
where
    F: Fn(f64) -> f64,
{
    let step = default_step() * x.abs().max(1.0);
    (f(x + step) - f(x - step)) / (2.0 * step)
}

/// Central-difference estimate of the gradient of `f` at `x`.
pub fn gradient_central_difference<F>(f: F, x: &[f64]) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut point = x.to_vec();
    let mut gradient = Vec::with_capacity(x.len());
    for i in 0..x.len() {
        let step = default_step() * x[i].abs().max(1.0);
        point[i] = x[i] + step;
        let upper = f(&point);
        point[i] = x[i] - step;
        let lower = f(&point);
        point[i] = x[i];
        gradient.push((upper - lower) / (2.0 * step));
    }
    gradient
}

// ASSERTIONS
// ================================================================================================

/// Asserts that two floats agree within `tol`, scaled by the larger
/// magnitude (mixed absolute/relative comparison).
#[macro_export]
macro_rules! assert_close {
    ($left:expr, $right:expr, $tol:expr) => {{
        let (left, right, tol) = ($left as f64, $right as f64, $tol as f64);
        let scale = left.abs().max(right.abs()).max(1.0);
        assert!(
            (left - right).abs() <= tol * scale,
            "values differ beyond tolerance: {left} vs {right} (tol {tol}, scale {scale})",
        );
    }};
    ($left:expr, $right:expr) => {
        $crate::assert_close!($left, $right, 1e-12)
    };
}

// TESTS
// ================================================================================================
