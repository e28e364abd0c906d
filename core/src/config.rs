//! Compile-time option table of the engine.
//!
//! Every flag is a `const bool` driven by a cargo feature, so disabled checks
//! compile down to nothing in the hot paths. The defaults keep all safety
//! gates on; production builds opt out per concern.

// RECORDING GATES
// ================================================================================================

/// Gates every `store` on the tape's activity flag. When disabled, recording
/// cannot be paused and `set_passive` has no effect on stores.
pub const CHECK_TAPE_ACTIVITY: bool = !cfg!(feature = "no-activity-check");

/// Skips partials whose operand identifier is the passive index 0.
pub const CHECK_ZERO_INDEX: bool = !cfg!(feature = "no-zero-index-check");

/// Skips partials whose numeric value is 0.
pub const CHECK_JACOBIAN_IS_ZERO: bool = !cfg!(feature = "no-zero-jacobian-check");

/// Skips partials that are NaN or infinite instead of propagating them.
pub const IGNORE_INVALID_JACOBIANS: bool = cfg!(feature = "ignore-invalid-jacobians");

// EVALUATION GATES
// ================================================================================================

/// Skips statements whose lhs adjoint is 0 during reverse sweeps; every
/// update they would produce is 0 as well.
pub const SKIP_ZERO_ADJOINT: bool = !cfg!(feature = "no-zero-adjoint-skip");

// DOMAIN GUARDS
// ================================================================================================

/// Enables the domain guards on elementary operators (`ln` of a non-positive
/// value, `asin` outside (-1, 1), ...). With the guards disabled, behavior in
/// the forbidden domain is unspecified but does not abort.
pub const CHECK_EXPRESSION_ARGUMENTS: bool = !cfg!(feature = "no-domain-checks");

/// Raises a domain error at boundary points that otherwise flush their
/// derivative to the stable subgradient 0 (`sqrt` at 0, `abs` at 0).
pub const STRICT_DOMAIN: bool = cfg!(feature = "strict-domain");

// CHUNK SIZING
// ================================================================================================

/// Default number of records per chunk for the data-heavy logs (Jacobian
/// entries, operand identifiers, constants).
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Default number of records per chunk for the short logs (statements,
/// external functions).
pub const DEFAULT_SMALL_CHUNK_SIZE: usize = 1024 * 1024;
