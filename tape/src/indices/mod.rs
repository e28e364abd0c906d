//! Identifier allocation policies.
//!
//! A tape is parameterized by exactly one index manager. The linear manager
//! never reclaims identifiers and is the natural partner of Jacobian tapes;
//! the reuse managers recycle identifiers through a free list, optionally
//! tracking use counts so that plain copy assignments need no statement at
//! all.

use core::fmt::Debug;

use descent_core::Identifier;

mod linear;
mod reuse;
mod reuse_count;

pub use linear::LinearIndexManager;
pub use reuse::ReuseIndexManager;
pub use reuse_count::ReuseCountIndexManager;

// INDEX MANAGER
// ================================================================================================

/// Allocation, tracking and reclamation of active-scalar identifiers.
///
/// Identifier 0 is the passive index and is never handed out. Managers are
/// constructed with a number of reserved identifiers; primal-value tapes
/// reserve the low range for temporarily promoted passive operands.
pub trait IndexManager: Debug {
    /// Per-manager component of a tape position. The linear manager's
    /// counter participates in positions and truncation; the reuse managers
    /// have no positional state.
    type Position: Copy + Default + Debug + PartialEq + PartialOrd;

    /// True for managers whose identifiers encode statement order.
    const IS_LINEAR: bool;

    /// True if a copy assignment must record a statement to stay sound; when
    /// false the manager handles copies internally (identifier aliasing or
    /// use counting).
    const ASSIGN_NEEDS_STATEMENT: bool;

    /// Returns a manager whose identifiers start above `reserved`.
    fn new(reserved: Identifier) -> Self;

    /// Hands out an identifier for a new left-hand side.
    fn create(&mut self) -> Identifier;

    /// Hands out an identifier that has never been used before.
    ///
    /// Input registration uses this: a recycled identifier could still appear
    /// as the left-hand side of older statements, and the reverse sweep would
    /// then consume the input's accumulated adjoint when it crosses them.
    fn create_unused(&mut self) -> Identifier;

    /// Releases `id` and sets it passive.
    fn free(&mut self, id: &mut Identifier);

    /// Gives `id` an identifier suitable for being overwritten: a fresh one,
    /// or its current one if no other holder shares it.
    fn assign(&mut self, id: &mut Identifier);

    /// Transfers `rhs` onto `lhs` for a copy assignment.
    ///
    /// Only called when [`Self::ASSIGN_NEEDS_STATEMENT`] is false.
    fn copy_assign(&mut self, lhs: &mut Identifier, rhs: Identifier);

    /// The largest identifier that may be in use; the adjoint and primal
    /// vectors are sized from it.
    fn max_live(&self) -> Identifier;

    /// Snapshot of the manager's positional state.
    fn position(&self) -> Self::Position;

    /// Restores a positional snapshot.
    fn reset_to(&mut self, pos: Self::Position);

    /// Drops all identifier state back to the construction state.
    fn reset(&mut self);

    /// Number of identifiers currently parked on the free list.
    fn free_count(&self) -> usize;
}
