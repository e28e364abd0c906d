use core::fmt;

use descent_core::{Gradient, Identifier, Real};

use crate::node::ExprNode;

// AD KIND
// ================================================================================================

/// Binding between an active scalar and the engine that differentiates it.
///
/// A kind names the primal type, the per-value payload an active scalar
/// carries next to its primal (a tape [`Identifier`] for recorded kinds, the
/// tangent itself for the tapeless forward kind), and the hooks the scalar
/// delegates its lifecycle to. Recorded kinds forward the hooks to a
/// thread-local tape; the forward kind computes in place.
///
/// Kinds are zero-sized marker types. They are usually declared with the
/// `declare_tape!` macro of `descent-tape` rather than implemented by hand.
pub trait AdKind: Sized + 'static {
    /// Primal type of scalars bound to this kind.
    type Real: Real;

    /// Payload stored inline in every active scalar of this kind.
    type Data: Clone + Default + fmt::Debug + 'static;

    /// Value type of the derivatives this kind produces.
    type Gradient: Gradient<Self::Real>;

    /// True if the engine tolerates primal updates that bypass the tape.
    ///
    /// Engines that never read primal values back from their own storage
    /// (Jacobian tapes, the tapeless forward mode) allow additive passive
    /// updates to skip recording; an engine that replays statements from a
    /// primal vector must see every value change.
    const ALLOW_JACOBIAN_OPTIMIZATION: bool;

    /// Records the assignment of an expression to a scalar of this kind.
    ///
    /// Implementations update `value` to the primal of `rhs` and `data`
    /// according to the engine's identifier policy.
    fn store_expr<E: ExprNode<Kind = Self>>(value: &mut Self::Real, data: &mut Self::Data, rhs: &E);

    /// Records the assignment of another scalar of the same kind.
    fn store_copy(value: &mut Self::Real, data: &mut Self::Data, rhs: &Active<Self>);

    /// Records the assignment of a passive value; the scalar becomes passive.
    fn store_passive(value: &mut Self::Real, data: &mut Self::Data, rhs: Self::Real);

    /// Releases the payload when a scalar dies.
    fn free_data(data: &mut Self::Data);

    /// The tape identifier carried in `data`.
    ///
    /// Recorded kinds report the identifier assigned by their index manager;
    /// the tapeless forward kind has none and reports the passive index.
    fn data_identifier(data: &Self::Data) -> Identifier;

    /// Reads the derivative associated with `data`.
    fn gradient(data: &Self::Data) -> Self::Gradient;

    /// Seeds the derivative associated with `data`.
    fn set_gradient(data: &mut Self::Data, gradient: Self::Gradient);
}

// ACTIVE SCALAR
// ================================================================================================

/// A floating-point value participating in automatic differentiation.
///
/// An active scalar is a pair of a primal value, which always mirrors what
/// the computation would have produced without AD, and the kind's payload.
/// Every arithmetic operator is overloaded to build an expression tree; the
/// tree is consumed when it is assigned back into an `Active` (via
/// [`From`]/[`Into`], [`Active::assign`], or a compound-assignment operator).
///
/// Binary operators take their operands by value; borrow a scalar (`&x`) to
/// keep using it after the expression:
///
/// ```ignore
/// let y: Active<K> = (42.0 * &x * &x).into();
/// ```
///
/// Cloning is not a bitwise copy: the kind's copy policy runs, so a clone
/// either shares the identifier (reference-counted index managers) or records
/// a copy statement, exactly as an assignment between two program variables
/// would.
pub struct Active<K: AdKind> {
    value: K::Real,
    data: K::Data,
}

impl<K: AdKind> Active<K> {
    // CONSTANTS
    // --------------------------------------------------------------------------------------------

    /// Machine epsilon of the underlying primal type.
    pub const EPSILON: K::Real = <K::Real as Real>::EPSILON;
    /// Smallest positive normal primal value.
    pub const MIN_POSITIVE: K::Real = <K::Real as Real>::MIN_POSITIVE;
    /// Largest finite primal value.
    pub const MAX: K::Real = <K::Real as Real>::MAX;
    /// Smallest finite primal value.
    pub const MIN: K::Real = <K::Real as Real>::MIN;
    pub const INFINITY: K::Real = <K::Real as Real>::INFINITY;
    pub const NEG_INFINITY: K::Real = <K::Real as Real>::NEG_INFINITY;
    pub const NAN: K::Real = <K::Real as Real>::NAN;

    // CONSTRUCTORS
    // --------------------------------------------------------------------------------------------

    /// Returns a passive scalar holding `value`.
    ///
    /// The scalar carries no tape identity until an expression with at least
    /// one active operand is assigned to it or it is registered as an input.
    pub fn new(value: K::Real) -> Self {
        Self { value, data: <K::Data as Default>::default() }
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the primal value.
    #[inline(always)]
    pub fn value(&self) -> K::Real {
        self.value
    }

    /// Returns the kind payload.
    #[inline(always)]
    pub fn data(&self) -> &K::Data {
        &self.data
    }

    /// Returns the derivative of this scalar.
    ///
    /// For recorded kinds this reads the adjoint slot of the scalar's
    /// identifier and is meaningful after a reverse sweep; for the forward
    /// kind it returns the tangent carried by the value itself.
    pub fn gradient(&self) -> K::Gradient {
        K::gradient(&self.data)
    }

    // STATE MUTATORS
    // --------------------------------------------------------------------------------------------

    /// Overwrites the primal value without recording anything.
    pub fn set_value(&mut self, value: K::Real) {
        self.value = value;
    }

    /// Returns mutable access to the kind payload.
    pub fn data_mut(&mut self) -> &mut K::Data {
        &mut self.data
    }

    /// Seeds the derivative of this scalar.
    pub fn set_gradient(&mut self, gradient: K::Gradient) {
        K::set_gradient(&mut self.data, gradient);
    }

    /// Assigns an expression to this scalar, recording a statement.
    ///
    /// Equivalent to `*self = rhs.into()` but reuses the left-hand slot the
    /// way the bound index manager prescribes. A purely passive right-hand
    /// side takes the kind's passive-store path instead of recording an
    /// empty statement.
    pub fn assign<E>(&mut self, rhs: E)
    where
        E: crate::node::IntoExpr<K>,
    {
        let node = rhs.into_node();
        if <E::Node as ExprNode>::MAX_ACTIVE == 0 {
            K::store_passive(&mut self.value, &mut self.data, node.value());
        } else {
            K::store_expr(&mut self.value, &mut self.data, &node);
        }
    }

    /// Splits the scalar into its parts for tape-side registration.
    pub fn parts_mut(&mut self) -> (&mut K::Real, &mut K::Data) {
        (&mut self.value, &mut self.data)
    }

    // PASS-THROUGH OPERATIONS
    // --------------------------------------------------------------------------------------------
    //
    // These delegate to the primal and deliberately return passive results;
    // they are not differentiated.

    pub fn is_nan(&self) -> bool {
        self.value.is_nan()
    }

    pub fn is_finite(&self) -> bool {
        self.value.is_finite()
    }

    pub fn is_infinite(&self) -> bool {
        self.value.is_infinite()
    }

    pub fn floor(&self) -> K::Real {
        self.value.floor()
    }

    pub fn ceil(&self) -> K::Real {
        self.value.ceil()
    }
}

impl<K: AdKind> Default for Active<K> {
    fn default() -> Self {
        Self::new(<K::Real as Real>::ZERO)
    }
}

impl<K: AdKind> Clone for Active<K> {
    fn clone(&self) -> Self {
        let mut value = <K::Real as Real>::ZERO;
        let mut data = <K::Data as Default>::default();
        K::store_copy(&mut value, &mut data, self);
        Self { value, data }
    }
}

impl<K: AdKind> Drop for Active<K> {
    fn drop(&mut self) {
        K::free_data(&mut self.data);
    }
}

impl<K: AdKind> fmt::Debug for Active<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Active")
            .field("value", &self.value)
            .field("data", &self.data)
            .finish()
    }
}

impl<K: AdKind> fmt::Display for Active<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

// CONVERSIONS
// ================================================================================================

impl<E: ExprNode> From<crate::node::Expr<E>> for Active<E::Kind> {
    fn from(rhs: crate::node::Expr<E>) -> Self {
        let mut value = <<E::Kind as AdKind>::Real as Real>::ZERO;
        let mut data = <<E::Kind as AdKind>::Data as Default>::default();
        <E::Kind as AdKind>::store_expr(&mut value, &mut data, rhs.node());
        Self { value, data }
    }
}

impl<K: AdKind> From<&Active<K>> for Active<K> {
    fn from(rhs: &Active<K>) -> Self {
        rhs.clone()
    }
}

macro_rules! impl_from_passive {
    ($($real:ty),*) => {
        $(
            impl<K: AdKind<Real = $real>> From<$real> for Active<K> {
                fn from(value: $real) -> Self {
                    Self::new(value)
                }
            }
        )*
    };
}

impl_from_passive!(f32, f64);
