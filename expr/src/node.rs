use core::fmt;
use core::marker::PhantomData;

use descent_core::{Gradient, Identifier, PASSIVE_INDEX, Real};

use crate::kind::{Active, AdKind};

// SINKS
// ================================================================================================

/// Consumer of the partial derivatives produced by an expression walk.
///
/// During recording the sink is the tape's Jacobian row writer; in forward
/// mode it is a tangent accumulator. Leaves report the Jacobian of the whole
/// statement with respect to themselves (the product of the partials along
/// the path from the root).
pub trait PartialsSink<K: AdKind> {
    fn push(&mut self, jacobian: K::Real, value: K::Real, data: &K::Data);
}

/// Consumer of the passive operands of an expression, in traversal order.
pub trait ConstantSink<R: Real> {
    fn push_constant(&mut self, value: R);
}

/// Consumer of the active-typed leaves of an expression, in traversal order.
///
/// Passive leaves (identifier 0) are reported too; the primal-value tape
/// promotes them to temporary identifiers.
pub trait LeafSink<R: Real> {
    fn push_leaf(&mut self, value: R, id: Identifier);
}

// EXPRESSION NODE
// ================================================================================================

/// A node of a statically composed expression tree.
///
/// Nodes own their operands and eagerly carry their primal result, so every
/// subexpression is computed exactly once no matter how many derivative walks
/// visit it. The `replay_*` associated functions re-execute the node *shape*
/// from a stored identifier/constant stream; primal-value tapes store one
/// handle per shape pointing at these monomorphizations.
///
/// The cursor discipline of the replay functions matches the recording
/// traversal: identifiers and constants are consumed depth-first,
/// left-to-right, one identifier per active-typed leaf and one constant per
/// passive operand.
pub trait ExprNode {
    /// The kind every leaf of this tree is bound to.
    type Kind: AdKind;

    /// Upper bound on the number of active-typed leaves of this tree.
    const MAX_ACTIVE: usize;

    /// Upper bound on the number of passive operands of this tree.
    const MAX_CONSTANTS: usize;

    /// The primal value of this node.
    fn value(&self) -> <Self::Kind as AdKind>::Real;

    /// Pushes `seed` times the partial derivative of this tree with respect
    /// to each active leaf into `sink`.
    fn push_partials<S: PartialsSink<Self::Kind>>(
        &self,
        sink: &mut S,
        seed: <Self::Kind as AdKind>::Real,
    );

    /// Number of leaves that currently carry an active identifier.
    fn active_count(&self) -> usize;

    /// Pushes the passive operands of this tree in traversal order.
    fn push_constants<S: ConstantSink<<Self::Kind as AdKind>::Real>>(&self, sink: &mut S);

    /// Pushes `(value, identifier)` for every active-typed leaf in traversal
    /// order.
    fn push_leaves<S: LeafSink<<Self::Kind as AdKind>::Real>>(&self, sink: &mut S);

    /// Recomputes the primal of this shape from stored operands.
    fn replay_primal(
        ids: &[Identifier],
        ipos: &mut usize,
        constants: &[<Self::Kind as AdKind>::Real],
        cpos: &mut usize,
        primals: &[<Self::Kind as AdKind>::Real],
    ) -> <Self::Kind as AdKind>::Real;

    /// Propagates `seed` into the adjoint slots of this shape's leaves.
    fn replay_adjoint<G: Gradient<<Self::Kind as AdKind>::Real>>(
        seed: G,
        ids: &[Identifier],
        ipos: &mut usize,
        constants: &[<Self::Kind as AdKind>::Real],
        cpos: &mut usize,
        primals: &[<Self::Kind as AdKind>::Real],
        adjoints: &mut [G],
    );

    /// Recomputes the primal of this shape and gathers the tangent carried by
    /// its leaves.
    fn replay_tangent<G: Gradient<<Self::Kind as AdKind>::Real>>(
        ids: &[Identifier],
        ipos: &mut usize,
        constants: &[<Self::Kind as AdKind>::Real],
        cpos: &mut usize,
        primals: &[<Self::Kind as AdKind>::Real],
        tangents: &[G],
    ) -> (<Self::Kind as AdKind>::Real, G);
}

// EXPRESSION WRAPPER
// ================================================================================================

/// The value produced by every overloaded operator.
///
/// `Expr` exists so that operator impls have a single local receiver type; it
/// is transparent otherwise. Assigning it to an [`Active`] (or calling
/// [`Active::assign`]) records the statement.
pub struct Expr<N>(pub(crate) N);

impl<N: ExprNode> Expr<N> {
    /// Wraps a node.
    pub fn new(node: N) -> Self {
        Self(node)
    }

    /// The primal value of the wrapped tree.
    pub fn value(&self) -> <N::Kind as AdKind>::Real {
        self.0.value()
    }

    /// Returns the wrapped node.
    pub fn node(&self) -> &N {
        &self.0
    }

    /// Unwraps the node.
    pub fn into_node(self) -> N {
        self.0
    }

    // PASS-THROUGH OPERATIONS
    // --------------------------------------------------------------------------------------------

    pub fn is_nan(&self) -> bool {
        self.value().is_nan()
    }

    pub fn is_finite(&self) -> bool {
        self.value().is_finite()
    }

    pub fn is_infinite(&self) -> bool {
        self.value().is_infinite()
    }

    pub fn floor(&self) -> <N::Kind as AdKind>::Real {
        self.value().floor()
    }

    pub fn ceil(&self) -> <N::Kind as AdKind>::Real {
        self.value().ceil()
    }
}

impl<N: ExprNode + fmt::Debug> fmt::Debug for Expr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Expr").field(&self.0).finish()
    }
}

// INTO EXPR
// ================================================================================================

/// Anything that can appear as an operand of an overloaded operator: an
/// active scalar (by value or by reference), a previously built expression,
/// or a passive value of the kind's primal type.
pub trait IntoExpr<K: AdKind> {
    type Node: ExprNode<Kind = K>;

    fn into_node(self) -> Self::Node;
}

impl<K: AdKind> IntoExpr<K> for Active<K> {
    type Node = Active<K>;

    #[inline(always)]
    fn into_node(self) -> Self::Node {
        self
    }
}

impl<'a, K: AdKind> IntoExpr<K> for &'a Active<K> {
    type Node = &'a Active<K>;

    #[inline(always)]
    fn into_node(self) -> Self::Node {
        self
    }
}

impl<E: ExprNode> IntoExpr<E::Kind> for Expr<E> {
    type Node = E;

    #[inline(always)]
    fn into_node(self) -> Self::Node {
        self.0
    }
}

macro_rules! impl_into_expr_passive {
    ($($real:ty),*) => {
        $(
            impl<K: AdKind<Real = $real>> IntoExpr<K> for $real {
                type Node = ConstOperand<K>;

                #[inline(always)]
                fn into_node(self) -> Self::Node {
                    ConstOperand::new(self)
                }
            }
        )*
    };
}

impl_into_expr_passive!(f32, f64);

// LEAVES
// ================================================================================================

/// A passive operand embedded in an expression.
///
/// It contributes no partials and no identifier, but primal-value tapes store
/// its value in the constant log so the shape can be replayed.
pub struct ConstOperand<K: AdKind> {
    value: K::Real,
    _kind: PhantomData<K>,
}

impl<K: AdKind> ConstOperand<K> {
    pub fn new(value: K::Real) -> Self {
        Self { value, _kind: PhantomData }
    }
}

impl<K: AdKind> Clone for ConstOperand<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: AdKind> Copy for ConstOperand<K> {}

impl<K: AdKind> fmt::Debug for ConstOperand<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConstOperand").field(&self.value).finish()
    }
}

/// A non-owning snapshot of an active scalar.
///
/// Compound assignments use it to reference the left-hand side inside the
/// right-hand expression without running the copy policy; it must not outlive
/// the statement it is recorded in.
pub struct LeafRef<K: AdKind> {
    value: K::Real,
    data: K::Data,
}

impl<K: AdKind> LeafRef<K> {
    pub fn capture(scalar: &Active<K>) -> Self {
        Self { value: scalar.value(), data: scalar.data().clone() }
    }
}

impl<K: AdKind> Clone for LeafRef<K> {
    fn clone(&self) -> Self {
        Self { value: self.value, data: self.data.clone() }
    }
}

impl<K: AdKind> fmt::Debug for LeafRef<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafRef").field("value", &self.value).field("data", &self.data).finish()
    }
}

/// Expands the leaf portion of [`ExprNode`]. All three leaf forms (owned
/// scalar, borrowed scalar, detached snapshot) share the exact same
/// semantics; `$node` binds `self` inside the value/data expressions.
macro_rules! impl_leaf_node {
    (|$node:ident| value: $value:expr, data: $data:expr) => {
        const MAX_ACTIVE: usize = 1;
        const MAX_CONSTANTS: usize = 0;

        #[inline(always)]
        fn value(&self) -> <Self::Kind as AdKind>::Real {
            let $node = self;
            $value
        }

        #[inline(always)]
        fn push_partials<S: PartialsSink<Self::Kind>>(
            &self,
            sink: &mut S,
            seed: <Self::Kind as AdKind>::Real,
        ) {
            let $node = self;
            sink.push(seed, $value, $data);
        }

        #[inline(always)]
        fn active_count(&self) -> usize {
            let $node = self;
            (<Self::Kind as AdKind>::data_identifier($data) != PASSIVE_INDEX) as usize
        }

        #[inline(always)]
        fn push_constants<S: ConstantSink<<Self::Kind as AdKind>::Real>>(&self, _sink: &mut S) {}

        #[inline(always)]
        fn push_leaves<S: LeafSink<<Self::Kind as AdKind>::Real>>(&self, sink: &mut S) {
            let $node = self;
            sink.push_leaf($value, <Self::Kind as AdKind>::data_identifier($data));
        }

        #[inline(always)]
        fn replay_primal(
            ids: &[Identifier],
            ipos: &mut usize,
            _constants: &[<Self::Kind as AdKind>::Real],
            _cpos: &mut usize,
            primals: &[<Self::Kind as AdKind>::Real],
        ) -> <Self::Kind as AdKind>::Real {
            let id = ids[*ipos];
            *ipos += 1;
            primals[id as usize]
        }

        #[inline(always)]
        fn replay_adjoint<G: Gradient<<Self::Kind as AdKind>::Real>>(
            seed: G,
            ids: &[Identifier],
            ipos: &mut usize,
            _constants: &[<Self::Kind as AdKind>::Real],
            _cpos: &mut usize,
            _primals: &[<Self::Kind as AdKind>::Real],
            adjoints: &mut [G],
        ) {
            let id = ids[*ipos];
            *ipos += 1;
            adjoints[id as usize] += seed;
        }

        #[inline(always)]
        fn replay_tangent<G: Gradient<<Self::Kind as AdKind>::Real>>(
            ids: &[Identifier],
            ipos: &mut usize,
            _constants: &[<Self::Kind as AdKind>::Real],
            _cpos: &mut usize,
            primals: &[<Self::Kind as AdKind>::Real],
            tangents: &[G],
        ) -> (<Self::Kind as AdKind>::Real, G) {
            let id = ids[*ipos];
            *ipos += 1;
            (primals[id as usize], tangents[id as usize])
        }
    };
}

impl<K: AdKind> ExprNode for Active<K> {
    type Kind = K;

    impl_leaf_node!(|n| value: n.value(), data: n.data());
}

impl<'a, K: AdKind> ExprNode for &'a Active<K> {
    type Kind = K;

    impl_leaf_node!(|n| value: (*n).value(), data: (*n).data());
}

impl<K: AdKind> ExprNode for LeafRef<K> {
    type Kind = K;

    impl_leaf_node!(|n| value: n.value, data: &n.data);
}

impl<K: AdKind> ExprNode for ConstOperand<K> {
    type Kind = K;

    const MAX_ACTIVE: usize = 0;
    const MAX_CONSTANTS: usize = 1;

    #[inline(always)]
    fn value(&self) -> K::Real {
        self.value
    }

    #[inline(always)]
    fn push_partials<S: PartialsSink<K>>(&self, _sink: &mut S, _seed: K::Real) {}

    #[inline(always)]
    fn active_count(&self) -> usize {
        0
    }

    #[inline(always)]
    fn push_constants<S: ConstantSink<K::Real>>(&self, sink: &mut S) {
        sink.push_constant(self.value);
    }

    #[inline(always)]
    fn push_leaves<S: LeafSink<K::Real>>(&self, _sink: &mut S) {}

    #[inline(always)]
    fn replay_primal(
        _ids: &[Identifier],
        _ipos: &mut usize,
        constants: &[K::Real],
        cpos: &mut usize,
        _primals: &[K::Real],
    ) -> K::Real {
        let constant = constants[*cpos];
        *cpos += 1;
        constant
    }

    #[inline(always)]
    fn replay_adjoint<G: Gradient<K::Real>>(
        _seed: G,
        _ids: &[Identifier],
        _ipos: &mut usize,
        _constants: &[K::Real],
        cpos: &mut usize,
        _primals: &[K::Real],
        _adjoints: &mut [G],
    ) {
        *cpos += 1;
    }

    #[inline(always)]
    fn replay_tangent<G: Gradient<K::Real>>(
        _ids: &[Identifier],
        _ipos: &mut usize,
        constants: &[K::Real],
        cpos: &mut usize,
        _primals: &[K::Real],
        _tangents: &[G],
    ) -> (K::Real, G) {
        let constant = constants[*cpos];
        *cpos += 1;
        (constant, G::zero())
    }
}
