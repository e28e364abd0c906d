//! The elementary operator set.
//!
//! Operators are described by zero-sized types implementing
//! [`BinaryOperator`] or [`UnaryOperator`]; a single generic [`BinaryNode`] /
//! [`UnaryNode`] pair then carries any of them, which keeps the operator
//! count from multiplying through the node layer. The declarative tables in
//! [`binary`] and [`unary`] define the primal and partial-derivative rules.

use core::fmt;
use core::marker::PhantomData;

use descent_core::{Gradient, Identifier, Real};

use crate::kind::AdKind;
use crate::node::{ConstantSink, ExprNode, LeafSink, PartialsSink};

pub mod binary;
mod compare;
pub mod functions;
pub mod unary;

pub use binary::{AddOp, Atan2Op, DivOp, MaxOp, MinOp, MulOp, PowOp, SubOp};
pub use unary::{
    AbsOp, AcosOp, AsinOp, AtanOp, AtanhOp, CosOp, CoshOp, ElementaryFunctions, ExpOp, Log10Op,
    LnOp, NegOp, SinOp, SinhOp, SqrtOp, TanOp, TanhOp,
};

// OPERATOR TRAITS
// ================================================================================================

/// Primal and partial-derivative rules of a binary elementary operation.
///
/// `partials` is used when both operands may be active; the one-sided
/// variants serve mixed active/passive applications, which lets an operator
/// skip work or guards that only the active side needs.
pub trait BinaryOperator<R: Real>: 'static {
    fn primal(left: R, right: R) -> R;

    /// Partial derivatives with respect to both operands.
    fn partials(left: R, right: R, result: R) -> (R, R);

    /// Partial with respect to the left operand when the right is passive.
    #[inline(always)]
    fn partial_left(left: R, right: R, result: R) -> R {
        Self::partials(left, right, result).0
    }

    /// Partial with respect to the right operand when the left is passive.
    #[inline(always)]
    fn partial_right(left: R, right: R, result: R) -> R {
        Self::partials(left, right, result).1
    }
}

/// Primal and partial-derivative rule of a unary elementary operation.
pub trait UnaryOperator<R: Real>: 'static {
    fn primal(arg: R) -> R;

    fn partial(arg: R, result: R) -> R;
}

// DOMAIN GUARD FAILURE
// ================================================================================================

/// Raises a domain error. Domain errors are fatal to the current
/// differentiation session; the tape must be reset before further recording.
#[cold]
#[inline(never)]
pub(crate) fn domain_error<R: Real>(function: &str, argument: R) -> ! {
    panic!("domain error: {function} is not differentiable at argument {argument}");
}

// BINARY NODE
// ================================================================================================

/// Application of a binary operator to two subtrees.
pub struct BinaryNode<Op, A, B>
where
    A: ExprNode,
    B: ExprNode<Kind = A::Kind>,
{
    left: A,
    right: B,
    value: <A::Kind as AdKind>::Real,
    _op: PhantomData<Op>,
}

impl<Op, A, B> BinaryNode<Op, A, B>
where
    A: ExprNode,
    B: ExprNode<Kind = A::Kind>,
    Op: BinaryOperator<<A::Kind as AdKind>::Real>,
{
    #[inline(always)]
    pub fn new(left: A, right: B) -> Self {
        let value = Op::primal(left.value(), right.value());
        Self { left, right, value, _op: PhantomData }
    }
}

impl<Op, A, B> ExprNode for BinaryNode<Op, A, B>
where
    A: ExprNode,
    B: ExprNode<Kind = A::Kind>,
    Op: BinaryOperator<<A::Kind as AdKind>::Real>,
{
    type Kind = A::Kind;

    const MAX_ACTIVE: usize = A::MAX_ACTIVE + B::MAX_ACTIVE;
    const MAX_CONSTANTS: usize = A::MAX_CONSTANTS + B::MAX_CONSTANTS;

    #[inline(always)]
    fn value(&self) -> <A::Kind as AdKind>::Real {
        self.value
    }

    fn push_partials<S: PartialsSink<A::Kind>>(
        &self,
        sink: &mut S,
        seed: <A::Kind as AdKind>::Real,
    ) {
        let left = self.left.value();
        let right = self.right.value();
        if B::MAX_ACTIVE == 0 {
            self.left.push_partials(sink, seed * Op::partial_left(left, right, self.value));
        } else if A::MAX_ACTIVE == 0 {
            self.right.push_partials(sink, seed * Op::partial_right(left, right, self.value));
        } else {
            let (d_left, d_right) = Op::partials(left, right, self.value);
            self.left.push_partials(sink, seed * d_left);
            self.right.push_partials(sink, seed * d_right);
        }
    }

    #[inline(always)]
    fn active_count(&self) -> usize {
        self.left.active_count() + self.right.active_count()
    }

    fn push_constants<S: ConstantSink<<A::Kind as AdKind>::Real>>(&self, sink: &mut S) {
        self.left.push_constants(sink);
        self.right.push_constants(sink);
    }

    fn push_leaves<S: LeafSink<<A::Kind as AdKind>::Real>>(&self, sink: &mut S) {
        self.left.push_leaves(sink);
        self.right.push_leaves(sink);
    }

    fn replay_primal(
        ids: &[Identifier],
        ipos: &mut usize,
        constants: &[<A::Kind as AdKind>::Real],
        cpos: &mut usize,
        primals: &[<A::Kind as AdKind>::Real],
    ) -> <A::Kind as AdKind>::Real {
        let left = A::replay_primal(ids, ipos, constants, cpos, primals);
        let right = B::replay_primal(ids, ipos, constants, cpos, primals);
        Op::primal(left, right)
    }

    fn replay_adjoint<G: Gradient<<A::Kind as AdKind>::Real>>(
        seed: G,
        ids: &[Identifier],
        ipos: &mut usize,
        constants: &[<A::Kind as AdKind>::Real],
        cpos: &mut usize,
        primals: &[<A::Kind as AdKind>::Real],
        adjoints: &mut [G],
    ) {
        // Peek the operand values with cursor copies; the statement segment is
        // consumed only by the descent below.
        let mut vip = *ipos;
        let mut vcp = *cpos;
        let left = A::replay_primal(ids, &mut vip, constants, &mut vcp, primals);
        let right = B::replay_primal(ids, &mut vip, constants, &mut vcp, primals);
        let result = Op::primal(left, right);

        if B::MAX_ACTIVE == 0 {
            let d_left = Op::partial_left(left, right, result);
            A::replay_adjoint(seed.scaled(d_left), ids, ipos, constants, cpos, primals, adjoints);
            *cpos += B::MAX_CONSTANTS;
        } else if A::MAX_ACTIVE == 0 {
            let d_right = Op::partial_right(left, right, result);
            *cpos += A::MAX_CONSTANTS;
            B::replay_adjoint(seed.scaled(d_right), ids, ipos, constants, cpos, primals, adjoints);
        } else {
            let (d_left, d_right) = Op::partials(left, right, result);
            A::replay_adjoint(seed.scaled(d_left), ids, ipos, constants, cpos, primals, adjoints);
            B::replay_adjoint(seed.scaled(d_right), ids, ipos, constants, cpos, primals, adjoints);
        }
    }

    fn replay_tangent<G: Gradient<<A::Kind as AdKind>::Real>>(
        ids: &[Identifier],
        ipos: &mut usize,
        constants: &[<A::Kind as AdKind>::Real],
        cpos: &mut usize,
        primals: &[<A::Kind as AdKind>::Real],
        tangents: &[G],
    ) -> (<A::Kind as AdKind>::Real, G) {
        let (left, left_dot) = A::replay_tangent(ids, ipos, constants, cpos, primals, tangents);
        let (right, right_dot) = B::replay_tangent(ids, ipos, constants, cpos, primals, tangents);
        let value = Op::primal(left, right);
        let dot = if B::MAX_ACTIVE == 0 {
            left_dot.scaled(Op::partial_left(left, right, value))
        } else if A::MAX_ACTIVE == 0 {
            right_dot.scaled(Op::partial_right(left, right, value))
        } else {
            let (d_left, d_right) = Op::partials(left, right, value);
            left_dot.scaled(d_left) + right_dot.scaled(d_right)
        };
        (value, dot)
    }
}

impl<Op, A, B> Clone for BinaryNode<Op, A, B>
where
    A: ExprNode + Clone,
    B: ExprNode<Kind = A::Kind> + Clone,
{
    fn clone(&self) -> Self {
        Self {
            left: self.left.clone(),
            right: self.right.clone(),
            value: self.value,
            _op: PhantomData,
        }
    }
}

impl<Op, A, B> fmt::Debug for BinaryNode<Op, A, B>
where
    A: ExprNode + fmt::Debug,
    B: ExprNode<Kind = A::Kind> + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryNode")
            .field("left", &self.left)
            .field("right", &self.right)
            .field("value", &self.value)
            .finish()
    }
}

// UNARY NODE
// ================================================================================================

/// Application of a unary operator to a subtree.
pub struct UnaryNode<Op, A: ExprNode> {
    arg: A,
    value: <A::Kind as AdKind>::Real,
    _op: PhantomData<Op>,
}

impl<Op, A> UnaryNode<Op, A>
where
    A: ExprNode,
    Op: UnaryOperator<<A::Kind as AdKind>::Real>,
{
    #[inline(always)]
    pub fn new(arg: A) -> Self {
        let value = Op::primal(arg.value());
        Self { arg, value, _op: PhantomData }
    }
}

impl<Op, A> ExprNode for UnaryNode<Op, A>
where
    A: ExprNode,
    Op: UnaryOperator<<A::Kind as AdKind>::Real>,
{
    type Kind = A::Kind;

    const MAX_ACTIVE: usize = A::MAX_ACTIVE;
    const MAX_CONSTANTS: usize = A::MAX_CONSTANTS;

    #[inline(always)]
    fn value(&self) -> <A::Kind as AdKind>::Real {
        self.value
    }

    fn push_partials<S: PartialsSink<A::Kind>>(
        &self,
        sink: &mut S,
        seed: <A::Kind as AdKind>::Real,
    ) {
        let partial = Op::partial(self.arg.value(), self.value);
        self.arg.push_partials(sink, seed * partial);
    }

    #[inline(always)]
    fn active_count(&self) -> usize {
        self.arg.active_count()
    }

    fn push_constants<S: ConstantSink<<A::Kind as AdKind>::Real>>(&self, sink: &mut S) {
        self.arg.push_constants(sink);
    }

    fn push_leaves<S: LeafSink<<A::Kind as AdKind>::Real>>(&self, sink: &mut S) {
        self.arg.push_leaves(sink);
    }

    fn replay_primal(
        ids: &[Identifier],
        ipos: &mut usize,
        constants: &[<A::Kind as AdKind>::Real],
        cpos: &mut usize,
        primals: &[<A::Kind as AdKind>::Real],
    ) -> <A::Kind as AdKind>::Real {
        Op::primal(A::replay_primal(ids, ipos, constants, cpos, primals))
    }

    fn replay_adjoint<G: Gradient<<A::Kind as AdKind>::Real>>(
        seed: G,
        ids: &[Identifier],
        ipos: &mut usize,
        constants: &[<A::Kind as AdKind>::Real],
        cpos: &mut usize,
        primals: &[<A::Kind as AdKind>::Real],
        adjoints: &mut [G],
    ) {
        let mut vip = *ipos;
        let mut vcp = *cpos;
        let arg = A::replay_primal(ids, &mut vip, constants, &mut vcp, primals);
        let result = Op::primal(arg);
        let partial = Op::partial(arg, result);
        A::replay_adjoint(seed.scaled(partial), ids, ipos, constants, cpos, primals, adjoints);
    }

    fn replay_tangent<G: Gradient<<A::Kind as AdKind>::Real>>(
        ids: &[Identifier],
        ipos: &mut usize,
        constants: &[<A::Kind as AdKind>::Real],
        cpos: &mut usize,
        primals: &[<A::Kind as AdKind>::Real],
        tangents: &[G],
    ) -> (<A::Kind as AdKind>::Real, G) {
        let (arg, arg_dot) = A::replay_tangent(ids, ipos, constants, cpos, primals, tangents);
        let value = Op::primal(arg);
        (value, arg_dot.scaled(Op::partial(arg, value)))
    }
}

impl<Op, A> Clone for UnaryNode<Op, A>
where
    A: ExprNode + Clone,
{
    fn clone(&self) -> Self {
        Self { arg: self.arg.clone(), value: self.value, _op: PhantomData }
    }
}

impl<Op, A> fmt::Debug for UnaryNode<Op, A>
where
    A: ExprNode + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryNode")
            .field("arg", &self.arg)
            .field("value", &self.value)
            .finish()
    }
}
