//! Binary operator table.
//!
//! Each operator is a zero-sized type carrying its primal and
//! partial-derivative rules; the table at the bottom wires `+ - * /` into the
//! standard operator traits for every active/expression/passive operand mix.
//! `pow`, `atan2`, `min` and `max` are exposed as methods and free functions
//! instead (see [`super::unary::ElementaryFunctions`] and
//! [`super::functions`]).

use descent_core::Real;
use descent_core::config::CHECK_EXPRESSION_ARGUMENTS;

use super::{domain_error, BinaryNode, BinaryOperator};
use crate::kind::{Active, AdKind};
use crate::node::{ConstOperand, Expr, ExprNode, IntoExpr, LeafRef};

// OPERATOR RULES
// ================================================================================================

pub struct AddOp;

impl<R: Real> BinaryOperator<R> for AddOp {
    #[inline(always)]
    fn primal(left: R, right: R) -> R {
        left + right
    }

    #[inline(always)]
    fn partials(_left: R, _right: R, _result: R) -> (R, R) {
        (R::ONE, R::ONE)
    }
}

pub struct SubOp;

impl<R: Real> BinaryOperator<R> for SubOp {
    #[inline(always)]
    fn primal(left: R, right: R) -> R {
        left - right
    }

    #[inline(always)]
    fn partials(_left: R, _right: R, _result: R) -> (R, R) {
        (R::ONE, -R::ONE)
    }
}

pub struct MulOp;

impl<R: Real> BinaryOperator<R> for MulOp {
    #[inline(always)]
    fn primal(left: R, right: R) -> R {
        left * right
    }

    #[inline(always)]
    fn partials(left: R, right: R, _result: R) -> (R, R) {
        (right, left)
    }
}

pub struct DivOp;

impl DivOp {
    #[inline(always)]
    fn guard<R: Real>(right: R) {
        if CHECK_EXPRESSION_ARGUMENTS && right == R::ZERO {
            domain_error("division", right);
        }
    }
}

impl<R: Real> BinaryOperator<R> for DivOp {
    #[inline(always)]
    fn primal(left: R, right: R) -> R {
        left / right
    }

    #[inline(always)]
    fn partials(_left: R, right: R, result: R) -> (R, R) {
        Self::guard(right);
        let inverse = right.recip();
        (inverse, -result * inverse)
    }
}

pub struct PowOp;

impl<R: Real> BinaryOperator<R> for PowOp {
    #[inline(always)]
    fn primal(base: R, exponent: R) -> R {
        base.powf(exponent)
    }

    /// Partials with an active exponent. For non-positive bases the exponent
    /// partial is forced to 0, extending the function continuously from the
    /// positive branch.
    #[inline(always)]
    fn partials(base: R, exponent: R, result: R) -> (R, R) {
        if CHECK_EXPRESSION_ARGUMENTS && base < R::ZERO {
            domain_error("pow with active exponent", base);
        }
        let d_base = exponent * base.powf(exponent - R::ONE);
        let d_exponent = if base > R::ZERO { base.ln() * result } else { R::ZERO };
        (d_base, d_exponent)
    }

    /// A passive exponent has no domain restriction on the base.
    #[inline(always)]
    fn partial_left(base: R, exponent: R, _result: R) -> R {
        exponent * base.powf(exponent - R::ONE)
    }

    #[inline(always)]
    fn partial_right(base: R, _exponent: R, result: R) -> R {
        if CHECK_EXPRESSION_ARGUMENTS && base < R::ZERO {
            domain_error("pow with active exponent", base);
        }
        if base > R::ZERO { base.ln() * result } else { R::ZERO }
    }
}

pub struct Atan2Op;

impl Atan2Op {
    #[inline(always)]
    fn guard<R: Real>(left: R, right: R) {
        if CHECK_EXPRESSION_ARGUMENTS && left == R::ZERO && right == R::ZERO {
            domain_error("atan2 at the origin", R::ZERO);
        }
    }
}

impl<R: Real> BinaryOperator<R> for Atan2Op {
    #[inline(always)]
    fn primal(left: R, right: R) -> R {
        left.atan2(right)
    }

    #[inline(always)]
    fn partials(left: R, right: R, _result: R) -> (R, R) {
        Self::guard(left, right);
        let inverse = (left * left + right * right).recip();
        (right * inverse, -left * inverse)
    }
}

pub struct MinOp;

impl<R: Real> BinaryOperator<R> for MinOp {
    /// Ties select the first argument.
    #[inline(always)]
    fn primal(left: R, right: R) -> R {
        if left <= right { left } else { right }
    }

    #[inline(always)]
    fn partials(left: R, right: R, _result: R) -> (R, R) {
        if left <= right { (R::ONE, R::ZERO) } else { (R::ZERO, R::ONE) }
    }
}

pub struct MaxOp;

impl<R: Real> BinaryOperator<R> for MaxOp {
    /// Ties select the first argument.
    #[inline(always)]
    fn primal(left: R, right: R) -> R {
        if left >= right { left } else { right }
    }

    #[inline(always)]
    fn partials(left: R, right: R, _result: R) -> (R, R) {
        if left >= right { (R::ONE, R::ZERO) } else { (R::ZERO, R::ONE) }
    }
}

// STANDARD OPERATOR WIRING
// ================================================================================================

/// Implements one `core::ops` binary trait for a passive left-hand side of a
/// concrete primitive type.
macro_rules! impl_binary_passive_lhs {
    ($trait:ident, $method:ident, $op:ty, $real:ty) => {
        impl<K: AdKind<Real = $real>> core::ops::$trait<Active<K>> for $real {
            type Output = Expr<BinaryNode<$op, ConstOperand<K>, Active<K>>>;

            #[inline(always)]
            fn $method(self, rhs: Active<K>) -> Self::Output {
                Expr::new(BinaryNode::new(ConstOperand::new(self), rhs))
            }
        }

        impl<'a, K: AdKind<Real = $real>> core::ops::$trait<&'a Active<K>> for $real {
            type Output = Expr<BinaryNode<$op, ConstOperand<K>, &'a Active<K>>>;

            #[inline(always)]
            fn $method(self, rhs: &'a Active<K>) -> Self::Output {
                Expr::new(BinaryNode::new(ConstOperand::new(self), rhs))
            }
        }

        impl<N> core::ops::$trait<Expr<N>> for $real
        where
            N: ExprNode,
            N::Kind: AdKind<Real = $real>,
        {
            type Output = Expr<BinaryNode<$op, ConstOperand<N::Kind>, N>>;

            #[inline(always)]
            fn $method(self, rhs: Expr<N>) -> Self::Output {
                Expr::new(BinaryNode::new(ConstOperand::new(self), rhs.into_node()))
            }
        }
    };
}

/// Implements one `core::ops` binary trait for every operand combination.
macro_rules! impl_binary_operator {
    ($trait:ident, $method:ident, $op:ty) => {
        impl<N: ExprNode, Rhs: IntoExpr<N::Kind>> core::ops::$trait<Rhs> for Expr<N> {
            type Output = Expr<BinaryNode<$op, N, Rhs::Node>>;

            #[inline(always)]
            fn $method(self, rhs: Rhs) -> Self::Output {
                Expr::new(BinaryNode::new(self.into_node(), rhs.into_node()))
            }
        }

        impl<K: AdKind, Rhs: IntoExpr<K>> core::ops::$trait<Rhs> for Active<K> {
            type Output = Expr<BinaryNode<$op, Active<K>, Rhs::Node>>;

            #[inline(always)]
            fn $method(self, rhs: Rhs) -> Self::Output {
                Expr::new(BinaryNode::new(self, rhs.into_node()))
            }
        }

        impl<'a, K: AdKind, Rhs: IntoExpr<K>> core::ops::$trait<Rhs> for &'a Active<K> {
            type Output = Expr<BinaryNode<$op, &'a Active<K>, Rhs::Node>>;

            #[inline(always)]
            fn $method(self, rhs: Rhs) -> Self::Output {
                Expr::new(BinaryNode::new(self, rhs.into_node()))
            }
        }

        impl_binary_passive_lhs!($trait, $method, $op, f32);
        impl_binary_passive_lhs!($trait, $method, $op, f64);
    };
}

impl_binary_operator!(Add, add, AddOp);
impl_binary_operator!(Sub, sub, SubOp);
impl_binary_operator!(Mul, mul, MulOp);
impl_binary_operator!(Div, div, DivOp);

// COMPOUND ASSIGNMENT
// ================================================================================================

/// Implements one compound-assignment trait on [`Active`].
///
/// Additive updates by a purely passive right-hand side skip the tape: stored
/// as an expression they would only produce an identity statement.
macro_rules! impl_compound_assign {
    ($trait:ident, $method:ident, $op:ty, passive_fast_path: $fast:literal) => {
        impl<K: AdKind, Rhs: IntoExpr<K>> core::ops::$trait<Rhs> for Active<K> {
            fn $method(&mut self, rhs: Rhs) {
                let rhs = rhs.into_node();
                if $fast
                    && K::ALLOW_JACOBIAN_OPTIMIZATION
                    && <Rhs::Node as ExprNode>::MAX_ACTIVE == 0
                {
                    let updated = <$op>::primal(self.value(), rhs.value());
                    self.set_value(updated);
                } else {
                    let node =
                        BinaryNode::<$op, _, _>::new(LeafRef::capture(self), rhs);
                    self.assign(Expr::new(node));
                }
            }
        }
    };
}

impl_compound_assign!(AddAssign, add_assign, AddOp, passive_fast_path: true);
impl_compound_assign!(SubAssign, sub_assign, SubOp, passive_fast_path: true);
impl_compound_assign!(MulAssign, mul_assign, MulOp, passive_fast_path: false);
impl_compound_assign!(DivAssign, div_assign, DivOp, passive_fast_path: false);

// TESTS
// ================================================================================================
