//! Free-function forms of the binary elementary functions.

use super::{Atan2Op, BinaryNode, MaxOp, MinOp, PowOp};
use crate::kind::AdKind;
use crate::node::{Expr, IntoExpr};

/// `base` raised to `exponent`.
///
/// With an active exponent the base must not be negative; for non-positive
/// bases the partial with respect to the exponent is 0.
pub fn pow<K, A, B>(base: A, exponent: B) -> Expr<BinaryNode<PowOp, A::Node, B::Node>>
where
    K: AdKind,
    A: IntoExpr<K>,
    B: IntoExpr<K>,
{
    Expr::new(BinaryNode::new(base.into_node(), exponent.into_node()))
}

/// Four-quadrant arctangent of `y / x`; undefined at the origin.
pub fn atan2<K, A, B>(y: A, x: B) -> Expr<BinaryNode<Atan2Op, A::Node, B::Node>>
where
    K: AdKind,
    A: IntoExpr<K>,
    B: IntoExpr<K>,
{
    Expr::new(BinaryNode::new(y.into_node(), x.into_node()))
}

/// The smaller operand; ties select the first argument.
pub fn min<K, A, B>(a: A, b: B) -> Expr<BinaryNode<MinOp, A::Node, B::Node>>
where
    K: AdKind,
    A: IntoExpr<K>,
    B: IntoExpr<K>,
{
    Expr::new(BinaryNode::new(a.into_node(), b.into_node()))
}

/// The larger operand; ties select the first argument.
pub fn max<K, A, B>(a: A, b: B) -> Expr<BinaryNode<MaxOp, A::Node, B::Node>>
where
    K: AdKind,
    A: IntoExpr<K>,
    B: IntoExpr<K>,
{
    Expr::new(BinaryNode::new(a.into_node(), b.into_node()))
}
