//! Unary operator table and the method surface for elementary functions.

use descent_core::config::{CHECK_EXPRESSION_ARGUMENTS, STRICT_DOMAIN};
use descent_core::Real;
use paste::paste;

use super::functions;
use super::{domain_error, BinaryNode, UnaryNode, UnaryOperator};
use crate::kind::{Active, AdKind};
use crate::node::{Expr, ExprNode, IntoExpr};

// OPERATOR RULES
// ================================================================================================

/// Declares one zero-sized unary operator: `Name, primal_method, |arg,
/// result| partial-body`.
macro_rules! define_unary_operators {
    ($($(#[$meta:meta])* $name:ident, $primal:ident, |$arg:ident, $result:ident| $partial:expr;)*) => {
        paste! {
            $(
                $(#[$meta])*
                pub struct [<$name Op>];

                impl<R: Real> UnaryOperator<R> for [<$name Op>] {
                    #[inline(always)]
                    fn primal(arg: R) -> R {
                        arg.$primal()
                    }

                    #[inline(always)]
                    fn partial($arg: R, $result: R) -> R {
                        $partial
                    }
                }
            )*
        }
    };
}

define_unary_operators! {
    /// d/da sqrt(a) = 1 / (2 sqrt(a)); the derivative at 0 is defined as 0 to
    /// keep reverse sweeps finite.
    Sqrt, sqrt, |arg, result| {
        if CHECK_EXPRESSION_ARGUMENTS && arg < R::ZERO {
            domain_error("sqrt", arg);
        }
        if result != R::ZERO {
            R::from_f64(0.5) / result
        } else {
            if STRICT_DOMAIN {
                domain_error("sqrt", arg);
            }
            R::ZERO
        }
    };

    Exp, exp, |_arg, result| result;

    Ln, ln, |arg, _result| {
        if CHECK_EXPRESSION_ARGUMENTS && arg <= R::ZERO {
            domain_error("ln", arg);
        }
        arg.recip()
    };

    Log10, log10, |arg, _result| {
        if CHECK_EXPRESSION_ARGUMENTS && arg <= R::ZERO {
            domain_error("log10", arg);
        }
        R::from_f64(core::f64::consts::LOG10_E) / arg
    };

    Sin, sin, |arg, _result| arg.cos();

    Cos, cos, |arg, _result| -arg.sin();

    Tan, tan, |arg, _result| {
        if CHECK_EXPRESSION_ARGUMENTS && arg.cos() == R::ZERO {
            domain_error("tan", arg);
        }
        let secant = arg.cos().recip();
        secant * secant
    };

    Asin, asin, |arg, _result| {
        if CHECK_EXPRESSION_ARGUMENTS && (arg <= -R::ONE || arg >= R::ONE) {
            domain_error("asin", arg);
        }
        (R::ONE - arg * arg).sqrt().recip()
    };

    Acos, acos, |arg, _result| {
        if CHECK_EXPRESSION_ARGUMENTS && (arg <= -R::ONE || arg >= R::ONE) {
            domain_error("acos", arg);
        }
        -(R::ONE - arg * arg).sqrt().recip()
    };

    Atan, atan, |arg, _result| (R::ONE + arg * arg).recip();

    Sinh, sinh, |arg, _result| arg.cosh();

    Cosh, cosh, |arg, _result| arg.sinh();

    Tanh, tanh, |_arg, result| R::ONE - result * result;

    Atanh, atanh, |arg, _result| {
        if CHECK_EXPRESSION_ARGUMENTS && (arg <= -R::ONE || arg >= R::ONE) {
            domain_error("atanh", arg);
        }
        (R::ONE - arg * arg).recip()
    };

    /// The subgradient at 0 is 0.
    Abs, abs, |arg, _result| {
        if arg < R::ZERO {
            -R::ONE
        } else if arg > R::ZERO {
            R::ONE
        } else {
            if STRICT_DOMAIN {
                domain_error("abs", arg);
            }
            R::ZERO
        }
    };
}

pub struct NegOp;

impl<R: Real> UnaryOperator<R> for NegOp {
    #[inline(always)]
    fn primal(arg: R) -> R {
        -arg
    }

    #[inline(always)]
    fn partial(_arg: R, _result: R) -> R {
        -R::ONE
    }
}

// NEGATION OPERATOR
// ================================================================================================

impl<N: ExprNode> core::ops::Neg for Expr<N> {
    type Output = Expr<UnaryNode<NegOp, N>>;

    #[inline(always)]
    fn neg(self) -> Self::Output {
        Expr::new(UnaryNode::new(self.into_node()))
    }
}

impl<K: AdKind> core::ops::Neg for Active<K> {
    type Output = Expr<UnaryNode<NegOp, Active<K>>>;

    #[inline(always)]
    fn neg(self) -> Self::Output {
        Expr::new(UnaryNode::new(self))
    }
}

impl<'a, K: AdKind> core::ops::Neg for &'a Active<K> {
    type Output = Expr<UnaryNode<NegOp, &'a Active<K>>>;

    #[inline(always)]
    fn neg(self) -> Self::Output {
        Expr::new(UnaryNode::new(self))
    }
}

// ELEMENTARY FUNCTION METHODS
// ================================================================================================

/// Elementary functions on anything that can be an operand: active scalars
/// (by value or reference), expressions.
///
/// Binary forms are also available as free functions in
/// [`functions`](super::functions).
pub trait ElementaryFunctions<K: AdKind>: IntoExpr<K> + Sized {
    fn sqrt(self) -> Expr<UnaryNode<SqrtOp, Self::Node>> {
        Expr::new(UnaryNode::new(self.into_node()))
    }

    fn exp(self) -> Expr<UnaryNode<ExpOp, Self::Node>> {
        Expr::new(UnaryNode::new(self.into_node()))
    }

    fn ln(self) -> Expr<UnaryNode<LnOp, Self::Node>> {
        Expr::new(UnaryNode::new(self.into_node()))
    }

    fn log10(self) -> Expr<UnaryNode<Log10Op, Self::Node>> {
        Expr::new(UnaryNode::new(self.into_node()))
    }

    fn sin(self) -> Expr<UnaryNode<SinOp, Self::Node>> {
        Expr::new(UnaryNode::new(self.into_node()))
    }

    fn cos(self) -> Expr<UnaryNode<CosOp, Self::Node>> {
        Expr::new(UnaryNode::new(self.into_node()))
    }

    fn tan(self) -> Expr<UnaryNode<TanOp, Self::Node>> {
        Expr::new(UnaryNode::new(self.into_node()))
    }

    fn asin(self) -> Expr<UnaryNode<AsinOp, Self::Node>> {
        Expr::new(UnaryNode::new(self.into_node()))
    }

    fn acos(self) -> Expr<UnaryNode<AcosOp, Self::Node>> {
        Expr::new(UnaryNode::new(self.into_node()))
    }

    fn atan(self) -> Expr<UnaryNode<AtanOp, Self::Node>> {
        Expr::new(UnaryNode::new(self.into_node()))
    }

    fn sinh(self) -> Expr<UnaryNode<SinhOp, Self::Node>> {
        Expr::new(UnaryNode::new(self.into_node()))
    }

    fn cosh(self) -> Expr<UnaryNode<CoshOp, Self::Node>> {
        Expr::new(UnaryNode::new(self.into_node()))
    }

    fn tanh(self) -> Expr<UnaryNode<TanhOp, Self::Node>> {
        Expr::new(UnaryNode::new(self.into_node()))
    }

    fn atanh(self) -> Expr<UnaryNode<AtanhOp, Self::Node>> {
        Expr::new(UnaryNode::new(self.into_node()))
    }

    fn abs(self) -> Expr<UnaryNode<AbsOp, Self::Node>> {
        Expr::new(UnaryNode::new(self.into_node()))
    }

    fn powf<E: IntoExpr<K>>(
        self,
        exponent: E,
    ) -> Expr<BinaryNode<super::PowOp, Self::Node, E::Node>> {
        functions::pow(self, exponent)
    }

    fn atan2<E: IntoExpr<K>>(self, rhs: E) -> Expr<BinaryNode<super::Atan2Op, Self::Node, E::Node>> {
        functions::atan2(self, rhs)
    }

    fn min<E: IntoExpr<K>>(self, rhs: E) -> Expr<BinaryNode<super::MinOp, Self::Node, E::Node>> {
        functions::min(self, rhs)
    }

    fn max<E: IntoExpr<K>>(self, rhs: E) -> Expr<BinaryNode<super::MaxOp, Self::Node, E::Node>> {
        functions::max(self, rhs)
    }
}

impl<K: AdKind, T: IntoExpr<K>> ElementaryFunctions<K> for T {}

// TESTS
// ================================================================================================
