//! Comparisons delegate to primal values; their results carry no tape
//! dependency.

use core::cmp::Ordering;

use crate::kind::{Active, AdKind};
use crate::node::{Expr, ExprNode};

// ACTIVE VS ACTIVE
// ================================================================================================

impl<K: AdKind> PartialEq for Active<K> {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl<K: AdKind> PartialOrd for Active<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value().partial_cmp(&other.value())
    }
}

// MIXED COMPARISONS
// ================================================================================================

macro_rules! impl_passive_comparisons {
    ($($real:ty),*) => {
        $(
            impl<K: AdKind<Real = $real>> PartialEq<$real> for Active<K> {
                fn eq(&self, other: &$real) -> bool {
                    self.value() == *other
                }
            }

            impl<K: AdKind<Real = $real>> PartialOrd<$real> for Active<K> {
                fn partial_cmp(&self, other: &$real) -> Option<Ordering> {
                    self.value().partial_cmp(other)
                }
            }

            impl<K: AdKind<Real = $real>> PartialEq<Active<K>> for $real {
                fn eq(&self, other: &Active<K>) -> bool {
                    *self == other.value()
                }
            }

            impl<K: AdKind<Real = $real>> PartialOrd<Active<K>> for $real {
                fn partial_cmp(&self, other: &Active<K>) -> Option<Ordering> {
                    self.partial_cmp(&other.value())
                }
            }

            impl<N> PartialEq<$real> for Expr<N>
            where
                N: ExprNode,
                N::Kind: AdKind<Real = $real>,
            {
                fn eq(&self, other: &$real) -> bool {
                    self.value() == *other
                }
            }

            impl<N> PartialOrd<$real> for Expr<N>
            where
                N: ExprNode,
                N::Kind: AdKind<Real = $real>,
            {
                fn partial_cmp(&self, other: &$real) -> Option<Ordering> {
                    self.value().partial_cmp(other)
                }
            }
        )*
    };
}

impl_passive_comparisons!(f32, f64);

// EXPRESSION COMPARISONS
// ================================================================================================

impl<A, B> PartialEq<Expr<B>> for Expr<A>
where
    A: ExprNode,
    B: ExprNode<Kind = A::Kind>,
{
    fn eq(&self, other: &Expr<B>) -> bool {
        self.value() == other.value()
    }
}

impl<A, B> PartialOrd<Expr<B>> for Expr<A>
where
    A: ExprNode,
    B: ExprNode<Kind = A::Kind>,
{
    fn partial_cmp(&self, other: &Expr<B>) -> Option<Ordering> {
        self.value().partial_cmp(&other.value())
    }
}

impl<A: ExprNode> PartialEq<Active<A::Kind>> for Expr<A> {
    fn eq(&self, other: &Active<A::Kind>) -> bool {
        self.value() == other.value()
    }
}

impl<A: ExprNode> PartialOrd<Active<A::Kind>> for Expr<A> {
    fn partial_cmp(&self, other: &Active<A::Kind>) -> Option<Ordering> {
        self.value().partial_cmp(&other.value())
    }
}

impl<A: ExprNode> PartialEq<Expr<A>> for Active<A::Kind> {
    fn eq(&self, other: &Expr<A>) -> bool {
        self.value() == other.value()
    }
}

impl<A: ExprNode> PartialOrd<Expr<A>> for Active<A::Kind> {
    fn partial_cmp(&self, other: &Expr<A>) -> Option<Ordering> {
        self.value().partial_cmp(&other.value())
    }
}
