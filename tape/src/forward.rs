use core::marker::PhantomData;

use descent_core::{Gradient, Identifier, PASSIVE_INDEX, Real};
use descent_expr::{AdKind, Active, ExprNode, PartialsSink};

// FORWARD MODE
// ================================================================================================

/// The tapeless forward (tangent) kind.
///
/// Scalars of this kind carry their tangent inline instead of a tape
/// identifier; every assignment folds the expression's partials into the new
/// tangent on the spot. Nothing is recorded and there is no shared state, so
/// forward-mode scalars are freely usable across threads.
///
/// Seed an input's direction with [`Active::set_gradient`] and read
/// derivatives off any downstream value with [`Active::gradient`]. With a
/// vector gradient `G`, one pass propagates several directions at once.
pub struct Forward<R, G = R>(PhantomData<fn() -> (R, G)>);

struct TangentSink<R: Real, G: Gradient<R>> {
    tangent: G,
    _real: PhantomData<R>,
}

impl<R: Real, G: Gradient<R>> PartialsSink<Forward<R, G>> for TangentSink<R, G> {
    #[inline(always)]
    fn push(&mut self, jacobian: R, _value: R, data: &G) {
        self.tangent += data.scaled(jacobian);
    }
}

impl<R: Real, G: Gradient<R>> AdKind for Forward<R, G> {
    type Real = R;
    type Data = G;
    type Gradient = G;

    const ALLOW_JACOBIAN_OPTIMIZATION: bool = true;

    fn store_expr<E: ExprNode<Kind = Self>>(value: &mut R, data: &mut G, rhs: &E) {
        let mut sink = TangentSink { tangent: G::zero(), _real: PhantomData };
        rhs.push_partials(&mut sink, R::ONE);
        *data = sink.tangent;
        *value = rhs.value();
    }

    fn store_copy(value: &mut R, data: &mut G, rhs: &Active<Self>) {
        *value = rhs.value();
        *data = *rhs.data();
    }

    fn store_passive(value: &mut R, data: &mut G, rhs: R) {
        *value = rhs;
        *data = G::zero();
    }

    fn free_data(_data: &mut G) {}

    #[inline(always)]
    fn data_identifier(_data: &G) -> Identifier {
        PASSIVE_INDEX
    }

    #[inline(always)]
    fn gradient(data: &G) -> G {
        *data
    }

    #[inline(always)]
    fn set_gradient(data: &mut G, gradient: G) {
        *data = gradient;
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use descent_core::Direction;
    use descent_expr::ElementaryFunctions;

    use super::*;

    type Dual = Active<Forward<f64>>;

    #[test]
    fn tangents_follow_the_chain_rule() {
        let mut x = Dual::new(0.5);
        x.set_gradient(1.0);

        let y: Dual = ((&x).sin() * (&x).exp()).into();
        let expected = (0.5f64.cos() + 0.5f64.sin()) * 0.5f64.exp();
        assert_eq!(y.value(), 0.5f64.sin() * 0.5f64.exp());
        assert!((y.gradient() - expected).abs() < 1e-15);
    }

    #[test]
    fn passive_assignments_clear_the_tangent() {
        let mut x = Dual::new(2.0);
        x.set_gradient(1.0);
        let y: Dual = ((&x) * 3.0).into();
        assert_eq!(y.gradient(), 3.0);

        let z = Dual::from(7.0);
        assert_eq!(z.gradient(), 0.0);
    }

    #[test]
    fn vector_tangents_broadcast() {
        type DualVec = Active<Forward<f64, Direction<f64, 2>>>;

        let mut x1 = DualVec::new(1.0);
        let mut x2 = DualVec::new(2.0);
        x1.set_gradient(Direction::unit(0));
        x2.set_gradient(Direction::unit(1));

        let sum: DualVec = (&x1 + &x2).into();
        let product: DualVec = (&x1 * &x2).into();
        assert_eq!(sum.gradient().as_slice(), &[1.0, 1.0]);
        assert_eq!(product.gradient().as_slice(), &[2.0, 1.0]);
    }
}
