use core::fmt::{Debug, Display};
use core::iter::{Product, Sum};
use core::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

// REAL
// ================================================================================================

/// A floating-point primitive that can serve as the primal type of an active
/// scalar.
///
/// The trait gathers everything the expression layer and the tapes need from
/// the underlying number type: arithmetic, the transcendental functions of the
/// operator table, value classification, and the numeric limits that active
/// scalars forward to their users. It is implemented for [`f32`] and [`f64`].
pub trait Real:
    Copy
    + Debug
    + Display
    + Default
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + Sum
    + Product
    + Send
    + Sync
    + 'static
{
    // CONSTANTS
    // --------------------------------------------------------------------------------------------

    const ZERO: Self;
    const ONE: Self;

    /// Machine epsilon of the underlying primitive.
    const EPSILON: Self;
    /// Smallest positive normal value.
    const MIN_POSITIVE: Self;
    /// Largest finite value.
    const MAX: Self;
    /// Smallest finite value.
    const MIN: Self;
    const INFINITY: Self;
    const NEG_INFINITY: Self;
    const NAN: Self;

    // CONVERSIONS
    // --------------------------------------------------------------------------------------------

    /// Converts an `f64` literal into this type, rounding if necessary.
    fn from_f64(value: f64) -> Self;

    /// Widens this value to `f64`.
    fn to_f64(self) -> f64;

    // ELEMENTARY FUNCTIONS
    // --------------------------------------------------------------------------------------------

    fn sqrt(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn log10(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn tan(self) -> Self;
    fn asin(self) -> Self;
    fn acos(self) -> Self;
    fn atan(self) -> Self;
    fn sinh(self) -> Self;
    fn cosh(self) -> Self;
    fn tanh(self) -> Self;
    fn atanh(self) -> Self;
    fn abs(self) -> Self;
    fn floor(self) -> Self;
    fn ceil(self) -> Self;
    fn powf(self, exponent: Self) -> Self;
    fn atan2(self, other: Self) -> Self;
    fn recip(self) -> Self;

    // CLASSIFICATION
    // --------------------------------------------------------------------------------------------

    fn is_nan(self) -> bool;
    fn is_finite(self) -> bool;
    fn is_infinite(self) -> bool;
}

// IMPLEMENTATIONS FOR PRIMITIVES
// ================================================================================================

macro_rules! impl_real {
    ($ty:ty) => {
        impl Real for $ty {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;
            const EPSILON: Self = <$ty>::EPSILON;
            const MIN_POSITIVE: Self = <$ty>::MIN_POSITIVE;
            const MAX: Self = <$ty>::MAX;
            const MIN: Self = <$ty>::MIN;
            const INFINITY: Self = <$ty>::INFINITY;
            const NEG_INFINITY: Self = <$ty>::NEG_INFINITY;
            const NAN: Self = <$ty>::NAN;

            #[inline(always)]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            #[inline(always)]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline(always)]
            fn sqrt(self) -> Self {
                self.sqrt()
            }

            #[inline(always)]
            fn exp(self) -> Self {
                self.exp()
            }

            #[inline(always)]
            fn ln(self) -> Self {
                self.ln()
            }

            #[inline(always)]
            fn log10(self) -> Self {
                self.log10()
            }

            #[inline(always)]
            fn sin(self) -> Self {
                self.sin()
            }

            #[inline(always)]
            fn cos(self) -> Self {
                self.cos()
            }

            #[inline(always)]
            fn tan(self) -> Self {
                self.tan()
            }

            #[inline(always)]
            fn asin(self) -> Self {
                self.asin()
            }

            #[inline(always)]
            fn acos(self) -> Self {
                self.acos()
            }

            #[inline(always)]
            fn atan(self) -> Self {
                self.atan()
            }

            #[inline(always)]
            fn sinh(self) -> Self {
                self.sinh()
            }

            #[inline(always)]
            fn cosh(self) -> Self {
                self.cosh()
            }

            #[inline(always)]
            fn tanh(self) -> Self {
                self.tanh()
            }

            #[inline(always)]
            fn atanh(self) -> Self {
                self.atanh()
            }

            #[inline(always)]
            fn abs(self) -> Self {
                self.abs()
            }

            #[inline(always)]
            fn floor(self) -> Self {
                self.floor()
            }

            #[inline(always)]
            fn ceil(self) -> Self {
                self.ceil()
            }

            #[inline(always)]
            fn powf(self, exponent: Self) -> Self {
                self.powf(exponent)
            }

            #[inline(always)]
            fn atan2(self, other: Self) -> Self {
                self.atan2(other)
            }

            #[inline(always)]
            fn recip(self) -> Self {
                self.recip()
            }

            #[inline(always)]
            fn is_nan(self) -> bool {
                self.is_nan()
            }

            #[inline(always)]
            fn is_finite(self) -> bool {
                self.is_finite()
            }

            #[inline(always)]
            fn is_infinite(self) -> bool {
                self.is_infinite()
            }
        }
    };
}

impl_real!(f32);
impl_real!(f64);

// TESTS
// ================================================================================================
