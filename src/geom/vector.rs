//! Scalar and vector primitives.
//!
//! The whole crate is generic over a float type [`Real`] (implemented for
//! `f32` and `f64`) and a coordinate type [`Coord`] providing the small
//! capability bundle the tree machinery needs: dot products, arithmetic,
//! norms, and random directions. [`Vec3`] is the workhorse; [`Vec2`] exists
//! for planar experiments.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use rand::Rng;
use rand_distr::StandardNormal;

// =============================================================================
// Real
// =============================================================================

/// Floating-point scalar abstraction.
///
/// Only the operations the tree code actually needs; implemented for `f32`
/// and `f64`.
pub trait Real:
    Copy
    + PartialEq
    + PartialOrd
    + Debug
    + Default
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
{
    const ZERO: Self;
    const ONE: Self;

    fn from_f64(x: f64) -> Self;
    fn to_f64(self) -> f64;
    fn from_f32(x: f32) -> Self;
    fn to_f32(self) -> f32;

    fn abs(self) -> Self;
    fn sqrt(self) -> Self;
    fn ln(self) -> Self;
    fn min(self, other: Self) -> Self;
    fn max(self, other: Self) -> Self;
    fn is_finite(self) -> bool;
    fn is_infinite(self) -> bool;
    fn infinity() -> Self;
    fn neg_infinity() -> Self;
}

macro_rules! impl_real {
    ($ty:ty) => {
        impl Real for $ty {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;

            #[inline]
            fn from_f64(x: f64) -> Self {
                x as $ty
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f32(x: f32) -> Self {
                x as $ty
            }

            #[inline]
            fn to_f32(self) -> f32 {
                self as f32
            }

            #[inline]
            fn abs(self) -> Self {
                <$ty>::abs(self)
            }

            #[inline]
            fn sqrt(self) -> Self {
                <$ty>::sqrt(self)
            }

            #[inline]
            fn ln(self) -> Self {
                <$ty>::ln(self)
            }

            #[inline]
            fn min(self, other: Self) -> Self {
                <$ty>::min(self, other)
            }

            #[inline]
            fn max(self, other: Self) -> Self {
                <$ty>::max(self, other)
            }

            #[inline]
            fn is_finite(self) -> bool {
                <$ty>::is_finite(self)
            }

            #[inline]
            fn is_infinite(self) -> bool {
                <$ty>::is_infinite(self)
            }

            #[inline]
            fn infinity() -> Self {
                <$ty>::INFINITY
            }

            #[inline]
            fn neg_infinity() -> Self {
                <$ty>::NEG_INFINITY
            }
        }
    };
}

impl_real!(f32);
impl_real!(f64);

// =============================================================================
// Coord
// =============================================================================

/// Fixed-dimension vector over a [`Real`] scalar.
///
/// Equality is bit-exact per component; the split search relies on this to
/// group samples with identical thresholds.
pub trait Coord<F: Real>:
    Copy
    + PartialEq
    + Debug
    + Default
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
{
    /// Inner product.
    fn dot(self, other: Self) -> F;

    /// Multiply every component by `s`.
    fn scale(self, s: F) -> Self;

    /// Sum of components.
    fn sum(self) -> F;

    /// Unit vectors along each coordinate axis.
    fn basis() -> Vec<Self>;

    /// A vector with every component drawn from a standard normal.
    fn random_gaussian<R: Rng + ?Sized>(rng: &mut R) -> Self;

    #[inline]
    fn norm_squared(self) -> F {
        self.dot(self)
    }

    #[inline]
    fn norm(self) -> F {
        self.norm_squared().sqrt()
    }

    /// Scaled to unit norm. The caller must ensure the norm is non-zero.
    #[inline]
    fn normalize(self) -> Self {
        self.scale(F::ONE / self.norm())
    }

    #[inline]
    fn dist(self, other: Self) -> F {
        (self - other).norm()
    }

    #[inline]
    fn mid(self, other: Self) -> Self {
        (self + other).scale(F::from_f64(0.5))
    }

    /// A uniformly random unit direction: normal per component, renormalized,
    /// rejecting degenerate draws with norm below 1e-5.
    fn random_unit<R: Rng + ?Sized>(rng: &mut R) -> Self {
        loop {
            let c = Self::random_gaussian(rng);
            let n = c.norm();
            if n > F::from_f64(1e-5) {
                return c.scale(F::ONE / n);
            }
        }
    }
}

// =============================================================================
// Vec3
// =============================================================================

/// A 3D vector.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vec3<F> {
    pub x: F,
    pub y: F,
    pub z: F,
}

impl<F: Real> Vec3<F> {
    #[inline]
    pub fn new(x: F, y: F, z: F) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn splat(v: F) -> Self {
        Self { x: v, y: v, z: v }
    }

    #[inline]
    pub fn zero() -> Self {
        Self::splat(F::ZERO)
    }

    #[inline]
    pub fn x_axis() -> Self {
        Self::new(F::ONE, F::ZERO, F::ZERO)
    }

    #[inline]
    pub fn y_axis() -> Self {
        Self::new(F::ZERO, F::ONE, F::ZERO)
    }

    #[inline]
    pub fn z_axis() -> Self {
        Self::new(F::ZERO, F::ZERO, F::ONE)
    }

    /// Componentwise minimum.
    #[inline]
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Componentwise maximum.
    #[inline]
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    /// Largest component.
    #[inline]
    pub fn max_coord(self) -> F {
        self.x.max(self.y).max(self.z)
    }

    #[inline]
    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs(), self.z.abs())
    }

    #[inline]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    #[inline]
    pub fn add_scalar(self, s: F) -> Self {
        Self::new(self.x + s, self.y + s, self.z + s)
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Component by index (0 = x, 1 = y, 2 = z).
    #[inline]
    pub fn component(self, i: usize) -> F {
        match i {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }
}

impl<F: Real> Add for Vec3<F> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl<F: Real> Sub for Vec3<F> {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl<F: Real> Mul for Vec3<F> {
    type Output = Self;

    /// Elementwise product.
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }
}

impl<F: Real> Neg for Vec3<F> {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl<F: Real> Coord<F> for Vec3<F> {
    #[inline]
    fn dot(self, other: Self) -> F {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    fn scale(self, s: F) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    #[inline]
    fn sum(self) -> F {
        self.x + self.y + self.z
    }

    fn basis() -> Vec<Self> {
        vec![Self::x_axis(), Self::y_axis(), Self::z_axis()]
    }

    fn random_gaussian<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::new(
            F::from_f64(rng.sample::<f64, _>(StandardNormal)),
            F::from_f64(rng.sample::<f64, _>(StandardNormal)),
            F::from_f64(rng.sample::<f64, _>(StandardNormal)),
        )
    }
}

// =============================================================================
// Vec2
// =============================================================================

/// A 2D vector, for planar variants of the tree machinery.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vec2<F> {
    pub x: F,
    pub y: F,
}

impl<F: Real> Vec2<F> {
    #[inline]
    pub fn new(x: F, y: F) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn zero() -> Self {
        Self::new(F::ZERO, F::ZERO)
    }
}

impl<F: Real> Add for Vec2<F> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl<F: Real> Sub for Vec2<F> {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl<F: Real> Mul for Vec2<F> {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.x * rhs.x, self.y * rhs.y)
    }
}

impl<F: Real> Neg for Vec2<F> {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl<F: Real> Coord<F> for Vec2<F> {
    #[inline]
    fn dot(self, other: Self) -> F {
        self.x * other.x + self.y * other.y
    }

    #[inline]
    fn scale(self, s: F) -> Self {
        Self::new(self.x * s, self.y * s)
    }

    #[inline]
    fn sum(self) -> F {
        self.x + self.y
    }

    fn basis() -> Vec<Self> {
        vec![Self::new(F::ONE, F::ZERO), Self::new(F::ZERO, F::ONE)]
    }

    fn random_gaussian<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::new(
            F::from_f64(rng.sample::<f64, _>(StandardNormal)),
            F::from_f64(rng.sample::<f64, _>(StandardNormal)),
        )
    }
}
