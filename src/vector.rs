//! Scalar and vector traits that let the BVH run over any of the glam vector types.
//!
//! The hierarchy is dimension agnostic: every box, ray and split decision is expressed
//! through [`BvhVector`], which is implemented for the 2D, 3D and 4D glam vectors in both
//! single and double precision.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

use glam::{DVec2, DVec3, DVec4, Vec2, Vec3, Vec3A, Vec4};

/// Floating point scalar used for coordinates and distances.
pub trait Real:
    Copy
    + Debug
    + Default
    + PartialOrd
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
{
    const ZERO: Self;
    const ONE: Self;
    const MAX: Self;
    const INFINITY: Self;
    const EPSILON: Self;

    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn abs(self) -> Self;
    fn min(self, other: Self) -> Self;
    fn max(self, other: Self) -> Self;
    fn is_finite(self) -> bool;
    fn signum(self) -> Self;

    /// `gamma(n)` from PBRT: a bound on the relative rounding error of `n` operations.
    #[inline(always)]
    fn rounding_gamma(n: u32) -> Self {
        let e = Self::EPSILON.to_f64() * 0.5;
        let n = f64::from(n);
        Self::from_f64((n * e) / (1.0 - n * e))
    }
}

macro_rules! impl_real {
    ($t:ty) => {
        impl Real for $t {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;
            const MAX: Self = <$t>::MAX;
            const INFINITY: Self = <$t>::INFINITY;
            const EPSILON: Self = <$t>::EPSILON;

            #[inline(always)]
            fn from_f64(value: f64) -> Self {
                value as $t
            }
            #[inline(always)]
            fn to_f64(self) -> f64 {
                self as f64
            }
            #[inline(always)]
            fn abs(self) -> Self {
                <$t>::abs(self)
            }
            #[inline(always)]
            fn min(self, other: Self) -> Self {
                <$t>::min(self, other)
            }
            #[inline(always)]
            fn max(self, other: Self) -> Self {
                <$t>::max(self, other)
            }
            #[inline(always)]
            fn is_finite(self) -> bool {
                <$t>::is_finite(self)
            }
            #[inline(always)]
            fn signum(self) -> Self {
                <$t>::signum(self)
            }
        }
    };
}

impl_real!(f32);
impl_real!(f64);

/// An N-dimensional point or direction.
pub trait BvhVector:
    Copy
    + Debug
    + Default
    + PartialEq
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
{
    type Scalar: Real;

    /// Number of dimensions.
    const DIM: usize;

    fn splat(value: Self::Scalar) -> Self;
    fn component(&self, axis: usize) -> Self::Scalar;
    fn set_component(&mut self, axis: usize, value: Self::Scalar);
    /// Element-wise minimum.
    fn min_by_element(self, other: Self) -> Self;
    /// Element-wise maximum.
    fn max_by_element(self, other: Self) -> Self;
    fn min_element(self) -> Self::Scalar;
    fn max_element(self) -> Self::Scalar;
    /// Bit `i` is set when component `i` is negative (including `-0.0`).
    fn negative_mask(self) -> u32;
    fn is_finite(self) -> bool;
    fn scaled(self, s: Self::Scalar) -> Self;
    fn dot(self, other: Self) -> Self::Scalar;

    #[inline(always)]
    fn length(self) -> Self::Scalar {
        Self::Scalar::from_f64(self.dot(self).to_f64().sqrt())
    }
}

macro_rules! impl_bvh_vector {
    ($v:ty, $t:ty, $dim:expr) => {
        impl BvhVector for $v {
            type Scalar = $t;
            const DIM: usize = $dim;

            #[inline(always)]
            fn splat(value: $t) -> Self {
                <$v>::splat(value)
            }
            #[inline(always)]
            fn component(&self, axis: usize) -> $t {
                self[axis]
            }
            #[inline(always)]
            fn set_component(&mut self, axis: usize, value: $t) {
                self[axis] = value;
            }
            #[inline(always)]
            fn min_by_element(self, other: Self) -> Self {
                self.min(other)
            }
            #[inline(always)]
            fn max_by_element(self, other: Self) -> Self {
                self.max(other)
            }
            #[inline(always)]
            fn min_element(self) -> $t {
                <$v>::min_element(self)
            }
            #[inline(always)]
            fn max_element(self) -> $t {
                <$v>::max_element(self)
            }
            #[inline(always)]
            fn negative_mask(self) -> u32 {
                self.is_negative_bitmask()
            }
            #[inline(always)]
            fn is_finite(self) -> bool {
                <$v>::is_finite(self)
            }
            #[inline(always)]
            fn scaled(self, s: $t) -> Self {
                self * s
            }
            #[inline(always)]
            fn dot(self, other: Self) -> $t {
                <$v>::dot(self, other)
            }
        }
    };
}

impl_bvh_vector!(Vec2, f32, 2);
impl_bvh_vector!(Vec3, f32, 3);
impl_bvh_vector!(Vec3A, f32, 3);
impl_bvh_vector!(Vec4, f32, 4);
impl_bvh_vector!(DVec2, f64, 2);
impl_bvh_vector!(DVec3, f64, 3);
impl_bvh_vector!(DVec4, f64, 4);
