//! A ray in N-dimensional space.

use crate::vector::{BvhVector, Real};

/// Computes the inverse of `x` avoiding division by zero.
#[inline(always)]
pub fn safe_inverse<S: Real>(x: S) -> S {
    if x.abs() <= S::EPSILON {
        x.signum() / S::EPSILON
    } else {
        S::ONE / x
    }
}

/// A struct representing a ray in N-dimensional space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Ray<V> {
    /// The starting point of the ray.
    pub origin: V,
    /// The direction vector of the ray.
    pub direction: V,
    /// The inverse of the direction vector components.
    /// Used to avoid division in ray/aabb tests.
    pub inv_direction: V,
}

impl<V: BvhVector> Ray<V> {
    /// Creates a new `Ray` with the given origin and direction.
    #[inline(always)]
    pub fn new(origin: V, direction: V) -> Self {
        let mut inv_direction = direction;
        for i in 0..V::DIM {
            inv_direction.set_component(i, safe_inverse(direction.component(i)));
        }

        let ray = Ray {
            origin,
            direction,
            inv_direction,
        };

        debug_assert!(ray.inv_direction.is_finite());
        debug_assert!(ray.direction.is_finite());
        debug_assert!(origin.is_finite());

        ray
    }

    /// Point at distance `t` along the ray.
    #[inline(always)]
    pub fn point(&self, t: V::Scalar) -> V {
        self.origin + self.direction.scaled(t)
    }

    /// The same ray with its origin moved `distance` along the direction.
    #[inline(always)]
    #[must_use]
    pub fn moved(&self, distance: V::Scalar) -> Self {
        Self {
            origin: self.point(distance),
            ..*self
        }
    }

    /// Bit `i` is set when the direction is negative on axis `i`.
    #[inline(always)]
    pub fn negative_mask(&self) -> u32 {
        self.direction.negative_mask()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{vec2, vec3a};

    #[test]
    fn test_inverse_direction_is_finite() {
        let ray = Ray::new(vec3a(0.0, 0.0, 0.0), vec3a(0.0, -2.0, 0.5));
        assert!(ray.inv_direction.is_finite());
        assert_eq!(ray.inv_direction.y, -0.5);
        assert_eq!(ray.inv_direction.z, 2.0);
        assert!(ray.inv_direction.x > 1e6);
        assert_eq!(ray.negative_mask(), 0b010);
    }

    #[test]
    fn test_moved() {
        let ray = Ray::new(vec2(1.0, 1.0), vec2(1.0, 0.0));
        let moved = ray.moved(-2.0);
        assert_eq!(moved.origin, vec2(-1.0, 1.0));
        assert_eq!(moved.direction, ray.direction);
        assert_eq!(ray.point(0.5), vec2(1.5, 1.0));
    }
}
