//! An N-dimensional Axis-Aligned Bounding Box (AABB) represented by its minimum and maximum points.

use crate::ray::Ray;
use crate::vector::{BvhVector, Real};

/// An Axis-Aligned Bounding Box (AABB) represented by its minimum and maximum points.
///
/// `min[i] <= max[i]` holds on every axis for any box built through [`Aabb::new`],
/// [`Aabb::from_point`] or merges of such boxes. `min == max` is a valid point box.
#[derive(Default, Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct Aabb<V> {
    pub min: V,
    pub max: V,
}

impl<V: BvhVector> Aabb<V> {
    /// Creates a box spanning the two corners, in any order.
    #[inline(always)]
    pub fn new(p1: V, p2: V) -> Self {
        Self {
            min: p1.min_by_element(p2),
            max: p1.max_by_element(p2),
        }
    }

    /// Creates a new AABB with both min and max set to the given point.
    #[inline(always)]
    pub fn from_point(point: V) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Returns an empty AABB, the identity of [`Aabb::union`].
    #[inline(always)]
    pub fn empty() -> Self {
        Self {
            min: V::splat(V::Scalar::MAX),
            max: V::splat(-V::Scalar::MAX),
        }
    }

    /// Merges every box of the iterator. Returns [`Aabb::empty`] for an empty iterator.
    pub fn from_boxes<I: IntoIterator<Item = Self>>(boxes: I) -> Self {
        boxes
            .into_iter()
            .fold(Self::empty(), |acc, aabb| acc.union(&aabb))
    }

    /// Extends the AABB to include the given point.
    #[inline(always)]
    pub fn extend(&mut self, point: V) -> &mut Self {
        self.min = self.min.min_by_element(point);
        self.max = self.max.max_by_element(point);
        self
    }

    /// Grows this AABB to contain `other`.
    #[inline(always)]
    pub fn merge(&mut self, other: &Self) -> &mut Self {
        *self = self.union(other);
        self
    }

    /// Returns the union of this AABB and another AABB.
    #[inline(always)]
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Aabb {
            min: self.min.min_by_element(other.min),
            max: self.max.max_by_element(other.max),
        }
    }

    /// Returns the diagonal vector of the AABB.
    #[inline(always)]
    pub fn diagonal(&self) -> V {
        self.max - self.min
    }

    /// Returns the center point of the AABB.
    #[inline(always)]
    pub fn center(&self) -> V {
        (self.max + self.min).scaled(V::Scalar::from_f64(0.5))
    }

    /// Returns the center coordinate of the AABB along a specific axis.
    #[inline(always)]
    pub fn center_axis(&self, axis: usize) -> V::Scalar {
        (self.max.component(axis) + self.min.component(axis)) * V::Scalar::from_f64(0.5)
    }

    /// Axis of the largest extent. Ties resolve to the lowest axis.
    #[inline(always)]
    pub fn maximum_extent(&self) -> usize {
        let d = self.diagonal();
        let mut axis = 0;
        for i in 1..V::DIM {
            if d.component(i) > d.component(axis) {
                axis = i;
            }
        }
        axis
    }

    /// Returns the surface area of the AABB: the summed measure of its `2 * N` facets.
    ///
    /// In 2D this is the perimeter, in 3D the usual surface area.
    #[inline(always)]
    pub fn surface_area(&self) -> V::Scalar {
        let d = self.diagonal();
        let mut sum = V::Scalar::ZERO;
        for i in 0..V::DIM {
            let mut facet = V::Scalar::ONE;
            for j in (0..V::DIM).filter(|&j| j != i) {
                facet = facet * d.component(j);
            }
            sum += facet;
        }
        sum + sum
    }

    #[inline(always)]
    pub fn volume(&self) -> V::Scalar {
        let d = self.diagonal();
        (0..V::DIM).fold(V::Scalar::ONE, |acc, i| acc * d.component(i))
    }

    #[inline(always)]
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    #[inline(always)]
    pub fn contains_point(&self, point: V) -> bool {
        (0..V::DIM).all(|i| {
            let c = point.component(i);
            c >= self.min.component(i) && c <= self.max.component(i)
        })
    }

    /// Checks if `other` lies entirely inside this AABB.
    #[inline(always)]
    pub fn contains(&self, other: &Self) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// Slab interval of the ray against this box, before clamping to `[0, max_distance]`.
    ///
    /// The far distance is widened by `1 + 2 * gamma(3)` so rounding never loses a hit.
    #[inline(always)]
    fn slab(&self, ray: &Ray<V>) -> (V::Scalar, V::Scalar) {
        let t1 = (self.min - ray.origin) * ray.inv_direction;
        let t2 = (self.max - ray.origin) * ray.inv_direction;

        let near = t1.min_by_element(t2).max_element();
        let far = t1.max_by_element(t2).min_element();
        let widen = V::Scalar::ONE + V::Scalar::rounding_gamma(3) + V::Scalar::rounding_gamma(3);
        (near, far * widen)
    }

    /// Distance to the nearest crossing of the box boundary: the entry point when the ray
    /// starts outside, the exit point when it starts inside.
    #[inline(always)]
    pub fn intersect(&self, ray: &Ray<V>, max_distance: V::Scalar) -> Option<V::Scalar> {
        let (near, far) = self.slab(ray);
        if far < near || far <= V::Scalar::ZERO {
            return None;
        }
        let t = if near > V::Scalar::ZERO { near } else { far };
        (t < max_distance).then_some(t)
    }

    /// Distance to the point where the ray leaves the box.
    #[inline(always)]
    pub fn intersect_farthest(&self, ray: &Ray<V>, max_distance: V::Scalar) -> Option<V::Scalar> {
        let (near, far) = self.slab(ray);
        if far < near || far <= V::Scalar::ZERO {
            return None;
        }
        (far < max_distance).then_some(far)
    }

    /// Distance to the solid box: `0` when the ray starts inside, the entry distance otherwise.
    #[inline(always)]
    pub fn intersect_volume(&self, ray: &Ray<V>, max_distance: V::Scalar) -> Option<V::Scalar> {
        let (near, far) = self.slab(ray);
        let near = near.max(V::Scalar::ZERO);
        let far = far.min(max_distance);
        (near <= far && near < max_distance).then_some(near)
    }

    /// Slab test against precomputed ray data, bounded by `max_distance`.
    ///
    /// `negative_mask` has bit `i` set when the ray direction is negative on axis `i`, which
    /// selects the near and far plane per axis without min/max.
    #[inline(always)]
    pub fn intersect_r(
        &self,
        origin: V,
        inv_direction: V,
        negative_mask: u32,
        max_distance: V::Scalar,
    ) -> bool {
        let widen = V::Scalar::ONE + V::Scalar::rounding_gamma(3) + V::Scalar::rounding_gamma(3);
        let mut near = V::Scalar::ZERO;
        let mut far = max_distance;
        for i in 0..V::DIM {
            let negative = (negative_mask >> i) & 1 != 0;
            let (near_plane, far_plane) = if negative {
                (self.max.component(i), self.min.component(i))
            } else {
                (self.min.component(i), self.max.component(i))
            };
            let o = origin.component(i);
            let r = inv_direction.component(i);
            let t_near = (near_plane - o) * r;
            let t_far = (far_plane - o) * r * widen;
            // Written so that a NaN slab leaves the interval unchanged.
            if t_near > near {
                near = t_near;
            }
            if t_far < far {
                far = t_far;
            }
            if near > far {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{dvec2, vec3a, DVec2, Vec3A, Vec4};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use crate::test_util::random_direction;

    fn random_box<V: BvhVector, R: Rng>(rng: &mut R) -> Aabb<V> {
        let mut p1 = V::default();
        let mut p2 = V::default();
        for i in 0..V::DIM {
            loop {
                let a: f64 = rng.random_range(-5.0..5.0);
                let b: f64 = rng.random_range(-5.0..5.0);
                if (a - b).abs() >= 0.5 {
                    p1.set_component(i, V::Scalar::from_f64(a));
                    p2.set_component(i, V::Scalar::from_f64(b));
                    break;
                }
            }
        }
        Aabb::new(p1, p2)
    }

    fn random_inner_point<V: BvhVector, R: Rng>(aabb: &Aabb<V>, rng: &mut R) -> V {
        let mut p = V::default();
        for i in 0..V::DIM {
            let (lo, hi) = (aabb.min.component(i).to_f64(), aabb.max.component(i).to_f64());
            let margin = (hi - lo) * 0.01;
            p.set_component(
                i,
                V::Scalar::from_f64(rng.random_range(lo + margin..hi - margin)),
            );
        }
        p
    }

    /// For every inner point three rays are cast: one from the point, one moved back past
    /// the box and one moved forward past the box. Exactly the first two must hit.
    fn check_intersection_counts<V: BvhVector>(seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..10 {
            let aabb = random_box::<V, _>(&mut rng);
            let move_distance = aabb.diagonal().length();
            for _ in 0..500 {
                let point = random_inner_point(&aabb, &mut rng);
                let ray = Ray::new(point, random_direction::<V, _>(&mut rng));
                let rays = [ray, ray.moved(-move_distance), ray.moved(move_distance)];

                let inf = V::Scalar::INFINITY;
                let hits = rays.iter().filter(|r| aabb.intersect(r, inf).is_some()).count();
                assert_eq!(hits, 2);
                let hits = rays
                    .iter()
                    .filter(|r| aabb.intersect_volume(r, inf).is_some())
                    .count();
                assert_eq!(hits, 2);
                let hits = rays
                    .iter()
                    .filter(|r| {
                        aabb.intersect_r(r.origin, r.inv_direction, r.negative_mask(), inf)
                    })
                    .count();
                assert_eq!(hits, 2);

                assert_eq!(aabb.intersect_volume(&ray, inf), Some(V::Scalar::ZERO));
                let exit = aabb.intersect(&ray, inf).unwrap();
                let farthest = aabb.intersect_farthest(&ray, inf).unwrap();
                assert_eq!(exit, farthest);
            }
        }
    }

    #[test]
    fn test_intersection_counts() {
        check_intersection_counts::<DVec2>(1);
        check_intersection_counts::<Vec3A>(2);
        check_intersection_counts::<Vec4>(3);
    }

    #[test]
    fn test_entry_and_exit_distances() {
        let aabb = Aabb::new(dvec2(1.0, -1.0), dvec2(3.0, 1.0));
        let ray = Ray::new(dvec2(0.0, 0.0), dvec2(1.0, 0.0));
        assert_eq!(aabb.intersect(&ray, f64::INFINITY), Some(1.0));
        assert_eq!(aabb.intersect_volume(&ray, f64::INFINITY), Some(1.0));
        let far = aabb.intersect_farthest(&ray, f64::INFINITY).unwrap();
        assert!((far - 3.0).abs() < 1e-12);

        // Bounded by max distance.
        assert_eq!(aabb.intersect(&ray, 0.5), None);
        assert_eq!(aabb.intersect_volume(&ray, 0.5), None);
        assert!(!aabb.intersect_r(ray.origin, ray.inv_direction, ray.negative_mask(), 0.5));
        assert!(aabb.intersect_r(ray.origin, ray.inv_direction, ray.negative_mask(), 1.5));

        // Pointing away.
        let ray = Ray::new(dvec2(0.0, 0.0), dvec2(-1.0, 0.0));
        assert_eq!(aabb.intersect(&ray, f64::INFINITY), None);
        assert!(!aabb.intersect_r(
            ray.origin,
            ray.inv_direction,
            ray.negative_mask(),
            f64::INFINITY
        ));
    }

    #[test]
    fn test_merge_properties() {
        let a = Aabb::new(vec3a(0.0, 0.0, 0.0), vec3a(1.0, 2.0, 3.0));
        let b = Aabb::new(vec3a(-1.0, 1.0, 5.0), vec3a(0.5, 0.5, 4.0));
        assert_eq!(a.union(&b), b.union(&a));
        assert_eq!(a.union(&a), a);
        assert_eq!(a.union(&Aabb::empty()), a);
        assert_eq!(Aabb::from_boxes([a, b]), a.union(&b));
        assert!(a.union(&b).contains(&a));
        assert!(a.union(&b).contains(&b));
        let mut c = a;
        c.merge(&b);
        assert_eq!(c, a.union(&b));
        assert_eq!(b.min, vec3a(-1.0, 0.5, 4.0));
    }

    #[test]
    fn test_measures() {
        let square = Aabb::new(dvec2(0.0, 0.0), dvec2(2.0, 1.0));
        assert_eq!(square.surface_area(), 6.0);
        assert_eq!(square.volume(), 2.0);
        assert_eq!(square.maximum_extent(), 0);

        let cube = Aabb::new(Vec3A::ZERO, vec3a(1.0, 2.0, 3.0));
        assert_eq!(cube.surface_area(), 22.0);
        assert_eq!(cube.volume(), 6.0);
        assert_eq!(cube.maximum_extent(), 2);
        assert_eq!(cube.center(), vec3a(0.5, 1.0, 1.5));
        assert_eq!(cube.center_axis(1), 1.0);

        let tesseract = Aabb::new(Vec4::ZERO, Vec4::ONE);
        assert_eq!(tesseract.surface_area(), 8.0);

        let point = Aabb::from_point(vec3a(1.0, 1.0, 1.0));
        assert_eq!(point.surface_area(), 0.0);
        assert_eq!(point.maximum_extent(), 0);
    }
}
