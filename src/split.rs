//! Surface area heuristic split of a set of objects.
//!
//! Matt Pharr, Wenzel Jakob, Greg Humphreys.
//! Physically Based Rendering. From theory to implementation. Third edition.
//! 4.3.2 The surface area heuristic

use std::marker::PhantomData;

use crate::{
    aabb::Aabb,
    error::{BvhError, Result},
    object::BvhObject,
    vector::{BvhVector, Real},
};

pub const BUCKET_COUNT: usize = 32;

/// Tolerance of the forward + backward cost cross-check.
const COST_RELATIVE_ERROR: f64 = 1e-5;

/// Bounds of the object centers along the axis of their largest extent.
///
/// Kept in `f64` so that a finite extent wider than the scalar range still buckets correctly.
struct CenterBounds<V: BvhVector> {
    axis: usize,
    min: f64,
    length_r: f64,
    is_point: bool,
    _vector: PhantomData<V>,
}

impl<V: BvhVector> CenterBounds<V> {
    fn new(objects: &[BvhObject<V>]) -> Self {
        let mut aabb = Aabb::from_point(objects[0].center);
        for object in &objects[1..] {
            aabb.extend(object.center);
        }
        let axis = aabb.maximum_extent();
        let min = aabb.min.component(axis).to_f64();
        let length = aabb.max.component(axis).to_f64() - min;
        Self {
            axis,
            min,
            length_r: 1.0 / length,
            is_point: length <= 0.0,
            _vector: PhantomData,
        }
    }

    #[inline(always)]
    fn bucket(&self, object: &BvhObject<V>) -> usize {
        let t = (object.center.component(self.axis).to_f64() - self.min) * self.length_r;
        ((BUCKET_COUNT as f64 * t) as usize).min(BUCKET_COUNT - 1)
    }
}

#[derive(Clone, Copy, Debug)]
struct Bucket<V> {
    bounds: Aabb<V>,
    cost: f64,
}

impl<V: BvhVector> Bucket<V> {
    #[inline(always)]
    fn merged(&self, other: &Self) -> Self {
        Self {
            bounds: self.bounds.union(&other.bounds),
            cost: self.cost + other.cost,
        }
    }
}

/// Fills the buckets and returns them with the summed cost of all objects.
fn compute_buckets_and_cost<V: BvhVector>(
    objects: &[BvhObject<V>],
    center_bounds: &CenterBounds<V>,
) -> ([Option<Bucket<V>>; BUCKET_COUNT], f64) {
    let mut buckets: [Option<Bucket<V>>; BUCKET_COUNT] = [None; BUCKET_COUNT];
    let mut cost = 0.0;
    for object in objects {
        cost += object.intersection_cost;
        match &mut buckets[center_bounds.bucket(object)] {
            Some(bucket) => {
                bucket.bounds.merge(&object.bounds);
                bucket.cost += object.intersection_cost;
            }
            empty => {
                *empty = Some(Bucket {
                    bounds: object.bounds,
                    cost: object.intersection_cost,
                });
            }
        }
    }
    debug_assert!(buckets[0].is_some());
    debug_assert!(buckets[BUCKET_COUNT - 1].is_some());
    (buckets, cost)
}

/// `forward[i]` accumulates buckets `0..=i`.
fn incremental_bucket_sum_forward<V: BvhVector>(
    buckets: &[Option<Bucket<V>>; BUCKET_COUNT],
) -> [Bucket<V>; BUCKET_COUNT - 1] {
    let first = buckets[0].expect("the minimum center always lands in the first bucket");
    let mut res = [first; BUCKET_COUNT - 1];
    for i in 1..BUCKET_COUNT - 1 {
        res[i] = match &buckets[i] {
            Some(bucket) => res[i - 1].merged(bucket),
            None => res[i - 1],
        };
    }
    res
}

/// `backward[i]` accumulates buckets `i + 1..BUCKET_COUNT`.
fn incremental_bucket_sum_backward<V: BvhVector>(
    buckets: &[Option<Bucket<V>>; BUCKET_COUNT],
) -> [Bucket<V>; BUCKET_COUNT - 1] {
    let last = buckets[BUCKET_COUNT - 1].expect("the maximum center always lands in the last bucket");
    let mut res = [last; BUCKET_COUNT - 1];
    for i in (1..BUCKET_COUNT - 1).rev() {
        res[i - 1] = match &buckets[i] {
            Some(bucket) => res[i].merged(bucket),
            None => res[i],
        };
    }
    res
}

fn costs_match<V>(cost: f64, forward: &[Bucket<V>], backward: &[Bucket<V>]) -> bool {
    forward.iter().zip(backward).all(|(f, b)| {
        let relative_error = (1.0 - (f.cost + b.cost) / cost).abs();
        relative_error < COST_RELATIVE_ERROR
    })
}

/// Extents of `bounds` in `f64`, so that large boxes never overflow.
#[inline(always)]
fn extents<V: BvhVector>(bounds: &Aabb<V>) -> impl Iterator<Item = f64> + '_ {
    (0..V::DIM).map(|i| bounds.max.component(i).to_f64() - bounds.min.component(i).to_f64())
}

/// N-dimensional surface area, accumulated in `f64`.
fn surface_area_f64<V: BvhVector>(bounds: &Aabb<V>) -> f64 {
    let facet = |i: usize| -> f64 {
        extents(bounds)
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(_, e)| e)
            .product()
    };
    2.0 * (0..V::DIM).map(facet).sum::<f64>()
}

/// Area measure used by the heuristic.
///
/// Boxes that are flat in some dimension have no surface; then every box of the split is
/// measured by the sum of its extents instead, which keeps the ratios meaningful.
#[inline(always)]
fn measure<V: BvhVector>(bounds: &Aabb<V>, flat: bool) -> f64 {
    if flat {
        extents(bounds).sum()
    } else {
        surface_area_f64(bounds)
    }
}

/// Returns the minimum estimated cost and the boundary index it was found at, or `None` when
/// no candidate has a finite cost.
fn minimum_surface_area_heuristic_split<V: BvhVector>(
    bounds: &Aabb<V>,
    interior_node_traversal_cost: f64,
    forward: &[Bucket<V>; BUCKET_COUNT - 1],
    backward: &[Bucket<V>; BUCKET_COUNT - 1],
) -> Option<(f64, usize)> {
    let surface = surface_area_f64(bounds);
    let flat = !(surface > 0.0 && surface.is_finite());
    let surface_r = 1.0 / measure(bounds, flat);
    if !(surface_r.is_finite() && surface_r > 0.0) {
        return None;
    }

    let mut split_cost = f64::INFINITY;
    let mut index = None;
    for (i, (f, b)) in forward.iter().zip(backward).enumerate() {
        let f = f.cost * measure(&f.bounds, flat);
        let b = b.cost * measure(&b.bounds, flat);
        let cost = interior_node_traversal_cost + (f + b) * surface_r;
        if cost < split_cost {
            split_cost = cost;
            index = Some(i);
        }
    }
    index.map(|i| (split_cost, i))
}

/// Two halves of a split: objects whose center bucket is at most the chosen boundary go to
/// the `min` side.
#[derive(Debug)]
pub struct BvhSplit<'a, V> {
    pub objects_min: &'a mut [BvhObject<V>],
    pub objects_max: &'a mut [BvhObject<V>],
    pub bounds_min: Aabb<V>,
    pub bounds_max: Aabb<V>,
    pub axis: usize,
}

/// Decides whether `objects` should be split and partitions them in place if so.
///
/// `bounds` must be the merged bounding box of `objects`. Returns `Ok(None)` when a leaf
/// is the better choice: a single object, all centers at one point, or no split cheaper
/// than intersecting every object.
pub fn split<'a, V: BvhVector>(
    objects: &'a mut [BvhObject<V>],
    bounds: &Aabb<V>,
    interior_node_traversal_cost: f64,
) -> Result<Option<BvhSplit<'a, V>>> {
    if objects.is_empty() {
        return Err(BvhError::NoObjects);
    }

    if objects.len() == 1 {
        return Ok(None);
    }

    let center_bounds = CenterBounds::new(objects);
    if center_bounds.is_point {
        return Ok(None);
    }

    let (buckets, cost) = compute_buckets_and_cost(objects, &center_bounds);
    if !(cost > 0.0) {
        // Free objects: no split can beat a leaf.
        return Ok(None);
    }
    let forward = incremental_bucket_sum_forward(&buckets);
    let backward = incremental_bucket_sum_backward(&buckets);

    assert!(
        costs_match(cost, &forward, &backward),
        "SAH bucket costs do not add up to the total cost {cost}"
    );

    let Some((split_cost, split_index)) = minimum_surface_area_heuristic_split(
        bounds,
        interior_node_traversal_cost,
        &forward,
        &backward,
    ) else {
        return Ok(None);
    };
    if split_cost >= cost {
        return Ok(None);
    }

    let (objects_min, objects_max) =
        partition::partition(objects, |object| center_bounds.bucket(object) <= split_index);
    assert!(!objects_min.is_empty() && !objects_max.is_empty());

    Ok(Some(BvhSplit {
        objects_min,
        objects_max,
        bounds_min: forward[split_index].bounds,
        bounds_max: backward[split_index].bounds,
        axis: center_bounds.axis,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{dvec2, vec3a, DVec2, Vec3A, Vec4};

    fn unit_box_objects(centers: &[Vec3A]) -> Vec<BvhObject<Vec3A>> {
        centers
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                BvhObject::new(
                    Aabb::new(c - Vec3A::splat(0.5), c + Vec3A::splat(0.5)),
                    1.0,
                    i as u32,
                )
            })
            .collect()
    }

    fn bounds_of<V: BvhVector>(objects: &[BvhObject<V>]) -> Aabb<V> {
        Aabb::from_boxes(objects.iter().map(|o| o.bounds))
    }

    #[test]
    fn test_empty_is_an_error() {
        let mut objects: Vec<BvhObject<Vec3A>> = Vec::new();
        assert_eq!(
            split(&mut objects, &Aabb::empty(), 1.0).unwrap_err(),
            BvhError::NoObjects
        );
    }

    #[test]
    fn test_single_object_is_a_leaf() {
        let mut objects = unit_box_objects(&[Vec3A::ZERO]);
        let bounds = bounds_of(&objects);
        assert!(split(&mut objects, &bounds, 1.0).unwrap().is_none());
    }

    #[test]
    fn test_coincident_centers_are_a_leaf() {
        let mut objects: Vec<BvhObject<Vec3A>> = (1..20)
            .map(|i| {
                let h = Vec3A::splat(i as f32);
                BvhObject::new(Aabb::new(-h, h), 1.0, i)
            })
            .collect();
        let bounds = bounds_of(&objects);
        assert!(split(&mut objects, &bounds, 1.0).unwrap().is_none());
    }

    #[test]
    fn test_three_boxes_split_on_x() {
        let mut objects =
            unit_box_objects(&[vec3a(4.0, 0.0, 0.0), vec3a(0.0, 0.0, 0.0), vec3a(2.0, 0.0, 0.0)]);
        let bounds = bounds_of(&objects);
        let split = split(&mut objects, &bounds, 1.0).unwrap().unwrap();
        assert_eq!(split.axis, 0);
        assert_eq!(split.objects_min.len() + split.objects_max.len(), 3);
        assert_eq!(split.bounds_min, bounds_of(split.objects_min));
        assert_eq!(split.bounds_max, bounds_of(split.objects_max));
        let max_min = split
            .objects_min
            .iter()
            .map(|o| o.center.x)
            .fold(f32::MIN, f32::max);
        let min_max = split
            .objects_max
            .iter()
            .map(|o| o.center.x)
            .fold(f32::MAX, f32::min);
        assert!(max_min < min_max);
    }

    #[test]
    fn test_expensive_traversal_prefers_leaf() {
        let mut objects =
            unit_box_objects(&[vec3a(0.0, 0.0, 0.0), vec3a(2.0, 0.0, 0.0), vec3a(4.0, 0.0, 0.0)]);
        let bounds = bounds_of(&objects);
        assert!(split(&mut objects, &bounds, 3.0).unwrap().is_none());
    }

    #[test]
    fn test_zero_cost_objects_are_a_leaf() {
        let mut objects: Vec<BvhObject<DVec2>> = (0..10)
            .map(|i| BvhObject::new(Aabb::from_point(dvec2(i as f64, 0.0)), 0.0, i))
            .collect();
        let bounds = bounds_of(&objects);
        assert!(split(&mut objects, &bounds, 0.0).unwrap().is_none());
    }

    #[test]
    fn test_collinear_points_still_split() {
        // Point objects on a line: every box has zero surface.
        let mut objects: Vec<BvhObject<Vec3A>> = (0..64)
            .map(|i| BvhObject::new(Aabb::from_point(vec3a(i as f32, 0.0, 0.0)), 1.0, i))
            .collect();
        let bounds = bounds_of(&objects);
        let split = split(&mut objects, &bounds, 1.0).unwrap().unwrap();
        assert_eq!(split.axis, 0);
        assert!(!split.objects_min.is_empty() && !split.objects_max.is_empty());
    }

    #[test]
    fn test_partition_respects_buckets() {
        let mut objects: Vec<BvhObject<Vec3A>> = (0..1000)
            .map(|i| {
                let x = ((i * 7919) % 1000) as f32 * 0.1;
                let y = (i % 3) as f32;
                BvhObject::new(
                    Aabb::new(vec3a(x, y, 0.0), vec3a(x + 0.05, y + 0.05, 0.05)),
                    1.0,
                    i,
                )
            })
            .collect();
        let bounds = bounds_of(&objects);
        let split = split(&mut objects, &bounds, 1.0).unwrap().unwrap();
        assert_eq!(split.axis, 0);
        assert_eq!(split.objects_min.len() + split.objects_max.len(), 1000);
        assert!(bounds.contains(&split.bounds_min));
        assert!(bounds.contains(&split.bounds_max));
        for object in split.objects_min.iter() {
            assert!(split.bounds_min.contains(&object.bounds));
        }
        for object in split.objects_max.iter() {
            assert!(split.bounds_max.contains(&object.bounds));
        }
    }

    /// Boxes `spacing` apart along the diagonal, each `spacing / 10` wide.
    fn spread_objects<V: BvhVector>(count: u32, spacing: f64) -> Vec<BvhObject<V>> {
        (0..count)
            .map(|i| {
                let min = V::splat(V::Scalar::from_f64(i as f64 * spacing));
                let max = V::splat(V::Scalar::from_f64(i as f64 * spacing + spacing * 0.1));
                BvhObject::new(Aabb::new(min, max), V::Scalar::ONE, i)
            })
            .collect()
    }

    #[test]
    fn test_huge_finite_boxes_still_split() {
        // Surface areas of these boxes overflow `f32`.
        let mut objects = spread_objects::<Vec4>(16, 1e12);
        let bounds = bounds_of(&objects);
        assert!(bounds.surface_area().is_infinite());
        let split = split(&mut objects, &bounds, 1.0).unwrap().unwrap();
        assert_eq!(split.objects_min.len() + split.objects_max.len(), 16);

        let mut objects = spread_objects::<Vec3A>(16, 1e18);
        let bounds = bounds_of(&objects);
        assert!(bounds.surface_area().is_infinite());
        let split = super::split(&mut objects, &bounds, 1.0).unwrap().unwrap();
        assert_eq!(split.axis, 0);
        assert!(!split.objects_min.is_empty() && !split.objects_max.is_empty());
    }
}
