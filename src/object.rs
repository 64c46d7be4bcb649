//! Objects as seen by the BVH builder: a box, a center, a cost and the caller's index.

use std::cell::RefCell;

use thread_local::ThreadLocal;

use crate::{
    aabb::Aabb,
    error::{BvhError, Result},
    par::Scheduler,
    scope, scope_print_major,
    vector::{BvhVector, Real},
};

/// Anything the BVH can be built over.
///
/// The BVH builder is only concerned with bounding boxes and costs: intersection of the
/// objects themselves happens in the closure passed to [`Bvh::intersect`](crate::bvh::Bvh::intersect).
pub trait BoundedObject<V: BvhVector> {
    fn bounding_box(&self) -> Aabb<V>;

    /// Relative cost of intersecting one ray with this object.
    ///
    /// Only the ratio to other objects and to
    /// [`BvhConfig::interior_node_traversal_cost`](crate::config::BvhConfig) matters.
    fn intersection_cost(&self) -> V::Scalar;

    /// Point used to bucket the object during splitting.
    #[inline(always)]
    fn center(&self) -> V {
        self.bounding_box().center()
    }
}

impl<V: BvhVector> BoundedObject<V> for Aabb<V> {
    #[inline(always)]
    fn bounding_box(&self) -> Aabb<V> {
        *self
    }

    #[inline(always)]
    fn intersection_cost(&self) -> V::Scalar {
        V::Scalar::ONE
    }
}

/// An input object prepared for the build.
///
/// Only `index` survives the build; the other fields drive partitioning.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BvhObject<V> {
    pub bounds: Aabb<V>,
    pub center: V,
    pub intersection_cost: f64,
    pub index: u32,
}

impl<V: BvhVector> BvhObject<V> {
    #[inline(always)]
    pub fn new(bounds: Aabb<V>, intersection_cost: V::Scalar, index: u32) -> Self {
        Self::with_center(bounds, bounds.center(), intersection_cost, index)
    }

    #[inline(always)]
    pub fn with_center(bounds: Aabb<V>, center: V, intersection_cost: V::Scalar, index: u32) -> Self {
        Self {
            bounds,
            center,
            intersection_cost: intersection_cost.to_f64(),
            index,
        }
    }

    #[inline(always)]
    pub fn from_object<O: BoundedObject<V> + ?Sized>(object: &O, index: u32) -> Self {
        Self::with_center(
            object.bounding_box(),
            object.center(),
            object.intersection_cost(),
            index,
        )
    }

    /// Rejects objects that would poison the SAH or the traversal.
    pub fn validate(&self) -> Result<()> {
        let index = self.index as usize;
        if !self.bounds.is_finite() || !self.center.is_finite() {
            return Err(BvhError::NonFiniteBounds { index });
        }
        let cost = self.intersection_cost;
        if !cost.is_finite() || cost < 0.0 {
            return Err(BvhError::InvalidIntersectionCost { index, cost });
        }
        Ok(())
    }
}

/// Largest object count whose indices fit the `u32` index arrays.
pub const MAX_OBJECT_COUNT: usize = u32::MAX as usize;

/// Wraps `objects` for the build, in parallel using `scheduler`.
///
/// Returns the wrapped objects with `index` set to the position in `objects`, and the merged
/// bounding box of all of them.
pub fn bvh_objects<V, O>(objects: &[O], scheduler: Scheduler) -> Result<(Vec<BvhObject<V>>, Aabb<V>)>
where
    V: BvhVector,
    O: BoundedObject<V> + Sync,
{
    scope_print_major!("bvh_objects");

    if objects.is_empty() {
        return Err(BvhError::NoObjects);
    }
    if objects.len() > MAX_OBJECT_COUNT {
        return Err(BvhError::TooManyObjects {
            count: objects.len(),
            max: MAX_OBJECT_COUNT,
        });
    }

    scheduler.init();

    let mut result = vec![BvhObject::<V>::default(); objects.len()];
    let local_aabbs: ThreadLocal<RefCell<Aabb<V>>> = ThreadLocal::new();
    let local_errors: ThreadLocal<RefCell<Option<BvhError>>> = ThreadLocal::new();

    let chunk_size = objects.len().div_ceil(scheduler.current_num_threads()).max(1);

    scheduler.par_chunks_mut(
        &mut result,
        &|start: usize, chunk: &mut [BvhObject<V>]| {
            scope!("bvh_objects chunk");
            let mut aabb = local_aabbs
                .get_or(|| RefCell::new(Aabb::empty()))
                .borrow_mut();
            for (i, output) in chunk.iter_mut().enumerate() {
                let index = start + i;
                *output = BvhObject::from_object(&objects[index], index as u32);
                if let Err(e) = output.validate() {
                    let mut error = local_errors.get_or_default().borrow_mut();
                    // Keep the lowest index so the reported error does not depend on scheduling.
                    let replace = match &*error {
                        Some(BvhError::NonFiniteBounds { index: j })
                        | Some(BvhError::InvalidIntersectionCost { index: j, .. }) => index < *j,
                        _ => true,
                    };
                    if replace {
                        *error = Some(e);
                    }
                    continue;
                }
                aabb.merge(&output.bounds);
            }
        },
        chunk_size,
    );

    let first_error = local_errors
        .into_iter()
        .filter_map(RefCell::into_inner)
        .min_by_key(|e| match e {
            BvhError::NonFiniteBounds { index } => *index,
            BvhError::InvalidIntersectionCost { index, .. } => *index,
            _ => usize::MAX,
        });
    if let Some(e) = first_error {
        return Err(e);
    }

    let total_aabb = Aabb::from_boxes(local_aabbs.into_iter().map(RefCell::into_inner));
    Ok((result, total_aabb))
}
