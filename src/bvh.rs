use std::{
    fmt,
    ops::{ControlFlow, Range},
    time::{Duration, Instant},
};

use arrayvec::ArrayVec;

use crate::{
    aabb::Aabb,
    build::build,
    config::BvhConfig,
    error::{BvhError, Result},
    flatten::flatten,
    object::{bvh_objects, BoundedObject, BvhObject, MAX_OBJECT_COUNT},
    progress::BuildProgress,
    ray::Ray,
    vector::{BvhVector, Real},
    PrettyDuration,
};

/// Capacity of the traversal stack. Builds never produce a tree deeper than this.
pub const TRAVERSAL_STACK_SIZE: usize = 64;

#[derive(Default, Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct BvhNode<V> {
    pub aabb: Aabb<V>,
    /// Leaf: first entry in the object indices. Interior: index of the second child, the first
    /// child is always the next node.
    pub offset: u32,
    /// Zero for interior nodes.
    pub object_count: u32,
    /// Split axis of an interior node.
    pub axis: u32,
}

impl<V> BvhNode<V> {
    #[inline(always)]
    pub fn is_leaf(&self) -> bool {
        self.object_count != 0
    }

    /// Range of a leaf's entries in [`Bvh::object_indices`].
    #[inline(always)]
    pub fn objects(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.object_count as usize
    }

    #[inline(always)]
    pub fn second_child(&self) -> u32 {
        self.offset
    }
}

/// Result of a leaf callback during [`Bvh::intersect`].
///
/// `bool` stops at the first reported hit. `Option<(distance, payload)>` keeps the nearest hit
/// and shrinks the search distance to it.
pub trait TraversalHit<S>: Default {
    /// Folds one leaf's result into `best`. `Break` ends the traversal.
    fn update(self, best: &mut Self, distance: &mut S) -> ControlFlow<()>;
}

impl<S> TraversalHit<S> for bool {
    #[inline(always)]
    fn update(self, best: &mut Self, _distance: &mut S) -> ControlFlow<()> {
        if self {
            *best = true;
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

impl<S: Real, P> TraversalHit<S> for Option<(S, P)> {
    #[inline(always)]
    fn update(self, best: &mut Self, distance: &mut S) -> ControlFlow<()> {
        if let Some((d, payload)) = self {
            if d < *distance {
                *distance = d;
                *best = Some((d, payload));
            }
        }
        ControlFlow::Continue(())
    }
}

/// Summary of a finished build.
#[derive(Default, Clone, Copy, Debug, PartialEq)]
pub struct BuildStats {
    pub node_count: usize,
    pub leaf_count: usize,
    /// Depth of the deepest leaf, the root being at depth 0.
    pub max_depth: u32,
    pub max_leaf_size: u32,
    pub duration: Duration,
}

impl BuildStats {
    fn from_nodes<V>(nodes: &[BvhNode<V>], duration: Duration) -> Self {
        let mut stats = BuildStats {
            node_count: nodes.len(),
            duration,
            ..Default::default()
        };
        let mut stack = vec![(0u32, 0u32)];
        while let Some((index, depth)) = stack.pop() {
            let node = &nodes[index as usize];
            if node.is_leaf() {
                stats.leaf_count += 1;
                stats.max_depth = stats.max_depth.max(depth);
                stats.max_leaf_size = stats.max_leaf_size.max(node.object_count);
            } else {
                stack.push((index + 1, depth + 1));
                stack.push((node.second_child(), depth + 1));
            }
        }
        stats
    }
}

impl fmt::Display for BuildStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nodes, {} leaves, depth {}, largest leaf {} in {}",
            self.node_count,
            self.leaf_count,
            self.max_depth,
            self.max_leaf_size,
            PrettyDuration(self.duration)
        )
    }
}

/// Immutable bounding volume hierarchy, laid out depth first.
///
/// Queries take `&self` and keep their state on the stack, so one `Bvh` can serve any number
/// of threads.
#[derive(Clone, Debug)]
pub struct Bvh<V> {
    nodes: Vec<BvhNode<V>>,
    object_indices: Vec<u32>,
    stats: BuildStats,
}

impl<V: BvhVector> Bvh<V> {
    /// Builds a BVH over `objects`. Leaves reference objects by [`BvhObject::index`].
    pub fn new(
        objects: Vec<BvhObject<V>>,
        config: &BvhConfig,
        progress: &dyn BuildProgress,
    ) -> Result<Self> {
        if objects.is_empty() {
            return Err(BvhError::NoObjects);
        }
        if objects.len() > MAX_OBJECT_COUNT {
            return Err(BvhError::TooManyObjects {
                count: objects.len(),
                max: MAX_OBJECT_COUNT,
            });
        }
        for object in &objects {
            object.validate()?;
        }
        let bounds = Aabb::from_boxes(objects.iter().map(|o| o.bounds));
        Self::from_validated(objects, bounds, config, progress)
    }

    /// Builds a BVH over `objects`, where leaves reference objects by their position in the
    /// slice.
    pub fn from_objects<O>(objects: &[O], config: &BvhConfig) -> Result<Self>
    where
        O: BoundedObject<V> + Sync,
    {
        let (objects, bounds) = bvh_objects(objects, config.scheduler)?;
        Self::from_validated(objects, bounds, config, &())
    }

    /// `objects` must be non-empty and valid, and `bounds` their merged bounding box.
    fn from_validated(
        mut objects: Vec<BvhObject<V>>,
        bounds: Aabb<V>,
        config: &BvhConfig,
        progress: &dyn BuildProgress,
    ) -> Result<Self> {
        let start = Instant::now();
        let build_result = build(&mut objects, bounds, config, progress)?;
        let (nodes, object_indices) = flatten(&build_result);
        let stats = BuildStats::from_nodes(&nodes, start.elapsed());

        log::debug!("built BVH over {} objects: {stats}", objects.len());

        Ok(Self {
            nodes,
            object_indices,
            stats,
        })
    }

    #[inline(always)]
    pub fn bounding_box(&self) -> &Aabb<V> {
        &self.nodes[0].aabb
    }

    #[inline(always)]
    pub fn nodes(&self) -> &[BvhNode<V>] {
        &self.nodes
    }

    #[inline(always)]
    pub fn object_indices(&self) -> &[u32] {
        &self.object_indices
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    pub fn depth(&self) -> u32 {
        self.stats.max_depth
    }

    /// Distance at which the ray reaches the root box as a solid, `0` if it starts inside.
    ///
    /// A `None` means [`Bvh::intersect`] can't find anything either.
    #[inline(always)]
    pub fn intersect_root(&self, ray: &Ray<V>, max_distance: V::Scalar) -> Option<V::Scalar> {
        self.bounding_box().intersect_volume(ray, max_distance)
    }

    /// Walks the nodes whose box the ray reaches within the current distance, near child first.
    ///
    /// `object_intersect` is called with the original indices of one leaf and the current
    /// distance bound. Its return type selects the mode, see [`TraversalHit`].
    ///
    /// # Panics
    ///
    /// When the tree is deeper than [`TRAVERSAL_STACK_SIZE`], which a build never produces.
    #[inline]
    pub fn intersect<R, F>(&self, ray: &Ray<V>, max_distance: V::Scalar, mut object_intersect: F) -> R
    where
        R: TraversalHit<V::Scalar>,
        F: FnMut(&[u32], V::Scalar) -> R,
    {
        let mut result = R::default();
        let mut distance = max_distance;
        let negative_mask = ray.negative_mask();

        let mut stack: ArrayVec<u32, TRAVERSAL_STACK_SIZE> = ArrayVec::new();
        let mut index = 0u32;
        loop {
            let node = &self.nodes[index as usize];
            if node
                .aabb
                .intersect_r(ray.origin, ray.inv_direction, negative_mask, distance)
            {
                if !node.is_leaf() {
                    let (near, far) = if (negative_mask >> node.axis) & 1 != 0 {
                        (node.second_child(), index + 1)
                    } else {
                        (index + 1, node.second_child())
                    };
                    if stack.try_push(far).is_err() {
                        panic!("BVH is deeper than the {TRAVERSAL_STACK_SIZE} entry traversal stack");
                    }
                    index = near;
                    continue;
                }
                let hit = object_intersect(&self.object_indices[node.objects()], distance);
                if hit.update(&mut result, &mut distance).is_break() {
                    return result;
                }
            }
            match stack.pop() {
                Some(next) => index = next,
                None => return result,
            }
        }
    }

    /// Checks the layout, bounds and object ranges of every node.
    ///
    /// # Panics
    ///
    /// On the first violated property.
    pub fn assert_well_formed(&self) {
        let nodes = &self.nodes;
        assert!(!nodes.is_empty(), "BVH has no nodes");

        let mut next_object = 0usize;
        for (i, node) in nodes.iter().enumerate() {
            if node.is_leaf() {
                // Pre-order visits leaves in object order.
                assert_eq!(node.offset as usize, next_object, "leaf {i} objects out of order");
                next_object += node.object_count as usize;
                assert!(
                    next_object <= self.object_indices.len(),
                    "leaf {i} objects out of range"
                );
                continue;
            }

            let first = i + 1;
            let second = node.second_child() as usize;
            assert!(first < second, "node {i}: second child {second} before first");
            assert!(second < nodes.len(), "node {i}: second child {second} out of range");
            assert!((node.axis as usize) < V::DIM, "node {i}: axis {}", node.axis);

            let a = &nodes[first].aabb;
            let b = &nodes[second].aabb;
            assert!(
                node.aabb.contains(a) && node.aabb.contains(b),
                "node {i} does not contain its children"
            );
            assert_eq!(a.union(b), node.aabb, "node {i} is not the union of its children");
        }
        assert_eq!(
            next_object,
            self.object_indices.len(),
            "leaves do not cover all object indices"
        );

        let depth = BuildStats::from_nodes(nodes, Duration::ZERO).max_depth;
        assert!(
            depth as usize <= TRAVERSAL_STACK_SIZE,
            "BVH depth {depth} exceeds the traversal stack"
        );

        let mut indices: Vec<u32> = self.object_indices.clone();
        indices.sort_unstable();
        for pair in indices.windows(2) {
            assert_ne!(pair[0], pair[1], "object {} appears twice", pair[0]);
        }
    }
}
