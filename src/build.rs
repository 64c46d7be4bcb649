//! Parallel top-down SAH build.
//!
//! Every worker pulls tasks (an object range, its bounds and the node slot it fills) from a
//! shared [`TaskQueue`]. A split pushes two child tasks, a leaf copies the object indices to
//! the shared output. Node slots and object index ranges are handed out by two independent
//! atomic counters, so every slot is written by exactly one thread.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU32, AtomicUsize, Ordering},
        OnceLock,
    },
    thread,
};

use crate::{
    aabb::Aabb,
    config::BvhConfig,
    error::{BvhError, Result},
    object::BvhObject,
    par::TaskQueue,
    progress::BuildProgress,
    scope, scope_print_major,
    split::split,
    vector::BvhVector,
};

/// Progress is reported each time the node count crosses a multiple of this.
const PROGRESS_INTERVAL: usize = 1 << 12;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BuildNode<V> {
    Leaf {
        bounds: Aabb<V>,
        object_offset: u32,
        object_count: u32,
    },
    Interior {
        bounds: Aabb<V>,
        axis: u32,
        children: [u32; 2],
    },
}

impl<V: BvhVector> BuildNode<V> {
    #[inline(always)]
    pub fn bounds(&self) -> &Aabb<V> {
        match self {
            BuildNode::Leaf { bounds, .. } | BuildNode::Interior { bounds, .. } => bounds,
        }
    }
}

/// Output of [`build`]: nodes with the root at index 0, and the object indices that leaves
/// reference by range.
#[derive(Clone, Debug)]
pub struct BuildResult<V> {
    pub nodes: Vec<BuildNode<V>>,
    pub object_indices: Vec<u32>,
}

struct Task<'a, V> {
    objects: &'a mut [BvhObject<V>],
    bounds: Aabb<V>,
    node: u32,
    depth: u32,
}

/// State shared by all workers of one build.
struct Shared<'p, V> {
    /// Write-once arena sized for the worst case, so indices stay valid while it fills.
    nodes: Box<[OnceLock<BuildNode<V>>]>,
    node_count: AtomicUsize,
    object_indices: Box<[AtomicU32]>,
    object_index_count: AtomicUsize,
    interior_node_traversal_cost: f64,
    max_depth: u32,
    progress: &'p dyn BuildProgress,
}

impl<V: BvhVector> Shared<'_, V> {
    fn set_node(&self, index: u32, node: BuildNode<V>) {
        let result = self.nodes[index as usize].set(node);
        assert!(result.is_ok(), "BVH node {index} written twice");
    }

    fn allocate_children(&self) -> u32 {
        let first = self.node_count.fetch_add(2, Ordering::Relaxed);
        assert!(
            first + 2 <= self.nodes.len(),
            "BVH node count exceeds the {} node bound",
            self.nodes.len()
        );
        if first / PROGRESS_INTERVAL != (first + 2) / PROGRESS_INTERVAL {
            self.progress
                .set((first + 2) as f64 / self.nodes.len() as f64);
        }
        first as u32
    }

    fn make_leaf(&self, task: Task<'_, V>) {
        let count = task.objects.len();
        let offset = self.object_index_count.fetch_add(count, Ordering::Relaxed);
        assert!(
            offset + count <= self.object_indices.len(),
            "BVH object index count exceeds the object count"
        );
        for (slot, object) in self.object_indices[offset..offset + count]
            .iter()
            .zip(task.objects.iter())
        {
            slot.store(object.index, Ordering::Relaxed);
        }
        self.set_node(
            task.node,
            BuildNode::Leaf {
                bounds: task.bounds,
                object_offset: offset as u32,
                object_count: count as u32,
            },
        );
    }

    fn process<'a>(&self, task: Task<'a, V>, queue: &TaskQueue<Task<'a, V>>) -> Result<()> {
        scope!("bvh build task");

        if task.depth >= self.max_depth {
            self.make_leaf(task);
            return Ok(());
        }

        let decision = split(
            &mut *task.objects,
            &task.bounds,
            self.interior_node_traversal_cost,
        )?
        .map(|s| (s.objects_min.len(), s.bounds_min, s.bounds_max, s.axis));

        let Some((mid, bounds_min, bounds_max, axis)) = decision else {
            self.make_leaf(task);
            return Ok(());
        };

        let first = self.allocate_children();
        self.set_node(
            task.node,
            BuildNode::Interior {
                bounds: task.bounds,
                axis: axis as u32,
                children: [first, first + 1],
            },
        );

        // The split already partitioned the objects in place.
        let (objects_min, objects_max) = task.objects.split_at_mut(mid);
        queue.push(Task {
            objects: objects_min,
            bounds: bounds_min,
            node: first,
            depth: task.depth + 1,
        });
        queue.push(Task {
            objects: objects_max,
            bounds: bounds_max,
            node: first + 1,
            depth: task.depth + 1,
        });
        Ok(())
    }
}

fn worker_loop<'a, V: BvhVector>(queue: &TaskQueue<Task<'a, V>>, shared: &Shared<'_, V>) -> Result<()> {
    while let Some(task) = queue.pop() {
        if let Err(e) = shared.process(task, queue) {
            queue.stop();
            return Err(e);
        }
        queue.task_done();
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs one worker. A panic stops the other workers and becomes an error.
fn run_worker<'a, V: BvhVector>(queue: &TaskQueue<Task<'a, V>>, shared: &Shared<'_, V>) -> Result<()> {
    match panic::catch_unwind(AssertUnwindSafe(|| worker_loop(queue, shared))) {
        Ok(result) => result,
        Err(payload) => {
            queue.stop();
            Err(BvhError::WorkerPanicked(panic_message(payload.as_ref())))
        }
    }
}

/// Builds the node tree over `objects`, reordering them in place.
///
/// `bounds` must be the merged bounding box of `objects`. Nothing is returned unless every
/// worker finished cleanly.
pub fn build<V: BvhVector>(
    objects: &mut [BvhObject<V>],
    bounds: Aabb<V>,
    config: &BvhConfig,
    progress: &dyn BuildProgress,
) -> Result<BuildResult<V>> {
    scope_print_major!("bvh build");

    if objects.is_empty() {
        return Err(BvhError::NoObjects);
    }

    let object_count = objects.len();
    // Every leaf holds at least one object, so a full binary tree is the worst case.
    let max_node_count = 2 * object_count - 1;

    let shared = Shared {
        nodes: (0..max_node_count).map(|_| OnceLock::new()).collect(),
        node_count: AtomicUsize::new(1),
        object_indices: (0..object_count).map(|_| AtomicU32::new(0)).collect(),
        object_index_count: AtomicUsize::new(0),
        interior_node_traversal_cost: config.interior_node_traversal_cost,
        max_depth: config.max_depth(),
        progress,
    };

    let queue = TaskQueue::new();
    queue.push(Task {
        objects,
        bounds,
        node: 0,
        depth: 0,
    });

    let thread_count = config.thread_count();
    log::trace!("building BVH over {object_count} objects with {thread_count} workers");

    let results: Vec<Result<()>> = thread::scope(|s| {
        let handles: Vec<_> = (1..thread_count)
            .map(|_| s.spawn(|| run_worker(&queue, &shared)))
            .collect();
        // Run one worker on this thread.
        let mut results = vec![run_worker(&queue, &shared)];
        results.extend(handles.into_iter().map(|handle| {
            handle
                .join()
                .unwrap_or_else(|payload| Err(BvhError::WorkerPanicked(panic_message(payload.as_ref()))))
        }));
        results
    });

    if let Some(error) = results.into_iter().find_map(|r| r.err()) {
        return Err(error);
    }

    let node_count = shared.node_count.into_inner();
    let object_index_count = shared.object_index_count.into_inner();
    assert_eq!(
        object_index_count, object_count,
        "BVH leaves hold {object_index_count} object indices for {object_count} objects"
    );

    let nodes: Vec<BuildNode<V>> = shared
        .nodes
        .into_vec()
        .into_iter()
        .take(node_count)
        .map(|cell| cell.into_inner().expect("every allocated BVH node is written"))
        .collect();
    let object_indices = shared
        .object_indices
        .into_vec()
        .into_iter()
        .map(AtomicU32::into_inner)
        .collect();

    progress.set(1.0);

    Ok(BuildResult {
        nodes,
        object_indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{par::Scheduler, test_util::random_boxes};
    use glam::{vec2, Vec2, Vec3A};
    use rand::{rngs::StdRng, SeedableRng};

    fn objects_of<V: BvhVector>(boxes: &[Aabb<V>]) -> (Vec<BvhObject<V>>, Aabb<V>) {
        let objects: Vec<_> = boxes
            .iter()
            .enumerate()
            .map(|(i, b)| BvhObject::new(*b, <V::Scalar as crate::vector::Real>::ONE, i as u32))
            .collect();
        (objects, Aabb::from_boxes(boxes.iter().copied()))
    }

    #[test]
    fn test_build_conserves_objects() {
        let mut rng = StdRng::seed_from_u64(5);
        let boxes = random_boxes::<Vec3A, _>(&mut rng, 3000, 100.0, 2.0);
        for thread_count in [1, 2, 8] {
            let (mut objects, bounds) = objects_of(&boxes);
            let config = BvhConfig::default()
                .with_scheduler(Scheduler::Raw)
                .with_thread_count(thread_count);
            let result = build(&mut objects, bounds, &config, &()).unwrap();

            let mut seen = vec![false; boxes.len()];
            for &index in &result.object_indices {
                assert!(!seen[index as usize]);
                seen[index as usize] = true;
            }
            assert!(seen.iter().all(|s| *s));

            let leaf_objects: u32 = result
                .nodes
                .iter()
                .map(|n| match n {
                    BuildNode::Leaf { object_count, .. } => *object_count,
                    BuildNode::Interior { .. } => 0,
                })
                .sum();
            assert_eq!(leaf_objects as usize, boxes.len());
            assert!(result.nodes.len() > 1);
            assert_eq!(*result.nodes[0].bounds(), bounds);
        }
    }

    #[test]
    fn test_children_bounds_are_contained() {
        let mut rng = StdRng::seed_from_u64(11);
        let boxes = random_boxes::<Vec2, _>(&mut rng, 500, 10.0, 1.0);
        let (mut objects, bounds) = objects_of(&boxes);
        let result = build(&mut objects, bounds, &BvhConfig::default(), &()).unwrap();
        for node in &result.nodes {
            if let BuildNode::Interior { bounds, children, .. } = node {
                let a = result.nodes[children[0] as usize].bounds();
                let b = result.nodes[children[1] as usize].bounds();
                assert_eq!(a.union(b), *bounds);
            }
        }
    }

    #[test]
    fn test_empty_build_is_an_error() {
        let mut objects: Vec<BvhObject<Vec2>> = Vec::new();
        let result = build(&mut objects, Aabb::empty(), &BvhConfig::default(), &());
        assert_eq!(result.unwrap_err(), BvhError::NoObjects);
    }

    #[test]
    fn test_depth_limit_makes_leaves() {
        let boxes: Vec<Aabb<Vec2>> = (0..256)
            .map(|i| Aabb::new(vec2(i as f32, 0.0), vec2(i as f32 + 0.5, 0.5)))
            .collect();
        let (mut objects, bounds) = objects_of(&boxes);
        let config = BvhConfig::default().with_max_depth(0);
        let result = build(&mut objects, bounds, &config, &()).unwrap();
        assert_eq!(result.nodes.len(), 1);
        assert!(matches!(
            result.nodes[0],
            BuildNode::Leaf {
                object_count: 256,
                ..
            }
        ));
    }

    struct PanickingProgress;

    impl BuildProgress for PanickingProgress {
        fn set(&self, fraction: f64) {
            if fraction < 1.0 {
                panic!("progress sink failed");
            }
        }
    }

    #[test]
    fn test_worker_panic_stops_the_build() {
        let mut rng = StdRng::seed_from_u64(3);
        let boxes = random_boxes::<Vec3A, _>(&mut rng, 20_000, 100.0, 0.5);
        for thread_count in [1, 4] {
            let (mut objects, bounds) = objects_of(&boxes);
            let config = BvhConfig::default()
                .with_scheduler(Scheduler::Raw)
                .with_thread_count(thread_count);
            let result = build(&mut objects, bounds, &config, &PanickingProgress);
            assert_eq!(
                result.unwrap_err(),
                BvhError::WorkerPanicked("progress sink failed".to_string())
            );
        }
    }
}
