//! Build configuration.

use argh::FromArgs;

use crate::{bvh::TRAVERSAL_STACK_SIZE, par::Scheduler};

/// Default cost of visiting an interior node, relative to an object intersection cost of 1.
pub const DEFAULT_INTERIOR_NODE_TRAVERSAL_COST: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BvhConfig {
    /// Backend for the data-parallel loops. `Sequential` also builds on a single thread.
    pub scheduler: Scheduler,
    /// Build worker count. `None` uses the scheduler's thread count.
    pub thread_count: Option<usize>,
    /// SAH cost of one interior node visit.
    pub interior_node_traversal_cost: f64,
    /// Tasks at this depth become leaves. Clamped to [`TRAVERSAL_STACK_SIZE`].
    pub max_depth: u32,
}

impl Default for BvhConfig {
    fn default() -> Self {
        Self {
            scheduler: Scheduler::default(),
            thread_count: None,
            interior_node_traversal_cost: DEFAULT_INTERIOR_NODE_TRAVERSAL_COST,
            max_depth: TRAVERSAL_STACK_SIZE as u32,
        }
    }
}

impl BvhConfig {
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = Some(thread_count);
        self
    }

    pub fn with_interior_node_traversal_cost(mut self, cost: f64) -> Self {
        self.interior_node_traversal_cost = cost;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Number of build workers, at least one.
    pub fn thread_count(&self) -> usize {
        let count = match self.scheduler {
            Scheduler::Sequential => 1,
            scheduler => self
                .thread_count
                .unwrap_or_else(|| scheduler.current_num_threads()),
        };
        count.max(1)
    }

    /// Effective depth limit: a tree built with it never overflows the traversal stack.
    pub fn max_depth(&self) -> u32 {
        self.max_depth.min(TRAVERSAL_STACK_SIZE as u32)
    }
}

/// build options for the BVH
#[derive(FromArgs, Debug, Clone, PartialEq)]
pub struct BuildArgs {
    /// scheduler: 'seq', 'rayon', 'chili' or 'raw'
    #[argh(option, default = "Scheduler::default()")]
    pub scheduler: Scheduler,

    /// number of build worker threads (default: available parallelism)
    #[argh(option)]
    pub threads: Option<usize>,

    /// cost of visiting an interior node, relative to an object test
    #[argh(option, default = "DEFAULT_INTERIOR_NODE_TRAVERSAL_COST")]
    pub traversal_cost: f64,

    /// maximum tree depth
    #[argh(option, default = "TRAVERSAL_STACK_SIZE as u32")]
    pub max_depth: u32,
}

impl From<&BuildArgs> for BvhConfig {
    fn from(args: &BuildArgs) -> Self {
        Self {
            scheduler: args.scheduler,
            thread_count: args.threads,
            interior_node_traversal_cost: args.traversal_cost,
            max_depth: args.max_depth,
        }
    }
}
