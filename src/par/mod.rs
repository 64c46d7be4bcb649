use std::{str::FromStr, sync::OnceLock};

pub mod par_chili;
pub mod par_raw;
pub mod par_rayon;
pub mod par_sequential;
pub mod task_queue;

pub use task_queue::TaskQueue;

static AVAILABLE_PARALLELISM: OnceLock<usize> = OnceLock::new();

#[inline(always)]
pub fn cached_available_parallelism() -> usize {
    *AVAILABLE_PARALLELISM.get_or_init(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

/// Backend used for the data-parallel loops of the crate.
///
/// The BVH build itself always runs its workers on scoped OS threads pulling from a
/// [`TaskQueue`]; the scheduler decides how many of them there are and how object
/// wrapping is parallelized.
#[derive(PartialEq, Eq, Default, Clone, Copy, Debug)]
#[repr(u32)]
pub enum Scheduler {
    Sequential = 0,
    #[default]
    Rayon = 1,
    Chili = 2,
    Raw = 3,
}

impl FromStr for Scheduler {
    type Err = String;

    #[inline(always)]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seq" => Ok(Self::Sequential),
            "rayon" => Ok(Self::Rayon),
            "chili" => Ok(Self::Chili),
            "raw" => Ok(Self::Raw),
            _ => Err(format!(
                "Unknown mode: '{s}', valid modes: 'seq', 'rayon', 'chili', 'raw'"
            )),
        }
    }
}

impl Scheduler {
    pub const ALL: [Scheduler; 4] = [
        Scheduler::Sequential,
        Scheduler::Rayon,
        Scheduler::Chili,
        Scheduler::Raw,
    ];

    #[inline(always)]
    pub fn par_map<T, F>(self, data: &mut [T], func: &F, chunks: u32)
    where
        T: Send + Sync,
        F: Fn(usize, &mut T) + Send + Sync,
    {
        match self {
            Scheduler::Sequential => par_sequential::par_map(data, func),
            Scheduler::Rayon => par_rayon::par_map(data, func),
            Scheduler::Chili => par_chili::par_map(data, func, chunks),
            Scheduler::Raw => par_raw::par_map(data, func, chunks),
        }
    }

    /// Calls `func(start, chunk)` for consecutive chunks of at most `chunk_size` elements,
    /// where `start` is the index of the chunk's first element in `data`.
    #[inline(always)]
    pub fn par_chunks_mut<T, F>(self, data: &mut [T], func: &F, chunk_size: usize)
    where
        T: Send + Sync,
        F: Fn(usize, &mut [T]) + Send + Sync,
    {
        match self {
            Scheduler::Sequential => par_sequential::par_chunks_mut(data, func),
            Scheduler::Rayon => par_rayon::par_chunks_mut(data, func, chunk_size),
            Scheduler::Chili => par_chili::par_chunks_mut(data, func, chunk_size),
            Scheduler::Raw => par_raw::par_chunks_mut(data, func, chunk_size),
        }
    }

    #[inline(always)]
    pub fn init(self) {
        cached_available_parallelism();
    }

    pub fn current_num_threads(self) -> usize {
        match self {
            Scheduler::Sequential => 1,
            Scheduler::Rayon => rayon::current_num_threads(),
            Scheduler::Chili => cached_available_parallelism(),
            Scheduler::Raw => cached_available_parallelism(),
        }
    }
}
