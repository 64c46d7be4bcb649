use std::thread;

use crate::par::cached_available_parallelism;

#[inline(always)]
pub fn par_map<T, F>(data: &mut [T], func: &F, chunks: u32)
where
    T: Send + Sync,
    F: Fn(usize, &mut T) + Send + Sync,
{
    if !data.is_empty() {
        // Limit the max number of chunks in this case since they are actual threads
        let max_chunks = cached_available_parallelism() * 6;

        let chunk_count = (chunks as usize).max(1).min(max_chunks);
        let chunk_size = data.len().div_ceil(chunk_count);
        par_chunks_mut(
            data,
            &|start: usize, chunk: &mut [T]| {
                for (i, output) in chunk.iter_mut().enumerate() {
                    func(start + i, output);
                }
            },
            chunk_size,
        );
    }
}

#[inline(always)]
pub fn par_chunks_mut<T, F>(data: &mut [T], func: &F, chunk_size: usize)
where
    T: Send + Sync,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    if !data.is_empty() {
        let chunk_size = chunk_size.max(1);
        let chunk_count = data.len().div_ceil(chunk_size);
        if chunk_count == 1 {
            func(0, data)
        } else {
            thread::scope(|s| {
                let mut slice = data;
                for chunk_id in 0..chunk_count {
                    let slice_len = slice.len();
                    let (left, right) = slice.split_at_mut(chunk_size.min(slice_len));
                    slice = right;
                    let start = chunk_id * chunk_size;
                    if chunk_id == chunk_count - 1 {
                        func(start, left) // Run the last one on this thread
                    } else {
                        s.spawn(move || func(start, left));
                    }
                }
            });
        }
    }
}
