#[inline(always)]
pub fn with_chili<F, R>(f: F) -> R
where
    F: FnOnce(&mut chili::Scope) -> R,
{
    // A fresh handle per call: a shared `&mut Scope` would alias across callers.
    let mut scope = chili::Scope::global();
    f(&mut scope)
}

#[inline(always)]
pub fn par_map<T, F>(data: &mut [T], func: &F, chunks: u32)
where
    T: Send + Sync,
    F: Fn(usize, &mut T) + Send + Sync,
{
    #[inline(always)]
    fn recursive_split<T, F>(
        worker: &mut chili::Scope,
        data: &mut [T],
        func: &F,
        base_id: usize,
        splits_left: u32,
    ) where
        T: Send + Sync,
        F: Fn(usize, &mut T) + Send + Sync,
    {
        if splits_left == 0 || data.len() < 2 {
            for (index, output) in data.iter_mut().enumerate() {
                func(base_id + index, output);
            }
        } else {
            let split_id = data.len() / 2;
            let (left, right) = data.split_at_mut(split_id);
            worker.join(
                |worker| recursive_split(worker, left, func, base_id, splits_left - 1),
                |worker| recursive_split(worker, right, func, base_id + split_id, splits_left - 1),
            );
        }
    }
    let splits = 31 - chunks.max(1).leading_zeros();
    with_chili(|worker| {
        recursive_split(worker, data, func, 0, splits);
    });
}

#[inline(always)]
pub fn par_chunks_mut<T, F>(data: &mut [T], func: &F, chunk_size: usize)
where
    T: Send + Sync,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    fn recursive_split<T, F>(
        worker: &mut chili::Scope,
        start: usize,
        slice: &mut [T],
        func: &F,
        chunk_size: usize,
    ) where
        T: Send + Sync,
        F: Fn(usize, &mut [T]) + Send + Sync,
    {
        let len = slice.len();
        if len <= chunk_size {
            func(start, slice);
        } else {
            let n_chunks = len.div_ceil(chunk_size);
            let left_chunks = n_chunks / 2;
            let left_len = (left_chunks * chunk_size).min(len);
            let (left, right) = slice.split_at_mut(left_len);

            worker.join(
                |worker| recursive_split(worker, start, left, func, chunk_size),
                |worker| recursive_split(worker, start + left_len, right, func, chunk_size),
            );
        }
    }
    if !data.is_empty() {
        with_chili(|worker| {
            recursive_split(worker, 0, data, func, chunk_size.max(1));
        });
    }
}
