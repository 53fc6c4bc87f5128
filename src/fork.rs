//! A bounded worker pool for the crate's recursive and flat parallelism.
//!
//! Tree building, TAO refinement, and decimation are fork/join recursions;
//! the per-axis split search and dataset labeling are flat fan-outs. Both
//! run on the same [`ForkQueue`]: a fixed-size worker pool (or none at all,
//! for sequential runs) with the invariant that a fork never deadlocks.
//! When no worker is free, the forking caller runs the second task itself,
//! so parallelism stays bounded while recursion depth does not.

use rayon::prelude::*;

/// A worker pool sized once at the entry point of a computation.
///
/// Thread-count semantics follow the builders' `concurrency` arguments:
/// 0 means one worker per hardware thread, 1 means fully sequential (no
/// pool is created), and any other value is an exact worker count.
pub struct ForkQueue {
    pool: Option<rayon::ThreadPool>,
}

impl ForkQueue {
    pub fn new(workers: usize) -> Self {
        let pool = (workers != 1).then(|| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .expect("build worker pool")
        });
        Self { pool }
    }

    /// Whether work may actually fan out.
    #[inline]
    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Run the root task, blocking until it returns.
    ///
    /// Recursive tasks that call [`ForkQueue::fork`] must be started through
    /// here so the forks land on this queue's workers.
    pub fn run<T: Send>(&self, task: impl FnOnce() -> T + Send) -> T {
        match &self.pool {
            Some(pool) => pool.install(task),
            None => task(),
        }
    }

    /// Run two subtasks, potentially in parallel.
    ///
    /// On a sequential queue `a` simply runs before `b`. On a parallel queue
    /// the second task is offered to an idle worker and stolen back by the
    /// caller when none picks it up.
    pub fn fork<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        if self.pool.is_some() {
            rayon::join(a, b)
        } else {
            (a(), b())
        }
    }

    /// Map `f` over `items`, fanning out across the workers.
    ///
    /// Results come back in input order either way, so selection loops over
    /// the output resolve ties identically no matter how the work was
    /// scheduled.
    pub fn map<T, B, I, M>(&self, items: I, f: M) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T> + Send,
        M: Fn(T) -> B + Sync + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(|| items.into_par_iter().map(f).collect()),
            None => items.into_iter().map(f).collect(),
        }
    }

    /// Like [`ForkQueue::map`], with a scratch value per worker.
    ///
    /// `init` runs once per worker (once in total when sequential) and the
    /// value it builds is reused across that worker's items; the split
    /// search uses this for its per-axis sort buffers.
    pub fn map_with<T, B, I, S, INIT, M>(&self, items: I, init: INIT, f: M) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T> + Send,
        INIT: Fn() -> S + Sync + Send,
        M: Fn(&mut S, T) -> B + Sync + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(|| items.into_par_iter().map_init(init, f).collect()),
            None => {
                let mut scratch = init();
                items.into_iter().map(|item| f(&mut scratch, item)).collect()
            }
        }
    }
}
