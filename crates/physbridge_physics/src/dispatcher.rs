//! Worker dispatch for solver-side parallel work

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

/// Fixed pool of solver workers
///
/// Each dispatch invokes the work closure exactly once per worker index in
/// `0..thread_count`, so per-worker buffers indexed by that value are never
/// shared between concurrent invocations.
pub struct ThreadDispatcher {
    pool: ThreadPool,
    thread_count: usize,
}

impl ThreadDispatcher {
    /// Create a dispatcher with `thread_count` workers (at least one)
    pub fn new(thread_count: usize) -> Result<Self, ThreadPoolBuildError> {
        let thread_count = thread_count.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(thread_count)
            .thread_name(|i| format!("physics-worker-{}", i))
            .build()?;
        Ok(Self { pool, thread_count })
    }

    /// Number of worker indices handed out per dispatch
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Run `work` once per worker index and collect the results in index order
    pub fn dispatch_workers<R, F>(&self, work: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Sync,
    {
        self.pool
            .install(|| (0..self.thread_count).into_par_iter().map(|worker| work(worker)).collect())
    }
}

impl std::fmt::Debug for ThreadDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadDispatcher")
            .field("thread_count", &self.thread_count)
            .finish()
    }
}
