//! Bounded compile pool

use crate::compile::compile;
use crate::error::CompileError;
use crate::options::{CompileOptions, CompiledModule};
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Workers to use when none are configured: all cores but one, at least one
#[must_use]
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Worker threads
    pub workers: usize,
    /// Jobs waiting for a worker
    pub queued: usize,
    /// Jobs that produced a module
    pub completed: u64,
    /// Jobs that produced an error (including lost workers)
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Fixed-size worker pool running [`compile`] off the async runtime.
///
/// Jobs start in submission order. The queue is unbounded, a running job is
/// never preempted and nothing is retried. Cloning shares the same workers.
#[derive(Clone)]
pub struct CompilePool {
    pool: Arc<rayon::ThreadPool>,
    workers: usize,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for CompilePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilePool")
            .field("stats", &self.stats())
            .finish()
    }
}

impl CompilePool {
    /// Pool with `workers` threads (at least one)
    ///
    /// # Errors
    /// [`CompileError::Internal`] if the threads cannot be spawned.
    pub fn new(workers: usize) -> Result<Self, CompileError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("forge-compile-{i}"))
            .build()
            .map_err(|e| CompileError::Internal(e.to_string()))?;
        info!(workers, "compile pool started");
        Ok(Self {
            pool: Arc::new(pool),
            workers,
            counters: Arc::default(),
        })
    }

    /// Pool sized by [`default_worker_count`]
    ///
    /// # Errors
    /// See [`CompilePool::new`].
    pub fn with_default_workers() -> Result<Self, CompileError> {
        Self::new(default_worker_count())
    }

    /// Compile on a worker and wait for the result
    ///
    /// # Errors
    /// Whatever [`compile`] returns, or [`CompileError::WorkerLost`] if the
    /// worker panicked.
    pub async fn compile(
        &self,
        source: String,
        options: CompileOptions,
    ) -> Result<CompiledModule, CompileError> {
        self.execute(move || compile(&source, &options)).await
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.workers,
            queued: self.counters.queued.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    async fn execute<F>(&self, job: F) -> Result<CompiledModule, CompileError>
    where
        F: FnOnce() -> Result<CompiledModule, CompileError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let counters = Arc::clone(&self.counters);
        counters.queued.fetch_add(1, Ordering::Relaxed);

        self.pool.spawn_fifo(move || {
            counters.queued.fetch_sub(1, Ordering::Relaxed);
            let result = panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                error!(%message, "compile worker panicked");
                Err(CompileError::WorkerLost(message))
            });
            let counter = if result.is_ok() {
                &counters.completed
            } else {
                &counters.failed
            };
            counter.fetch_add(1, Ordering::Relaxed);
            // receiver gone means the caller stopped waiting
            let _ = tx.send(result);
        });

        rx.await
            .unwrap_or_else(|_| Err(CompileError::WorkerLost("compile job dropped".to_string())))
    }
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
