//! Bounded async worker pools
//!
//! The pipeline runs two process-global pools: one for CPU-bound message
//! parsing and one for I/O-bound database writes. Both are plain fan-out
//! pools: N workers, each draining its own bounded job queue, with
//! submissions distributed round-robin. Submission applies backpressure only
//! through queue capacity; it never runs the job inline.
//!
//! Pools are built once at startup and injected into each task, so several
//! tasks can share (or tests can substitute) the same workers.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossfire::{AsyncRx, MAsyncTx};
use tokio::task::JoinHandle;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Error returned when submitting to a pool whose workers have shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolClosed;

impl std::fmt::Display for PoolClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("worker pool closed")
    }
}

impl std::error::Error for PoolClosed {}

/// A fixed-size pool of async workers with bounded job queues.
pub struct WorkerPool {
    name: &'static str,
    senders: Vec<MAsyncTx<Job>>,
    next: AtomicUsize,
    backlog: Arc<AtomicU64>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks, each with a queue of `queue_depth` jobs.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(name: &'static str, workers: usize, queue_depth: usize) -> Self {
        let workers = workers.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let (tx, rx): (MAsyncTx<Job>, AsyncRx<Job>) =
                crossfire::mpsc::bounded_async(queue_depth.max(1));
            senders.push(tx);
            handles.push(tokio::spawn(async move {
                tracing::debug!(pool = name, worker_id, "pool worker starting");
                while let Ok(job) = rx.recv().await {
                    job.await;
                }
                tracing::debug!(pool = name, worker_id, "pool worker stopping");
            }));
        }

        Self {
            name,
            senders,
            next: AtomicUsize::new(0),
            backlog: Arc::new(AtomicU64::new(0)),
            workers: parking_lot::Mutex::new(handles),
        }
    }

    /// Number of workers in the pool.
    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    /// Jobs submitted but not yet finished.
    pub fn backlog(&self) -> u64 {
        self.backlog.load(Ordering::Relaxed)
    }

    /// Enqueue a job, waiting only for queue capacity on the chosen worker.
    pub async fn submit<F>(&self, job: F) -> Result<(), PoolClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        self.backlog.fetch_add(1, Ordering::Relaxed);

        // The counter travels with the job so backlog covers queued and
        // running work alike.
        let backlog = Arc::clone(&self.backlog);
        let counted = async move {
            job.await;
            backlog.fetch_sub(1, Ordering::Relaxed);
        };

        if self.senders[idx].send(Box::pin(counted)).await.is_err() {
            self.backlog.fetch_sub(1, Ordering::Relaxed);
            tracing::warn!(pool = self.name, "job submitted to closed pool");
            return Err(PoolClosed);
        }
        Ok(())
    }

    /// Abort all workers. Queued jobs are dropped.
    pub fn shutdown(&self) {
        for handle in self.workers.lock().drain(..) {
            handle.abort();
        }
    }
}
