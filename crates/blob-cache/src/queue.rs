//! Serialized execution contexts
//!
//! Every cache name owns one worker thread that runs submitted tasks strictly
//! in submission order, one at a time. Workers are created lazily on first use
//! and live for the rest of the process. Distinct names run independently.
//!
//! A separate process-wide callback queue delivers fetch callbacks so user
//! code never runs on, or blocks, a cache worker.

use crate::{
    config::DOMAIN,
    error::{CacheError, CacheResult},
};
use dashmap::DashMap;
use std::{
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, LazyLock},
    thread,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

static QUEUES: LazyLock<DashMap<String, SerialQueue>> = LazyLock::new(DashMap::new);

/// Handle to a single-worker FIFO task queue
#[derive(Clone)]
pub struct SerialQueue {
    label: Arc<str>,
    sender: mpsc::UnboundedSender<Job>,
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl SerialQueue {
    /// Start a new worker thread named `label`
    ///
    /// Prefer [`queue_for`], which reuses one worker per cache name.
    pub fn spawn(label: impl Into<String>) -> CacheResult<Self> {
        let label: String = label.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        let worker_label = label.clone();
        thread::Builder::new().name(label.clone()).spawn(move || {
            while let Some(job) = receiver.blocking_recv() {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("Task on queue {worker_label} panicked");
                }
            }
            debug!("Queue {worker_label} stopped");
        })?;

        debug!("Started queue {label}");
        Ok(Self {
            label: label.into(),
            sender,
        })
    }

    /// Name of the worker thread
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Enqueue `job` behind everything already submitted
    ///
    /// Returns `false` if the worker is gone and the job was dropped.
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Box::new(job)).is_err() {
            warn!("Queue {} is closed, dropping task", self.label);
            return false;
        }
        true
    }

    /// Run `job` on the queue and resolve with its result
    ///
    /// The job is enqueued immediately, not when the future is first polled.
    pub fn submit<F, T>(&self, job: F) -> impl Future<Output = CacheResult<T>> + Send + use<F, T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.dispatch(move || {
            let _ = tx.send(job());
        });

        let label = Arc::clone(&self.label);
        async move { rx.await.map_err(|_| CacheError::QueueClosed(label.to_string())) }
    }

    /// Resolve once every previously submitted job has finished
    pub fn barrier(&self) -> impl Future<Output = CacheResult<()>> + Send + use<> {
        self.submit(|| ())
    }
}

fn shared_queue(label: String) -> CacheResult<SerialQueue> {
    if let Some(queue) = QUEUES.get(&label) {
        return Ok(queue.value().clone());
    }

    QUEUES
        .entry(label.clone())
        .or_try_insert_with(|| SerialQueue::spawn(label))
        .map(|queue| queue.value().clone())
}

/// Worker queue for the cache called `name`, created on first use
pub fn queue_for(name: &str) -> CacheResult<SerialQueue> {
    shared_queue(format!("{DOMAIN}.{name}"))
}

/// Process-wide queue on which fetch callbacks are delivered
pub fn callback_queue() -> CacheResult<SerialQueue> {
    // '/' is not allowed in cache names, so this never aliases a cache queue
    shared_queue(format!("{DOMAIN}/callbacks"))
}

#[cfg(test)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_tasks_run_in_submission_order() {
        let queue = SerialQueue::spawn("test.order").expect("Operation should succeed");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let seen = Arc::clone(&seen);
            assert!(queue.dispatch(move || seen.lock().unwrap().push(i)));
        }
        queue.barrier().await.expect("Operation should succeed");

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_submit_returns_result() {
        let queue = SerialQueue::spawn("test.submit").expect("Operation should succeed");
        let value = queue.submit(|| 6 * 7).await.expect("Operation should succeed");
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_tasks_run_on_worker_thread() {
        let queue = queue_for("thread-name-check").expect("Operation should succeed");
        let name = queue
            .submit(|| thread::current().name().map(str::to_string))
            .await
            .expect("Operation should succeed");
        assert_eq!(name.as_deref(), Some("blob-cache.thread-name-check"));
    }

    #[test]
    fn test_registry_reuses_queue_per_name() {
        let first = queue_for("registry-shared").expect("Operation should succeed");
        let second = queue_for("registry-shared").expect("Operation should succeed");
        let other = queue_for("registry-other").expect("Operation should succeed");

        assert!(first.sender.same_channel(&second.sender));
        assert!(!first.sender.same_channel(&other.sender));
        assert_eq!(first.label(), "blob-cache.registry-shared");

        let callbacks = callback_queue().expect("Operation should succeed");
        assert_eq!(callbacks.label(), "blob-cache/callbacks");
    }

    #[tokio::test]
    async fn test_worker_survives_panicking_task() {
        let queue = SerialQueue::spawn("test.panic").expect("Operation should succeed");
        queue.dispatch(|| panic!("task failure"));

        let value = queue.submit(|| "still running").await;
        assert_eq!(value.expect("Operation should succeed"), "still running");
    }

    #[tokio::test]
    async fn test_dropped_result_reports_queue_closed() {
        let queue = SerialQueue::spawn("test.closed").expect("Operation should succeed");
        // A panicking job drops its completion sender
        let result = queue.submit(|| -> u32 { panic!("no result") }).await;
        assert!(matches!(result, Err(CacheError::QueueClosed(_))));
    }
}
