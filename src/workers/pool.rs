/*!
 * Worker Pool
 * Fixed-size thread pool draining a task queue
 */

use crossbeam_channel::{unbounded, Sender};
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::thread::JoinHandle;
use thiserror::Error;

/// Unit of rewrite work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool error types
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum PoolError {
    /// Worker thread creation failed
    #[error("Failed to spawn worker thread: {0}")]
    SpawnFailed(String),

    /// Pool already shut down
    #[error("Worker pool '{0}' shut down")]
    ShutDown(String),

    /// Pool requested before thread counts were finalized
    #[error("Thread counts not finalized; pools cannot be created yet")]
    CountsNotFinalized,

    /// Pool sized to zero threads
    #[error("Invalid pool size: {0}")]
    InvalidSize(String),
}

/// Fixed-size pool of worker threads.
///
/// Sized once at creation, after thread counts are finalized for the
/// process, and never resized. Dropping the pool drains the queue and
/// joins every worker.
pub struct WorkerPool {
    name: String,
    thread_count: usize,
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn spawn(name: &str, thread_count: usize) -> Result<Self, PoolError> {
        if thread_count == 0 {
            return Err(PoolError::InvalidSize(
                "Pool needs at least one thread".to_string(),
            ));
        }

        let (sender, receiver) = unbounded::<Task>();
        let mut workers = Vec::with_capacity(thread_count);
        for index in 0..thread_count {
            let rx = receiver.clone();
            let thread_name = format!("{}-{}", name, index);
            let handle = std::thread::Builder::new()
                .name(thread_name)
                .spawn(move || {
                    while let Ok(task) = rx.recv() {
                        task();
                    }
                    debug!("Worker thread exiting");
                })
                .map_err(|e| PoolError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!("Started worker pool '{}' ({} threads)", name, thread_count);

        Ok(Self {
            name: name.to_string(),
            thread_count,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Queue a task for execution on some pool thread.
    pub fn submit(&self, task: Task) -> Result<(), PoolError> {
        let sender = self.sender.lock().clone();
        match sender {
            Some(ref tx) => tx
                .send(task)
                .map_err(|_| PoolError::ShutDown(self.name.clone())),
            None => Err(PoolError::ShutDown(self.name.clone())),
        }
    }

    /// Drain outstanding tasks and join all workers.
    pub fn shutdown(&self) {
        let sender = self.sender.lock().take();
        drop(sender);
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
