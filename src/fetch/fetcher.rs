/*!
 * Network Fetcher
 * Origin fetcher bound to one dedicated I/O worker thread
 */

use super::types::{FetchCallback, FetchError, FetchRequest, FetchResponse};
use crate::config::options::FetchOptions;
use crate::stats::SharedStats;
use crossbeam_channel::{bounded, unbounded, Sender};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Transport seam for the actual origin protocol, which lives outside
/// this crate. Implementations honor the timeout themselves.
pub trait FetchTransport: Send + Sync {
    fn fetch(&self, request: &FetchRequest, timeout_ms: u64)
        -> Result<FetchResponse, FetchError>;
}

struct FetchJob {
    request: FetchRequest,
    callback: FetchCallback,
}

/// Plain fetcher: one worker thread draining a request queue through the
/// transport. Expensive to create (each costs a thread), so instances
/// are pooled per configuration signature.
pub struct Fetcher {
    options: FetchOptions,
    sender: Mutex<Option<Sender<FetchJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Fetcher {
    /// Spawn the worker thread. Failure is fatal only to the requesting
    /// configuration; the error propagates instead of panicking so
    /// sibling configurations keep running.
    pub fn spawn(
        options: FetchOptions,
        transport: Arc<dyn FetchTransport>,
        stats: Option<Arc<SharedStats>>,
    ) -> Result<Self, FetchError> {
        let (sender, receiver) = unbounded::<FetchJob>();
        let timeout_ms = options.timeout_ms;
        let worker = std::thread::Builder::new()
            .name("fetcher-io".to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    let result = transport.fetch(&job.request, timeout_ms);
                    if let Some(ref stats) = stats {
                        match result {
                            Ok(_) => stats.add("fetch_successes", 1),
                            Err(_) => stats.add("fetch_failures", 1),
                        }
                    }
                    (job.callback)(result);
                }
                debug!("Fetcher worker exiting");
            })
            .map_err(|e| FetchError::SpawnFailed(e.to_string()))?;

        info!(
            "Started fetcher worker (timeout {} ms, proxy: {})",
            options.timeout_ms,
            options.proxy.as_deref().unwrap_or("direct")
        );

        Ok(Self {
            options,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    #[inline]
    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Queue a fetch; the callback runs on the worker thread.
    pub fn fetch_async(&self, request: FetchRequest, callback: FetchCallback) {
        let sender = self.sender.lock().clone();
        let job = FetchJob { request, callback };
        match sender {
            Some(ref tx) => {
                if let Err(err) = tx.send(job) {
                    (err.0.callback)(Err(FetchError::ShutDown));
                }
            }
            None => (job.callback)(Err(FetchError::ShutDown)),
        }
    }

    /// Blocking fetch, for callers without a continuation.
    pub fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let (tx, rx) = bounded(1);
        self.fetch_async(
            request,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.recv().map_err(|_| FetchError::ShutDown)?
    }

    /// Drain the queue and join the worker.
    pub fn shutdown(&self) {
        let sender = self.sender.lock().take();
        drop(sender);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Fetcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Rate-limiting decorator handed to normal callers; the unwrapped
/// transport stays reachable through the pool's plain constructor for
/// callers that explicitly bypass pooling policy.
pub struct RateLimitedFetcher {
    inner: Arc<Fetcher>,
    inflight: Arc<AtomicUsize>,
    max_inflight: usize,
}

impl RateLimitedFetcher {
    pub fn new(inner: Arc<Fetcher>) -> Self {
        let max_inflight = inner.options().max_inflight;
        Self {
            inner,
            inflight: Arc::new(AtomicUsize::new(0)),
            max_inflight,
        }
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    pub fn fetch_async(&self, request: FetchRequest, callback: FetchCallback) {
        let inflight = self.inflight.fetch_add(1, Ordering::AcqRel) + 1;
        if inflight > self.max_inflight {
            self.inflight.fetch_sub(1, Ordering::AcqRel);
            callback(Err(FetchError::RateLimited {
                inflight,
                max: self.max_inflight,
            }));
            return;
        }
        let counter = Arc::clone(&self.inflight);
        self.inner.fetch_async(
            request,
            Box::new(move |result| {
                counter.fetch_sub(1, Ordering::AcqRel);
                callback(result);
            }),
        );
    }

    pub fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let (tx, rx) = bounded(1);
        self.fetch_async(
            request,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.recv().map_err(|_| FetchError::ShutDown)?
    }

    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}
