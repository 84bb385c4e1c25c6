//! Asynchronous worker pool for batch inference.
//!
//! This module defines the [`WorkerPool`] struct, which manages a set of
//! asynchronous workers responsible for processing [`WorkRequest`]s. It
//! distributes batches using round-robin scheduling and supports coordinated
//! shutdown via a shared [`CancellationToken`].
//!
//! Each worker listens on its own bounded [`mpsc::Receiver`] and executes
//! batches independently. The pool also owns the [`StreamGate`] that counts
//! in-flight streams, so shutdown can stop admitting calls and wait for the
//! running ones to finish.

use crate::server::{
    streaming::request::WorkRequest,
    telemetry::{decrement_streams_inflight, increment_streams_inflight},
};
use core::time::Duration;
use lambda_tonic_core::{Error, Result, proto::InferImageResponse, types::AccumulatedRequest};
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

/// Admission control for client streams.
///
/// Every accepted stream holds a [`StreamPermit`] for its whole lifetime.
/// Closing the gate rejects new streams while letting existing permits run
/// to completion.
#[derive(Debug, Default)]
pub struct StreamGate {
    inflight: AtomicUsize,
    closed: AtomicBool,
}

impl StreamGate {
    /// Admits one stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once the gate is closed.
    pub fn try_enter(self: &Arc<Self>) -> Result<StreamPermit> {
        if self.is_closed() {
            return Err(Error::ServiceShutdown);
        }

        self.inflight.fetch_add(1, Ordering::AcqRel);
        let permit = StreamPermit {
            gate: Arc::clone(self),
        };
        increment_streams_inflight();

        // Lost a race with `close`; the permit's drop undoes the increment.
        if self.is_closed() {
            return Err(Error::ServiceShutdown);
        }

        Ok(permit)
    }

    /// Stops admitting new streams.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of streams currently holding a permit.
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }
}

/// Held by a stream while it is being served. Released on drop, whatever the
/// outcome of the call.
#[derive(Debug)]
pub struct StreamPermit {
    gate: Arc<StreamGate>,
}

impl Drop for StreamPermit {
    fn drop(&mut self) {
        self.gate.inflight.fetch_sub(1, Ordering::AcqRel);
        decrement_streams_inflight();
    }
}

/// A cooperative pool of asynchronous workers that process [`WorkRequest`]s.
///
/// Workers receive requests over bounded MPSC channels. Work is distributed in
/// round-robin fashion and the pool supports graceful, cancellable shutdown.
pub struct WorkerPool {
    workers: Vec<mpsc::Sender<WorkRequest>>,
    next_worker: AtomicUsize,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
    gate: Arc<StreamGate>,
}

impl WorkerPool {
    /// Constructs a new [`WorkerPool`] from initialized worker channels and a
    /// shared cancellation token.
    pub fn new(
        workers: Vec<mpsc::Sender<WorkRequest>>,
        shutdown_token: CancellationToken,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            shutdown_token,
            shutdown_timeout,
            gate: Arc::new(StreamGate::default()),
        }
    }

    /// Admission gate shared with the RPC handler.
    pub fn gate(&self) -> &Arc<StreamGate> {
        &self.gate
    }

    /// Returns the index of the next worker to receive work (round-robin).
    ///
    /// Uses a relaxed atomic increment to minimize contention.
    pub fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Sends a [`WorkRequest`] to the next available worker in the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The service is shutting down (`shutdown_token` was cancelled).
    /// - The worker's channel is closed.
    pub async fn send_to_next_worker(&self, request: WorkRequest) -> Result<()> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        let worker_idx = self.next_worker_index();
        let worker = &self.workers[worker_idx];

        match worker.send(request).await {
            Ok(()) => Ok(()),
            Err(_) => Err(Error::ChannelError {
                context: format!("Worker {worker_idx} channel closed"),
            }),
        }
    }

    /// Runs a drained stream on the next worker and waits for its response.
    ///
    /// # Errors
    ///
    /// Propagates the worker's result, or fails if the worker went away
    /// before replying.
    pub async fn submit(&self, request: AccumulatedRequest) -> Result<InferImageResponse> {
        let (response, rx) = oneshot::channel();
        self.send_to_next_worker(WorkRequest::Infer { request, response })
            .await?;

        match rx.await {
            Ok(result) => result,
            Err(_) if self.shutdown_token.is_cancelled() => Err(Error::ServiceShutdown),
            Err(_) => Err(Error::ChannelError {
                context: "Worker dropped the response".to_string(),
            }),
        }
    }

    /// Gracefully shuts down all workers in the pool.
    ///
    /// - Closes the [`StreamGate`] so new streams are refused.
    /// - Waits up to `shutdown_timeout` for in-flight streams to finish.
    /// - Cancels the shared [`CancellationToken`] to abandon remaining work.
    /// - Sends a [`WorkRequest::Shutdown`] to each worker and waits (up to
    ///   `shutdown_timeout` per worker) for acknowledgements.
    ///
    /// This method is typically invoked during service termination.
    pub async fn shutdown(&self) -> Result<()> {
        // === Phase 0: Stop accepting new requests ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new streams");
        self.gate.close();

        // === Phase 1: Wait for in-flight streams to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight streams ({} active)", self.gate.inflight());
        let drain_result = timeout(self.shutdown_timeout, async {
            while self.gate.inflight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight streams drained successfully");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} streams still active)",
                    self.gate.inflight()
                );
            }
        }

        // === Phase 2: Cancel any remaining work ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling remaining work via shutdown token");
        self.shutdown_token.cancel();

        // === Phase 3: Notify workers to shut down ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Notifying all workers to shut down");
        let mut shutdown_handles = Vec::with_capacity(self.workers.len());

        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            if let Err(_e) = worker.send(WorkRequest::Shutdown { response: tx }).await {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to send shutdown to worker {i}: {_e}");
            } else {
                shutdown_handles.push((i, rx));
            }
        }

        let ack_timeout = self.shutdown_timeout;
        let timeout_futures = shutdown_handles.into_iter().map(|(_i, rx)| async move {
            match timeout(ack_timeout, rx).await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_i} shutdown acknowledged");
                }
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_i} returned error: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_i} shutdown timed out");
                }
            }
        });

        futures::future::join_all(timeout_futures).await;

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool shutdown complete");

        Ok(())
    }
}
