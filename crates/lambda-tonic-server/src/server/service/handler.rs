//! gRPC service implementation for client-streamed batch inference.
//!
//! This module defines [`InferService`], the concrete implementation of the
//! [`Lambda`] gRPC service defined in the protobuf specification. Its one
//! endpoint, `InferImage`, accepts a client stream of image chunks and answers
//! with a single response once the client closes the stream.
//!
//! ## Responsibilities
//!
//! - Spawn and manage a background worker pool running the compute backend.
//! - Admit streams through the pool's gate; refuse them during shutdown.
//! - Drain each stream into one accumulated request, honouring limits and
//!   the call deadline.
//! - Hand the drained request to a worker and return its response, or a
//!   single error status. Partial results are never sent.
//!
//! ## Per-stream lifecycle
//!
//! `OPEN -> receiving* -> CLOSING -> RESPONDING -> CLOSED`, or `FAILED` from
//! any state before `CLOSED`. Each stream runs on its own handler future and
//! owns its buffer; nothing but counters is shared between streams.

use crate::server::{
    backend::SharedBackend,
    config::ServerConfig,
    pool::{manager::WorkerPool, worker::worker_loop},
    streaming::{aggregator::StreamAggregator, deadline::resolve_deadline},
    telemetry::{
        increment_items_received, increment_requests, increment_stream_errors,
        record_items_per_request, record_stream_duration,
    },
};
use lambda_tonic_core::{
    Error, Result,
    proto::{InferImageRequest, InferImageResponse, lambda_server::Lambda},
};
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    time::{Instant, timeout_at},
};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

/// gRPC service aggregating client-streamed image batches.
///
/// Implements the [`Lambda`] service defined in the protobuf schema. Cloning
/// is cheap; clones share the same worker pool.
#[derive(Clone)]
pub struct InferService {
    config: ServerConfig,
    worker_pool: Arc<WorkerPool>,
}

impl InferService {
    /// Creates a new `InferService` and spawns `config.num_workers` workers,
    /// each holding a handle to `backend`.
    ///
    /// Worker channels have capacity 1: a worker holds at most one queued
    /// batch besides the one it is running, and further submissions wait for
    /// it. This bounds the number of drained requests held in memory by the
    /// pool to twice the worker count.
    pub fn new(config: ServerConfig, backend: SharedBackend) -> Self {
        let mut workers = Vec::with_capacity(config.num_workers);
        let shutdown_token = CancellationToken::new();

        for worker_id in 0..config.num_workers {
            let (tx, rx) = mpsc::channel(1);
            workers.push(tx);

            tokio::spawn(worker_loop(
                worker_id,
                rx,
                Arc::clone(&backend),
                shutdown_token.clone(),
            ));
        }

        let worker_pool = WorkerPool::new(workers, shutdown_token, config.shutdown_timeout);

        Self {
            config,
            worker_pool: Arc::new(worker_pool),
        }
    }

    /// Initiates a graceful shutdown of the worker pool.
    ///
    /// New streams are refused immediately, in-flight streams get up to the
    /// configured shutdown timeout to finish, then remaining work is
    /// cancelled and the call blocks until each worker acknowledges.
    pub async fn shutdown(&self) -> Result<()> {
        self.worker_pool.shutdown().await
    }

    /// Drains `inbound` and produces the response for it.
    ///
    /// The deadline covers both phases: waiting on the client and waiting on
    /// the backend.
    async fn aggregate_and_respond<S>(
        &self,
        inbound: S,
        deadline: Option<Instant>,
    ) -> Result<InferImageResponse>
    where
        S: Stream<Item = core::result::Result<InferImageRequest, Status>> + Unpin,
    {
        let accumulated = StreamAggregator::new(inbound, self.config.limits)
            .with_deadline(deadline)
            .drain()
            .await?;

        let items = accumulated.len();
        increment_items_received(items as u64);

        let respond = self.worker_pool.submit(accumulated);
        let response = match deadline {
            Some(deadline) => timeout_at(deadline, respond)
                .await
                .map_err(|_| Error::DeadlineExceeded)??,
            None => respond.await?,
        };

        debug_assert_eq!(response.outputs.len(), items);
        record_items_per_request(items as f64);
        Ok(response)
    }
}

#[tonic::async_trait]
impl Lambda for InferService {
    /// Handles one client-streamed inference batch.
    ///
    /// If `tracing` is enabled, a span is recorded per call.
    ///
    /// If `metrics` is enabled, emits telemetry for:
    /// - request rate
    /// - images received and images per completed call
    /// - concurrent stream count
    /// - stream duration
    /// - failed calls
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn infer_image(
        &self,
        req: Request<Streaming<InferImageRequest>>,
    ) -> core::result::Result<Response<InferImageResponse>, Status> {
        let start = std::time::Instant::now();

        let _permit = match self.worker_pool.gate().try_enter() {
            Ok(permit) => permit,
            Err(e) => {
                increment_stream_errors();
                return Err(e.into());
            }
        };
        increment_requests();

        let deadline = resolve_deadline(req.metadata(), self.config.request_timeout);

        match self.aggregate_and_respond(req.into_inner(), deadline).await {
            Ok(response) => {
                record_stream_duration(start.elapsed().as_millis() as f64);
                Ok(Response::new(response))
            }
            Err(e) => {
                increment_stream_errors();
                #[cfg(feature = "tracing")]
                tracing::warn!("InferImage failed: {}", e);
                Err(e.into())
            }
        }
    }
}
