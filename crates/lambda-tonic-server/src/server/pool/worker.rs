use crate::server::{
    backend::SharedBackend,
    streaming::{processor::handle_infer_request, request::WorkRequest},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Worker task responsible for processing [`WorkRequest`] messages.
///
/// Each worker holds a handle to the compute backend and runs one batch at a
/// time. It listens on an MPSC channel and processes requests until a
/// shutdown signal is received or every sender is dropped.
///
/// # Arguments
///
/// - `worker_id`: Unique numeric identifier for this worker (used for
///   logs/tracing).
/// - `rx`: Receiver through which [`WorkRequest`]s are received.
/// - `backend`: Compute backend used to label images.
/// - `shutdown`: Pool-wide token checked between images of a batch.
///
/// # Request Types
///
/// - [`WorkRequest::Infer`] - Runs [`handle_infer_request`] and replies with
///   the whole response or the first error. The batch is abandoned as soon
///   as the caller stops waiting for it.
/// - [`WorkRequest::Shutdown`] - Signals the worker to stop and acknowledge
///   shutdown.
pub async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<WorkRequest>,
    backend: SharedBackend,
    shutdown: CancellationToken,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    while let Some(work) = rx.recv().await {
        match work {
            WorkRequest::Infer {
                request,
                mut response,
            } => {
                // The caller gave up (disconnect or deadline); skip the batch.
                if response.is_closed() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {worker_id} dropping batch for closed caller");
                    continue;
                }

                // Losing the caller mid-batch drops the batch and its buffer at
                // the backend's current await point.
                let result = tokio::select! {
                    result = handle_infer_request(worker_id, backend.as_ref(), request, &shutdown) => result,
                    () = response.closed() => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Worker {worker_id} abandoning batch for closed caller");
                        continue;
                    }
                };

                if response.send(result).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {worker_id} failed to deliver response");
                }
            }
            WorkRequest::Shutdown { response } => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::backend::{BackendError, InferenceBackend, StaticLabelBackend};
    use bytes::Bytes;
    use core::time::Duration;
    use lambda_tonic_core::{
        proto::{Image, InferImageRequest, JobDescriptor},
        types::{AccumulatedRequest, StreamLimits},
    };
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio::{
        sync::oneshot,
        time::{sleep, timeout},
    };

    #[tokio::test]
    async fn replies_then_acknowledges_shutdown() {
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(worker_loop(
            0,
            rx,
            Arc::new(StaticLabelBackend::default()),
            CancellationToken::new(),
        ));

        let (resp_tx, resp_rx) = oneshot::channel();
        tx.send(WorkRequest::Infer {
            request: AccumulatedRequest::new(),
            response: resp_tx,
        })
        .await
        .unwrap();
        let response = resp_rx.await.unwrap().unwrap();
        assert!(response.outputs.is_empty());

        let (ack_tx, ack_rx) = oneshot::channel();
        tx.send(WorkRequest::Shutdown { response: ack_tx })
            .await
            .unwrap();
        ack_rx.await.unwrap();
        handle.await.unwrap();
    }

    /// Sleeps per image and counts calls.
    struct SlowBackend {
        calls: Arc<AtomicUsize>,
    }

    #[tonic::async_trait]
    impl InferenceBackend for SlowBackend {
        async fn infer(
            &self,
            _job: &JobDescriptor,
            _payload: &Bytes,
        ) -> core::result::Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(50)).await;
            Ok("slow".to_string())
        }
    }

    fn batch(images: usize) -> AccumulatedRequest {
        let mut request = AccumulatedRequest::new();
        request
            .absorb(
                InferImageRequest {
                    job: None,
                    images: (0..images)
                        .map(|i| Image {
                            name: format!("image-{i}"),
                            data: Bytes::from_static(b"\x00"),
                        })
                        .collect(),
                },
                &StreamLimits::UNBOUNDED,
            )
            .unwrap();
        request
    }

    #[tokio::test]
    async fn abandons_batch_when_caller_goes_away() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(worker_loop(
            0,
            rx,
            Arc::new(SlowBackend {
                calls: Arc::clone(&calls),
            }),
            CancellationToken::new(),
        ));

        let (resp_tx, resp_rx) = oneshot::channel();
        tx.send(WorkRequest::Infer {
            request: batch(10),
            response: resp_tx,
        })
        .await
        .unwrap();

        sleep(Duration::from_millis(120)).await;
        drop(resp_rx);

        sleep(Duration::from_millis(20)).await;
        let stopped_at = calls.load(Ordering::SeqCst);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), stopped_at);
        assert!(stopped_at < 10);

        // The worker is free for the next batch.
        let (resp_tx, resp_rx) = oneshot::channel();
        tx.send(WorkRequest::Infer {
            request: AccumulatedRequest::new(),
            response: resp_tx,
        })
        .await
        .unwrap();
        let response = timeout(Duration::from_secs(1), resp_rx)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(response.outputs.is_empty());
    }

    #[tokio::test]
    async fn exits_when_senders_drop() {
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(worker_loop(
            3,
            rx,
            Arc::new(StaticLabelBackend::default()),
            CancellationToken::new(),
        ));
        drop(tx);
        handle.await.unwrap();
    }
}
