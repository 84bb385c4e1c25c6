use lambda_tonic_core::{Result, proto::InferImageResponse, types::AccumulatedRequest};
use tokio::sync::oneshot;

/// A message sent from the RPC handler to a worker.
#[derive(Debug)]
pub enum WorkRequest {
    /// Run inference over a fully drained stream and reply on `response`.
    Infer {
        request: AccumulatedRequest,
        response: oneshot::Sender<Result<InferImageResponse>>,
    },
    /// Stop the worker once acknowledged.
    Shutdown { response: oneshot::Sender<()> },
}
