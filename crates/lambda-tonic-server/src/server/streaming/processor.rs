use crate::server::backend::InferenceBackend;
use lambda_tonic_core::{
    Error, Result,
    proto::{InferImageResponse, InferOutput},
    types::AccumulatedRequest,
};
use tokio_util::sync::CancellationToken;

/// Builds the single response for a drained stream.
///
/// Every image is passed to `backend` in arrival order together with the
/// batch's job descriptor. The returned response holds exactly one
/// [`InferOutput`] per image, where `outputs[i].name == items[i].name`.
///
/// # Arguments
///
/// - `_worker_id`: Identifier of the calling worker, used in logs.
/// - `backend`: Compute backend producing one label per image.
/// - `request`: The merged stream; consumed.
/// - `shutdown`: Pool-wide token; once cancelled the batch is abandoned.
///
/// # Errors
///
/// The batch is all-or-nothing:
/// - [`Error::Backend`] as soon as the backend fails on any image. No later
///   image is processed.
/// - [`Error::ServiceShutdown`] if `shutdown` is cancelled mid-batch.
#[allow(clippy::used_underscore_binding)]
pub async fn handle_infer_request(
    _worker_id: usize,
    backend: &dyn InferenceBackend,
    request: AccumulatedRequest,
    shutdown: &CancellationToken,
) -> Result<InferImageResponse> {
    let (job, items) = request.into_parts();
    let mut outputs = Vec::with_capacity(items.len());

    for image in items {
        if shutdown.is_cancelled() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {_worker_id} abandoning batch on shutdown");
            return Err(Error::ServiceShutdown);
        }

        let label = backend
            .infer(&job, &image.data)
            .await
            .map_err(|e| Error::Backend {
                name: image.name.clone(),
                reason: e.reason,
            })?;

        outputs.push(InferOutput {
            name: image.name,
            label,
        });
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} labelled {} images for {job}", outputs.len());

    Ok(InferImageResponse { outputs })
}
