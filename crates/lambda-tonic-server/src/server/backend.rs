//! Compute backend seam.
//!
//! The service never runs a model itself. Each image of a batch is handed to
//! an [`InferenceBackend`] together with the batch's job descriptor, and the
//! label it returns becomes the image's output.

use bytes::Bytes;
use core::fmt;
use lambda_tonic_core::proto::JobDescriptor;
use std::sync::Arc;

/// Label reported by [`StaticLabelBackend`] unless configured otherwise.
pub const DEFAULT_LABEL: &str = "all ok";

/// Failure reported by a backend for a single image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub reason: String,
}

impl BackendError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for BackendError {}

/// Turns one image payload into an outcome label.
#[tonic::async_trait]
pub trait InferenceBackend: Send + Sync + 'static {
    async fn infer(&self, job: &JobDescriptor, payload: &Bytes) -> Result<String, BackendError>;
}

/// Shared handle to the backend, cloned into every worker.
pub type SharedBackend = Arc<dyn InferenceBackend>;

/// Backend that labels every image with the same string.
///
/// This is what the service runs with when no model is wired in. It never
/// fails and ignores both the descriptor and the payload.
#[derive(Debug, Clone)]
pub struct StaticLabelBackend {
    label: String,
}

impl StaticLabelBackend {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Default for StaticLabelBackend {
    fn default() -> Self {
        Self::new(DEFAULT_LABEL)
    }
}

#[tonic::async_trait]
impl InferenceBackend for StaticLabelBackend {
    async fn infer(&self, _job: &JobDescriptor, _payload: &Bytes) -> Result<String, BackendError> {
        Ok(self.label.clone())
    }
}
