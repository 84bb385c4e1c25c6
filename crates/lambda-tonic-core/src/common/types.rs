//! # Stream accumulation types
//!
//! A client-streaming `InferImage` call is merged chunk by chunk into a single
//! [`AccumulatedRequest`] before any inference runs. This module owns that
//! buffer and the [`StreamLimits`] applied while it grows.
//!
//! ## Merge rules
//!
//! - Images are appended in arrival order across all chunks. The order is the
//!   order of the response.
//! - The job descriptor is last-write-wins: every chunk that carries a `job`
//!   replaces the previous one. Chunks without a `job` leave it unchanged.
//! - Image contents are never inspected; empty payloads are kept as-is.
//!
//! ## Limits
//!
//! Both limits are checked before a chunk is applied, so a rejected chunk
//! leaves the buffer untouched. The caller drops the buffer on any error.

use crate::{
    Error, Result,
    proto::{Image, InferImageRequest, JobDescriptor},
};

/// Default upper bound on images per stream.
pub const DEFAULT_MAX_ITEMS: usize = 10_000;

/// Default upper bound on summed image payload bytes per stream (64 MiB).
pub const DEFAULT_MAX_STREAM_BYTES: usize = 64 * 1024 * 1024;

/// Per-stream bounds on buffered work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimits {
    /// Maximum number of images across all chunks.
    pub max_items: usize,
    /// Maximum sum of `Image::data` lengths across all chunks.
    pub max_bytes: usize,
}

impl StreamLimits {
    /// No bounds at all.
    pub const UNBOUNDED: Self = Self {
        max_items: usize::MAX,
        max_bytes: usize::MAX,
    };
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            max_bytes: DEFAULT_MAX_STREAM_BYTES,
        }
    }
}

/// Server-side buffer holding everything a client stream has sent so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulatedRequest {
    job: JobDescriptor,
    items: Vec<Image>,
    payload_bytes: usize,
}

impl AccumulatedRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one chunk into the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] if the chunk would push the image
    /// count or payload size past `limits`. The buffer is not modified in that
    /// case.
    pub fn absorb(&mut self, chunk: InferImageRequest, limits: &StreamLimits) -> Result<()> {
        let InferImageRequest { job, images } = chunk;

        let items = self.items.len().saturating_add(images.len());
        if items > limits.max_items {
            return Err(Error::ResourceExhausted {
                reason: format!(
                    "Stream carries {} images, limit is {}",
                    items, limits.max_items
                ),
            });
        }

        let payload_bytes = images
            .iter()
            .fold(self.payload_bytes, |acc, image| acc.saturating_add(image.data.len()));
        if payload_bytes > limits.max_bytes {
            return Err(Error::ResourceExhausted {
                reason: format!(
                    "Stream carries {} payload bytes, limit is {}",
                    payload_bytes, limits.max_bytes
                ),
            });
        }

        if let Some(job) = job {
            self.job = job;
        }
        self.items.extend(images);
        self.payload_bytes = payload_bytes;
        Ok(())
    }

    /// The job descriptor most recently received.
    pub fn job(&self) -> &JobDescriptor {
        &self.job
    }

    /// All images received so far, in arrival order.
    pub fn items(&self) -> &[Image] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total payload bytes buffered.
    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    pub fn into_parts(self) -> (JobDescriptor, Vec<Image>) {
        (self.job, self.items)
    }
}
