//! Inbound stream aggregation.
//!
//! A [`StreamAggregator`] owns one client stream and the
//! [`AccumulatedRequest`] it is merged into. It is driven by a single task
//! (the RPC handler) and never shared, so the buffer needs no locking.
//!
//! ## Termination
//!
//! - Clean end-of-stream hands the buffer to the caller.
//! - A transport error, an elapsed deadline, or a limit violation fails the
//!   call. The buffer is dropped with the aggregator.

use lambda_tonic_core::{
    Error, Result,
    proto::InferImageRequest,
    types::{AccumulatedRequest, StreamLimits},
};
use tokio::time::{Instant, timeout_at};
use tokio_stream::{Stream, StreamExt};
use tonic::Status;

/// Outcome of a single [`StreamAggregator::receive_next`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// A chunk carrying this many images was merged.
    Chunk { images: usize },
    /// The client closed its side of the stream.
    EndOfStream,
}

/// Drains a client stream of [`InferImageRequest`] chunks into one
/// [`AccumulatedRequest`].
pub struct StreamAggregator<S> {
    inbound: S,
    accumulated: AccumulatedRequest,
    limits: StreamLimits,
    deadline: Option<Instant>,
    finished: bool,
}

impl<S> StreamAggregator<S>
where
    S: Stream<Item = core::result::Result<InferImageRequest, Status>> + Unpin,
{
    pub fn new(inbound: S, limits: StreamLimits) -> Self {
        Self {
            inbound,
            accumulated: AccumulatedRequest::new(),
            limits,
            deadline: None,
            finished: false,
        }
    }

    /// Fails the receive loop with [`Error::DeadlineExceeded`] once
    /// `deadline` passes.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Waits for the next chunk, end-of-stream, or error.
    ///
    /// After [`Received::EndOfStream`] has been returned the inbound stream is
    /// not polled again and every further call returns `EndOfStream`.
    ///
    /// # Errors
    ///
    /// - [`Error::Transport`] if the stream yields an error status.
    /// - [`Error::DeadlineExceeded`] if the deadline passes first.
    /// - [`Error::ResourceExhausted`] if the chunk breaks the stream limits.
    pub async fn receive_next(&mut self) -> Result<Received> {
        if self.finished {
            return Ok(Received::EndOfStream);
        }

        let next = match self.deadline {
            Some(deadline) => timeout_at(deadline, self.inbound.next())
                .await
                .map_err(|_| Error::DeadlineExceeded)?,
            None => self.inbound.next().await,
        };

        match next {
            Some(Ok(chunk)) => {
                let images = chunk.images.len();
                self.accumulated.absorb(chunk, &self.limits)?;
                Ok(Received::Chunk { images })
            }
            Some(Err(status)) => Err(status.into()),
            None => {
                self.finished = true;
                Ok(Received::EndOfStream)
            }
        }
    }

    /// Receives until end-of-stream and returns the merged request.
    pub async fn drain(mut self) -> Result<AccumulatedRequest> {
        let mut _chunks = 0_usize;
        while let Received::Chunk { .. } = self.receive_next().await? {
            _chunks += 1;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Stream drained: {} chunks, {} images, {} bytes",
            _chunks,
            self.accumulated.len(),
            self.accumulated.payload_bytes()
        );

        Ok(self.accumulated)
    }

    /// Images merged so far.
    pub fn accumulated(&self) -> &AccumulatedRequest {
        &self.accumulated
    }
}
