//! Error types for the inference service.
//!
//! This module defines the central `Error` enum, which captures every way a
//! single `InferImage` call can fail. It implements `From<Error>` for
//! `tonic::Status` so handlers can return it with `?` and the client receives
//! one call-level status instead of a partial response.
//!
//! ## Error Cases
//! - `ChannelError`: An internal communication failure between the handler
//!   and the worker pool.
//! - `Transport`: The inbound stream broke before a clean end-of-stream.
//! - `DeadlineExceeded`: The call deadline elapsed before the response was
//!   ready.
//! - `ResourceExhausted`: The stream exceeded the configured item or byte
//!   limits.
//! - `Backend`: The compute backend failed on one image; the whole batch is
//!   abandoned.
//! - `ServiceShutdown`: A request arrived or was in flight while the service
//!   was shutting down.

use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the inference service.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// Internal channel send/receive failure (e.g., closed or full channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The inbound stream failed; `code` is the status tonic reported for it.
    #[error("Transport error ({code:?}): {message}")]
    Transport { code: Code, message: String },

    /// The caller's (or the server's) deadline elapsed.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// The stream carried more images or payload bytes than allowed.
    #[error("Resource limit exceeded: {reason}")]
    ResourceExhausted { reason: String },

    /// The compute backend rejected one image of the batch.
    #[error("Backend failed on image `{name}`: {reason}")]
    Backend { name: String, reason: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Error::Transport {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {}", context))
            }
            // A transport failure that somehow reports `Ok` must still fail
            // the call.
            Error::Transport { code: Code::Ok, message } => Status::unknown(message),
            Error::Transport { code, message } => Status::new(code, message),
            Error::DeadlineExceeded => Status::deadline_exceeded("Deadline exceeded"),
            Error::ResourceExhausted { reason } => Status::resource_exhausted(reason),
            Error::Backend { name, reason } => {
                Status::internal(format!("Inference failed for `{}`: {}", name, reason))
            }
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_keeps_inbound_code() {
        let err = Error::from(Status::cancelled("client went away"));
        let status = Status::from(err);
        assert_eq!(status.code(), Code::Cancelled);
        assert_eq!(status.message(), "client went away");
    }

    #[test]
    fn transport_error_never_maps_to_ok() {
        let err = Error::Transport {
            code: Code::Ok,
            message: "reset".to_string(),
        };
        assert_eq!(Status::from(err).code(), Code::Unknown);
    }

    #[test]
    fn status_codes() {
        let cases = [
            (Error::DeadlineExceeded, Code::DeadlineExceeded),
            (
                Error::ResourceExhausted {
                    reason: "too many".to_string(),
                },
                Code::ResourceExhausted,
            ),
            (
                Error::Backend {
                    name: "image-1".to_string(),
                    reason: "boom".to_string(),
                },
                Code::Internal,
            ),
            (
                Error::ChannelError {
                    context: "closed".to_string(),
                },
                Code::Internal,
            ),
            (Error::ServiceShutdown, Code::Unavailable),
        ];

        for (err, code) in cases {
            assert_eq!(Status::from(err).code(), code);
        }
    }

    #[test]
    fn backend_status_names_the_image() {
        let status = Status::from(Error::Backend {
            name: "image-7".to_string(),
            reason: "model not loaded".to_string(),
        });
        assert!(status.message().contains("image-7"));
        assert!(status.message().contains("model not loaded"));
    }
}
