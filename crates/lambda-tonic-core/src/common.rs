pub mod error;
pub mod types;

pub use error::{Error, Result};

/// Generated message types, client and server bindings for `lambda.proto`.
pub mod proto {
    tonic::include_proto!("lambda");

    /// Encoded descriptor set for `lambda.proto`, registered with the gRPC
    /// reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("lambda_descriptor");

    impl core::fmt::Display for JobDescriptor {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            write!(f, "{}@{}", self.name, self.version)
        }
    }
}
