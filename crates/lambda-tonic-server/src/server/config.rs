use crate::server::settings::DeploymentSettings;
use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use lambda_tonic_core::types::{DEFAULT_MAX_ITEMS, DEFAULT_MAX_STREAM_BYTES, StreamLimits};

/// Runtime configuration for the `lambda-tonic-server` binary.
///
/// These settings bound how much a single client stream may buffer, how many
/// batches run inference concurrently, and how long calls and shutdown may
/// take. All values are parsed from CLI arguments or environment variables,
/// with defaults suitable for production.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "lambda-tonic-server",
    version,
    about = "A gRPC service aggregating client-streamed image batches for inference"
)]
pub struct CliArgs {
    /// Maximum number of images accepted across all chunks of one stream.
    ///
    /// A stream that goes past this limit fails with `RESOURCE_EXHAUSTED`
    /// and receives no response.
    ///
    /// Environment variable: `MAX_ITEMS`
    #[arg(long, env = "MAX_ITEMS", default_value_t = DEFAULT_MAX_ITEMS)]
    pub max_items: usize,

    /// Maximum sum of image payload bytes accepted across one stream.
    ///
    /// Every image of a stream is held in memory until the stream ends, so
    /// this is the per-call memory bound.
    ///
    /// Environment variable: `MAX_STREAM_BYTES`
    #[arg(long, env = "MAX_STREAM_BYTES", default_value_t = DEFAULT_MAX_STREAM_BYTES)]
    pub max_stream_bytes: usize,

    /// Maximum size of a single decoded chunk message.
    ///
    /// Environment variable: `MAX_MESSAGE_BYTES`
    #[arg(long, env = "MAX_MESSAGE_BYTES", default_value_t = 4 * 1024 * 1024)]
    pub max_message_bytes: usize,

    /// Number of worker tasks running inference batches concurrently.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 4)]
    pub num_workers: usize,

    /// Server-side deadline for a whole call, in seconds. `0` disables it.
    ///
    /// A shorter `grpc-timeout` sent by the client takes precedence.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_SECS`
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 0)]
    pub request_timeout_secs: u64,

    /// How long shutdown waits for in-flight streams to finish.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,

    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/lambda-uds.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    #[command(flatten)]
    pub deployment: DeploymentSettings,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub limits: StreamLimits,
    pub max_message_bytes: usize,
    pub num_workers: usize,
    pub request_timeout: Option<Duration>,
    pub shutdown_timeout: Duration,
    pub server_addr: String,
    pub uds: bool,
    pub deployment: DeploymentSettings,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.max_items == 0 {
            bail!("MAX_ITEMS must be greater than 0");
        }

        if args.max_stream_bytes == 0 || args.max_message_bytes == 0 {
            bail!("MAX_STREAM_BYTES and MAX_MESSAGE_BYTES must be greater than 0");
        }

        if args.max_message_bytes > args.max_stream_bytes {
            bail!(
                "MAX_MESSAGE_BYTES ({}) exceeds MAX_STREAM_BYTES ({})",
                args.max_message_bytes,
                args.max_stream_bytes
            );
        }

        let request_timeout =
            (args.request_timeout_secs > 0).then(|| Duration::from_secs(args.request_timeout_secs));

        Ok(Self {
            limits: StreamLimits {
                max_items: args.max_items,
                max_bytes: args.max_stream_bytes,
            },
            max_message_bytes: args.max_message_bytes,
            num_workers: args.num_workers,
            request_timeout,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            server_addr: args.server_addr,
            uds: args.uds,
            deployment: args.deployment,
        })
    }
}
