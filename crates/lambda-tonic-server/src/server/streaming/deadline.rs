//! Call deadline resolution.
//!
//! A call may carry a `grpc-timeout` header and the server may be configured
//! with its own request timeout. The effective deadline is the earlier of the
//! two, measured from the moment the call is accepted.

use core::time::Duration;
use tokio::time::Instant;
use tonic::metadata::MetadataMap;

pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Parses a `grpc-timeout` header value: up to 8 ASCII digits followed by one
/// of `H`, `M`, `S`, `m`, `u`, `n`. Returns `None` for anything else.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if !value.is_ascii() || value.len() < 2 || value.len() > 9 {
        return None;
    }

    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    match unit {
        "H" => Some(Duration::from_secs(amount * 60 * 60)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

/// Computes the deadline for a call accepted now.
///
/// A malformed `grpc-timeout` header is ignored rather than failing the call.
pub fn resolve_deadline(metadata: &MetadataMap, server_timeout: Option<Duration>) -> Option<Instant> {
    let client_timeout = metadata
        .get(GRPC_TIMEOUT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_grpc_timeout);

    let timeout = match (client_timeout, server_timeout) {
        (Some(client), Some(server)) => Some(client.min(server)),
        (client, server) => client.or(server),
    };

    // A timeout too large to represent is no deadline at all.
    timeout.and_then(|timeout| Instant::now().checked_add(timeout))
}
