//! gRPC service implementation and worker coordination logic.
//!
//! This module contains the core logic for handling client-streamed gRPC
//! requests and delegating the drained batches to background worker tasks. It
//! implements the gRPC service and manages stream aggregation, error mapping,
//! and shutdown coordination.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`InferService`).

pub mod handler;
