//! Server-side components of the pairwise reduction service.
//!
//! This module contains the building blocks necessary to run the streaming
//! gRPC server: per-stream session handling, the shared correlation store,
//! configuration, and telemetry setup.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration and validation.
//! - [`correlation`] - The process-wide key-to-pairing-state store.
//! - [`service`] - Core gRPC service implementation and stream plumbing.
//! - [`session`] - The per-stream state machine driving the store.
//! - [`telemetry`] - Tracing-based structured logging initialization and
//!   optional metrics.
//!
//! These components are wired together in the server's `main.rs` and used to
//! serve the `PairReducer` gRPC service defined in `pairwise-tonic-core`.

pub mod config;
pub mod correlation;
pub mod service;
pub mod session;
pub mod telemetry;
