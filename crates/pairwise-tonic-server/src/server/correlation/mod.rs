//! Correlation state shared across concurrently active streams.
//!
//! ## Submodules
//!
//! - [`store`] - The process-wide mapping from correlation key to pairing
//!   state, with atomic per-key transitions.

pub mod store;
