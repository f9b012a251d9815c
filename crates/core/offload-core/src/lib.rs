//! Offload Core - Shared types for the offloading simulator
//!
//! This crate defines the domain vocabulary used by the simulation engine
//! and by anything that consumes its output:
//! - Task and TaskType (what arrives)
//! - Site (where it runs: LOCAL, EDGE, CLOUD)
//! - ExecutionRecord (what happened)
//! - Error types

pub mod error;
pub mod record;
pub mod types;

pub use error::*;
pub use record::*;
pub use types::*;
