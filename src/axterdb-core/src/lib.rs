//! AxterDB Core Library
//!
//! This crate provides the vocabulary shared by the AxterDB client and the
//! local stub service, including:
//! - Column types, table schemas and rows
//! - The JSON envelopes exchanged with the service
//! - Client configuration
//! - Activity-log telemetry

pub mod config;
pub mod models;
pub mod telemetry;

// Re-export commonly used types
pub use config::ClientConfig;
pub use models::*;
