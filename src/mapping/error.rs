//! Error definitions for the mapping and calibration pipeline.
//!
//! Text parsing is deliberately not represented here: a malformed mapping
//! string degrades to a partial [`crate::mapping::MappingParts`] instead of
//! failing. These variants cover the async plumbing around the engine.

use thiserror::Error;

/// Failures of the calibration engine and its channels.
#[derive(Debug, Error)]
pub enum MappingError {
    /// Session could not be constructed for the device.
    #[error("Initialization error: {0}")]
    InitializationError(String),

    /// A channel send or receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The engine task panicked or was lost.
    #[error("Task error: {0}")]
    TaskError(String),
}
