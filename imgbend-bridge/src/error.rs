//! Error types for imgbend-bridge
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum Error {
    /// Chunking, reassembly and config errors from the common crate
    #[error(transparent)]
    Common(#[from] imgbend_common::Error),

    /// Configuration errors specific to the bridge
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio device / host errors
    #[error("Audio host error: {0}")]
    AudioHost(String),

    /// Image decoding or encoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The engine stopped before the session finished
    #[error("Session aborted: {0}")]
    SessionAborted(String),

    /// A producer or consumer task panicked or was cancelled
    #[error("Task error: {0}")]
    Task(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using the bridge Error
pub type Result<T> = std::result::Result<T, Error>;
