//! Common error types for imgbend

use thiserror::Error;

/// Common result type for imgbend operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the chunking, reassembly and config layers
#[derive(Error, Debug)]
pub enum Error {
    /// Reassembled data does not cover the destination geometry
    #[error("Shape mismatch: expected {expected} samples, received {received}")]
    ShapeMismatch { expected: usize, received: usize },

    /// A data sample outside `[0.0, 1.0)` was handed to the chunker
    ///
    /// Negative values are reserved for control codes and must never be sent as data.
    #[error("Invalid data sample {value} at index {index} (must be in [0.0, 1.0))")]
    InvalidSample { index: usize, value: f32 },

    /// Producer and consumer disagree on the audio channel count
    #[error("Channel count mismatch: expected {expected}, received {received}")]
    ChannelMismatch { expected: usize, received: usize },

    /// Block size of zero or a block of the wrong length
    #[error("Invalid block size: {0}")]
    InvalidBlockSize(String),

    /// Pixel buffer geometry does not match its data
    #[error("Invalid pixel buffer: {0}")]
    InvalidPixels(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
