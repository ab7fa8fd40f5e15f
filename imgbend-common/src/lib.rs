//! # imgbend Common Library
//!
//! Shared, audio-free code for the imgbend image/audio bridge:
//! - In-band sentinel protocol (control codes carried inside the sample stream)
//! - Block and pixel buffer types
//! - Chunker (pixels -> fixed-size blocks) and Reassembler (blocks -> pixels)
//! - Configuration loading

pub mod block;
pub mod chunker;
pub mod config;
pub mod error;
pub mod pixels;
pub mod protocol;
pub mod reassembler;

pub use block::Block;
pub use chunker::Chunker;
pub use error::{Error, Result};
pub use pixels::{ChannelLayout, ImageDescriptor, PixelBuffer};
pub use protocol::Control;
pub use reassembler::Reassembler;
