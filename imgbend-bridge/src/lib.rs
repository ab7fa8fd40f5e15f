//! # imgbend bridge library
//!
//! Streams the pixels of an image out through real-time audio outputs and
//! rebuilds an image from what comes back on the inputs.
//!
//! **Architecture:** a block-synchronous engine runs inside the audio callback
//! and moves fixed-size blocks between the audio ports and two bounded queues.
//! A producer task chunks the source image into the outbound queue; a consumer
//! task reassembles the inbound queue into the destination image. The three
//! contexts share nothing but the queues and the session signals.

pub mod audio;
pub mod bridge;
pub mod config;
pub mod error;
pub mod image_io;
pub mod playback;

pub use bridge::{run_session, SessionReport};
pub use config::Settings;
pub use error::{Error, Result};
