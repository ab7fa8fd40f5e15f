//! Audio hosts
//!
//! A host owns the audio ports and invokes [`Engine::process`] once per block.
//! Hosts:
//! - [`duplex::DuplexHost`]: cpal input and output streams on real devices
//! - `jack_client::JackHost`: a named JACK client (`jack` feature)
//! - [`loopback::LoopbackHost`]: in-process, feeds the outputs back to the inputs
//!
//! [`Engine::process`]: crate::playback::Engine::process

pub mod duplex;
pub mod io;
#[cfg(feature = "jack")]
pub mod jack_client;
pub mod loopback;
pub mod ports;

pub use duplex::DuplexHost;
pub use io::{BlockIo, BufferIo};
#[cfg(feature = "jack")]
pub use jack_client::{ActiveJackHost, JackHost};
pub use loopback::{LoopbackHost, LoopbackReport};
