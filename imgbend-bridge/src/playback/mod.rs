//! Block transport between the image tasks and the audio callback
//!
//! - `session`: queues and signals shared by the three contexts
//! - `engine`: the real-time per-block callback
//! - `producer` / `consumer`: the non-real-time tasks on either side
//! - `callback_monitor`: lock-free health counters for the callback

pub mod callback_monitor;
pub mod consumer;
pub mod engine;
pub mod producer;
pub mod session;

pub use callback_monitor::{CallbackMonitor, CallbackStats};
pub use engine::{CallbackControl, Engine, EngineState, StopReason};
pub use session::{open_session, SessionSignals, SessionSpec};
