//! Test helper modules for imgbend bridge integration tests
//!
//! Provides reusable test infrastructure components:
//! - Harness: session wiring with the engine driven by the test
//! - Images: deterministic source images

pub mod harness;
pub mod images;

// Re-export commonly used types
pub use harness::{wait_for_queued, Harness};
pub use images::gradient;
