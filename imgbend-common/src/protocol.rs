//! In-band sentinel protocol
//!
//! Control transitions travel through the same block queues and audio ports as
//! pixel data. A control block is a block filled with one reserved negative
//! constant; data samples live in `[0.0, 1.0)` so the two ranges never overlap.
//!
//! Every control decision in the crate goes through [`classify`]. Any change to
//! [`SCALE`] must keep all data samples non-negative.
//!
//! These constants are the wire contract with unmodified counterparts and must
//! not change.

use serde::{Deserialize, Serialize};

/// Precedes the first data block; tells the engine to start forwarding capture
pub const STREAM_START: f32 = -2.0;

/// Follows the last data block; tells the engine to close the inbound queue and stop
pub const STREAM_END: f32 = -1.0;

/// Written by the engine into its own input buffers when it is forced to stop
pub const ABORT_FILL: f32 = -3.0;

/// Pixel intensities are divided by this on the way out and multiplied on the way back
pub const SCALE: f32 = 256.0;

/// Control event carried by a sentinel block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    StreamStart,
    StreamEnd,
    Abort,
}

impl Control {
    /// Sentinel value used to fill a block carrying this control event
    pub fn value(self) -> f32 {
        match self {
            Control::StreamStart => STREAM_START,
            Control::StreamEnd => STREAM_END,
            Control::Abort => ABORT_FILL,
        }
    }
}

impl std::fmt::Display for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Control::StreamStart => write!(f, "stream-start"),
            Control::StreamEnd => write!(f, "stream-end"),
            Control::Abort => write!(f, "abort"),
        }
    }
}

/// Classify a block of samples.
///
/// A block is a control block if *any* sample equals a reserved constant.
/// When several constants are present `StreamEnd` wins over `StreamStart`,
/// which wins over `Abort`. Returns `None` for data blocks.
///
/// Single pass, no allocation: safe to call from the real-time callback.
pub fn classify(samples: &[f32]) -> Option<Control> {
    let mut start = false;
    let mut abort = false;
    for &s in samples {
        if s == STREAM_END {
            return Some(Control::StreamEnd);
        }
        start |= s == STREAM_START;
        abort |= s == ABORT_FILL;
    }
    if start {
        Some(Control::StreamStart)
    } else if abort {
        Some(Control::Abort)
    } else {
        None
    }
}

/// Replace every negative sample with zero so control values never reach a reconstruction
pub fn clamp_negative(samples: &mut [f32]) {
    for s in samples.iter_mut() {
        if *s < 0.0 {
            *s = 0.0;
        }
    }
}

/// True if `sample` may be transported as data
pub fn is_valid_data(sample: f32) -> bool {
    (0.0..1.0).contains(&sample)
}

/// Map an 8-bit intensity into the data range
pub fn normalize(intensity: u8) -> f32 {
    intensity as f32 / SCALE
}

/// Map a received sample back to an 8-bit intensity (rounded, saturating)
pub fn denormalize(sample: f32) -> u8 {
    let scaled = (sample * SCALE).round();
    if scaled.is_nan() {
        0
    } else {
        scaled.clamp(0.0, 255.0) as u8
    }
}
