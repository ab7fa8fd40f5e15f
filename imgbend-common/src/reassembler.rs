//! Reassembler: received blocks -> pixel buffer
//!
//! Blocks are concatenated in arrival order, rescaled by [`SCALE`], truncated
//! to the destination's sample count and reshaped into its rows. Receiving
//! fewer samples than the destination needs is a [`Error::ShapeMismatch`],
//! never a silently short image.
//!
//! [`SCALE`]: crate::protocol::SCALE

use crate::block::Block;
use crate::error::{Error, Result};
use crate::pixels::{ChannelLayout, ImageDescriptor, PixelBuffer};
use crate::protocol::{self, SCALE};
use tracing::debug;

/// Accumulates blocks for one destination image
#[derive(Debug)]
pub struct Reassembler {
    descriptor: ImageDescriptor,
    channels: usize,
    received: Vec<f32>,
    blocks: usize,
}

impl Reassembler {
    /// Prepare to rebuild an image shaped like `descriptor`.
    ///
    /// `layout` must match the one the producer used; each pushed block is
    /// checked against the resulting channel count.
    pub fn new(descriptor: ImageDescriptor, layout: ChannelLayout) -> Self {
        let channels = layout.audio_channels(descriptor.bands);
        let expected = descriptor.sample_count();
        Self {
            descriptor,
            channels,
            received: Vec::with_capacity(expected),
            blocks: 0,
        }
    }

    /// Audio channel count every block must carry
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples needed to fill the destination
    pub fn expected_samples(&self) -> usize {
        self.descriptor.sample_count()
    }

    /// Samples received so far, padding included
    pub fn received_samples(&self) -> usize {
        self.received.len()
    }

    /// Blocks received so far
    pub fn received_blocks(&self) -> usize {
        self.blocks
    }

    /// True once enough samples arrived to fill the destination
    pub fn is_complete(&self) -> bool {
        self.received.len() >= self.expected_samples()
    }

    /// Append one block
    pub fn push(&mut self, block: &Block) -> Result<()> {
        if block.channels() != self.channels {
            return Err(Error::ChannelMismatch {
                expected: self.channels,
                received: block.channels(),
            });
        }
        self.received.extend_from_slice(block.samples());
        self.blocks += 1;
        Ok(())
    }

    fn truncated(mut self) -> Result<(ImageDescriptor, Vec<f32>)> {
        let expected = self.expected_samples();
        if self.received.len() < expected {
            return Err(Error::ShapeMismatch {
                expected,
                received: self.received.len(),
            });
        }
        debug!(
            "Reassembler: {} blocks, {} samples received, {} used",
            self.blocks,
            self.received.len(),
            expected
        );
        self.received.truncate(expected);
        Ok((self.descriptor, self.received))
    }

    /// Rescaled intensities (0.0..256.0), row-major, without 8-bit quantization
    pub fn finish_intensities(self) -> Result<Vec<f32>> {
        let (_, samples) = self.truncated()?;
        Ok(samples.into_iter().map(|s| s * SCALE).collect())
    }

    /// Rebuild the destination image, palette included
    pub fn finish(self) -> Result<PixelBuffer> {
        let (descriptor, samples) = self.truncated()?;
        let data: Vec<u8> = samples.into_iter().map(protocol::denormalize).collect();
        PixelBuffer::new(descriptor, data)
    }
}
