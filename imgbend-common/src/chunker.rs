//! Chunker: pixel samples -> fixed-size blocks
//!
//! Emits, in order: one `STREAM_START` block, every data block in row-major
//! scan order, one `STREAM_END` block. The tail of the last data block is
//! zero-filled. Closing the queue afterwards is the producer's job.
//!
//! The number of data blocks is always `ceil(frames / block_size)`, so no
//! source frame is ever dropped regardless of how the padding rounds.

use crate::block::Block;
use crate::error::{Error, Result};
use crate::pixels::{ChannelLayout, PixelBuffer};
use crate::protocol::{self, Control};
use tracing::debug;

/// Round `x` to the nearest multiple of `mul`, ties rounding up.
///
/// `mul` must be non-zero.
pub fn closest_multiple(x: usize, mul: usize) -> usize {
    let rem = x % mul;
    if 2 * rem < mul {
        x - rem
    } else {
        x + (mul - rem)
    }
}

/// Number of zero frames appended after `total` frames.
///
/// When rounding to the closest multiple would land below `total`, one more
/// block is added so the padded length always covers every source frame.
pub fn padding_len(total: usize, block_size: usize) -> usize {
    let closest = closest_multiple(total, block_size);
    if closest >= total {
        closest - total
    } else {
        closest + block_size - total
    }
}

/// Number of data blocks needed for `total` frames
pub fn block_count(total: usize, block_size: usize) -> usize {
    total.div_ceil(block_size)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Start,
    Data(usize),
    End,
    Done,
}

/// Lazy, single-pass block sequence over a normalized sample buffer
#[derive(Debug)]
pub struct Chunker {
    samples: Vec<f32>,
    channels: usize,
    block_size: usize,
    frames: usize,
    data_blocks: usize,
    stage: Stage,
}

impl Chunker {
    /// Build a chunker over frame-major samples.
    ///
    /// # Errors
    /// - `InvalidBlockSize` if `block_size` is zero
    /// - `InvalidPixels` if `samples` is not a whole number of `channels`-wide frames
    /// - `InvalidSample` for the first sample outside `[0.0, 1.0)`
    pub fn new(samples: Vec<f32>, channels: usize, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::InvalidBlockSize("block size must be non-zero".to_string()));
        }
        if channels == 0 || samples.len() % channels != 0 {
            return Err(Error::InvalidPixels(format!(
                "{} samples do not form whole {}-channel frames",
                samples.len(),
                channels
            )));
        }
        if let Some((index, &value)) = samples
            .iter()
            .enumerate()
            .find(|(_, &s)| !protocol::is_valid_data(s))
        {
            return Err(Error::InvalidSample { index, value });
        }

        let frames = samples.len() / channels;
        let data_blocks = block_count(frames, block_size);
        debug_assert_eq!(frames + padding_len(frames, block_size), data_blocks * block_size);

        debug!(
            "Chunker: {} frames x {} channels -> {} blocks of {} frames ({} padding frames)",
            frames,
            channels,
            data_blocks,
            block_size,
            padding_len(frames, block_size)
        );

        Ok(Self {
            samples,
            channels,
            block_size,
            frames,
            data_blocks,
            stage: Stage::Start,
        })
    }

    /// Chunk an image using `layout` to decide the audio channel count
    pub fn from_pixels(pixels: &PixelBuffer, layout: ChannelLayout, block_size: usize) -> Result<Self> {
        let channels = layout.audio_channels(pixels.bands());
        Self::new(pixels.normalized(), channels, block_size)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Source frames, before padding
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Data blocks emitted between the two control blocks
    pub fn data_blocks(&self) -> usize {
        self.data_blocks
    }

    /// Total blocks including both control blocks
    pub fn total_blocks(&self) -> usize {
        self.data_blocks + 2
    }

    fn data_block(&self, index: usize) -> Block {
        let width = self.block_size * self.channels;
        let start = index * width;
        let end = (start + width).min(self.samples.len());
        let mut block = Block::zeroed(self.block_size, self.channels);
        block.samples_mut()[..end - start].copy_from_slice(&self.samples[start..end]);
        block
    }
}

impl Iterator for Chunker {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        match self.stage {
            Stage::Start => {
                self.stage = if self.data_blocks > 0 { Stage::Data(0) } else { Stage::End };
                Some(Block::sentinel(Control::StreamStart, self.block_size, self.channels))
            }
            Stage::Data(index) => {
                let block = self.data_block(index);
                self.stage = if index + 1 < self.data_blocks {
                    Stage::Data(index + 1)
                } else {
                    Stage::End
                };
                Some(block)
            }
            Stage::End => {
                self.stage = Stage::Done;
                Some(Block::sentinel(Control::StreamEnd, self.block_size, self.channels))
            }
            Stage::Done => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.stage {
            Stage::Start => self.data_blocks + 2,
            Stage::Data(index) => self.data_blocks - index + 1,
            Stage::End => 1,
            Stage::Done => 0,
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunker {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_multiple_rounds_down_below_half() {
        assert_eq!(closest_multiple(9, 4), 8);
        assert_eq!(closest_multiple(16, 4), 16);
        assert_eq!(closest_multiple(11, 5), 10);
    }

    #[test]
    fn test_closest_multiple_tie_rounds_up() {
        assert_eq!(closest_multiple(10, 4), 12);
        assert_eq!(closest_multiple(3, 2), 4);
    }

    #[test]
    fn test_closest_multiple_rounds_up_above_half() {
        assert_eq!(closest_multiple(11, 4), 12);
        assert_eq!(closest_multiple(13, 5), 15);
    }

    #[test]
    fn test_padding_never_drops_frames() {
        for block in 1..=17 {
            for total in 0..=100 {
                let padded = total + padding_len(total, block);
                assert_eq!(padded, block_count(total, block) * block, "total={total} block={block}");
                assert!(padded >= total);
            }
        }
    }

    #[test]
    fn test_emission_order() {
        let chunker = Chunker::new(vec![0.5; 10], 1, 4).unwrap();
        assert_eq!(chunker.len(), 5);
        let blocks: Vec<Block> = chunker.collect();
        assert_eq!(blocks.len(), 5);
        assert_eq!(blocks[0].control(), Some(Control::StreamStart));
        assert!(blocks[1..4].iter().all(|b| b.control().is_none()));
        assert_eq!(blocks[4].control(), Some(Control::StreamEnd));
    }

    #[test]
    fn test_tail_is_zero_filled() {
        let blocks: Vec<Block> = Chunker::new(vec![0.5; 5], 1, 4).unwrap().collect();
        assert_eq!(blocks[2].samples(), &[0.5, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_empty_buffer_emits_only_control() {
        let blocks: Vec<Block> = Chunker::new(Vec::new(), 2, 4).unwrap().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].control(), Some(Control::StreamStart));
        assert_eq!(blocks[1].control(), Some(Control::StreamEnd));
    }

    #[test]
    fn test_rejects_negative_sample() {
        let err = Chunker::new(vec![0.1, -0.2, 0.3], 1, 2).unwrap_err();
        assert!(matches!(err, Error::InvalidSample { index: 1, .. }));
    }

    #[test]
    fn test_rejects_out_of_range_sample() {
        assert!(matches!(
            Chunker::new(vec![1.0], 1, 2),
            Err(Error::InvalidSample { index: 0, .. })
        ));
    }

    #[test]
    fn test_rejects_zero_block_size_and_ragged_frames() {
        assert!(matches!(Chunker::new(vec![0.1], 1, 0), Err(Error::InvalidBlockSize(_))));
        assert!(matches!(Chunker::new(vec![0.1; 5], 2, 4), Err(Error::InvalidPixels(_))));
    }

    #[test]
    fn test_multichannel_blocks_hold_whole_frames() {
        let samples: Vec<f32> = (0..12).map(|i| i as f32 / 16.0).collect();
        let blocks: Vec<Block> = Chunker::new(samples.clone(), 3, 2).unwrap().collect();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[1].channels(), 3);
        assert_eq!(blocks[1].samples(), &samples[0..6]);
        assert_eq!(blocks[2].samples(), &samples[6..12]);
    }
}
