//! Fixed-size multi-channel sample blocks
//!
//! A [`Block`] is the unit exchanged once per audio callback. Samples are stored
//! frame-major (`[f0c0, f0c1, f1c0, f1c1, ...]`), matching the row-major layout
//! of a pixel buffer so chunking is a plain slice copy.

use crate::protocol::{self, Control};

/// One block of `frames` frames with `channels` samples each
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    channels: usize,
    frames: usize,
    samples: Vec<f32>,
}

impl Block {
    /// Block with every sample set to `value`
    pub fn filled(frames: usize, channels: usize, value: f32) -> Self {
        Self {
            channels,
            frames,
            samples: vec![value; frames * channels],
        }
    }

    /// Silent block
    pub fn zeroed(frames: usize, channels: usize) -> Self {
        Self::filled(frames, channels, 0.0)
    }

    /// Uniform sentinel block for a control event
    pub fn sentinel(control: Control, frames: usize, channels: usize) -> Self {
        Self::filled(frames, channels, control.value())
    }

    /// Wrap frame-major samples.
    ///
    /// Returns `None` when the sample count is not a whole number of frames.
    pub fn from_interleaved(samples: Vec<f32>, channels: usize) -> Option<Self> {
        if channels == 0 || samples.len() % channels != 0 {
            return None;
        }
        Some(Self {
            channels,
            frames: samples.len() / channels,
            samples,
        })
    }

    /// Stack per-port buffers into one block (outer index = channel).
    ///
    /// All ports must have the same length.
    pub fn from_channels(ports: &[&[f32]]) -> Option<Self> {
        let frames = ports.first().map(|p| p.len())?;
        if ports.iter().any(|p| p.len() != frames) {
            return None;
        }
        let mut block = Self::zeroed(frames, ports.len());
        for (ch, port) in ports.iter().enumerate() {
            block.write_channel(ch, port);
        }
        Some(block)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// True if the block is `frames` long with `channels` samples per frame
    pub fn has_shape(&self, frames: usize, channels: usize) -> bool {
        self.frames == frames && self.channels == channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Sentinel classification of this block
    pub fn control(&self) -> Option<Control> {
        protocol::classify(&self.samples)
    }

    /// Zero every negative sample
    pub fn clamp_negative(&mut self) {
        protocol::clamp_negative(&mut self.samples);
    }

    /// Copy channel `channel` into a port buffer.
    ///
    /// Copies `min(port.len(), frames)` samples; the rest of `port` is left as is.
    ///
    /// # Panics
    /// If `channel` is not below [`Block::channels`].
    pub fn read_channel(&self, channel: usize, port: &mut [f32]) {
        for (dst, frame) in port.iter_mut().zip(self.samples.chunks_exact(self.channels)) {
            *dst = frame[channel];
        }
    }

    /// Overwrite channel `channel` from a port buffer
    pub fn write_channel(&mut self, channel: usize, port: &[f32]) {
        let channels = self.channels;
        for (frame, &src) in self.samples.chunks_exact_mut(channels).zip(port) {
            frame[channel] = src;
        }
    }
}
