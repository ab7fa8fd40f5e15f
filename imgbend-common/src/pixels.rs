//! Pixel buffers and image geometry
//!
//! A [`PixelBuffer`] is an 8-bit, row-major, band-interleaved image. The image
//! codec boundary produces one on load and consumes one on save; everything in
//! between only sees normalized samples.

use crate::error::{Error, Result};
use crate::protocol;
use serde::{Deserialize, Serialize};

/// RGB palette entry
pub type PaletteEntry = [u8; 3];

/// How image bands map onto audio channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelLayout {
    /// All bands flattened into one audio channel
    #[default]
    Interleaved,
    /// One audio channel per image band
    Split,
}

impl ChannelLayout {
    pub fn from_split_flag(split: bool) -> Self {
        if split {
            ChannelLayout::Split
        } else {
            ChannelLayout::Interleaved
        }
    }

    /// Number of audio ports needed for an image with `bands` bands
    pub fn audio_channels(self, bands: usize) -> usize {
        match self {
            ChannelLayout::Interleaved => 1,
            ChannelLayout::Split => bands,
        }
    }
}

/// Geometry and metadata of an image, without its pixels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub width: usize,
    pub height: usize,
    /// Samples per pixel (1 = L, 2 = LA, 3 = RGB, 4 = RGBA)
    pub bands: usize,
    /// Palette to reattach on reconstruction, if the source carried one
    pub palette: Option<Vec<PaletteEntry>>,
}

impl ImageDescriptor {
    pub fn new(width: usize, height: usize, bands: usize) -> Self {
        Self {
            width,
            height,
            bands,
            palette: None,
        }
    }

    pub fn with_palette(mut self, palette: Vec<PaletteEntry>) -> Self {
        self.palette = Some(palette);
        self
    }

    /// Total number of 8-bit samples in the image
    pub fn sample_count(&self) -> usize {
        self.width * self.height * self.bands
    }
}

/// An 8-bit image held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    descriptor: ImageDescriptor,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw pixel data; the length must match the descriptor
    pub fn new(descriptor: ImageDescriptor, data: Vec<u8>) -> Result<Self> {
        if descriptor.bands == 0 {
            return Err(Error::InvalidPixels("image has no bands".to_string()));
        }
        if data.len() != descriptor.sample_count() {
            return Err(Error::InvalidPixels(format!(
                "{}x{}x{} image needs {} samples, got {}",
                descriptor.width,
                descriptor.height,
                descriptor.bands,
                descriptor.sample_count(),
                data.len()
            )));
        }
        Ok(Self { descriptor, data })
    }

    pub fn descriptor(&self) -> &ImageDescriptor {
        &self.descriptor
    }

    pub fn width(&self) -> usize {
        self.descriptor.width
    }

    pub fn height(&self) -> usize {
        self.descriptor.height
    }

    pub fn bands(&self) -> usize {
        self.descriptor.bands
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Row `y` as a slice of `width * bands` samples
    pub fn row(&self, y: usize) -> &[u8] {
        let stride = self.descriptor.width * self.descriptor.bands;
        &self.data[y * stride..(y + 1) * stride]
    }

    /// Intensities mapped into the data range, row-major
    pub fn normalized(&self) -> Vec<f32> {
        self.data.iter().map(|&p| protocol::normalize(p)).collect()
    }

    /// Resolve palette indices into RGB.
    ///
    /// Only single-band images with a palette are expanded; anything else is
    /// returned unchanged. Indices past the end of the palette map to black.
    pub fn expand_palette(self) -> Self {
        let palette = match (&self.descriptor.palette, self.descriptor.bands) {
            (Some(palette), 1) => palette.clone(),
            _ => return self,
        };
        let mut rgb = Vec::with_capacity(self.data.len() * 3);
        for &index in &self.data {
            let entry = palette.get(index as usize).copied().unwrap_or([0, 0, 0]);
            rgb.extend_from_slice(&entry);
        }
        Self {
            descriptor: ImageDescriptor::new(self.descriptor.width, self.descriptor.height, 3),
            data: rgb,
        }
    }
}
