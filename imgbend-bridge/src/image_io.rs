//! Image codec boundary
//!
//! Decodes the input image into an 8-bit [`PixelBuffer`] and encodes the
//! reconstruction back to disk. The decoder resolves paletted images to
//! direct color on load, so the bands seen by the chunker are always L, LA,
//! RGB or RGBA. Deeper or floating-point images are converted to RGBA8.

use crate::error::{Error, Result};
use image::{ColorType, DynamicImage};
use imgbend_common::{ImageDescriptor, PixelBuffer};
use std::path::Path;
use tracing::{debug, info};

/// Decode `path` into an 8-bit pixel buffer
pub fn load(path: &Path) -> Result<PixelBuffer> {
    let image = image::open(path)?;
    let pixels = from_dynamic(image)?;
    info!(
        "Loaded {}: {}x{} with {} bands",
        path.display(),
        pixels.width(),
        pixels.height(),
        pixels.bands()
    );
    Ok(pixels)
}

/// Convert a decoded image to a pixel buffer, keeping 8-bit layouts as they are
pub fn from_dynamic(image: DynamicImage) -> Result<PixelBuffer> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let (bands, data) = match image {
        DynamicImage::ImageLuma8(buf) => (1, buf.into_raw()),
        DynamicImage::ImageLumaA8(buf) => (2, buf.into_raw()),
        DynamicImage::ImageRgb8(buf) => (3, buf.into_raw()),
        DynamicImage::ImageRgba8(buf) => (4, buf.into_raw()),
        other => {
            debug!("Converting {:?} image to RGBA8", other.color());
            (4, other.to_rgba8().into_raw())
        }
    };
    Ok(PixelBuffer::new(ImageDescriptor::new(width, height, bands), data)?)
}

/// Encode `pixels` to `path`; the format follows the file extension.
///
/// A palette attached to the descriptor is applied first.
pub fn save(path: &Path, pixels: PixelBuffer) -> Result<()> {
    let pixels = pixels.expand_palette();
    let color = color_type(pixels.bands())?;
    let (width, height) = (dimension(pixels.width())?, dimension(pixels.height())?);

    image::save_buffer(path, pixels.data(), width, height, color)?;
    info!("Saved {}x{} image to {}", width, height, path.display());
    Ok(())
}

fn color_type(bands: usize) -> Result<ColorType> {
    match bands {
        1 => Ok(ColorType::L8),
        2 => Ok(ColorType::La8),
        3 => Ok(ColorType::Rgb8),
        4 => Ok(ColorType::Rgba8),
        other => Err(Error::Common(imgbend_common::Error::InvalidPixels(format!(
            "No 8-bit color type with {} bands",
            other
        )))),
    }
}

fn dimension(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        Error::Common(imgbend_common::Error::InvalidPixels(format!(
            "Image dimension {} out of range",
            value
        )))
    })
}
