//! Deterministic source images

use imgbend_common::{ImageDescriptor, PixelBuffer};

/// `width` x `height` image whose samples walk through every byte value
pub fn gradient(width: usize, height: usize, bands: usize) -> PixelBuffer {
    let data = (0..width * height * bands)
        .map(|i| ((i * 37 + i / 7) % 256) as u8)
        .collect();
    PixelBuffer::new(ImageDescriptor::new(width, height, bands), data).unwrap()
}
