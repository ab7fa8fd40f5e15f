//! Chunker / Reassembler integration tests
//!
//! Covers the round-trip law, block counts across many (length, block size)
//! pairs, and channel-count symmetry between the two sides.

use approx::assert_abs_diff_eq;
use imgbend_common::chunker::{block_count, Chunker};
use imgbend_common::pixels::{ChannelLayout, ImageDescriptor, PixelBuffer};
use imgbend_common::protocol::{Control, SCALE};
use imgbend_common::{Block, Error, Reassembler};

fn data_blocks(chunker: Chunker) -> Vec<Block> {
    chunker.filter(|b| b.control().is_none()).collect()
}

#[test]
fn test_round_trip_law_for_many_lengths() {
    for block_size in [1usize, 2, 3, 4, 7, 16] {
        for len in 0..=40usize {
            let samples: Vec<f32> = (0..len).map(|i| (i % 256) as f32 / SCALE).collect();
            let chunker = Chunker::new(samples.clone(), 1, block_size).unwrap();
            let blocks = data_blocks(chunker);

            assert_eq!(blocks.len(), block_count(len, block_size), "len={len} block={block_size}");
            assert!(blocks.iter().all(|b| b.frames() == block_size));

            let mut joined: Vec<f32> = blocks.into_iter().flat_map(Block::into_samples).collect();
            assert!(joined[len..].iter().all(|&s| s == 0.0), "padding must be zero");
            joined.truncate(len);
            assert_eq!(joined, samples);
        }
    }
}

#[test]
fn test_loopback_passthrough_ten_samples() {
    // [0.1, 0.2, ..., 1.0] with the last value capped below 1.0
    let samples: Vec<f32> = (1..=10).map(|i| (i as f32 / 10.0).min(255.0 / SCALE)).collect();
    let chunker = Chunker::new(samples.clone(), 1, 4).unwrap();
    assert_eq!(chunker.data_blocks(), 3);

    let mut reassembler = Reassembler::new(ImageDescriptor::new(10, 1, 1), ChannelLayout::Interleaved);
    for block in chunker {
        if block.control().is_none() {
            reassembler.push(&block).unwrap();
        }
    }
    let intensities = reassembler.finish_intensities().unwrap();
    assert_eq!(intensities.len(), 10);
    for (got, sent) in intensities.iter().zip(&samples) {
        assert_abs_diff_eq!(got / SCALE, *sent, epsilon = 1e-6);
    }
}

#[test]
fn test_image_round_trip_is_exact() {
    let data: Vec<u8> = (0..5 * 3 * 3).map(|i| (i * 7 % 256) as u8).collect();
    let image = PixelBuffer::new(ImageDescriptor::new(5, 3, 3), data).unwrap();

    for layout in [ChannelLayout::Interleaved, ChannelLayout::Split] {
        let chunker = Chunker::from_pixels(&image, layout, 4).unwrap();
        let mut reassembler = Reassembler::new(image.descriptor().clone(), layout);
        for block in data_blocks(chunker) {
            reassembler.push(&block).unwrap();
        }
        assert_eq!(reassembler.finish().unwrap(), image, "layout {:?}", layout);
    }
}

#[test]
fn test_split_layout_is_symmetric() {
    let image = PixelBuffer::new(ImageDescriptor::new(2, 2, 4), vec![9; 16]).unwrap();
    let chunker = Chunker::from_pixels(&image, ChannelLayout::Split, 2).unwrap();
    let reassembler = Reassembler::new(image.descriptor().clone(), ChannelLayout::Split);
    assert_eq!(chunker.channels(), 4);
    assert_eq!(chunker.channels(), reassembler.channels());
}

#[test]
fn test_mismatched_layouts_are_rejected() {
    let image = PixelBuffer::new(ImageDescriptor::new(2, 2, 3), vec![1; 12]).unwrap();
    let chunker = Chunker::from_pixels(&image, ChannelLayout::Interleaved, 4).unwrap();
    let mut reassembler = Reassembler::new(image.descriptor().clone(), ChannelLayout::Split);
    let first = data_blocks(chunker).into_iter().next().unwrap();
    assert!(matches!(
        reassembler.push(&first),
        Err(Error::ChannelMismatch { expected: 3, received: 1 })
    ));
}

#[test]
fn test_early_close_is_shape_mismatch() {
    let samples = vec![0.5; 10];
    let blocks = data_blocks(Chunker::new(samples, 1, 4).unwrap());
    let mut reassembler = Reassembler::new(ImageDescriptor::new(10, 1, 1), ChannelLayout::Interleaved);
    // Channel closed after two of three blocks
    for block in blocks.into_iter().take(2) {
        reassembler.push(&block).unwrap();
    }
    assert!(matches!(
        reassembler.finish(),
        Err(Error::ShapeMismatch { expected: 10, received: 8 })
    ));
}

#[test]
fn test_control_blocks_bracket_data() {
    let mut chunker = Chunker::new(vec![0.25; 4], 2, 2).unwrap();
    assert_eq!(chunker.next().unwrap().control(), Some(Control::StreamStart));
    assert_eq!(chunker.next().unwrap().control(), None);
    assert_eq!(chunker.next().unwrap().control(), Some(Control::StreamEnd));
    assert!(chunker.next().is_none());
    assert!(chunker.next().is_none());
}
