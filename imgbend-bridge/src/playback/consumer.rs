//! Consumer task
//!
//! Drains the inbound queue into a [`Reassembler`] until the engine closes the
//! queue (or reports the input side complete and the queue runs dry), then
//! rebuilds the destination image. Drained blocks go back to the engine's
//! spare pool.

use crate::error::Result;
use crate::playback::session::ConsumerLink;
use crossbeam_channel::{RecvTimeoutError, Sender};
use imgbend_common::{Block, PixelBuffer, Reassembler};
use std::time::Duration;
use tracing::{debug, info};

/// How often an idle receive re-checks the input-complete signal
const RECV_POLL: Duration = Duration::from_millis(50);

/// Receive blocks until the session closes, then reassemble.
///
/// # Errors
/// - `ShapeMismatch` when fewer samples arrived than the image needs
/// - `ChannelMismatch` when a block carries the wrong channel count
pub fn run_consumer(mut reassembler: Reassembler, link: ConsumerLink) -> Result<PixelBuffer> {
    let ConsumerLink {
        inbound,
        recycle,
        signals,
    } = link;
    info!(
        "Consumer: listening for {} samples on {} channels",
        reassembler.expected_samples(),
        reassembler.channels()
    );

    loop {
        match inbound.recv_timeout(RECV_POLL) {
            Ok(block) => take_block(&mut reassembler, &recycle, block)?,
            Err(RecvTimeoutError::Timeout) => {
                // Host shutdown completes the input side without closing the queue
                if signals.is_input_complete() {
                    for block in inbound.try_iter() {
                        take_block(&mut reassembler, &recycle, block)?;
                    }
                    debug!("Consumer: input complete with queue still open");
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(
        "Consumer: stopped listening after {} blocks ({} samples)",
        reassembler.received_blocks(),
        reassembler.received_samples()
    );
    Ok(reassembler.finish()?)
}

fn take_block(reassembler: &mut Reassembler, recycle: &Sender<Block>, block: Block) -> Result<()> {
    reassembler.push(&block)?;
    // Pool full or engine gone: the block is simply dropped
    let _ = recycle.try_send(block);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::playback::session::{open_session, SessionSpec};
    use imgbend_common::pixels::{ChannelLayout, ImageDescriptor};
    use imgbend_common::Block;

    fn spec() -> SessionSpec {
        SessionSpec {
            block_size: 2,
            channels: 1,
            outbound_depth: 4,
            inbound_depth: 4,
        }
    }

    #[test]
    fn test_reassembles_until_closed() {
        let (_producer, engine, consumer) = open_session(spec());
        engine.inbound.send(Block::from_interleaved(vec![0.5, 0.25], 1).unwrap()).unwrap();
        engine.inbound.send(Block::from_interleaved(vec![0.125, 0.0], 1).unwrap()).unwrap();
        drop(engine);

        let reassembler = Reassembler::new(ImageDescriptor::new(3, 1, 1), ChannelLayout::Interleaved);
        let image = run_consumer(reassembler, consumer).unwrap();
        assert_eq!(image.data(), &[128, 64, 32]);
    }

    #[test]
    fn test_early_close_reports_shape_mismatch() {
        let (_producer, engine, consumer) = open_session(spec());
        engine.inbound.send(Block::zeroed(2, 1)).unwrap();
        drop(engine);

        let reassembler = Reassembler::new(ImageDescriptor::new(2, 2, 1), ChannelLayout::Interleaved);
        let err = run_consumer(reassembler, consumer).unwrap_err();
        assert!(matches!(
            err,
            Error::Common(imgbend_common::Error::ShapeMismatch { expected: 4, received: 2 })
        ));
    }

    #[test]
    fn test_drained_blocks_return_to_pool() {
        let (_producer, engine, consumer) = open_session(spec());
        let spares: Vec<Block> = engine.spare.try_iter().collect();
        for block in spares.into_iter().take(2) {
            engine.inbound.send(block).unwrap();
        }
        drop(engine.inbound);

        let reassembler = Reassembler::new(ImageDescriptor::new(4, 1, 1), ChannelLayout::Interleaved);
        run_consumer(reassembler, consumer).unwrap();
        assert_eq!(engine.spare.try_iter().count(), 2);
    }

    #[test]
    fn test_input_complete_ends_open_queue() {
        let (_producer, engine, consumer) = open_session(spec());
        engine.inbound.send(Block::zeroed(2, 1)).unwrap();
        engine.signals.host_shutdown();

        let reassembler = Reassembler::new(ImageDescriptor::new(2, 1, 1), ChannelLayout::Interleaved);
        let image = run_consumer(reassembler, consumer).unwrap();
        assert_eq!(image.data(), &[0, 0]);
        drop(engine);
    }
}
