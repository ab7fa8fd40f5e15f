//! Producer task
//!
//! Owns the source image's block sequence, pushes it into the outbound queue
//! (blocking), closes the queue and then waits for the engine to report the
//! output side complete, so it never exits while the engine still expects data.

use crate::error::{Error, Result};
use crate::playback::session::{ProducerLink, SessionSignals};
use crossbeam_channel::{SendTimeoutError, Sender};
use imgbend_common::protocol::Control;
use imgbend_common::{Block, Chunker};
use std::time::Duration;
use tracing::{debug, info};

/// How often a blocked send re-checks whether the engine has stopped
const SEND_POLL: Duration = Duration::from_millis(50);

/// Outcome of a producer run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerReport {
    /// Blocks pushed, control blocks included
    pub blocks_sent: usize,
    /// Data blocks among them
    pub data_blocks: usize,
}

/// Send every block from `chunker`, close the queue, wait for output completion.
///
/// # Errors
/// - `ChannelMismatch` / `InvalidBlockSize` if the chunker does not fit the session
/// - `SessionAborted` if the engine stops or drops its queue before every block is sent
pub fn run_producer(chunker: Chunker, link: ProducerLink) -> Result<ProducerReport> {
    let ProducerLink {
        spec,
        outbound,
        signals,
    } = link;
    if chunker.channels() != spec.channels {
        return Err(imgbend_common::Error::ChannelMismatch {
            expected: spec.channels,
            received: chunker.channels(),
        }
        .into());
    }
    if chunker.block_size() != spec.block_size {
        return Err(imgbend_common::Error::InvalidBlockSize(format!(
            "chunker emits {} frames per block, session expects {}",
            chunker.block_size(),
            spec.block_size
        ))
        .into());
    }
    let data_blocks = chunker.data_blocks();
    info!(
        "Producer: streaming {} data blocks of {} frames x {} channels",
        data_blocks,
        chunker.block_size(),
        chunker.channels()
    );

    let mut blocks_sent = 0;
    for block in chunker {
        let control = block.control();
        send_block(&outbound, &signals, block)?;
        blocks_sent += 1;
        match control {
            Some(Control::StreamStart) => info!("Producer: sent start signal"),
            Some(Control::StreamEnd) => info!("Producer: sent end signal"),
            _ => {}
        }
    }

    // Close notification
    drop(outbound);
    debug!("Producer: outbound queue closed, waiting for output completion");

    signals.wait_output_complete();
    info!("Producer: output complete after {} blocks", blocks_sent);

    Ok(ProducerReport {
        blocks_sent,
        data_blocks,
    })
}

fn send_block(outbound: &Sender<Block>, signals: &SessionSignals, mut block: Block) -> Result<()> {
    loop {
        if signals.is_output_complete() {
            return Err(Error::SessionAborted(
                "engine stopped before the whole image was sent".to_string(),
            ));
        }
        match outbound.send_timeout(block, SEND_POLL) {
            Ok(()) => return Ok(()),
            Err(SendTimeoutError::Timeout(returned)) => block = returned,
            Err(SendTimeoutError::Disconnected(_)) => {
                return Err(Error::SessionAborted("engine dropped the outbound queue".to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::session::{open_session, SessionSpec};
    use std::sync::Arc;
    use std::thread;

    fn spec(depth: usize) -> SessionSpec {
        SessionSpec {
            block_size: 4,
            channels: 1,
            outbound_depth: depth,
            inbound_depth: depth,
        }
    }

    #[test]
    fn test_sends_all_then_waits_for_completion() {
        let (producer, engine, _consumer) = open_session(spec(16));
        let chunker = Chunker::new(vec![0.5; 10], 1, 4).unwrap();
        let signals = Arc::clone(&engine.signals);

        let handle = thread::spawn(move || run_producer(chunker, producer));
        thread::sleep(Duration::from_millis(30));
        assert!(!handle.is_finished(), "producer waits for output completion");

        let received: Vec<Block> = engine.outbound.try_iter().collect();
        assert_eq!(received.len(), 5);
        signals.set_output_complete();

        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.blocks_sent, 5);
        assert_eq!(report.data_blocks, 3);
        assert!(engine.outbound.recv().is_err(), "queue closed after the end block");
    }

    #[test]
    fn test_aborts_when_engine_stops_early() {
        let (producer, engine, _consumer) = open_session(spec(1));
        let chunker = Chunker::new(vec![0.5; 64], 1, 4).unwrap();
        engine.signals.set_output_complete();
        let err = run_producer(chunker, producer).unwrap_err();
        assert!(matches!(err, Error::SessionAborted(_)));
    }

    #[test]
    fn test_rejects_chunker_with_wrong_channels() {
        let (producer, engine, _consumer) = open_session(SessionSpec {
            channels: 2,
            ..spec(4)
        });
        let chunker = Chunker::new(vec![0.5; 8], 1, 4).unwrap();
        let err = run_producer(chunker, producer).unwrap_err();
        assert!(matches!(
            err,
            Error::Common(imgbend_common::Error::ChannelMismatch { expected: 2, received: 1 })
        ));
        assert!(engine.outbound.try_recv().is_err(), "nothing reaches the engine");
    }

    #[test]
    fn test_rejects_chunker_with_wrong_block_size() {
        let (producer, engine, _consumer) = open_session(spec(4));
        let chunker = Chunker::new(vec![0.5; 8], 1, 8).unwrap();
        let err = run_producer(chunker, producer).unwrap_err();
        assert!(matches!(err, Error::Common(imgbend_common::Error::InvalidBlockSize(_))));
        assert!(engine.outbound.try_recv().is_err());
    }

    #[test]
    fn test_aborts_when_queue_dropped() {
        let (producer, engine, _consumer) = open_session(spec(1));
        drop(engine);
        let chunker = Chunker::new(vec![0.5; 8], 1, 4).unwrap();
        assert!(matches!(run_producer(chunker, producer), Err(Error::SessionAborted(_))));
    }
}
