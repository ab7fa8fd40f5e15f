//! Real-time block engine
//!
//! [`Engine::process`] is invoked once per audio block by the host and is the
//! only place where the real-time and non-real-time sides touch. Per call:
//!
//! 1. Output path: pop one block from the outbound queue (non-blocking) and
//!    write it to the output ports. On an empty queue the outputs follow the
//!    configured [`UnderrunPolicy`].
//! 2. Input path: stack all input ports into one block.
//! 3. Control detection: `STREAM_END` closes the inbound queue and stops the
//!    engine; `STREAM_START` enables forwarding. Control blocks are never
//!    forwarded.
//! 4. Forwarding: while enabled, clamp negatives to zero and push the block to
//!    the inbound queue (non-blocking; a full queue drops the block).
//!
//! A block length different from the session block size stops the engine
//! before anything else happens.
//!
//! The engine never blocks and never logs. Forwarded blocks come from a spare
//! pool the consumer refills, so the callback only allocates when that pool
//! runs dry. Diagnostics go through [`CallbackMonitor`] counters.

use crate::playback::callback_monitor::CallbackMonitor;
use crate::playback::session::{EngineLink, SessionSignals, SessionSpec};
use crate::audio::io::BlockIo;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use imgbend_common::config::UnderrunPolicy;
use imgbend_common::protocol::{Control, ABORT_FILL};
use imgbend_common::Block;
use std::sync::Arc;

/// Engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Normal per-block processing
    Running,
    /// Stop transition done; waiting for the host to deregister the callback
    Stopping,
    /// Host confirmed the callback is no longer invoked
    Stopped,
}

/// What the host should do after a callback returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackControl {
    Continue,
    /// Deregister this callback; it must not be invoked again
    Quit,
}

/// Why the engine left `Running`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `STREAM_END` came back on the inputs
    StreamEnd,
    /// The host changed the callback length mid-session
    BlockSizeChanged { expected: usize, actual: usize },
    /// The host presented a different number of ports than the session needs
    PortCountChanged { expected: usize, inputs: usize, outputs: usize },
    /// Stop requested from outside the callback
    Requested,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::StreamEnd => write!(f, "end of stream received"),
            StopReason::BlockSizeChanged { expected, actual } => {
                write!(f, "blocksize changed from {} to {}, stopping", expected, actual)
            }
            StopReason::PortCountChanged { expected, inputs, outputs } => write!(
                f,
                "expected {} ports each way, host has {} inputs and {} outputs",
                expected, inputs, outputs
            ),
            StopReason::Requested => write!(f, "stop requested"),
        }
    }
}

/// Block-synchronous bridge between the audio ports and the session queues
#[derive(Debug)]
pub struct Engine {
    spec: SessionSpec,
    outbound: Receiver<Block>,
    inbound: Option<Sender<Block>>,
    spare: Receiver<Block>,
    signals: Arc<SessionSignals>,
    monitor: Arc<CallbackMonitor>,
    policy: UnderrunPolicy,
    state: EngineState,
    stop_reason: Option<StopReason>,
    /// Stacked input ports, reused every callback
    capture: Block,
    /// Between the start and end blocks on the output side
    streaming: bool,
}

impl Engine {
    pub fn new(link: EngineLink, monitor: Arc<CallbackMonitor>, policy: UnderrunPolicy) -> Self {
        let spec = link.spec;
        Self {
            spec,
            outbound: link.outbound,
            inbound: Some(link.inbound),
            spare: link.spare,
            signals: link.signals,
            monitor,
            policy,
            state: EngineState::Running,
            stop_reason: None,
            capture: Block::zeroed(spec.block_size, spec.channels),
            streaming: false,
        }
    }

    pub fn spec(&self) -> SessionSpec {
        self.spec
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn signals(&self) -> &Arc<SessionSignals> {
        &self.signals
    }

    /// True while the inbound queue is still open
    pub fn is_inbound_open(&self) -> bool {
        self.inbound.is_some()
    }

    /// Process one audio block
    pub fn process(&mut self, io: &mut dyn BlockIo) -> CallbackControl {
        if self.state != EngineState::Running {
            return CallbackControl::Quit;
        }
        self.monitor.record_callback();

        let frames = io.frames();
        if frames != self.spec.block_size {
            return self.stop(
                io,
                StopReason::BlockSizeChanged {
                    expected: self.spec.block_size,
                    actual: frames,
                },
            );
        }
        let channels = self.spec.channels;
        if io.input_ports() != channels || io.output_ports() != channels {
            let reason = StopReason::PortCountChanged {
                expected: channels,
                inputs: io.input_ports(),
                outputs: io.output_ports(),
            };
            return self.stop(io, reason);
        }

        self.play_next(io);

        for port in 0..channels {
            self.capture.write_channel(port, io.input(port));
        }

        match self.capture.control() {
            Some(Control::StreamEnd) => {
                self.close_inbound();
                return self.stop(io, StopReason::StreamEnd);
            }
            Some(Control::StreamStart) => {
                self.signals.enable_forwarding();
                return CallbackControl::Continue;
            }
            Some(Control::Abort) | None => {}
        }

        if self.signals.is_forwarding() {
            let mut block = self.take_spare();
            block.samples_mut().copy_from_slice(self.capture.samples());
            block.clamp_negative();
            self.forward(block);
        }

        CallbackControl::Continue
    }

    fn take_spare(&mut self) -> Block {
        let (frames, channels) = (self.spec.block_size, self.spec.channels);
        match self.spare.try_recv() {
            Ok(block) if block.has_shape(frames, channels) => block,
            _ => {
                self.monitor.record_spare_miss();
                Block::zeroed(frames, channels)
            }
        }
    }

    fn play_next(&mut self, io: &mut dyn BlockIo) {
        match self.outbound.try_recv() {
            Ok(block) if !block.has_shape(self.spec.block_size, self.spec.channels) => {
                // Never index into a block shaped for another session
                self.monitor.record_misshapen_block();
                self.monitor.record_underrun();
                self.apply_underrun_policy(io);
            }
            Ok(block) => {
                for port in 0..self.spec.channels {
                    block.read_channel(port, io.output_mut(port));
                }
                match block.control() {
                    Some(Control::StreamStart) => self.streaming = true,
                    Some(Control::StreamEnd) => self.streaming = false,
                    _ => {}
                }
                self.monitor.record_block_played();
            }
            Err(TryRecvError::Empty) => {
                if self.streaming {
                    self.monitor.record_underrun();
                }
                self.apply_underrun_policy(io);
            }
            Err(TryRecvError::Disconnected) => {
                self.apply_underrun_policy(io);
            }
        }
    }

    fn apply_underrun_policy(&self, io: &mut dyn BlockIo) {
        match self.policy {
            // Port buffers still hold the last block written
            UnderrunPolicy::RepeatLast => {}
            UnderrunPolicy::Silence => {
                for port in 0..io.output_ports() {
                    io.output_mut(port).fill(0.0);
                }
            }
        }
    }

    fn forward(&mut self, block: Block) {
        let Some(inbound) = self.inbound.as_ref() else {
            return;
        };
        match inbound.try_send(block) {
            Ok(()) => self.monitor.record_block_forwarded(),
            Err(TrySendError::Full(_)) => self.monitor.record_overflow(),
            // Consumer gone; nothing left to forward to
            Err(TrySendError::Disconnected(_)) => self.inbound = None,
        }
    }

    /// Close the inbound queue. Dropping the only sender closes it exactly once.
    fn close_inbound(&mut self) {
        self.inbound.take();
    }

    /// Stop transition: mark inputs with the abort fill, complete both sides,
    /// clear forwarding and close the inbound queue.
    ///
    /// Only the first call has any effect.
    pub fn stop(&mut self, io: &mut dyn BlockIo, reason: StopReason) -> CallbackControl {
        if self.state != EngineState::Running {
            return CallbackControl::Quit;
        }
        self.state = EngineState::Stopping;
        self.stop_reason = Some(reason);

        for port in 0..io.input_ports() {
            io.input_mut(port).fill(ABORT_FILL);
        }
        self.signals.set_output_complete();
        self.signals.set_input_complete();
        self.signals.clear_forwarding();
        self.close_inbound();

        CallbackControl::Quit
    }

    /// Host confirmation that the callback has been deregistered
    pub fn mark_stopped(&mut self) {
        if self.state == EngineState::Stopping {
            self.state = EngineState::Stopped;
        }
    }

    /// Stop without port access, for a host that is tearing down.
    ///
    /// Buffers may no longer be valid, so no abort fill is written.
    pub fn shutdown(&mut self) {
        if self.state == EngineState::Running {
            self.state = EngineState::Stopping;
            self.stop_reason = Some(StopReason::Requested);
        }
        self.signals.host_shutdown();
        self.signals.clear_forwarding();
        self.close_inbound();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::io::BufferIo;
    use crate::playback::session::{open_session, ConsumerLink, ProducerLink};
    use imgbend_common::protocol::{STREAM_END, STREAM_START};

    fn engine(policy: UnderrunPolicy) -> (ProducerLink, Engine, ConsumerLink, Arc<CallbackMonitor>) {
        let spec = SessionSpec {
            block_size: 4,
            channels: 1,
            outbound_depth: 8,
            inbound_depth: 8,
        };
        let (producer, link, consumer) = open_session(spec);
        let monitor = Arc::new(CallbackMonitor::new(0, 4));
        let engine = Engine::new(link, Arc::clone(&monitor), policy);
        (producer, engine, consumer, monitor)
    }

    #[test]
    fn test_block_written_to_outputs() {
        let (producer, mut engine, _consumer, monitor) = engine(UnderrunPolicy::RepeatLast);
        producer.outbound.send(Block::filled(4, 1, 0.25)).unwrap();
        let mut io = BufferIo::new(1, 4);
        assert_eq!(engine.process(&mut io), CallbackControl::Continue);
        assert_eq!(io.outputs()[0], vec![0.25; 4]);
        assert_eq!(monitor.stats().blocks_played, 1);
    }

    #[test]
    fn test_empty_queue_keeps_previous_output() {
        let (producer, mut engine, _consumer, _) = engine(UnderrunPolicy::RepeatLast);
        producer.outbound.send(Block::filled(4, 1, 0.5)).unwrap();
        let mut io = BufferIo::new(1, 4);
        engine.process(&mut io);
        engine.process(&mut io);
        assert_eq!(io.outputs()[0], vec![0.5; 4]);
    }

    #[test]
    fn test_silence_policy_zeroes_outputs() {
        let (producer, mut engine, _consumer, _) = engine(UnderrunPolicy::Silence);
        producer.outbound.send(Block::filled(4, 1, 0.5)).unwrap();
        let mut io = BufferIo::new(1, 4);
        engine.process(&mut io);
        engine.process(&mut io);
        assert_eq!(io.outputs()[0], vec![0.0; 4]);
    }

    #[test]
    fn test_underrun_counted_only_while_streaming() {
        let (producer, mut engine, _consumer, monitor) = engine(UnderrunPolicy::RepeatLast);
        let mut io = BufferIo::new(1, 4);
        engine.process(&mut io);
        assert_eq!(monitor.stats().underrun_count, 0);

        producer.outbound.send(Block::sentinel(Control::StreamStart, 4, 1)).unwrap();
        engine.process(&mut io);
        engine.process(&mut io);
        assert_eq!(monitor.stats().underrun_count, 1);
    }

    #[test]
    fn test_start_enables_forwarding_without_forwarding_itself() {
        let (_producer, mut engine, consumer, _) = engine(UnderrunPolicy::RepeatLast);
        let mut io = BufferIo::new(1, 4);

        io.set_input(0, &[0.3; 4]);
        engine.process(&mut io);
        assert!(consumer.inbound.try_recv().is_err(), "nothing forwarded before start");

        io.set_input(0, &[STREAM_START; 4]);
        engine.process(&mut io);
        assert!(engine.signals().is_forwarding());
        assert!(consumer.inbound.try_recv().is_err(), "start block is not forwarded");

        io.set_input(0, &[0.1, -0.4, 0.2, 0.3]);
        engine.process(&mut io);
        let block = consumer.inbound.try_recv().unwrap();
        assert_eq!(block.samples(), &[0.1, 0.0, 0.2, 0.3]);
    }

    #[test]
    fn test_end_closes_inbound_and_stops() {
        let (_producer, mut engine, consumer, _) = engine(UnderrunPolicy::RepeatLast);
        let mut io = BufferIo::new(1, 4);
        io.set_input(0, &[STREAM_START; 4]);
        engine.process(&mut io);

        // Mixed block: the end sentinel wins over the data around it
        io.set_input(0, &[0.2, STREAM_END, 0.3, 0.4]);
        assert_eq!(engine.process(&mut io), CallbackControl::Quit);
        assert_eq!(engine.state(), EngineState::Stopping);
        assert_eq!(engine.stop_reason(), Some(StopReason::StreamEnd));
        assert!(!engine.is_inbound_open());
        assert!(consumer.inbound.recv().is_err(), "end block is not forwarded and queue is closed");
        assert_eq!(io.inputs()[0], vec![ABORT_FILL; 4]);

        let signals = engine.signals();
        assert!(signals.is_output_complete());
        assert!(signals.is_input_complete());
        assert!(!signals.is_forwarding());
    }

    #[test]
    fn test_block_size_change_stops_immediately() {
        let (producer, mut engine, consumer, _) = engine(UnderrunPolicy::RepeatLast);
        producer.outbound.send(Block::filled(4, 1, 0.5)).unwrap();
        let mut io = BufferIo::new(1, 8);
        assert_eq!(engine.process(&mut io), CallbackControl::Quit);
        assert_eq!(
            engine.stop_reason(),
            Some(StopReason::BlockSizeChanged { expected: 4, actual: 8 })
        );
        assert_eq!(io.outputs()[0], vec![0.0; 8], "nothing played after a size change");
        assert!(consumer.inbound.recv().is_err());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (_producer, mut engine, _consumer, _) = engine(UnderrunPolicy::RepeatLast);
        let mut io = BufferIo::new(1, 4);
        assert_eq!(engine.stop(&mut io, StopReason::Requested), CallbackControl::Quit);

        // Second stop must not repeat any side effect
        io.set_input(0, &[0.7; 4]);
        assert!(!engine.signals().set_output_complete());
        assert_eq!(engine.stop(&mut io, StopReason::StreamEnd), CallbackControl::Quit);
        assert_eq!(io.inputs()[0], vec![0.7; 4]);
        assert_eq!(engine.stop_reason(), Some(StopReason::Requested));

        engine.mark_stopped();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.process(&mut io), CallbackControl::Quit);
    }

    #[test]
    fn test_misshapen_block_is_an_underrun() {
        let (producer, mut engine, _consumer, monitor) = engine(UnderrunPolicy::Silence);
        let mut io = BufferIo::new(1, 4);
        io.output_mut(0).fill(0.9);

        // Two channels on a one-port session, then a short block
        producer.outbound.send(Block::filled(4, 2, 0.5)).unwrap();
        assert_eq!(engine.process(&mut io), CallbackControl::Continue);
        assert_eq!(io.outputs()[0], vec![0.0; 4]);

        producer.outbound.send(Block::filled(2, 1, 0.5)).unwrap();
        assert_eq!(engine.process(&mut io), CallbackControl::Continue);
        assert_eq!(io.outputs()[0], vec![0.0; 4]);

        let stats = monitor.stats();
        assert_eq!(stats.misshapen_blocks, 2);
        assert_eq!(stats.underrun_count, 2);
        assert_eq!(stats.blocks_played, 0);
        assert_eq!(engine.state(), EngineState::Running);
    }

    #[test]
    fn test_forwarding_reuses_spare_blocks() {
        let (_producer, mut engine, consumer, monitor) = engine(UnderrunPolicy::RepeatLast);
        let mut io = BufferIo::new(1, 4);
        io.set_input(0, &[STREAM_START; 4]);
        engine.process(&mut io);

        let spares = consumer.recycle.len();
        io.set_input(0, &[0.5; 4]);
        engine.process(&mut io);
        let block = consumer.inbound.try_recv().unwrap();
        assert_eq!(block.samples(), &[0.5; 4]);
        assert_eq!(engine.spare.len(), spares - 1);

        consumer.recycle.try_send(block).unwrap();
        assert_eq!(engine.spare.len(), spares);
        assert_eq!(monitor.stats().spare_misses, 0);
    }

    #[test]
    fn test_empty_spare_pool_still_forwards() {
        let (_producer, mut engine, consumer, monitor) = engine(UnderrunPolicy::RepeatLast);
        while engine.spare.try_recv().is_ok() {}

        let mut io = BufferIo::new(1, 4);
        io.set_input(0, &[STREAM_START; 4]);
        engine.process(&mut io);
        io.set_input(0, &[0.25; 4]);
        engine.process(&mut io);

        assert_eq!(consumer.inbound.try_recv().unwrap().samples(), &[0.25; 4]);
        assert_eq!(monitor.stats().spare_misses, 1);
    }

    #[test]
    fn test_full_inbound_drops_block() {
        let spec = SessionSpec {
            block_size: 2,
            channels: 1,
            outbound_depth: 1,
            inbound_depth: 1,
        };
        let (_producer, link, consumer) = open_session(spec);
        let monitor = Arc::new(CallbackMonitor::new(0, 2));
        let mut engine = Engine::new(link, Arc::clone(&monitor), UnderrunPolicy::RepeatLast);
        let mut io = BufferIo::new(1, 2);
        io.set_input(0, &[STREAM_START; 2]);
        engine.process(&mut io);
        io.set_input(0, &[0.1; 2]);
        engine.process(&mut io);
        engine.process(&mut io);
        assert_eq!(monitor.stats().blocks_forwarded, 1);
        assert_eq!(monitor.stats().overflow_count, 1);
        assert_eq!(consumer.inbound.len(), 1);
    }

    #[test]
    fn test_shutdown_completes_without_touching_ports() {
        let (_producer, mut engine, consumer, _) = engine(UnderrunPolicy::RepeatLast);
        engine.shutdown();
        assert!(engine.signals().is_output_complete());
        assert!(engine.signals().is_input_complete());
        assert!(consumer.inbound.recv().is_err());
        assert_eq!(engine.state(), EngineState::Stopping);
    }
}
