//! In-process loopback host
//!
//! Drives the engine without an audio server: every output block comes back
//! on the inputs `latency_blocks` callbacks later, unchanged. Used by the
//! `--backend loopback` mode and by the end-to-end tests.
//!
//! Port buffers persist between callbacks, so an engine that leaves its
//! outputs untouched repeats the previous block exactly like a server that
//! reuses port memory.

use crate::audio::io::BufferIo;
use crate::playback::engine::{CallbackControl, Engine, StopReason};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Outcome of a loopback run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopbackReport {
    /// Engine invocations
    pub callbacks: u64,
    /// Reason the engine stopped, if it did
    pub stop_reason: Option<StopReason>,
    /// The run ended through the shutdown hook instead of the engine
    pub host_shutdown: bool,
}

/// Loopback host configuration
#[derive(Debug, Clone)]
pub struct LoopbackHost {
    channels: usize,
    block_size: usize,
    latency_blocks: usize,
    period: Option<Duration>,
    max_callbacks: Option<u64>,
    shutdown: Arc<AtomicBool>,
}

impl LoopbackHost {
    /// Unpaced host with one block of latency
    pub fn new(channels: usize, block_size: usize) -> Self {
        Self {
            channels,
            block_size,
            latency_blocks: 1,
            period: None,
            max_callbacks: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Blocks between an output and its return on the inputs (at least 1)
    pub fn with_latency(mut self, blocks: usize) -> Self {
        self.latency_blocks = blocks.max(1);
        self
    }

    /// Sleep one block period between callbacks, as a device at `sample_rate` would
    pub fn paced(mut self, sample_rate: u32) -> Self {
        if sample_rate > 0 {
            self.period = Some(Duration::from_secs_f64(
                self.block_size as f64 / sample_rate as f64,
            ));
        }
        self
    }

    /// Give up after `limit` callbacks, shutting the engine down
    pub fn with_max_callbacks(mut self, limit: u64) -> Self {
        self.max_callbacks = Some(limit);
        self
    }

    /// Setting the returned flag simulates the audio server going away
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn latency_blocks(&self) -> usize {
        self.latency_blocks
    }

    /// Invoke the engine until it quits or the host shuts down
    pub fn run(&self, engine: &mut Engine) -> LoopbackReport {
        let mut io = BufferIo::new(self.channels, self.block_size);
        let silence = vec![vec![0.0f32; self.block_size]; self.channels];
        let mut delay: VecDeque<Vec<Vec<f32>>> =
            (1..self.latency_blocks).map(|_| silence.clone()).collect();

        let mut report = LoopbackReport {
            callbacks: 0,
            stop_reason: None,
            host_shutdown: false,
        };

        debug!(
            "Loopback running: channels={}, block_size={}, latency={} blocks, paced={}",
            self.channels,
            self.block_size,
            self.latency_blocks,
            self.period.is_some()
        );

        loop {
            // Completion set from outside the callback means the session is being torn down
            if self.shutdown.load(Ordering::Acquire) || engine.signals().is_output_complete() {
                // Shutdown hook: complete both sides, touch no buffers
                engine.signals().host_shutdown();
                report.host_shutdown = true;
                break;
            }

            let control = engine.process(&mut io);
            report.callbacks += 1;
            if control == CallbackControl::Quit {
                engine.mark_stopped();
                break;
            }

            delay.push_back(io.outputs().to_vec());
            if let Some(returned) = delay.pop_front() {
                for (port, samples) in returned.iter().enumerate() {
                    io.set_input(port, samples);
                }
            }

            if self.max_callbacks.is_some_and(|limit| report.callbacks >= limit) {
                engine.shutdown();
                report.host_shutdown = true;
                break;
            }

            if let Some(period) = self.period {
                thread::sleep(period);
            }
        }

        report.stop_reason = engine.stop_reason();
        info!(
            "Loopback finished after {} callbacks ({})",
            report.callbacks,
            report
                .stop_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "host shutdown".to_string())
        );
        report
    }
}
