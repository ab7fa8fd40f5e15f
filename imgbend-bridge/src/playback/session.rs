//! Session context shared by the producer, consumer and engine
//!
//! The only cross-context state: two bounded block queues and three
//! [`SessionSignals`] flags. Each context gets its own link at construction
//! time; nothing else is shared.
//!
//! Queue directions:
//! - outbound: producer -> engine (audio outputs)
//! - inbound: engine (audio inputs) -> consumer
//!
//! Dropping the last `Sender` of a queue closes it. The producer closes the
//! outbound queue after the end block; the engine closes the inbound queue on
//! `STREAM_END` or when it stops.
//!
//! A third queue carries spare blocks from the consumer back to the engine so
//! forwarding reuses preallocated blocks instead of allocating in the callback.

use crossbeam_channel::{bounded, Receiver, Sender};
use imgbend_common::Block;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Upper bound on preallocated spare blocks, on top of the two in flight
const MAX_SPARE_BLOCKS: usize = 32;

/// Set-once session flags, safe to touch from any context.
///
/// `input_complete` and `output_complete` never clear. `forward_enabled` can be
/// enabled once per session and is cleared only by the engine's stop transition.
#[derive(Debug, Default)]
pub struct SessionSignals {
    forward_enabled: AtomicBool,
    forward_latched: AtomicBool,
    input_complete: AtomicBool,
    output_complete: AtomicBool,
    wait_lock: Mutex<()>,
    wait_cv: Condvar,
}

impl SessionSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start relaying captured input. Returns false if forwarding was already
    /// enabled earlier in this session (the call has no effect then).
    pub fn enable_forwarding(&self) -> bool {
        if self.forward_latched.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.forward_enabled.store(true, Ordering::Release);
        true
    }

    /// Stop relaying captured input
    pub fn clear_forwarding(&self) {
        self.forward_enabled.store(false, Ordering::Release);
    }

    pub fn is_forwarding(&self) -> bool {
        self.forward_enabled.load(Ordering::Acquire)
    }

    /// Mark the capture side finished. Returns true on the first call only.
    pub fn set_input_complete(&self) -> bool {
        let newly_set = !self.input_complete.swap(true, Ordering::AcqRel);
        if newly_set {
            self.notify();
        }
        newly_set
    }

    /// Mark the playback side finished. Returns true on the first call only.
    pub fn set_output_complete(&self) -> bool {
        let newly_set = !self.output_complete.swap(true, Ordering::AcqRel);
        if newly_set {
            self.notify();
        }
        newly_set
    }

    pub fn is_input_complete(&self) -> bool {
        self.input_complete.load(Ordering::Acquire)
    }

    pub fn is_output_complete(&self) -> bool {
        self.output_complete.load(Ordering::Acquire)
    }

    /// Host audio engine went away: both sides are done, no buffers are touched
    pub fn host_shutdown(&self) {
        self.set_output_complete();
        self.set_input_complete();
    }

    fn notify(&self) {
        let _guard = self.wait_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.wait_cv.notify_all();
    }

    /// Block until `output_complete` is set
    pub fn wait_output_complete(&self) {
        let mut guard = self.wait_lock.lock().unwrap_or_else(|e| e.into_inner());
        while !self.is_output_complete() {
            guard = self.wait_cv.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Block until `output_complete` is set or `timeout` elapses.
    ///
    /// Returns whether the flag is set.
    pub fn wait_output_complete_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.wait_lock.lock().unwrap_or_else(|e| e.into_inner());
        while !self.is_output_complete() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .wait_cv
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
        true
    }
}

/// Shape and queue sizing for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSpec {
    /// Frames per block
    pub block_size: usize,
    /// Audio channels per block
    pub channels: usize,
    /// Outbound queue capacity in blocks
    pub outbound_depth: usize,
    /// Inbound queue capacity in blocks
    pub inbound_depth: usize,
}

impl SessionSpec {
    /// Spare blocks preallocated for forwarding
    pub fn spare_blocks(&self) -> usize {
        self.inbound_depth.min(MAX_SPARE_BLOCKS) + 2
    }
}

/// Producer end: blocking sends into the outbound queue
#[derive(Debug)]
pub struct ProducerLink {
    pub spec: SessionSpec,
    pub outbound: Sender<Block>,
    pub signals: Arc<SessionSignals>,
}

/// Engine end: non-blocking access to both queues
#[derive(Debug)]
pub struct EngineLink {
    pub spec: SessionSpec,
    pub outbound: Receiver<Block>,
    pub inbound: Sender<Block>,
    /// Blocks handed back by the consumer, ready to be filled again
    pub spare: Receiver<Block>,
    pub signals: Arc<SessionSignals>,
}

/// Consumer end: blocking receives from the inbound queue
#[derive(Debug)]
pub struct ConsumerLink {
    pub inbound: Receiver<Block>,
    /// Return path for drained blocks
    pub recycle: Sender<Block>,
    pub signals: Arc<SessionSignals>,
}

/// Create both queues and the signals, split into one link per context
pub fn open_session(spec: SessionSpec) -> (ProducerLink, EngineLink, ConsumerLink) {
    let signals = Arc::new(SessionSignals::new());
    let (out_tx, out_rx) = bounded(spec.outbound_depth);
    let (in_tx, in_rx) = bounded(spec.inbound_depth);
    let (spare_tx, spare_rx) = bounded(spec.spare_blocks());
    for _ in 0..spec.spare_blocks() {
        let _ = spare_tx.try_send(Block::zeroed(spec.block_size, spec.channels));
    }

    debug!(
        "Session opened: block_size={}, channels={}, outbound_depth={}, inbound_depth={}",
        spec.block_size, spec.channels, spec.outbound_depth, spec.inbound_depth
    );

    (
        ProducerLink {
            spec,
            outbound: out_tx,
            signals: Arc::clone(&signals),
        },
        EngineLink {
            spec,
            outbound: out_rx,
            inbound: in_tx,
            spare: spare_rx,
            signals: Arc::clone(&signals),
        },
        ConsumerLink {
            inbound: in_rx,
            recycle: spare_tx,
            signals,
        },
    )
}
