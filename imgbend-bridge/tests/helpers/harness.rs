//! Session wiring for tests that drive the engine themselves

use crossbeam_channel::Receiver;
use imgbend_bridge::playback::session::{ConsumerLink, ProducerLink};
use imgbend_bridge::playback::{open_session, CallbackMonitor, Engine, SessionSpec};
use imgbend_common::config::UnderrunPolicy;
use imgbend_common::Block;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// One session with the engine built but not registered with any host
pub struct Harness {
    pub producer: Option<ProducerLink>,
    pub consumer: Option<ConsumerLink>,
    pub engine: Engine,
    pub monitor: Arc<CallbackMonitor>,
    /// Extra receiver on the outbound queue, for observing its length
    pub outbound_probe: Receiver<Block>,
}

impl Harness {
    pub fn new(block_size: usize, channels: usize, depth: usize, policy: UnderrunPolicy) -> Self {
        let spec = SessionSpec {
            block_size,
            channels,
            outbound_depth: depth,
            inbound_depth: depth,
        };
        let (producer, link, consumer) = open_session(spec);
        let outbound_probe = link.outbound.clone();
        let monitor = Arc::new(CallbackMonitor::new(0, block_size));
        let engine = Engine::new(link, Arc::clone(&monitor), policy);
        Self {
            producer: Some(producer),
            consumer: Some(consumer),
            engine,
            monitor,
            outbound_probe,
        }
    }

    pub fn take_producer(&mut self) -> ProducerLink {
        self.producer.take().unwrap()
    }

    pub fn take_consumer(&mut self) -> ConsumerLink {
        self.consumer.take().unwrap()
    }
}

/// Block until `probe` holds `count` blocks (panics after 5s)
pub fn wait_for_queued(probe: &Receiver<Block>, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while probe.len() < count {
        assert!(Instant::now() < deadline, "producer never queued {} blocks", count);
        thread::sleep(Duration::from_millis(1));
    }
}
