//! Audio callback health monitor
//!
//! The engine runs on the real-time thread and must not log. It bumps atomic
//! counters here instead; a tokio task polls the counters and reports changes
//! through `tracing`.
//!
//! Tracked:
//! - callback invocations and irregular callback intervals
//! - outbound underruns (no block ready while the image is still streaming)
//! - inbound overflows (consumer queue full, captured block dropped)
//! - capture underruns (host delivered fewer input frames than a block)
//! - outbound blocks of the wrong shape (skipped, treated as underruns)
//! - forwards that found the spare block pool empty and had to allocate
//! - xruns reported by the host

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lock-free counters shared between the callback and the monitoring task
#[derive(Debug)]
pub struct CallbackMonitor {
    /// Monotonic reference for interval measurement
    start_time: Instant,

    /// Last callback time (nanoseconds since start_time)
    last_callback_ns: AtomicU64,

    callback_count: AtomicU64,
    irregular_intervals: AtomicU64,
    blocks_played: AtomicU64,
    blocks_forwarded: AtomicU64,
    underrun_count: AtomicU64,
    overflow_count: AtomicU64,
    capture_underrun_count: AtomicU64,
    xrun_count: AtomicU64,
    misshapen_blocks: AtomicU64,
    spare_misses: AtomicU64,

    /// Expected interval between callbacks (nanoseconds)
    expected_interval_ns: u64,

    /// Deviation beyond which an interval counts as irregular (nanoseconds)
    tolerance_ns: u64,
}

impl CallbackMonitor {
    /// Monitor for a stream running `block_size` frames per callback at `sample_rate`
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        let expected_interval_ns = if sample_rate == 0 {
            0
        } else {
            ((block_size as f64 / sample_rate as f64) * 1_000_000_000.0) as u64
        };
        // 20% of the block period
        let tolerance_ns = (expected_interval_ns as f64 * 0.20) as u64;

        debug!(
            "CallbackMonitor initialized: sample_rate={}, block_size={}, expected_interval={:.2}ms, tolerance={:.2}ms",
            sample_rate,
            block_size,
            expected_interval_ns as f64 / 1_000_000.0,
            tolerance_ns as f64 / 1_000_000.0
        );

        Self {
            start_time: Instant::now(),
            last_callback_ns: AtomicU64::new(0),
            callback_count: AtomicU64::new(0),
            irregular_intervals: AtomicU64::new(0),
            blocks_played: AtomicU64::new(0),
            blocks_forwarded: AtomicU64::new(0),
            underrun_count: AtomicU64::new(0),
            overflow_count: AtomicU64::new(0),
            capture_underrun_count: AtomicU64::new(0),
            xrun_count: AtomicU64::new(0),
            misshapen_blocks: AtomicU64::new(0),
            spare_misses: AtomicU64::new(0),
            expected_interval_ns,
            tolerance_ns,
        }
    }

    /// Record a callback invocation (call at the start of the callback)
    ///
    /// **REAL-TIME SAFE**: atomics only
    pub fn record_callback(&self) {
        let now_ns = self.start_time.elapsed().as_nanos() as u64;
        let last_ns = self.last_callback_ns.swap(now_ns, Ordering::Relaxed);
        self.callback_count.fetch_add(1, Ordering::Relaxed);

        // Skip first callback (no previous timestamp) and hosts driven as fast as possible
        if last_ns == 0 || self.expected_interval_ns == 0 {
            return;
        }

        let actual_interval_ns = now_ns.saturating_sub(last_ns);
        if actual_interval_ns.abs_diff(self.expected_interval_ns) > self.tolerance_ns {
            self.irregular_intervals.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// **REAL-TIME SAFE**
    pub fn record_block_played(&self) {
        self.blocks_played.fetch_add(1, Ordering::Relaxed);
    }

    /// **REAL-TIME SAFE**
    pub fn record_block_forwarded(&self) {
        self.blocks_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Outbound queue empty while output was expected
    ///
    /// **REAL-TIME SAFE**
    pub fn record_underrun(&self) {
        self.underrun_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Inbound queue full, captured block dropped
    ///
    /// **REAL-TIME SAFE**
    pub fn record_overflow(&self) {
        self.overflow_count.fetch_add(1, Ordering::Relaxed);
    }

    /// **REAL-TIME SAFE**
    pub fn record_capture_underrun(&self) {
        self.capture_underrun_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Outbound block did not match the session shape
    ///
    /// **REAL-TIME SAFE**
    pub fn record_misshapen_block(&self) {
        self.misshapen_blocks.fetch_add(1, Ordering::Relaxed);
    }

    /// **REAL-TIME SAFE**
    pub fn record_spare_miss(&self) {
        self.spare_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Host xrun notification
    pub fn record_xrun(&self) {
        self.xrun_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Current statistics
    pub fn stats(&self) -> CallbackStats {
        CallbackStats {
            callback_count: self.callback_count.load(Ordering::Relaxed),
            irregular_intervals: self.irregular_intervals.load(Ordering::Relaxed),
            blocks_played: self.blocks_played.load(Ordering::Relaxed),
            blocks_forwarded: self.blocks_forwarded.load(Ordering::Relaxed),
            underrun_count: self.underrun_count.load(Ordering::Relaxed),
            overflow_count: self.overflow_count.load(Ordering::Relaxed),
            capture_underrun_count: self.capture_underrun_count.load(Ordering::Relaxed),
            xrun_count: self.xrun_count.load(Ordering::Relaxed),
            misshapen_blocks: self.misshapen_blocks.load(Ordering::Relaxed),
            spare_misses: self.spare_misses.load(Ordering::Relaxed),
            expected_interval_ms: self.expected_interval_ns as f64 / 1_000_000.0,
        }
    }

    /// Spawn the polling task on `rt_handle`.
    ///
    /// Polls every 100ms and logs counter changes.
    ///
    /// **Returns:** Shutdown flag (set to true to stop monitoring)
    pub fn spawn_monitoring_task(self: Arc<Self>, rt_handle: tokio::runtime::Handle) -> Arc<AtomicBool> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let monitor = Arc::clone(&self);

        rt_handle.spawn(async move {
            let mut last = monitor.stats();
            debug!("CallbackMonitor: Monitoring task started");

            while !shutdown_clone.load(Ordering::Relaxed) {
                tokio::time::sleep(Duration::from_millis(100)).await;
                let stats = monitor.stats();

                if stats.underrun_count > last.underrun_count {
                    warn!(
                        "Outbound underrun: {} total (+{}), outputs kept their previous block",
                        stats.underrun_count,
                        stats.underrun_count - last.underrun_count
                    );
                }
                if stats.overflow_count > last.overflow_count {
                    warn!(
                        "Inbound queue full: {} captured blocks dropped (+{})",
                        stats.overflow_count,
                        stats.overflow_count - last.overflow_count
                    );
                }
                if stats.capture_underrun_count > last.capture_underrun_count {
                    warn!(
                        "Capture underrun: {} short input blocks (+{})",
                        stats.capture_underrun_count,
                        stats.capture_underrun_count - last.capture_underrun_count
                    );
                }
                if stats.misshapen_blocks > last.misshapen_blocks {
                    warn!(
                        "Skipped {} outbound blocks of the wrong shape (+{})",
                        stats.misshapen_blocks,
                        stats.misshapen_blocks - last.misshapen_blocks
                    );
                }
                if stats.spare_misses > last.spare_misses {
                    debug!("Spare block pool ran dry {} times", stats.spare_misses);
                }
                if stats.xrun_count > last.xrun_count {
                    warn!("Got an xrun: {} total", stats.xrun_count);
                }
                if stats.irregular_intervals >= last.irregular_intervals + 100 {
                    warn!(
                        "Audio callback irregular intervals: {} of {} callbacks",
                        stats.irregular_intervals, stats.callback_count
                    );
                    last.irregular_intervals = stats.irregular_intervals;
                }

                let irregular = last.irregular_intervals;
                last = stats;
                last.irregular_intervals = irregular;
            }

            info!("CallbackMonitor: Monitoring task stopped");
        });

        shutdown
    }
}

/// Callback statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CallbackStats {
    pub callback_count: u64,
    pub irregular_intervals: u64,
    pub blocks_played: u64,
    pub blocks_forwarded: u64,
    pub underrun_count: u64,
    pub overflow_count: u64,
    pub capture_underrun_count: u64,
    pub xrun_count: u64,
    pub misshapen_blocks: u64,
    pub spare_misses: u64,
    pub expected_interval_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let monitor = CallbackMonitor::new(48_000, 256);
        monitor.record_callback();
        monitor.record_callback();
        monitor.record_underrun();
        monitor.record_overflow();
        monitor.record_xrun();
        monitor.record_block_played();
        monitor.record_block_forwarded();
        monitor.record_capture_underrun();
        monitor.record_misshapen_block();
        monitor.record_spare_miss();

        let stats = monitor.stats();
        assert_eq!(stats.callback_count, 2);
        assert_eq!(stats.underrun_count, 1);
        assert_eq!(stats.overflow_count, 1);
        assert_eq!(stats.xrun_count, 1);
        assert_eq!(stats.blocks_played, 1);
        assert_eq!(stats.blocks_forwarded, 1);
        assert_eq!(stats.capture_underrun_count, 1);
        assert_eq!(stats.misshapen_blocks, 1);
        assert_eq!(stats.spare_misses, 1);
    }

    #[test]
    fn test_expected_interval() {
        let monitor = CallbackMonitor::new(48_000, 480);
        approx::assert_abs_diff_eq!(monitor.stats().expected_interval_ms, 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_unpaced_host_never_irregular() {
        let monitor = CallbackMonitor::new(0, 256);
        for _ in 0..10 {
            monitor.record_callback();
        }
        assert_eq!(monitor.stats().irregular_intervals, 0);
    }

    #[tokio::test]
    async fn test_monitoring_task_stops() {
        let monitor = Arc::new(CallbackMonitor::new(48_000, 256));
        let shutdown = Arc::clone(&monitor).spawn_monitoring_task(tokio::runtime::Handle::current());
        monitor.record_underrun();
        tokio::time::sleep(Duration::from_millis(150)).await;
        shutdown.store(true, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(monitor.stats().underrun_count, 1);
    }
}
