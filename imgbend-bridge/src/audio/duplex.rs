//! Duplex audio host using cpal
//!
//! One output stream and one input stream with N channels each and a fixed
//! buffer of `block_size` frames. The output stream's callback drives the
//! engine; the input stream hands captured samples over through a lock-free
//! ring buffer so the engine sees inputs and outputs in the same invocation.
//!
//! With autoconnect on, the patterns pick the devices by name.
//!
//! The error callback is the host's notification hook: a vanished device is a
//! server shutdown (both session sides complete, no buffers touched) and any
//! other stream error is counted as an xrun.

use crate::audio::io::BufferIo;
use crate::audio::ports::matches_pattern;
use crate::error::{Error, Result};
use crate::playback::callback_monitor::CallbackMonitor;
use crate::playback::engine::{CallbackControl, Engine, StopReason};
use crate::playback::session::SessionSignals;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, StreamError, SupportedStreamConfigRange};
use crossbeam_channel::{bounded, Receiver, Sender};
use imgbend_common::config::ConnectConfig;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Capture ring capacity in blocks
const CAPTURE_RING_BLOCKS: usize = 8;

/// cpal duplex host
pub struct DuplexHost {
    client_name: String,
    input_device: Device,
    output_device: Device,
    input_config: StreamConfig,
    output_config: StreamConfig,
    streams: Vec<Stream>,
    stop_slot: StopSlot,
}

/// Hands the engine's stop reason from the output callback to the host
/// thread. The callback side only ever does a non-blocking send.
#[derive(Debug)]
struct StopSlot {
    tx: Sender<StopReason>,
    rx: Receiver<StopReason>,
    reason: Option<StopReason>,
}

impl StopSlot {
    fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx, reason: None }
    }

    fn recorder(&self) -> Sender<StopReason> {
        self.tx.clone()
    }

    /// First reason recorded, if any
    fn reason(&mut self) -> Option<StopReason> {
        if self.reason.is_none() {
            self.reason = self.rx.try_recv().ok();
        }
        self.reason
    }
}

impl DuplexHost {
    /// Input and output device names on the selected host
    pub fn list_devices() -> Result<(Vec<String>, Vec<String>)> {
        let host = select_host();
        let inputs = host
            .input_devices()
            .map_err(|e| Error::AudioHost(format!("Failed to enumerate input devices: {}", e)))?
            .filter_map(|d| d.name().ok())
            .collect::<Vec<_>>();
        let outputs = host
            .output_devices()
            .map_err(|e| Error::AudioHost(format!("Failed to enumerate output devices: {}", e)))?
            .filter_map(|d| d.name().ok())
            .collect::<Vec<_>>();
        debug!("Found {} input and {} output devices", inputs.len(), outputs.len());
        Ok((inputs, outputs))
    }

    /// Open both devices for `channels` f32 channels at `block_size` frames.
    ///
    /// With autoconnect on, the output device is the first one matching
    /// `connect.input_pattern` (it feeds the processing loop's inputs) and the
    /// input device the first one matching `connect.output_pattern`. Without a
    /// match, or with autoconnect off, the host defaults are used.
    pub fn open(
        client_name: &str,
        channels: usize,
        block_size: usize,
        connect: &ConnectConfig,
    ) -> Result<Self> {
        let host = select_host();
        info!("Opening audio host {:?} as '{}'", host.id(), client_name);

        let output_pattern = connect.autoconnect.then_some(connect.input_pattern.as_str());
        let output_device = pick_device(
            host.output_devices()
                .map_err(|e| Error::AudioHost(format!("Failed to enumerate output devices: {}", e)))?,
            host.default_output_device(),
            output_pattern,
            "output",
        )?;

        let input_pattern = connect.autoconnect.then_some(connect.output_pattern.as_str());
        let input_device = pick_device(
            host.input_devices()
                .map_err(|e| Error::AudioHost(format!("Failed to enumerate input devices: {}", e)))?,
            host.default_input_device(),
            input_pattern,
            "input",
        )?;

        let sample_rate = output_device
            .default_output_config()
            .map_err(|e| Error::AudioHost(format!("Failed to query output config: {}", e)))?
            .sample_rate()
            .0;

        let output_config = pick_config(
            output_device
                .supported_output_configs()
                .map_err(|e| Error::AudioHost(format!("Failed to query output configs: {}", e)))?,
            channels,
            sample_rate,
            block_size,
        )
        .ok_or_else(|| {
            Error::AudioHost(format!(
                "Output device does not support {} f32 channels at {} Hz with {} frame blocks",
                channels, sample_rate, block_size
            ))
        })?;

        let input_config = pick_config(
            input_device
                .supported_input_configs()
                .map_err(|e| Error::AudioHost(format!("Failed to query input configs: {}", e)))?,
            channels,
            sample_rate,
            block_size,
        )
        .ok_or_else(|| {
            Error::AudioHost(format!(
                "Input device does not support {} f32 channels at {} Hz with {} frame blocks",
                channels, sample_rate, block_size
            ))
        })?;
        debug!(
            "Audio config: sample_rate={}, channels={}, buffer_size={:?}",
            output_config.sample_rate.0, output_config.channels, output_config.buffer_size
        );

        Ok(Self {
            client_name: client_name.to_string(),
            input_device,
            output_device,
            input_config,
            output_config,
            streams: Vec::new(),
            stop_slot: StopSlot::new(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.output_config.sample_rate.0
    }

    pub fn channels(&self) -> usize {
        self.output_config.channels as usize
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Why the engine stopped, once it has
    pub fn stop_reason(&mut self) -> Option<StopReason> {
        self.stop_slot.reason()
    }

    /// Register the engine with the output stream and start both streams
    pub fn start(&mut self, engine: Engine, monitor: Arc<CallbackMonitor>) -> Result<()> {
        info!("Starting duplex streams");

        let channels = self.channels();
        let block_size = engine.spec().block_size;
        let signals = Arc::clone(engine.signals());

        let ring = HeapRb::<f32>::new(block_size * channels * CAPTURE_RING_BLOCKS);
        let (mut capture_tx, mut capture_rx) = ring.split();

        let input_monitor = Arc::clone(&monitor);
        let input_stream = self
            .input_device
            .build_input_stream(
                &self.input_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Whole buffers only so frames never tear
                    if capture_tx.vacant_len() >= data.len() {
                        capture_tx.push_slice(data);
                    } else {
                        input_monitor.record_overflow();
                    }
                },
                stream_error_handler(Arc::clone(&signals), Arc::clone(&monitor), "input"),
                None,
            )
            .map_err(|e| Error::AudioHost(format!("Failed to build input stream: {}", e)))?;

        let mut engine = engine;
        let mut io = BufferIo::new(channels, block_size);
        let mut scratch = vec![0.0f32; block_size * channels];
        let mut registered = true;
        let mut primed = false;
        let output_monitor = Arc::clone(&monitor);
        let stop_tx = self.stop_slot.recorder();

        let output_stream = self
            .output_device
            .build_output_stream(
                &self.output_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !registered {
                        data.fill(0.0);
                        return;
                    }

                    let frames = data.len() / channels;
                    io.set_frames(frames);
                    let wanted = frames * channels;
                    if scratch.len() < wanted {
                        scratch.resize(wanted, 0.0);
                    }

                    let available = capture_rx.occupied_len() / channels * channels;
                    let taken = capture_rx.pop_slice(&mut scratch[..wanted.min(available)]);
                    if taken > 0 {
                        primed = true;
                    }
                    if primed && taken < wanted {
                        output_monitor.record_capture_underrun();
                    }
                    io.load_inputs_interleaved(&scratch[..taken]);

                    let control = engine.process(&mut io);
                    io.store_outputs_interleaved(data);

                    if control == CallbackControl::Quit {
                        engine.mark_stopped();
                        registered = false;
                        if let Some(reason) = engine.stop_reason() {
                            let _ = stop_tx.try_send(reason);
                        }
                    }
                },
                stream_error_handler(Arc::clone(&signals), Arc::clone(&monitor), "output"),
                None,
            )
            .map_err(|e| Error::AudioHost(format!("Failed to build output stream: {}", e)))?;

        input_stream
            .play()
            .map_err(|e| Error::AudioHost(format!("Failed to start input stream: {}", e)))?;
        output_stream
            .play()
            .map_err(|e| Error::AudioHost(format!("Failed to start output stream: {}", e)))?;

        self.streams = vec![input_stream, output_stream];
        info!("Duplex streams started");
        Ok(())
    }

    /// Pause and drop both streams
    pub fn stop(&mut self) -> Result<()> {
        if self.streams.is_empty() {
            return Ok(());
        }
        info!("Stopping duplex streams");
        for stream in self.streams.drain(..) {
            stream
                .pause()
                .map_err(|e| Error::AudioHost(format!("Failed to pause stream: {}", e)))?;
        }
        Ok(())
    }
}

impl Drop for DuplexHost {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn select_host() -> cpal::Host {
    cpal::default_host()
}

fn pick_device(
    devices: impl Iterator<Item = Device>,
    default: Option<Device>,
    pattern: Option<&str>,
    role: &str,
) -> Result<Device> {
    if let Some(pattern) = pattern {
        for device in devices {
            let Ok(name) = device.name() else { continue };
            if matches_pattern(pattern, &name) {
                info!("Connecting {} to '{}' (pattern '{}')", role, name, pattern);
                return Ok(device);
            }
        }
        warn!("No {} device matches '{}', falling back to default device", role, pattern);
    }

    let device = default
        .ok_or_else(|| Error::AudioHost(format!("No default {} device found", role)))?;
    info!(
        "Using default {} device: {}",
        role,
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(device)
}

/// First f32 config with exactly `channels` channels that covers the rate and block size
fn pick_config(
    ranges: impl Iterator<Item = SupportedStreamConfigRange>,
    channels: usize,
    sample_rate: u32,
    block_size: usize,
) -> Option<StreamConfig> {
    let block = u32::try_from(block_size).ok()?;
    ranges
        .filter(|r| r.sample_format() == SampleFormat::F32)
        .filter(|r| r.channels() as usize == channels)
        .filter(|r| r.min_sample_rate().0 <= sample_rate && sample_rate <= r.max_sample_rate().0)
        .find(|r| match r.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } => *min <= block && block <= *max,
            cpal::SupportedBufferSize::Unknown => true,
        })
        .map(|r| StreamConfig {
            channels: r.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Fixed(block),
        })
}

fn stream_error_handler(
    signals: Arc<SessionSignals>,
    monitor: Arc<CallbackMonitor>,
    direction: &'static str,
) -> impl FnMut(StreamError) + Send + 'static {
    move |err| match err {
        StreamError::DeviceNotAvailable => {
            error!("Audio {} device went away, shutting down the session", direction);
            signals.host_shutdown();
        }
        other => {
            monitor.record_xrun();
            debug!("Audio {} stream error: {}", direction, other);
        }
    }
}
