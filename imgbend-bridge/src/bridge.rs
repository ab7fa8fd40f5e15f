//! Session bootstrapping
//!
//! One session moves one image through the audio loop:
//! 1. Decode the input image and size the session (channels, block size; a
//!    JACK client is opened first because its server fixes the block size)
//! 2. Start the audio host with the engine registered
//! 3. Run the producer and consumer as blocking tasks until both finish
//! 4. Save the reconstruction and report
//!
//! The audio host lives on its own thread because cpal streams cannot move
//! between threads. That thread keeps the host running until the engine (or
//! the host) reports the output side complete.

#[cfg(feature = "jack")]
use crate::audio::JackHost;
use crate::audio::{DuplexHost, LoopbackHost};
use crate::config::{Backend, Settings, LOOPBACK_SAMPLE_RATE};
use crate::error::{Error, Result};
use crate::image_io;
use crate::playback::callback_monitor::{CallbackMonitor, CallbackStats};
use crate::playback::consumer::run_consumer;
use crate::playback::engine::{Engine, StopReason};
use crate::playback::producer::{run_producer, ProducerReport};
use crate::playback::session::{open_session, EngineLink, SessionSpec};
use imgbend_common::config::BridgeConfig;
use imgbend_common::{Chunker, Reassembler};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Summary of a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub output: PathBuf,
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub spec: SessionSpec,
    pub producer: ProducerReport,
    pub stop_reason: Option<StopReason>,
    pub stats: CallbackStats,
}

/// Host chosen for a session, opened already when it decides the block size
enum PreparedHost {
    Device,
    Loopback,
    #[cfg(feature = "jack")]
    Jack(JackHost),
}

/// Audio host running on its own thread
struct HostHandle {
    monitor: Arc<CallbackMonitor>,
    thread: thread::JoinHandle<Option<StopReason>>,
}

/// Run one image through the audio loop and save the result.
///
/// # Errors
/// - Image decode/encode failures
/// - Audio host setup failures
/// - `SessionAborted` when the engine stops for anything but the end block
/// - `ShapeMismatch` when the loop returned less data than the image needs
pub async fn run_session(settings: Settings) -> Result<SessionReport> {
    let Settings {
        input,
        output,
        layout,
        backend,
        config,
    } = settings;

    let source = blocking(move || image_io::load(&input)).await?;
    let descriptor = source.descriptor().clone();
    let channels = layout.audio_channels(descriptor.bands);

    let (prepared, block_size) = prepare_host(backend, &config, channels).await?;

    let chunker = Chunker::from_pixels(&source, layout, block_size)?;
    let reassembler = Reassembler::new(descriptor.clone(), layout);
    drop(source);

    let spec = SessionSpec {
        block_size,
        channels,
        outbound_depth: config.queue_depth,
        inbound_depth: config.inbound_depth,
    };
    info!(
        "Session: {} channel(s), {} frames per block, {} data blocks ({:?} layout)",
        channels,
        spec.block_size,
        chunker.data_blocks(),
        layout
    );

    let (producer_link, engine_link, consumer_link) = open_session(spec);
    let signals = Arc::clone(&producer_link.signals);

    let host = start_host(prepared, &config, engine_link).await?;
    let monitor_shutdown = Arc::clone(&host.monitor).spawn_monitoring_task(tokio::runtime::Handle::current());

    let interrupt = {
        let signals = Arc::clone(&signals);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Received Ctrl+C, shutting down the session");
                signals.host_shutdown();
            }
        })
    };

    let producer = tokio::task::spawn_blocking(move || run_producer(chunker, producer_link));
    let consumer = tokio::task::spawn_blocking(move || run_consumer(reassembler, consumer_link));
    let (produced, consumed) = tokio::join!(producer, consumer);

    // Host thread exits once output is complete, which both tasks waited for
    signals.host_shutdown();
    let HostHandle { monitor, thread } = host;
    let stop_reason = blocking(move || {
        thread
            .join()
            .map_err(|_| Error::Task("audio host thread panicked".to_string()))
    })
    .await?;

    interrupt.abort();
    monitor_shutdown.store(true, Ordering::Relaxed);
    let stats = monitor.stats();
    debug!("Callback stats: {:?}", stats);

    match stop_reason {
        Some(StopReason::StreamEnd) => info!("Engine stopped: {}", StopReason::StreamEnd),
        Some(reason) => {
            error!("Engine stopped early: {}", reason);
            return Err(Error::SessionAborted(reason.to_string()));
        }
        None => warn!("Audio host shut down before the end of stream"),
    }

    let producer = produced.map_err(|e| Error::Task(format!("producer: {}", e)))??;
    let pixels = consumed.map_err(|e| Error::Task(format!("consumer: {}", e)))??;

    let save_path = output.clone();
    blocking(move || image_io::save(&save_path, pixels)).await?;

    info!(
        "Session complete: {} blocks sent, {} played, {} forwarded, {} underruns, {} overflows, {} xruns",
        producer.blocks_sent,
        stats.blocks_played,
        stats.blocks_forwarded,
        stats.underrun_count,
        stats.overflow_count,
        stats.xrun_count
    );

    Ok(SessionReport {
        output,
        width: descriptor.width,
        height: descriptor.height,
        bands: descriptor.bands,
        spec,
        producer,
        stop_reason,
        stats,
    })
}

/// Pick the host and the session block size
async fn prepare_host(backend: Backend, config: &BridgeConfig, channels: usize) -> Result<(PreparedHost, usize)> {
    match backend {
        Backend::Device => Ok((PreparedHost::Device, config.block_size)),
        Backend::Loopback => Ok((PreparedHost::Loopback, config.block_size)),
        Backend::Jack => open_jack(config, channels).await,
    }
}

#[cfg(feature = "jack")]
async fn open_jack(config: &BridgeConfig, channels: usize) -> Result<(PreparedHost, usize)> {
    let client_name = config.client_name.clone();
    let host = blocking(move || JackHost::open(&client_name, channels)).await?;
    let block_size = host.block_size();
    if block_size != config.block_size {
        info!(
            "Using the JACK buffer size of {} frames instead of {}",
            block_size, config.block_size
        );
    }
    Ok((PreparedHost::Jack(host), block_size))
}

#[cfg(not(feature = "jack"))]
async fn open_jack(_config: &BridgeConfig, _channels: usize) -> Result<(PreparedHost, usize)> {
    Err(Error::AudioHost(
        "this build has no JACK support (enable the `jack` feature)".to_string(),
    ))
}

/// Start the prepared host with the engine registered. Resolves once the
/// host is running, or with the error that kept it from starting.
async fn start_host(prepared: PreparedHost, config: &BridgeConfig, link: EngineLink) -> Result<HostHandle> {
    let policy = config.underrun_policy;
    let spec = link.spec;

    match prepared {
        #[cfg(feature = "jack")]
        PreparedHost::Jack(host) => {
            let monitor = Arc::new(CallbackMonitor::new(host.sample_rate(), spec.block_size));
            let engine = Engine::new(link, Arc::clone(&monitor), policy);
            let signals = Arc::clone(engine.signals());
            info!("Audio host ready as '{}' at {} Hz", host.client_name(), host.sample_rate());

            let active = host.start(engine, Arc::clone(&monitor))?;
            if config.connect.autoconnect {
                active.autoconnect(&config.connect)?;
            }

            let thread = thread::Builder::new()
                .name("imgbend-jack".to_string())
                .spawn(move || {
                    signals.wait_output_complete();
                    match active.stop() {
                        Ok(reason) => reason,
                        Err(e) => {
                            warn!("{}", e);
                            None
                        }
                    }
                })?;
            Ok(HostHandle { monitor, thread })
        }
        PreparedHost::Loopback => {
            let monitor = Arc::new(CallbackMonitor::new(LOOPBACK_SAMPLE_RATE, spec.block_size));
            let mut engine = Engine::new(link, Arc::clone(&monitor), policy);
            let host = LoopbackHost::new(spec.channels, spec.block_size)
                .with_latency(config.capture_latency_blocks)
                .paced(LOOPBACK_SAMPLE_RATE);
            info!(
                "Using loopback host ({} blocks latency) as '{}'",
                host.latency_blocks(),
                config.client_name
            );
            let thread = thread::Builder::new()
                .name("imgbend-loopback".to_string())
                .spawn(move || host.run(&mut engine).stop_reason)?;
            Ok(HostHandle { monitor, thread })
        }
        PreparedHost::Device => {
            let (ready_tx, ready_rx) = oneshot::channel::<Result<Arc<CallbackMonitor>>>();
            let client_name = config.client_name.clone();
            let connect = config.connect.clone();

            let thread = thread::Builder::new()
                .name("imgbend-audio".to_string())
                .spawn(move || {
                    let signals = Arc::clone(&link.signals);
                    let mut host = match DuplexHost::open(&client_name, spec.channels, spec.block_size, &connect) {
                        Ok(host) => host,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return None;
                        }
                    };
                    info!("Audio host ready as '{}' at {} Hz", host.client_name(), host.sample_rate());
                    let monitor = Arc::new(CallbackMonitor::new(host.sample_rate(), spec.block_size));
                    let engine = Engine::new(link, Arc::clone(&monitor), policy);
                    if let Err(e) = host.start(engine, Arc::clone(&monitor)) {
                        let _ = ready_tx.send(Err(e));
                        return None;
                    }
                    let _ = ready_tx.send(Ok(monitor));

                    signals.wait_output_complete();
                    // Dropping the streams waits out a callback still in flight
                    if let Err(e) = host.stop() {
                        warn!("Failed to stop audio streams: {}", e);
                    }
                    host.stop_reason()
                })?;

            let monitor = ready_rx
                .await
                .map_err(|_| Error::AudioHost("audio thread exited during startup".to_string()))??;
            Ok(HostHandle { monitor, thread })
        }
    }
}

/// Run blocking work on the tokio blocking pool
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Task(e.to_string()))?
}
