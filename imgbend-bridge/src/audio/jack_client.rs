//! JACK client host
//!
//! Registers a named JACK client with `output_N`/`input_N` audio ports, one
//! pair per session channel, and drives the engine from the JACK process
//! callback. The server's buffer size is the session block size.
//!
//! Port wiring is left to the user unless autoconnect is on; then our outputs
//! go to the ports matching `connect.input_pattern` and our inputs are fed by
//! the ports matching `connect.output_pattern`, in port order.
//!
//! Server notifications: an xrun is counted, a server shutdown completes both
//! session sides without touching any port buffer.

use crate::audio::io::BufferIo;
use crate::audio::ports::pair_ports;
use crate::error::{Error, Result};
use crate::playback::callback_monitor::CallbackMonitor;
use crate::playback::engine::{CallbackControl, Engine, StopReason};
use crate::playback::session::SessionSignals;
use imgbend_common::config::ConnectConfig;
use jack::{
    AsyncClient, AudioIn, AudioOut, Client, ClientOptions, ClientStatus, Control, Frames,
    NotificationHandler, Port, PortFlags, PortSpec, ProcessHandler, ProcessScope,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Registered but not yet active JACK client
pub struct JackHost {
    client: Client,
    inputs: Vec<Port<AudioIn>>,
    outputs: Vec<Port<AudioOut>>,
}

impl JackHost {
    /// Connect to the running server as `client_name` and register `channels`
    /// ports each way. Never starts a server.
    pub fn open(client_name: &str, channels: usize) -> Result<Self> {
        let (client, status) = Client::new(client_name, ClientOptions::NO_START_SERVER)
            .map_err(|e| Error::AudioHost(format!("Failed to open JACK client '{}': {:?}", client_name, e)))?;
        debug!("JACK client status: {:?}", status);
        if client.name() != client_name {
            warn!("JACK renamed the client to '{}'", client.name());
        }

        let mut inputs = Vec::with_capacity(channels);
        let mut outputs = Vec::with_capacity(channels);
        for n in 1..=channels {
            outputs.push(
                client
                    .register_port(&format!("output_{}", n), AudioOut::default())
                    .map_err(|e| Error::AudioHost(format!("Failed to register output_{}: {:?}", n, e)))?,
            );
            inputs.push(
                client
                    .register_port(&format!("input_{}", n), AudioIn::default())
                    .map_err(|e| Error::AudioHost(format!("Failed to register input_{}: {:?}", n, e)))?,
            );
        }

        info!(
            "JACK client '{}': {} port pair(s), {} frames at {} Hz",
            client.name(),
            channels,
            client.buffer_size(),
            client.sample_rate()
        );
        Ok(Self {
            client,
            inputs,
            outputs,
        })
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    pub fn sample_rate(&self) -> u32 {
        self.client.sample_rate() as u32
    }

    /// Server buffer size, which every process callback will use
    pub fn block_size(&self) -> usize {
        self.client.buffer_size() as usize
    }

    /// Register the engine as the process callback and activate the client
    pub fn start(self, engine: Engine, monitor: Arc<CallbackMonitor>) -> Result<ActiveJackHost> {
        let input_names = port_names(&self.inputs)?;
        let output_names = port_names(&self.outputs)?;
        let channels = self.inputs.len();
        let block_size = engine.spec().block_size;

        let notifications = Notifications {
            signals: Arc::clone(engine.signals()),
            monitor,
        };
        let process = ProcessBridge {
            engine,
            inputs: self.inputs,
            outputs: self.outputs,
            io: BufferIo::new(channels, block_size),
            registered: true,
        };

        let client = self
            .client
            .activate_async(notifications, process)
            .map_err(|e| Error::AudioHost(format!("Failed to activate JACK client: {:?}", e)))?;
        info!("JACK client activated");

        Ok(ActiveJackHost {
            client,
            input_names,
            output_names,
        })
    }
}

/// Active JACK client with the engine registered
pub struct ActiveJackHost {
    client: AsyncClient<Notifications, ProcessBridge>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl ActiveJackHost {
    /// Wire our ports to the processing loop's ports by pattern
    pub fn autoconnect(&self, connect: &ConnectConfig) -> Result<()> {
        let client = self.client.as_client();
        let audio = AudioIn::default().jack_port_type().to_string();
        let is_ours = |name: &String| self.input_names.contains(name) || self.output_names.contains(name);

        let sinks: Vec<String> = client
            .ports(None, Some(&audio), PortFlags::IS_INPUT)
            .into_iter()
            .filter(|name| !is_ours(name))
            .collect();
        let sources: Vec<String> = client
            .ports(None, Some(&audio), PortFlags::IS_OUTPUT)
            .into_iter()
            .filter(|name| !is_ours(name))
            .collect();

        for (ours, theirs) in pair_ports(&connect.input_pattern, &self.output_names, &sinks)? {
            client
                .connect_ports_by_name(&ours, &theirs)
                .map_err(|e| Error::AudioHost(format!("Failed to connect {} -> {}: {:?}", ours, theirs, e)))?;
            info!("Connected {} -> {}", ours, theirs);
        }
        for (ours, theirs) in pair_ports(&connect.output_pattern, &self.input_names, &sources)? {
            client
                .connect_ports_by_name(&theirs, &ours)
                .map_err(|e| Error::AudioHost(format!("Failed to connect {} -> {}: {:?}", theirs, ours, e)))?;
            info!("Connected {} -> {}", theirs, ours);
        }
        Ok(())
    }

    /// Deactivate the client and report why the engine stopped, if it did
    pub fn stop(self) -> Result<Option<StopReason>> {
        info!("Deactivating JACK client");
        let (_client, _notifications, process) = self
            .client
            .deactivate()
            .map_err(|e| Error::AudioHost(format!("Failed to deactivate JACK client: {:?}", e)))?;
        Ok(process.engine.stop_reason())
    }
}

fn port_names<PS: PortSpec>(ports: &[Port<PS>]) -> Result<Vec<String>> {
    ports
        .iter()
        .map(|port| {
            port.name()
                .map_err(|e| Error::AudioHost(format!("Failed to read JACK port name: {:?}", e)))
        })
        .collect()
}

/// Process callback: copies the ports through [`BufferIo`] around the engine.
///
/// JACK output buffers do not keep their contents between cycles, so the
/// outputs live in `io` and are copied out every cycle; that is what lets
/// the repeat-last underrun policy hold the previous block.
pub struct ProcessBridge {
    engine: Engine,
    inputs: Vec<Port<AudioIn>>,
    outputs: Vec<Port<AudioOut>>,
    io: BufferIo,
    registered: bool,
}

impl ProcessHandler for ProcessBridge {
    fn process(&mut self, _: &Client, ps: &ProcessScope) -> Control {
        if !self.registered {
            return Control::Quit;
        }

        self.io.set_frames(ps.n_frames() as usize);
        for (port, input) in self.inputs.iter().enumerate() {
            self.io.set_input(port, input.as_slice(ps));
        }

        let control = self.engine.process(&mut self.io);

        for (port, output) in self.outputs.iter_mut().enumerate() {
            let dst = output.as_mut_slice(ps);
            let src = &self.io.outputs()[port];
            let n = dst.len().min(src.len());
            dst[..n].copy_from_slice(&src[..n]);
        }

        if control == CallbackControl::Quit {
            self.engine.mark_stopped();
            self.registered = false;
            return Control::Quit;
        }
        Control::Continue
    }
}

/// Server notifications
pub struct Notifications {
    signals: Arc<SessionSignals>,
    monitor: Arc<CallbackMonitor>,
}

impl NotificationHandler for Notifications {
    unsafe fn shutdown(&mut self, status: ClientStatus, reason: &str) {
        error!("JACK shutdown! status: {:?}, reason: {}", status, reason);
        self.signals.host_shutdown();
    }

    fn xrun(&mut self, _: &Client) -> Control {
        self.monitor.record_xrun();
        Control::Continue
    }

    fn buffer_size(&mut self, _: &Client, size: Frames) -> Control {
        // The next process call sees the new size and stops the engine
        debug!("JACK buffer size now {}", size);
        Control::Continue
    }
}
