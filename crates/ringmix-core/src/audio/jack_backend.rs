//! Native JACK audio backend for Linux
//!
//! Render-on-demand model: the JACK process thread asks for `n_frames` and
//! the mixer renders raw PCM. Volume is applied by the endpoint while
//! converting to JACK's f32 ports, so the mixer never rescales samples.
//!
//! Each sound buffer gets its own JACK client (`<prefix>_<n>`) with one
//! output port per channel. Works with PipeWire's JACK compatibility layer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   set_volume (atomic)   ┌─────────────────────┐
//! │  RenderCallback  │────────────────────────►│     JackVolume      │
//! │ (JACK RT thread) │                         │   (f32 bits, lock   │
//! └────────┬─────────┘                         │        free)        │
//!          │ i16 PCM                           └──────────┬──────────┘
//!          ▼                                              │ gain
//! ┌──────────────────┐                                    ▼
//! │  JackProcessor   │──── de-interleave, scale ────► out_1 .. out_N
//! └──────────────────┘
//! ```

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use jack::{AsyncClient, AudioOut, Client, ClientOptions, Control, Port, ProcessScope};

use super::backend::{
    AudioBackend, AudioEndpoint, DesiredFormat, GainStage, NegotiatedFormat, VolumeControl,
    BITS_PER_SAMPLE,
};
use super::config::MAX_BUFFER_SIZE;
use super::convert::deinterleave_scaled;
use super::error::{AudioError, AudioResult};
use crate::mixer::{RenderCallback, Renderer};

/// Backend that opens one JACK client per sound buffer
pub struct JackBackend {
    client_name: String,
    auto_connect: bool,
    next_client: AtomicUsize,
}

impl JackBackend {
    /// `client_name` prefixes every client; `auto_connect` wires the output
    /// ports to `system:playback_N` when an endpoint starts
    pub fn new(client_name: &str, auto_connect: bool) -> Self {
        Self {
            client_name: client_name.to_string(),
            auto_connect,
            next_client: AtomicUsize::new(1),
        }
    }
}

impl AudioBackend for JackBackend {
    fn name(&self) -> &'static str {
        "jack"
    }

    fn open(
        &self,
        desired: &DesiredFormat,
        renderer: Renderer,
    ) -> AudioResult<Box<dyn AudioEndpoint>> {
        let index = self.next_client.fetch_add(1, Ordering::Relaxed);
        let requested_name = format!("{}_{}", self.client_name, index);

        // JACK may rename if another client has the same name
        let (client, _status) = Client::new(&requested_name, ClientOptions::NO_START_SERVER)
            .map_err(|e| AudioError::ConfigError(format!("Failed to create JACK client: {}", e)))?;
        let client_name = client.name().to_string();

        let sample_rate = client.sample_rate() as u32;
        if sample_rate != desired.sample_rate {
            return Err(AudioError::UnsupportedFormat {
                sample_rate: desired.sample_rate,
                channels: desired.channels,
                reason: format!("JACK server runs at {}Hz", sample_rate),
            });
        }
        let buffer_frames = client.buffer_size();

        let mut ports = Vec::with_capacity(desired.channels as usize);
        for channel in 1..=desired.channels {
            let port = client
                .register_port(&format!("out_{}", channel), AudioOut::default())
                .map_err(|e| AudioError::ConfigError(format!("Failed to register port: {}", e)))?;
            ports.push(port);
        }

        let format = NegotiatedFormat {
            sample_rate,
            channels: desired.channels,
            bits_per_sample: BITS_PER_SAMPLE,
            silence: 0,
            buffer_frames,
        };
        log::info!(
            "JACK client '{}' created ({} channels, {}Hz, {} frames, ~{:.1}ms)",
            client_name,
            format.channels,
            sample_rate,
            buffer_frames,
            (buffer_frames as f32 / sample_rate as f32) * 1000.0
        );

        let volume = Arc::new(JackVolume::default());
        let callback = renderer.bind(format, GainStage::Endpoint(volume.clone()));
        let processor = JackProcessor {
            ports,
            callback,
            pcm: Vec::with_capacity(MAX_BUFFER_SIZE as usize * desired.channels as usize),
            volume,
        };

        Ok(Box::new(JackEndpoint {
            format,
            client_name,
            auto_connect: self.auto_connect,
            state: JackState::Inactive(client, processor),
        }))
    }
}

/// Endpoint-side gain, written by the render callback, read by the process handler
struct JackVolume {
    gain: AtomicU32,
}

impl Default for JackVolume {
    fn default() -> Self {
        Self {
            gain: AtomicU32::new(1.0f32.to_bits()),
        }
    }
}

impl JackVolume {
    fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }
}

impl VolumeControl for JackVolume {
    fn set_volume(&self, gain: f32) -> AudioResult<()> {
        if !(0.0..=1.0).contains(&gain) {
            return Err(AudioError::VolumeError(format!("gain {} out of range", gain)));
        }
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
        Ok(())
    }
}

/// JACK process handler
///
/// Owns the render callback exclusively; the PCM scratch is pre-allocated
/// for the largest JACK period.
struct JackProcessor {
    ports: Vec<Port<AudioOut>>,
    callback: RenderCallback,
    pcm: Vec<i16>,
    volume: Arc<JackVolume>,
}

impl jack::ProcessHandler for JackProcessor {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        let n_frames = ps.n_frames() as usize;
        let channels = self.ports.len();

        self.pcm.resize(n_frames * channels, 0);
        self.callback.render(bytemuck::cast_slice_mut(&mut self.pcm[..]));

        let gain = self.volume.gain();
        for (channel, port) in self.ports.iter_mut().enumerate() {
            deinterleave_scaled(&self.pcm, channels, channel, gain, port.as_mut_slice(ps));
        }

        Control::Continue
    }
}

/// JACK notification handler
struct JackNotifications;

impl jack::NotificationHandler for JackNotifications {
    fn sample_rate(&mut self, _client: &Client, srate: jack::Frames) -> Control {
        log::info!("JACK sample rate changed to: {}", srate);
        Control::Continue
    }

    fn xrun(&mut self, _client: &Client) -> Control {
        log::warn!("JACK xrun detected");
        Control::Continue
    }
}

enum JackState {
    Inactive(Client, JackProcessor),
    Active(AsyncClient<JackNotifications, JackProcessor>),
    /// Activation failed and took the client with it
    Closed,
}

/// One JACK client driving one sound buffer
///
/// Dropping it deactivates the client, which waits for a process cycle in
/// progress to finish.
struct JackEndpoint {
    format: NegotiatedFormat,
    client_name: String,
    auto_connect: bool,
    state: JackState,
}

impl JackEndpoint {
    fn connect_ports(&self, client: &Client) {
        for channel in 1..=self.format.channels {
            let ours = format!("{}:out_{}", self.client_name, channel);
            let theirs = format!("system:playback_{}", channel);
            if let Err(e) = client.connect_ports_by_name(&ours, &theirs) {
                log::warn!("Could not connect {} to {}: {}", ours, theirs, e);
            }
        }
    }
}

impl AudioEndpoint for JackEndpoint {
    fn format(&self) -> &NegotiatedFormat {
        &self.format
    }

    fn start(&mut self) -> AudioResult<()> {
        match std::mem::replace(&mut self.state, JackState::Closed) {
            JackState::Inactive(client, processor) => {
                let active = client
                    .activate_async(JackNotifications, processor)
                    .map_err(|e| {
                        AudioError::StreamPlayError(format!("Failed to activate JACK client: {}", e))
                    })?;
                if self.auto_connect {
                    self.connect_ports(active.as_client());
                }
                log::debug!("JACK client '{}' activated", self.client_name);
                self.state = JackState::Active(active);
                Ok(())
            }
            active @ JackState::Active(_) => {
                self.state = active;
                Ok(())
            }
            JackState::Closed => Err(AudioError::StreamPlayError(format!(
                "JACK client '{}' is closed",
                self.client_name
            ))),
        }
    }

    fn pause(&mut self) -> AudioResult<()> {
        match std::mem::replace(&mut self.state, JackState::Closed) {
            JackState::Active(active) => {
                let (client, _notifications, processor) = active.deactivate().map_err(|e| {
                    AudioError::StreamPauseError(format!(
                        "Failed to deactivate JACK client: {}",
                        e
                    ))
                })?;
                self.state = JackState::Inactive(client, processor);
                Ok(())
            }
            other => {
                self.state = other;
                Ok(())
            }
        }
    }
}

impl Drop for JackEndpoint {
    fn drop(&mut self) {
        if let JackState::Active(active) = std::mem::replace(&mut self.state, JackState::Closed) {
            if let Err(e) = active.deactivate() {
                log::warn!("Failed to deactivate JACK client '{}': {}", self.client_name, e);
            }
        }
        log::debug!("JACK client '{}' closed", self.client_name);
    }
}
