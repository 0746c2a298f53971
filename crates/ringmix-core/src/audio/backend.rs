//! Audio backend trait for platform-specific implementations
//!
//! Defines a common interface for the two host execution models:
//! - **Pull callback** (CPAL): the host hands the callback a byte region on a
//!   fixed schedule and the mixer scales samples in software.
//! - **Render on demand** (JACK): the host asks for N frames, the callback
//!   renders raw PCM and the endpoint applies volume itself.
//!
//! Both models drive the same [`RenderCallback`]; only the [`GainStage`]
//! differs. Dropping an endpoint is the synchronous close: once the drop
//! returns, the host will not invoke that endpoint's callback again.

use std::sync::Arc;

use crate::mixer::Renderer;

use super::config::{BackendKind, MixerConfig};
use super::error::{AudioError, AudioResult};

/// Bits per sample of the PCM produced by the emulated sound hardware
pub const BITS_PER_SAMPLE: u16 = 16;

/// Format requested when opening an endpoint for a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesiredFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Preferred device buffer size in frames
    pub buffer_frames: u32,
}

impl DesiredFormat {
    /// Size the device buffer to hold roughly `ms` milliseconds, rounded up
    /// to a power of two and capped at `max_frames`.
    pub fn for_buffer(sample_rate: u32, channels: u16, ms: u32, max_frames: u32) -> Self {
        let frames = (sample_rate as u64 * ms as u64 / 1000).max(1);
        let frames = frames.next_power_of_two().min(max_frames.max(1) as u64) as u32;
        Self {
            sample_rate,
            channels,
            buffer_frames: frames,
        }
    }
}

/// Format actually granted by the backend
///
/// Fixed for the lifetime of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Signed native-endian PCM
    pub bits_per_sample: u16,
    /// Byte value that encodes silence
    pub silence: u8,
    pub buffer_frames: u32,
}

impl NegotiatedFormat {
    /// Grant the desired format unchanged
    pub fn granted(desired: &DesiredFormat) -> Self {
        Self {
            sample_rate: desired.sample_rate,
            channels: desired.channels,
            bits_per_sample: BITS_PER_SAMPLE,
            silence: 0,
            buffer_frames: desired.buffer_frames,
        }
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.bits_per_sample as usize / 8
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.bytes_per_frame()
    }

    /// Bytes in one full device buffer
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_frames as usize * self.bytes_per_frame()
    }
}

/// Volume parameter exposed by endpoints that apply gain themselves
pub trait VolumeControl: Send + Sync {
    /// Set the linear output gain, `0.0..=1.0`
    fn set_volume(&self, gain: f32) -> AudioResult<()>;
}

/// Where the buffer's linear gain is applied
#[derive(Clone)]
pub enum GainStage {
    /// Samples are scaled while mixing into the host buffer
    Mixer,
    /// Samples are copied raw; the endpoint scales them
    Endpoint(Arc<dyn VolumeControl>),
}

impl std::fmt::Debug for GainStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GainStage::Mixer => write!(f, "Mixer"),
            GainStage::Endpoint(_) => write!(f, "Endpoint"),
        }
    }
}

/// An open host output endpoint (device, stream or client)
pub trait AudioEndpoint: Send {
    /// Format negotiated when the endpoint was opened
    fn format(&self) -> &NegotiatedFormat;

    /// Begin (or resume) invoking the render callback
    fn start(&mut self) -> AudioResult<()>;

    /// Stop invoking the render callback; the endpoint stays open
    fn pause(&mut self) -> AudioResult<()>;
}

/// Host audio facility that can open endpoints
pub trait AudioBackend: Send + Sync {
    /// Short backend name for diagnostics
    fn name(&self) -> &'static str;

    /// Negotiate a format and open a paused endpoint driving `renderer`
    ///
    /// Implementations bind the renderer to the negotiated format before
    /// handing it to the host thread.
    fn open(
        &self,
        desired: &DesiredFormat,
        renderer: Renderer,
    ) -> AudioResult<Box<dyn AudioEndpoint>>;
}

/// Create the backend selected by the configuration
///
/// Backends are chosen at build time through cargo features; selecting one
/// that was not compiled in fails with [`AudioError::BackendUnavailable`].
pub fn create_backend(config: &MixerConfig) -> AudioResult<Box<dyn AudioBackend>> {
    match config.backend {
        BackendKind::Null => Ok(Box::new(super::null_backend::NullBackend::new())),

        #[cfg(feature = "cpal-backend")]
        BackendKind::Cpal => Ok(Box::new(super::cpal_backend::CpalBackend::new(
            config.device.clone(),
        ))),

        #[cfg(all(target_os = "linux", feature = "jack-backend"))]
        BackendKind::Jack => Ok(Box::new(super::jack_backend::JackBackend::new(
            &config.client_name,
            config.auto_connect,
        ))),

        #[allow(unreachable_patterns)]
        other => Err(AudioError::BackendUnavailable(other.name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_frames_power_of_two() {
        // 44100 * 30 / 1000 = 1323 -> 2048
        let desired = DesiredFormat::for_buffer(44100, 2, 30, 8192);
        assert_eq!(desired.buffer_frames, 2048);
        assert_eq!(desired.sample_rate, 44100);
        assert_eq!(desired.channels, 2);
    }

    #[test]
    fn test_buffer_frames_capped() {
        let desired = DesiredFormat::for_buffer(48000, 2, 1000, 4096);
        assert_eq!(desired.buffer_frames, 4096);
    }

    #[test]
    fn test_zero_duration_still_requests_a_frame() {
        let desired = DesiredFormat::for_buffer(44100, 1, 0, 8192);
        assert_eq!(desired.buffer_frames, 1);
    }

    #[test]
    fn test_bytes_per_second() {
        let format = NegotiatedFormat::granted(&DesiredFormat::for_buffer(44100, 2, 30, 8192));
        assert_eq!(format.bytes_per_frame(), 4);
        assert_eq!(format.bytes_per_second(), 176_400);
        assert_eq!(format.buffer_bytes(), 2048 * 4);
        assert_eq!(format.silence, 0);
    }

    #[test]
    fn test_null_backend_always_available() {
        let backend = create_backend(&MixerConfig::headless()).unwrap();
        assert_eq!(backend.name(), "null");
    }
}
