//! Headless audio backend
//!
//! Endpoints never render on their own. A [`NullProbe`] plays the part of
//! the host audio thread: each [`NullProbe::pump`] runs one callback on
//! every started endpoint and returns what was rendered. Used for tests and
//! for running without an audio device.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::backend::{
    AudioBackend, AudioEndpoint, DesiredFormat, GainStage, NegotiatedFormat, VolumeControl,
};
use super::error::{AudioError, AudioResult};
use crate::mixer::{RenderCallback, Renderer};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct NullShared {
    endpoints: Mutex<Vec<Weak<NullSlot>>>,
    opened: AtomicUsize,
    rejecting: AtomicBool,
    volume_calls: Mutex<Vec<f32>>,
}

/// Host-side state of one endpoint
struct NullSlot {
    callback: Mutex<Option<RenderCallback>>,
    running: AtomicBool,
}

/// Backend whose endpoints render only when pumped
pub struct NullBackend {
    shared: Arc<NullShared>,
    sample_rate: Option<u32>,
    channels: Option<u16>,
    endpoint_gain: bool,
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NullBackend {
    /// Grant every requested format, gain applied by the mixer
    pub fn new() -> Self {
        Self {
            shared: Arc::new(NullShared::default()),
            sample_rate: None,
            channels: None,
            endpoint_gain: false,
        }
    }

    /// Refuse every format until [`NullProbe::set_rejecting`] clears it
    pub fn rejecting() -> Self {
        let backend = Self::new();
        backend.shared.rejecting.store(true, Ordering::Relaxed);
        backend
    }

    /// Grant this rate whatever was requested
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Grant this channel count whatever was requested
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Leave samples unscaled and record endpoint volume changes instead
    pub fn with_endpoint_gain(mut self) -> Self {
        self.endpoint_gain = true;
        self
    }

    /// Host-side view of the endpoints this backend opens
    pub fn probe(&self) -> NullProbe {
        NullProbe {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl AudioBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn open(
        &self,
        desired: &DesiredFormat,
        renderer: Renderer,
    ) -> AudioResult<Box<dyn AudioEndpoint>> {
        if self.shared.rejecting.load(Ordering::Relaxed) {
            return Err(AudioError::UnsupportedFormat {
                sample_rate: desired.sample_rate,
                channels: desired.channels,
                reason: "null backend is rejecting formats".to_string(),
            });
        }

        let mut format = NegotiatedFormat::granted(desired);
        if let Some(rate) = self.sample_rate {
            format.sample_rate = rate;
        }
        if let Some(channels) = self.channels {
            format.channels = channels;
        }

        let gain = if self.endpoint_gain {
            GainStage::Endpoint(Arc::new(NullVolume {
                shared: Arc::clone(&self.shared),
            }))
        } else {
            GainStage::Mixer
        };

        let slot = Arc::new(NullSlot {
            callback: Mutex::new(Some(renderer.bind(format, gain))),
            running: AtomicBool::new(false),
        });
        {
            let mut endpoints = lock(&self.shared.endpoints);
            endpoints.retain(|e| e.strong_count() > 0);
            endpoints.push(Arc::downgrade(&slot));
        }
        self.shared.opened.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "Null endpoint opened: {} Hz, {} channels, {} frames",
            format.sample_rate,
            format.channels,
            format.buffer_frames
        );

        Ok(Box::new(NullEndpoint { format, slot }))
    }
}

struct NullEndpoint {
    format: NegotiatedFormat,
    slot: Arc<NullSlot>,
}

impl AudioEndpoint for NullEndpoint {
    fn format(&self) -> &NegotiatedFormat {
        &self.format
    }

    fn start(&mut self) -> AudioResult<()> {
        self.slot.running.store(true, Ordering::Release);
        Ok(())
    }

    fn pause(&mut self) -> AudioResult<()> {
        self.slot.running.store(false, Ordering::Release);
        Ok(())
    }
}

impl Drop for NullEndpoint {
    fn drop(&mut self) {
        self.slot.running.store(false, Ordering::Release);
        // Waits out a pump in progress on this endpoint
        lock(&self.slot.callback).take();
    }
}

struct NullVolume {
    shared: Arc<NullShared>,
}

impl VolumeControl for NullVolume {
    fn set_volume(&self, gain: f32) -> AudioResult<()> {
        lock(&self.shared.volume_calls).push(gain);
        Ok(())
    }
}

/// Drives and inspects the endpoints of a [`NullBackend`]
#[derive(Clone)]
pub struct NullProbe {
    shared: Arc<NullShared>,
}

impl NullProbe {
    fn slots(&self) -> Vec<Arc<NullSlot>> {
        lock(&self.shared.endpoints)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Run one callback of `len` bytes on every started endpoint
    ///
    /// Returns the rendered bytes, one entry per endpoint that ran.
    pub fn pump(&self, len: usize) -> Vec<Vec<u8>> {
        let mut rendered = Vec::new();
        for slot in self.slots() {
            if !slot.running.load(Ordering::Acquire) {
                continue;
            }
            let mut callback = lock(&slot.callback);
            if let Some(callback) = callback.as_mut() {
                let mut out = vec![0xA5; len];
                callback.render(&mut out);
                rendered.push(out);
            }
        }
        rendered
    }

    /// Run one callback sized to each endpoint's full device buffer
    pub fn pump_period(&self) -> Vec<Vec<u8>> {
        let mut rendered = Vec::new();
        for slot in self.slots() {
            if !slot.running.load(Ordering::Acquire) {
                continue;
            }
            let mut callback = lock(&slot.callback);
            if let Some(callback) = callback.as_mut() {
                let mut out = vec![0xA5; callback.format().buffer_bytes()];
                callback.render(&mut out);
                rendered.push(out);
            }
        }
        rendered
    }

    /// Endpoints opened so far, including closed ones
    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::Relaxed)
    }

    /// Endpoints opened and not yet closed
    pub fn live_endpoints(&self) -> usize {
        self.slots()
            .iter()
            .filter(|slot| lock(&slot.callback).is_some())
            .count()
    }

    /// Every gain passed to an endpoint volume control, in order
    pub fn volume_calls(&self) -> Vec<f32> {
        lock(&self.shared.volume_calls).clone()
    }

    pub fn set_rejecting(&self, rejecting: bool) {
        self.shared.rejecting.store(rejecting, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferHandle, PcmRingBuffer};
    use crate::mixer::SoundGenerator;

    #[test]
    fn test_pump_renders_only_started_endpoints() {
        let backend = NullBackend::new();
        let probe = backend.probe();
        let buffer = Arc::new(PcmRingBuffer::with_duration(44100, 2, 100));
        buffer.play();
        buffer.write(&[7; 16]);

        assert!(probe.pump(8).is_empty());

        let generator = SoundGenerator::new(BufferHandle::new(&buffer));
        generator.write_audio(30, &backend, 8192).unwrap();
        let rendered = probe.pump(8);
        assert_eq!(rendered, vec![vec![7; 8]]);

        generator.stop();
        assert!(probe.pump(8).is_empty());
    }

    #[test]
    fn test_forced_format() {
        let backend = NullBackend::new().with_sample_rate(48000);
        let probe = backend.probe();
        let buffer = Arc::new(PcmRingBuffer::with_duration(44100, 2, 100));
        buffer.play();

        let generator = SoundGenerator::new(BufferHandle::new(&buffer));
        generator.write_audio(30, &backend, 8192).unwrap();
        assert_eq!(generator.format().unwrap().sample_rate, 48000);
        assert_eq!(probe.pump_period()[0].len(), 2048 * 4);
    }

    #[test]
    fn test_channel_mismatch_is_refused() {
        let backend = NullBackend::new().with_channels(1);
        let probe = backend.probe();
        let buffer = Arc::new(PcmRingBuffer::with_duration(44100, 2, 100));
        buffer.play();

        let generator = SoundGenerator::new(BufferHandle::new(&buffer));
        let err = generator.write_audio(30, &backend, 8192).unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedFormat { channels: 1, .. }));
        assert!(!generator.is_running());
        assert_eq!(probe.live_endpoints(), 0);
    }

    #[test]
    fn test_rejecting_can_be_lifted() {
        let backend = NullBackend::rejecting();
        let probe = backend.probe();
        let buffer = Arc::new(PcmRingBuffer::with_duration(44100, 2, 100));
        buffer.play();
        let generator = SoundGenerator::new(BufferHandle::new(&buffer));

        assert!(generator.write_audio(30, &backend, 8192).is_err());
        probe.set_rejecting(false);
        assert!(generator.write_audio(30, &backend, 8192).unwrap());
        assert_eq!(probe.opened(), 1);
    }
}
