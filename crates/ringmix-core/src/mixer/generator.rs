//! One output endpoint per registered sound buffer
//!
//! A [`SoundGenerator`] opens its endpoint lazily, the first time the mixer
//! is pumped while the buffer is playing, and keeps it open until stopped.
//! Pausing the emulated buffer does not close the endpoint; the render
//! callback simply runs dry and pads with silence.

use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};

use basedrop::Shared;

use super::gc::gc_handle;
use super::info::SoundInfo;
use super::render::{GeneratorShared, Renderer};
use super::volume::linear_gain;
use crate::audio::{
    AudioBackend, AudioEndpoint, AudioError, AudioResult, DesiredFormat, NegotiatedFormat,
    BITS_PER_SAMPLE,
};
use crate::buffer::BufferHandle;

struct GeneratorState {
    endpoint: Option<Box<dyn AudioEndpoint>>,
    /// Last negotiated format, kept after the endpoint closes
    format: Option<NegotiatedFormat>,
    /// Set once the generator is unregistered; it never reopens after that
    retired: bool,
}

/// Plays one [`SoundBuffer`](crate::buffer::SoundBuffer) through one host endpoint
pub struct SoundGenerator {
    shared: Shared<GeneratorShared>,
    state: Mutex<GeneratorState>,
}

impl SoundGenerator {
    pub fn new(handle: BufferHandle) -> Self {
        Self {
            shared: Shared::new(&gc_handle(), GeneratorShared::new(handle)),
            state: Mutex::new(GeneratorState {
                endpoint: None,
                format: None,
                retired: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, GeneratorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn handle(&self) -> &BufferHandle {
        &self.shared.handle
    }

    /// Whether an endpoint is open and driving the render callback
    pub fn is_running(&self) -> bool {
        self.state().endpoint.is_some()
    }

    /// Format of the current or most recent endpoint
    pub fn format(&self) -> Option<NegotiatedFormat> {
        self.state().format
    }

    /// Open and start the endpoint if the buffer is playing
    ///
    /// `ms` sizes the device buffer. Returns `Ok(true)` when an endpoint was
    /// opened by this call and `Ok(false)` when there was nothing to do:
    /// already running, buffer not playing, buffer gone, or generator
    /// retired. On error the generator stays closed and the next call tries
    /// again.
    pub fn write_audio(
        &self,
        ms: u32,
        backend: &dyn AudioBackend,
        max_buffer_frames: u32,
    ) -> AudioResult<bool> {
        let mut state = self.state();
        if state.retired || state.endpoint.is_some() {
            return Ok(false);
        }
        let Some(buffer) = self.shared.handle.upgrade() else {
            return Ok(false);
        };
        if !buffer.is_playing() {
            return Ok(false);
        }

        let desired = DesiredFormat::for_buffer(
            buffer.sample_rate(),
            buffer.channels(),
            ms,
            max_buffer_frames,
        );
        drop(buffer);

        let mut endpoint = backend.open(&desired, Renderer::new(self.shared.clone()))?;
        let format = *endpoint.format();
        if format.channels != desired.channels || format.bits_per_sample != BITS_PER_SAMPLE {
            return Err(AudioError::UnsupportedFormat {
                sample_rate: format.sample_rate,
                channels: format.channels,
                reason: format!(
                    "requested {} channels of {}-bit PCM, endpoint granted {} channels of {}-bit",
                    desired.channels, BITS_PER_SAMPLE, format.channels, format.bits_per_sample
                ),
            });
        }

        endpoint.start()?;
        log::info!(
            "{}: {} endpoint started at {} Hz, {} channels, {} frames",
            self.shared.handle.id(),
            backend.name(),
            format.sample_rate,
            format.channels,
            format.buffer_frames
        );
        state.endpoint = Some(endpoint);
        state.format = Some(format);
        Ok(true)
    }

    /// Pause and close the endpoint, if open
    ///
    /// When this returns the render callback will not run again until the
    /// next successful [`write_audio`](Self::write_audio).
    pub fn stop(&self) {
        let mut state = self.state();
        Self::close(&self.shared, &mut state);
    }

    /// Stop for good; later `write_audio` calls do nothing
    pub(crate) fn retire(&self) {
        let mut state = self.state();
        state.retired = true;
        Self::close(&self.shared, &mut state);
    }

    fn close(shared: &GeneratorShared, state: &mut GeneratorState) {
        if let Some(mut endpoint) = state.endpoint.take() {
            if let Err(e) = endpoint.pause() {
                log::warn!("{}: failed to pause endpoint: {}", shared.handle.id(), e);
            }
            drop(endpoint);
            log::debug!("{}: endpoint closed", shared.handle.id());
        }
    }

    pub fn underruns(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }

    pub fn reset_underruns(&self) {
        self.shared.underruns.store(0, Ordering::Relaxed);
    }

    /// Snapshot of this generator and its buffer
    ///
    /// Buffer-derived fields read as zero once the producer has dropped the
    /// buffer.
    pub fn info(&self) -> SoundInfo {
        let (running, format) = {
            let state = self.state();
            (state.endpoint.is_some(), state.format)
        };
        let buffer = self.shared.handle.upgrade();

        let (volume, bytes_in_buffer, buffer_size) = match &buffer {
            Some(b) => (b.logarithmic_volume(), b.bytes_in_buffer(), b.buffer_size()),
            None => (0.0, 0, 0),
        };
        // Fill times only mean something while an endpoint drains the buffer
        let bytes_per_second = match format {
            Some(f) if running => f.bytes_per_second(),
            _ => 0,
        };

        SoundInfo {
            id: self.shared.handle.id(),
            running,
            sample_rate: format.map_or(0, |f| f.sample_rate),
            channels: format.map_or(0, |f| f.channels),
            volume,
            gain: linear_gain(volume),
            underruns: self.underruns(),
            bytes_in_buffer,
            buffered_ms: SoundInfo::duration_ms(bytes_in_buffer, bytes_per_second),
            capacity_ms: SoundInfo::duration_ms(buffer_size, bytes_per_second),
            callbacks: self.shared.callbacks.load(Ordering::Relaxed),
            bytes_rendered: self.shared.bytes_rendered.load(Ordering::Relaxed),
        }
    }

    /// Log one diagnostic line for this generator
    pub fn print_info(&self) {
        log::info!("{}", self.info());
    }
}

impl Drop for SoundGenerator {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        Self::close(&self.shared, state);
    }
}

impl std::fmt::Debug for SoundGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundGenerator")
            .field("buffer", &self.shared.handle.id())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullBackend;
    use crate::buffer::PcmRingBuffer;
    use std::sync::Arc;

    fn playing_buffer(rate: u32, channels: u16) -> Arc<PcmRingBuffer> {
        let buffer = Arc::new(PcmRingBuffer::with_duration(rate, channels, 200));
        buffer.play();
        buffer
    }

    #[test]
    fn test_not_playing_does_not_open() {
        let backend = NullBackend::new();
        let buffer = Arc::new(PcmRingBuffer::with_duration(44100, 2, 200));
        let generator = SoundGenerator::new(BufferHandle::new(&buffer));

        assert!(!generator.write_audio(30, &backend, 8192).unwrap());
        assert!(!generator.is_running());
        assert_eq!(backend.probe().opened(), 0);
    }

    #[test]
    fn test_opens_once_and_records_format() {
        let backend = NullBackend::new();
        let buffer = playing_buffer(44100, 2);
        let generator = SoundGenerator::new(BufferHandle::new(&buffer));

        assert!(generator.write_audio(30, &backend, 8192).unwrap());
        assert!(!generator.write_audio(30, &backend, 8192).unwrap());
        assert!(generator.is_running());
        assert_eq!(backend.probe().opened(), 1);

        let format = generator.format().unwrap();
        assert_eq!(format.sample_rate, 44100);
        assert_eq!(format.channels, 2);
        assert_eq!(format.buffer_frames, 2048);
    }

    #[test]
    fn test_stop_keeps_format_and_allows_reopen() {
        let backend = NullBackend::new();
        let buffer = playing_buffer(22050, 1);
        let generator = SoundGenerator::new(BufferHandle::new(&buffer));

        generator.write_audio(30, &backend, 8192).unwrap();
        generator.stop();
        assert!(!generator.is_running());
        assert_eq!(generator.format().unwrap().sample_rate, 22050);
        assert_eq!(backend.probe().live_endpoints(), 0);

        assert!(generator.write_audio(30, &backend, 8192).unwrap());
        assert_eq!(backend.probe().opened(), 2);
    }

    #[test]
    fn test_retired_generator_never_reopens() {
        let backend = NullBackend::new();
        let buffer = playing_buffer(44100, 2);
        let generator = SoundGenerator::new(BufferHandle::new(&buffer));
        generator.write_audio(30, &backend, 8192).unwrap();

        generator.retire();
        assert!(!generator.is_running());
        assert!(!generator.write_audio(30, &backend, 8192).unwrap());
    }

    #[test]
    fn test_open_failure_leaves_generator_closed() {
        let backend = NullBackend::rejecting();
        let buffer = playing_buffer(44100, 2);
        let generator = SoundGenerator::new(BufferHandle::new(&buffer));

        assert!(generator.write_audio(30, &backend, 8192).is_err());
        assert!(!generator.is_running());
        assert!(generator.format().is_none());
    }

    #[test]
    fn test_info_snapshot() {
        let backend = NullBackend::new();
        let buffer = playing_buffer(44100, 2);
        buffer.set_logarithmic_volume(0.5);
        buffer.write(&vec![0; 17640 / 2]);
        let generator = SoundGenerator::new(BufferHandle::new(&buffer));

        let before = generator.info();
        assert!(!before.running);
        assert_eq!(before.channels, 0);
        assert_eq!(before.buffered_ms, 0.0);
        assert_eq!(before.bytes_in_buffer, 8820);

        generator.write_audio(30, &backend, 8192).unwrap();
        let info = generator.info();
        assert!(info.running);
        assert_eq!(info.channels, 2);
        assert_eq!(info.bytes_in_buffer, 8820);
        assert!((info.buffered_ms - 50.0).abs() < 1e-3);
        assert!((info.gain - linear_gain(0.5)).abs() < 1e-6);
        assert!((info.fill_ratio() - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_drop_closes_endpoint() {
        let backend = NullBackend::new();
        let buffer = playing_buffer(44100, 2);
        let generator = SoundGenerator::new(BufferHandle::new(&buffer));
        generator.write_audio(30, &backend, 8192).unwrap();
        assert_eq!(backend.probe().live_endpoints(), 1);

        drop(generator);
        assert_eq!(backend.probe().live_endpoints(), 0);
    }
}
