//! Lock-free PCM ring buffer for emulated sound hardware
//!
//! The emulator thread writes samples, the host audio thread reads them.
//! Each side keeps its own half of an `rtrb` ring behind its own mutex, so
//! the two never contend. The audio side only ever `try_lock`s: if someone
//! else holds the consumer, the read comes back empty instead of blocking.
//!
//! Reads only ever hand out whole frames. Bytes of a frame the producer has
//! not finished writing stay in the ring until the rest arrives.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::SoundBuffer;
use crate::mixer::{logarithmic_volume, pull, RingSpans};

/// Ring buffer of signed 16-bit PCM bytes
pub struct PcmRingBuffer {
    producer: Mutex<rtrb::Producer<u8>>,
    consumer: Mutex<rtrb::Consumer<u8>>,
    capacity: usize,
    sample_rate: u32,
    channels: u16,
    /// Running byte totals, so the fill level is readable without a lock
    written: AtomicU64,
    consumed: AtomicU64,
    /// Logarithmic volume, stored as f64 bits
    volume: AtomicU64,
    playing: AtomicBool,
}

impl PcmRingBuffer {
    /// Create a stopped buffer at full volume holding `capacity` bytes
    pub fn new(sample_rate: u32, channels: u16, capacity: usize) -> Self {
        let (producer, consumer) = rtrb::RingBuffer::<u8>::new(capacity);
        Self {
            producer: Mutex::new(producer),
            consumer: Mutex::new(consumer),
            capacity,
            sample_rate,
            channels,
            written: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            volume: AtomicU64::new(1.0f64.to_bits()),
            playing: AtomicBool::new(false),
        }
    }

    /// Create a buffer sized to hold `ms` milliseconds of whole frames
    pub fn with_duration(sample_rate: u32, channels: u16, ms: u32) -> Self {
        let frame_bytes = channels.max(1) as usize * 2;
        let bytes_per_second = sample_rate as usize * frame_bytes;
        let frames = (bytes_per_second * ms as usize / 1000 / frame_bytes).max(1);
        Self::new(sample_rate, channels, frames * frame_bytes)
    }

    /// Bytes in one interleaved frame
    pub fn frame_bytes(&self) -> usize {
        self.channels.max(1) as usize * 2
    }

    fn producer(&self) -> MutexGuard<'_, rtrb::Producer<u8>> {
        self.producer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, producer: &mut rtrb::Producer<u8>, bytes: &[u8]) -> usize {
        let n = bytes.len().min(producer.slots());
        let Ok(mut chunk) = producer.write_chunk(n) else {
            return 0;
        };
        let (first, second) = chunk.as_mut_slices();
        let split = first.len();
        first.copy_from_slice(&bytes[..split]);
        second.copy_from_slice(&bytes[split..n]);
        // Count before committing so the fill level never goes negative
        self.written.fetch_add(n as u64, Ordering::AcqRel);
        chunk.commit_all();
        n
    }

    /// Append raw PCM bytes, returning how many fit
    ///
    /// Callers writing raw bytes are responsible for completing frames;
    /// [`write_samples`](Self::write_samples) does that automatically.
    pub fn write(&self, bytes: &[u8]) -> usize {
        let mut producer = self.producer();
        self.push(&mut producer, bytes)
    }

    /// Append whole frames of samples, returning how many samples fit
    ///
    /// A trailing partial frame in `samples` is never written.
    pub fn write_samples(&self, samples: &[i16]) -> usize {
        let channels = self.channels.max(1) as usize;
        let mut producer = self.producer();
        let frames = (samples.len() / channels).min(producer.slots() / self.frame_bytes());
        let samples = &samples[..frames * channels];
        self.push(&mut producer, bytemuck::cast_slice(samples)) / 2
    }

    /// Bytes that can be written without overrunning the reader
    pub fn free_bytes(&self) -> usize {
        self.producer().slots()
    }

    pub fn play(&self) {
        self.playing.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.playing.store(false, Ordering::Release);
    }

    pub fn set_logarithmic_volume(&self, volume: f64) {
        self.volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Set the volume from a linear gain in `[0, 1]`
    pub fn set_linear_volume(&self, gain: f32) {
        self.set_logarithmic_volume(logarithmic_volume(gain));
    }
}

impl SoundBuffer for PcmRingBuffer {
    fn read(&self, max_bytes: usize, sink: &mut dyn FnMut(RingSpans<'_>)) -> usize {
        match self.consumer.try_lock() {
            Ok(mut consumer) => {
                let readable = consumer.slots();
                let whole_frames = readable - readable % self.frame_bytes();
                let n = pull(&mut consumer, max_bytes.min(whole_frames), sink);
                self.consumed.fetch_add(n as u64, Ordering::AcqRel);
                n
            }
            Err(_) => {
                sink(RingSpans::empty());
                0
            }
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn logarithmic_volume(&self) -> f64 {
        f64::from_bits(self.volume.load(Ordering::Relaxed))
    }

    fn buffer_size(&self) -> usize {
        self.capacity
    }

    fn bytes_in_buffer(&self) -> usize {
        let consumed = self.consumed.load(Ordering::Acquire);
        let written = self.written.load(Ordering::Acquire);
        (written.saturating_sub(consumed) as usize).min(self.capacity)
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(buffer: &PcmRingBuffer, max: usize) -> Vec<u8> {
        let mut out = Vec::new();
        buffer.read(max, &mut |spans| spans.copy_into(&mut out));
        out
    }

    fn read_samples(buffer: &PcmRingBuffer, max: usize) -> Vec<i16> {
        read_all(buffer, max)
            .chunks_exact(2)
            .map(|b| i16::from_ne_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn test_write_then_read() {
        let buffer = PcmRingBuffer::new(44100, 1, 8);
        assert_eq!(buffer.write(&[1, 2, 3, 4, 5, 6]), 6);
        assert_eq!(buffer.bytes_in_buffer(), 6);
        assert_eq!(read_all(&buffer, 4), vec![1, 2, 3, 4]);
        assert_eq!(buffer.bytes_in_buffer(), 2);
    }

    #[test]
    fn test_write_stops_when_full() {
        let buffer = PcmRingBuffer::new(44100, 1, 4);
        assert_eq!(buffer.write(&[1, 2, 3, 4, 5, 6]), 4);
        assert_eq!(buffer.free_bytes(), 0);
        assert_eq!(buffer.write(&[7]), 0);
        assert_eq!(buffer.bytes_in_buffer(), 4);
    }

    #[test]
    fn test_wrapping_write_and_read() {
        let buffer = PcmRingBuffer::new(44100, 1, 6);
        buffer.write(&[0, 1, 2, 3]);
        read_all(&buffer, 4);
        assert_eq!(buffer.write(&[10, 11, 12, 13]), 4);

        let mut spans_seen = (0, 0);
        let mut out = Vec::new();
        let n = buffer.read(4, &mut |spans| {
            spans_seen = (spans.first().len(), spans.second().len());
            spans.copy_into(&mut out);
        });
        assert_eq!(n, 4);
        assert_eq!(spans_seen, (2, 2));
        assert_eq!(out, vec![10, 11, 12, 13]);
        assert_eq!(buffer.bytes_in_buffer(), 0);
    }

    #[test]
    fn test_write_samples() {
        let buffer = PcmRingBuffer::new(44100, 1, 6);
        assert_eq!(buffer.write_samples(&[1, -1, 300, 400]), 3);
        assert_eq!(read_samples(&buffer, 6), vec![1, -1, 300]);
    }

    #[test]
    fn test_stereo_capacity_holds_whole_frames() {
        // 7 ms at 44.1 kHz is 308.7 frames
        let buffer = PcmRingBuffer::with_duration(44100, 2, 7);
        assert_eq!(buffer.buffer_size(), 308 * 4);
        assert_eq!(buffer.buffer_size() % buffer.frame_bytes(), 0);
    }

    #[test]
    fn test_write_samples_never_splits_a_frame() {
        let buffer = PcmRingBuffer::with_duration(44100, 2, 7);
        let frames: Vec<i16> = [100i16, -100].repeat(400);

        // Only whole frames fit, and an odd sample count drops the tail
        assert_eq!(buffer.write_samples(&frames), 308 * 2);
        read_all(&buffer, 40 * 4);
        assert_eq!(buffer.write_samples(&frames[..81]), 80);

        let samples = read_samples(&buffer, buffer.buffer_size());
        assert_eq!(samples.len(), 308 * 2);
        for frame in samples.chunks_exact(2) {
            assert_eq!(frame, [100, -100]);
        }
    }

    #[test]
    fn test_read_holds_back_partial_frame() {
        let buffer = PcmRingBuffer::new(44100, 2, 16);
        let frame: Vec<u8> = [1i16, 2].iter().flat_map(|s| s.to_ne_bytes()).collect();
        buffer.write(&frame);
        buffer.write(&frame[..2]);

        assert_eq!(read_all(&buffer, 16), frame);
        assert_eq!(buffer.bytes_in_buffer(), 2);

        // The held-back half is read once its frame is complete
        buffer.write(&frame[2..]);
        assert_eq!(read_all(&buffer, 16), frame);
    }

    #[test]
    fn test_read_while_consumer_held_is_empty() {
        let buffer = PcmRingBuffer::new(44100, 1, 8);
        buffer.write(&[1, 2, 3, 4]);
        let _held = buffer.consumer.lock().unwrap();
        assert!(read_all(&buffer, 4).is_empty());
    }

    #[test]
    fn test_fill_level_readable_while_producer_held() {
        let buffer = PcmRingBuffer::new(44100, 1, 8);
        buffer.write(&[1, 2, 3, 4]);
        let _held = buffer.producer.lock().unwrap();
        assert_eq!(buffer.bytes_in_buffer(), 4);
    }

    #[test]
    fn test_play_state_and_volume() {
        let buffer = PcmRingBuffer::with_duration(44100, 2, 100);
        assert!(!buffer.is_playing());
        assert_eq!(buffer.logarithmic_volume(), 1.0);
        assert_eq!(buffer.buffer_size(), 17640);

        buffer.play();
        buffer.set_logarithmic_volume(1.5);
        assert!(buffer.is_playing());
        assert_eq!(buffer.logarithmic_volume(), 1.0);

        buffer.set_linear_volume(0.0);
        assert_eq!(buffer.logarithmic_volume(), 0.0);
        buffer.stop();
        assert!(!buffer.is_playing());
    }
}
