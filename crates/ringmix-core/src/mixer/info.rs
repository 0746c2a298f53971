//! Per-buffer diagnostic snapshots

use crate::buffer::BufferId;

/// Snapshot of one registered buffer and its generator
#[derive(Debug, Clone, PartialEq)]
pub struct SoundInfo {
    pub id: BufferId,
    /// An endpoint is open and pulling from the buffer
    pub running: bool,
    /// Negotiated rate, 0 before the first successful open
    pub sample_rate: u32,
    /// Negotiated channel count, 0 before the first successful open
    pub channels: u16,
    /// Buffer volume on the logarithmic scale
    pub volume: f64,
    /// Linear gain derived from `volume`
    pub gain: f32,
    pub underruns: u64,
    pub bytes_in_buffer: usize,
    /// Audio queued in the buffer, in milliseconds of playback
    pub buffered_ms: f32,
    /// Whole buffer capacity, in milliseconds of playback
    pub capacity_ms: f32,
    /// Render callbacks served since the generator was created
    pub callbacks: u64,
    pub bytes_rendered: u64,
}

impl SoundInfo {
    /// Playback time of `bytes` at `bytes_per_second`, 0 when the rate is unknown
    pub(crate) fn duration_ms(bytes: usize, bytes_per_second: usize) -> f32 {
        if bytes_per_second == 0 {
            return 0.0;
        }
        bytes as f32 / bytes_per_second as f32 * 1000.0
    }

    /// Fraction of the buffer currently filled, `0.0..=1.0`
    pub fn fill_ratio(&self) -> f32 {
        if self.capacity_ms <= 0.0 {
            return 0.0;
        }
        (self.buffered_ms / self.capacity_ms).clamp(0.0, 1.0)
    }
}

impl std::fmt::Display for SoundInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: channels: {}, buffer: {:>6}, {:>8.2} ms, underruns: {:>10}",
            self.id, self.channels, self.bytes_in_buffer, self.buffered_ms, self.underruns
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_ms() {
        // 176400 bytes/s is 44.1kHz stereo 16-bit
        assert!((SoundInfo::duration_ms(17640, 176_400) - 100.0).abs() < 1e-3);
        assert_eq!(SoundInfo::duration_ms(17640, 0), 0.0);
    }
}
