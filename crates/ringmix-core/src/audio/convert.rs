//! Sample conversion between the mixer's i16 PCM and device formats
//!
//! Used by backends whose device side differs from the buffer: f32 sample
//! formats, a different channel count, or planar per-port outputs.

/// Full-scale divisor for i16 to f32 conversion
const I16_SCALE: f32 = 32768.0;

/// Convert one sample to f32 in `[-1.0, 1.0)`
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / I16_SCALE
}

/// Copy interleaved frames from a `src_channels` buffer to a `dst_channels` device
///
/// Mono buffers fan out to every device channel. A mono device gets the
/// average of all buffer channels. Otherwise channels map by position and
/// device channels the buffer lacks are silent. `convert` maps each i16
/// sample to the device format.
pub fn remap_frames<T: Copy>(
    src: &[i16],
    src_channels: usize,
    dst: &mut [T],
    dst_channels: usize,
    convert: impl Fn(i16) -> T,
) {
    if src_channels == 0 || dst_channels == 0 {
        return;
    }
    let silence = convert(0);

    for (in_frame, out_frame) in src
        .chunks_exact(src_channels)
        .zip(dst.chunks_exact_mut(dst_channels))
    {
        if src_channels == dst_channels {
            for (out, sample) in out_frame.iter_mut().zip(in_frame) {
                *out = convert(*sample);
            }
        } else if src_channels == 1 {
            out_frame.fill(convert(in_frame[0]));
        } else if dst_channels == 1 {
            let sum: i32 = in_frame.iter().map(|s| *s as i32).sum();
            out_frame[0] = convert((sum / src_channels as i32) as i16);
        } else {
            for (channel, out) in out_frame.iter_mut().enumerate() {
                *out = in_frame.get(channel).map_or(silence, |s| convert(*s));
            }
        }
    }
}

/// Extract one channel of interleaved PCM into a planar f32 port, scaled by `gain`
///
/// Writes `min(out.len(), frames in pcm)` samples.
pub fn deinterleave_scaled(
    pcm: &[i16],
    channels: usize,
    channel: usize,
    gain: f32,
    out: &mut [f32],
) {
    if channels == 0 || channel >= channels {
        return;
    }
    for (sample, frame) in out.iter_mut().zip(pcm.chunks_exact(channels)) {
        *sample = i16_to_f32(frame[channel]) * gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i16_to_f32_scaling() {
        assert_eq!(i16_to_f32(0), 0.0);
        assert_eq!(i16_to_f32(i16::MIN), -1.0);
        assert_eq!(i16_to_f32(16384), 0.5);
        assert!(i16_to_f32(i16::MAX) < 1.0);

        let mut out = [9.0f32; 3];
        remap_frames(&[-16384, 8192, 0], 1, &mut out, 1, i16_to_f32);
        assert_eq!(out, [-0.5, 0.25, 0.0]);
    }

    #[test]
    fn test_same_channel_count_is_a_copy() {
        let mut out = [0i16; 4];
        remap_frames(&[1, 2, 3, 4], 2, &mut out, 2, |s| s);
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_mono_fans_out_to_stereo() {
        let mut out = [0.0f32; 4];
        remap_frames(&[16384, -8192], 1, &mut out, 2, i16_to_f32);
        assert_eq!(out, [0.5, 0.5, -0.25, -0.25]);
    }

    #[test]
    fn test_stereo_downmixes_to_mono() {
        let mut out = [0i16; 2];
        remap_frames(&[100, 300, -1000, 1000], 2, &mut out, 1, |s| s);
        assert_eq!(out, [200, 0]);

        // Full-scale frames do not overflow the sum
        remap_frames(&[i16::MIN, i16::MIN], 2, &mut out[..1], 1, |s| s);
        assert_eq!(out[0], i16::MIN);
    }

    #[test]
    fn test_extra_device_channels_are_silent() {
        let mut out = [7i16; 8];
        remap_frames(&[1, 2, 3, 4], 2, &mut out, 4, |s| s);
        assert_eq!(out, [1, 2, 0, 0, 3, 4, 0, 0]);

        let mut out = [7i16; 4];
        remap_frames(&[1, 2, 3, 4, 5, 6], 3, &mut out, 2, |s| s);
        assert_eq!(out, [1, 2, 4, 5]);
    }

    #[test]
    fn test_deinterleave_keeps_channel_order_and_applies_gain() {
        let pcm = [16384i16, -16384, 8192, -8192, 0, i16::MIN];
        let mut left = [0.0f32; 3];
        let mut right = [0.0f32; 3];
        deinterleave_scaled(&pcm, 2, 0, 1.0, &mut left);
        deinterleave_scaled(&pcm, 2, 1, 0.5, &mut right);

        assert_eq!(left, [0.5, 0.25, 0.0]);
        assert_eq!(right, [-0.25, -0.125, -0.5]);
    }

    #[test]
    fn test_deinterleave_short_pcm_leaves_tail() {
        let mut out = [9.0f32; 4];
        deinterleave_scaled(&[16384, 0], 1, 0, 1.0, &mut out);
        assert_eq!(out, [0.5, 0.0, 9.0, 9.0]);

        // Out-of-range channel writes nothing
        deinterleave_scaled(&[16384, 0], 1, 3, 1.0, &mut out);
        assert_eq!(out, [0.5, 0.0, 9.0, 9.0]);
    }
}
