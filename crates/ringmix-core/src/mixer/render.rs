//! The host audio callback
//!
//! A [`Renderer`] is handed to a backend when an endpoint is opened. The
//! backend binds it to the negotiated format and calls
//! [`RenderCallback::render`] from the host audio thread, once per period.
//!
//! Nothing on the render path locks or logs (except a failed endpoint volume
//! update), and the scratch buffer is sized for a full device buffer up
//! front, so steady-state callbacks do not allocate.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use basedrop::Shared;

use super::volume::linear_gain;
use crate::audio::{GainStage, NegotiatedFormat, VolumeControl};
use crate::buffer::BufferHandle;

/// Generator state shared with the render callback
pub(crate) struct GeneratorShared {
    pub(crate) handle: BufferHandle,
    pub(crate) underruns: AtomicU64,
    pub(crate) callbacks: AtomicU64,
    pub(crate) bytes_rendered: AtomicU64,
    /// Gain last accepted by an endpoint volume control, f32 bits (NaN = none yet)
    applied_gain: AtomicU32,
}

impl GeneratorShared {
    pub(crate) fn new(handle: BufferHandle) -> Self {
        Self {
            handle,
            underruns: AtomicU64::new(0),
            callbacks: AtomicU64::new(0),
            bytes_rendered: AtomicU64::new(0),
            applied_gain: AtomicU32::new(f32::NAN.to_bits()),
        }
    }

    pub(crate) fn applied_gain(&self) -> Option<f32> {
        let gain = f32::from_bits(self.applied_gain.load(Ordering::Relaxed));
        (!gain.is_nan()).then_some(gain)
    }

    /// Push `gain` to the endpoint unless it already holds that value
    fn sync_endpoint_gain(&self, control: &dyn VolumeControl, gain: f32) {
        if let Some(applied) = self.applied_gain() {
            if (gain - applied).abs() <= f32::EPSILON {
                return;
            }
        }
        match control.set_volume(gain) {
            Ok(()) => self.applied_gain.store(gain.to_bits(), Ordering::Relaxed),
            Err(e) => log::warn!("{}: {}", self.handle.id(), e),
        }
    }
}

/// Render state for an endpoint that has not negotiated its format yet
pub struct Renderer {
    shared: Shared<GeneratorShared>,
}

impl Renderer {
    pub(crate) fn new(shared: Shared<GeneratorShared>) -> Self {
        Self { shared }
    }

    /// Fix the output format and gain stage for the endpoint's lifetime
    ///
    /// For endpoint gain stages the buffer's current volume is applied
    /// right away, before the host starts calling back.
    pub fn bind(self, format: NegotiatedFormat, gain: GainStage) -> RenderCallback {
        let shared = self.shared;
        shared
            .applied_gain
            .store(f32::NAN.to_bits(), Ordering::Relaxed);

        if let GainStage::Endpoint(control) = &gain {
            if let Some(buffer) = shared.handle.upgrade() {
                shared.sync_endpoint_gain(control.as_ref(), linear_gain(buffer.logarithmic_volume()));
            }
        }

        RenderCallback {
            scratch: Vec::with_capacity(format.buffer_bytes() * 2),
            shared,
            format,
            gain,
        }
    }
}

/// A bound renderer, owned by the host audio thread
pub struct RenderCallback {
    shared: Shared<GeneratorShared>,
    format: NegotiatedFormat,
    gain: GainStage,
    scratch: Vec<u8>,
}

impl RenderCallback {
    pub fn format(&self) -> &NegotiatedFormat {
        &self.format
    }

    /// Fill `out` from the buffer, silence-padding whatever it cannot supply
    ///
    /// A short read counts as one underrun.
    pub fn render(&mut self, out: &mut [u8]) {
        let shared = &*self.shared;
        let scratch = &mut self.scratch;
        let requested = out.len();
        shared.callbacks.fetch_add(1, Ordering::Relaxed);

        scratch.clear();
        let (available, gain) = match shared.handle.upgrade() {
            Some(buffer) => {
                let available = buffer.read(requested, &mut |spans| spans.copy_into(scratch));
                (available, linear_gain(buffer.logarithmic_volume()))
            }
            None => (0, 0.0),
        };
        // Never emit a partial frame; it would shift every channel after it
        let available = available.min(scratch.len()).min(requested);
        let available = available - available % self.format.bytes_per_frame().max(1);
        scratch.truncate(available);

        let (filled, gap) = out.split_at_mut(available);
        match &self.gain {
            GainStage::Mixer => {
                filled.fill(0);
                mix_s16(filled, scratch, gain);
            }
            GainStage::Endpoint(control) => {
                filled.copy_from_slice(scratch);
                shared.sync_endpoint_gain(control.as_ref(), gain);
            }
        }

        if !gap.is_empty() {
            gap.fill(self.format.silence);
            shared.underruns.fetch_add(1, Ordering::Relaxed);
        }
        shared
            .bytes_rendered
            .fetch_add(available as u64, Ordering::Relaxed);
    }
}

/// Mix native-endian 16-bit samples from `src` into `dst`, scaled by `gain`
///
/// Sums saturate at the sample range instead of wrapping.
#[inline]
pub(crate) fn mix_s16(dst: &mut [u8], src: &[u8], gain: f32) {
    for (d, s) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
        let sample = i16::from_ne_bytes([s[0], s[1]]) as f32 * gain;
        let current = i16::from_ne_bytes([d[0], d[1]]) as i32;
        let mixed = (current + sample as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        d.copy_from_slice(&mixed.to_ne_bytes());
    }
}
