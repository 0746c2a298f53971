//! Upstream sound buffers
//!
//! The emulated machine owns its sound buffers and writes PCM into them at
//! its own pace. The mixer only ever sees them through [`SoundBuffer`] and
//! keys its bookkeeping on [`BufferHandle`] identity.

mod ring;

use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::mixer::RingSpans;

pub use ring::PcmRingBuffer;

/// A producer-owned PCM ring buffer the mixer can play
///
/// PCM is signed 16-bit native-endian, interleaved by channel. All methods
/// may be called from the host audio thread and must not block. `read`
/// should hand over whole frames only.
pub trait SoundBuffer: Send + Sync {
    /// Consume up to `max_bytes`, handing the (possibly wrapped) spans to `sink`
    ///
    /// Returns the number of bytes handed over. Fewer than `max_bytes` means
    /// the producer has not kept up.
    fn read(&self, max_bytes: usize, sink: &mut dyn FnMut(RingSpans<'_>)) -> usize;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Current volume on the logarithmic scale, `1.0` = no attenuation
    fn logarithmic_volume(&self) -> f64;

    /// Total capacity in bytes
    fn buffer_size(&self) -> usize;

    /// Bytes written but not yet read
    fn bytes_in_buffer(&self) -> usize;

    /// Whether the emulated buffer is in the playing state
    fn is_playing(&self) -> bool;
}

/// Opaque identity of a registered buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(usize);

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "buffer@{:#x}", self.0)
    }
}

/// Non-owning reference to a producer's sound buffer
///
/// Equality and hashing use the buffer's identity only. The handle keeps
/// the allocation's address reserved while it exists, so an id is never
/// reused by a different buffer while a handle to it is alive.
#[derive(Clone)]
pub struct BufferHandle {
    buffer: Weak<dyn SoundBuffer>,
}

impl BufferHandle {
    pub fn new<B: SoundBuffer + 'static>(buffer: &Arc<B>) -> Self {
        let buffer: Weak<B> = Arc::downgrade(buffer);
        Self { buffer }
    }

    pub fn id(&self) -> BufferId {
        BufferId(Weak::as_ptr(&self.buffer) as *const () as usize)
    }

    /// The buffer, unless the producer has already dropped it
    pub fn upgrade(&self) -> Option<Arc<dyn SoundBuffer>> {
        self.buffer.upgrade()
    }
}

impl From<&Arc<dyn SoundBuffer>> for BufferHandle {
    fn from(buffer: &Arc<dyn SoundBuffer>) -> Self {
        Self {
            buffer: Arc::downgrade(buffer),
        }
    }
}

impl PartialEq for BufferHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for BufferHandle {}

impl Hash for BufferHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl std::fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BufferHandle").field(&self.id()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_compare_by_identity() {
        let a = Arc::new(PcmRingBuffer::new(44100, 2, 1024));
        let b = Arc::new(PcmRingBuffer::new(44100, 2, 1024));

        assert_eq!(BufferHandle::new(&a), BufferHandle::new(&a));
        assert_ne!(BufferHandle::new(&a), BufferHandle::new(&b));
        assert_eq!(BufferHandle::new(&a).id(), BufferHandle::new(&a).clone().id());
    }

    #[test]
    fn test_dyn_and_concrete_handles_agree() {
        let concrete = Arc::new(PcmRingBuffer::new(22050, 1, 256));
        let erased: Arc<dyn SoundBuffer> = concrete.clone();
        assert_eq!(BufferHandle::new(&concrete), BufferHandle::from(&erased));
    }

    #[test]
    fn test_handle_from_concrete_buffer_type() {
        // Coerces Arc<PcmRingBuffer> without an explicit dyn cast at the call site
        let buffer: Arc<PcmRingBuffer> = Arc::new(PcmRingBuffer::new(48000, 2, 64));
        let handle = BufferHandle::new(&buffer);
        let upgraded = handle.upgrade().unwrap();
        assert_eq!(upgraded.sample_rate(), 48000);
        assert_eq!(upgraded.channels(), 2);
    }

    #[test]
    fn test_handle_does_not_keep_buffer_alive() {
        let buffer = Arc::new(PcmRingBuffer::new(44100, 2, 1024));
        let handle = BufferHandle::new(&buffer);
        assert!(handle.upgrade().is_some());
        drop(buffer);
        assert!(handle.upgrade().is_none());
    }
}
