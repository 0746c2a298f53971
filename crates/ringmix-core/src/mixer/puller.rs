//! Two-span reads out of a byte ring
//!
//! A read that crosses the end of the ring's storage comes back as two
//! slices: the tail of the storage followed by the wrapped head. Nothing is
//! copied until the caller copies the spans, in order, into its own buffer.

/// The next readable bytes of a ring, split at the wrap point
#[derive(Debug, Clone, Copy, Default)]
pub struct RingSpans<'a> {
    first: &'a [u8],
    second: &'a [u8],
}

impl<'a> RingSpans<'a> {
    pub fn new(first: &'a [u8], second: &'a [u8]) -> Self {
        Self { first, second }
    }

    /// No bytes available
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn first(&self) -> &'a [u8] {
        self.first
    }

    /// Wrapped part, empty unless the read crossed the end of the storage
    pub fn second(&self) -> &'a [u8] {
        self.second
    }

    pub fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace `dest` with both spans, first then second
    ///
    /// Only grows `dest` when its capacity is short, so a pre-sized scratch
    /// buffer never allocates here.
    #[inline]
    pub fn copy_into(&self, dest: &mut Vec<u8>) {
        dest.clear();
        dest.extend_from_slice(self.first);
        dest.extend_from_slice(self.second);
    }
}

/// Pull up to `requested` bytes from `consumer`
///
/// `sink` sees the available bytes before they are released back to the
/// producer. Returns how many bytes were available, which is less than
/// `requested` when the producer has fallen behind.
pub fn pull(
    consumer: &mut rtrb::Consumer<u8>,
    requested: usize,
    sink: &mut dyn FnMut(RingSpans<'_>),
) -> usize {
    let available = consumer.slots().min(requested);
    match consumer.read_chunk(available) {
        Ok(chunk) => {
            let (first, second) = chunk.as_slices();
            sink(RingSpans::new(first, second));
            chunk.commit_all();
            available
        }
        Err(_) => {
            sink(RingSpans::empty());
            0
        }
    }
}
