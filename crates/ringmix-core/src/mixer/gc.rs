//! Deferred release of generator state touched by audio callbacks
//!
//! A render callback holds its own reference to the generator's shared
//! state, so the last reference may be released on the host audio thread
//! when a stream shuts down. Wrapping that state in `basedrop::Shared`
//! turns the release into a queue push; the memory is reclaimed later on the
//! collector thread below.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// How often the collector thread reclaims released state
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("ringmix-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives and dies on this thread
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }
            log::debug!("Generator state collector started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn generator state collector thread");

    rx.recv()
        .expect("Generator state collector exited before handing out its handle")
}

/// Handle for allocating `basedrop::Shared` generator state
pub(crate) fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Shared;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    /// Raises its flag when the collector finally drops it
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_shared_clones_share_value() {
        let a = Shared::new(&gc_handle(), 7u32);
        let b = a.clone();
        assert_eq!(*a, 7);
        assert_eq!(*b, 7);
        drop(a);
        assert_eq!(*b, 7);
    }

    #[test]
    fn test_last_release_is_reclaimed_by_collector_thread() {
        let dropped = Arc::new(AtomicBool::new(false));
        let shared = Shared::new(&gc_handle(), DropFlag(dropped.clone()));
        let clone = shared.clone();

        drop(shared);
        drop(clone);

        // The release only queues the value; the collector thread frees it
        let deadline = Instant::now() + Duration::from_secs(5);
        while !dropped.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "collector never reclaimed the value");
            thread::sleep(Duration::from_millis(10));
        }
    }
}
