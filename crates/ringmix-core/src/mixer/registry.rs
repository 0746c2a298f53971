//! Mixer facade: the table of sound generators, keyed by buffer identity
//!
//! The emulator registers each sound buffer it creates and pumps
//! [`SoundMixer::write_all`] periodically. Generators open their endpoints
//! on the first pump after their buffer starts playing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::error::{MixerError, MixerResult};
use super::generator::SoundGenerator;
use super::info::SoundInfo;
use crate::audio::{create_backend, AudioBackend, MixerConfig};
use crate::buffer::{BufferHandle, BufferId};

/// Owns one [`SoundGenerator`] per registered buffer
pub struct SoundMixer {
    backend: Box<dyn AudioBackend>,
    max_buffer_frames: u32,
    generators: Mutex<HashMap<BufferId, Arc<SoundGenerator>>>,
}

impl SoundMixer {
    pub fn new(backend: Box<dyn AudioBackend>, config: &MixerConfig) -> Self {
        log::info!("Sound mixer using {} backend", backend.name());
        Self {
            backend,
            max_buffer_frames: config.max_buffer_frames,
            generators: Mutex::new(HashMap::new()),
        }
    }

    /// Create the backend selected by `config` and a mixer on top of it
    pub fn from_config(config: &MixerConfig) -> MixerResult<Self> {
        let backend = create_backend(config)?;
        Ok(Self::new(backend, config))
    }

    fn generators(&self) -> MutexGuard<'_, HashMap<BufferId, Arc<SoundGenerator>>> {
        self.generators.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current generators, so callers can work on them without the table lock
    fn snapshot(&self) -> Vec<Arc<SoundGenerator>> {
        self.generators().values().cloned().collect()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Create a generator for `handle`
    ///
    /// Nothing is opened until the buffer plays and [`write_all`](Self::write_all)
    /// runs.
    pub fn register(&self, handle: BufferHandle) -> MixerResult<()> {
        let id = handle.id();
        let mut generators = self.generators();
        if generators.contains_key(&id) {
            return Err(MixerError::AlreadyRegistered(id));
        }
        generators.insert(id, Arc::new(SoundGenerator::new(handle)));
        log::debug!("{}: registered", id);
        Ok(())
    }

    /// Close and forget the generator for `handle`; unknown handles are ignored
    ///
    /// The endpoint is closed before the entry is removed, so no render
    /// callback starts after this returns.
    pub fn unregister(&self, handle: &BufferHandle) {
        let id = handle.id();
        let mut generators = self.generators();
        if let Some(generator) = generators.get(&id) {
            generator.retire();
            generators.remove(&id);
            log::debug!("{}: unregistered", id);
        }
    }

    pub fn is_registered(&self, handle: &BufferHandle) -> bool {
        self.generators().contains_key(&handle.id())
    }

    pub fn len(&self) -> usize {
        self.generators().len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators().is_empty()
    }

    /// Close every endpoint; buffers stay registered and may restart
    pub fn stop_all(&self) {
        for generator in self.snapshot() {
            generator.stop();
        }
    }

    /// Open endpoints for every playing buffer that does not have one yet
    ///
    /// Failures are logged and retried on the next call.
    pub fn write_all(&self, ms: u32) {
        for generator in self.snapshot() {
            if let Err(e) = generator.write_audio(ms, self.backend.as_ref(), self.max_buffer_frames)
            {
                log::warn!("{}: failed to open endpoint: {}", generator.handle().id(), e);
            }
        }
    }

    /// One snapshot per registered buffer, in no particular order
    pub fn collect_info(&self) -> Vec<SoundInfo> {
        self.snapshot().iter().map(|g| g.info()).collect()
    }

    pub fn reset_all_underruns(&self) {
        for generator in self.snapshot() {
            generator.reset_underruns();
        }
    }

    /// Log a line for every generator with an open endpoint
    pub fn print_diagnostics(&self) {
        let mut running: Vec<_> = self
            .collect_info()
            .into_iter()
            .filter(|info| info.running)
            .collect();
        running.sort_by_key(|info| info.id);
        log::info!("{} of {} sound buffers running", running.len(), self.len());
        for info in running {
            log::info!("  {}", info);
        }
    }
}

impl Drop for SoundMixer {
    fn drop(&mut self) {
        self.stop_all();
    }
}
