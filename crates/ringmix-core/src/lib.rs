//! Ringmix Core - ring-buffer sound output for emulated machines
//!
//! Emulated sound hardware writes PCM into per-voice ring buffers. This crate
//! pulls those bytes out on the host audio thread, applies each voice's
//! volume and hands the result to the platform audio backend.

pub mod audio;
pub mod buffer;
pub mod config;
pub mod mixer;

pub use buffer::{BufferHandle, BufferId, PcmRingBuffer, SoundBuffer};
pub use mixer::{MixerError, MixerResult, SoundInfo, SoundMixer};
