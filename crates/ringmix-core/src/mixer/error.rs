//! Mixer facade error types

use thiserror::Error;

use crate::audio::AudioError;
use crate::buffer::BufferId;

/// Errors returned by [`SoundMixer`](super::SoundMixer)
#[derive(Error, Debug)]
pub enum MixerError {
    /// The buffer already has a generator
    #[error("{0} is already registered")]
    AlreadyRegistered(BufferId),

    /// The host audio backend failed
    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Result type for mixer operations
pub type MixerResult<T> = Result<T, MixerError>;
