//! Sound mixing: volume mapping, ring reads, generators and the mixer facade

mod error;
mod gc;
mod generator;
mod info;
mod puller;
mod registry;
mod render;
mod volume;

pub use error::{MixerError, MixerResult};
pub use generator::SoundGenerator;
pub use info::SoundInfo;
pub use puller::{pull, RingSpans};
pub use registry::SoundMixer;
pub use render::{RenderCallback, Renderer};
pub use volume::{linear_gain, logarithmic_volume, FULL_GAIN_THRESHOLD};
