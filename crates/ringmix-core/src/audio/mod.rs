//! Host audio backends for the ringmix mixer
//!
//! Provides one endpoint abstraction with platform-specific implementations:
//! - **CPAL** (default): pull-callback streams on ALSA/PipeWire, WASAPI, CoreAudio
//! - **JACK** (Linux, jack-backend feature): render-on-demand client per buffer
//! - **Null**: headless endpoints that render only when pumped
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   open(desired, Renderer)   ┌─────────────────────┐
//! │  SoundGenerator  │────────────────────────────►│    AudioBackend     │
//! │ (control thread) │◄────────────────────────────│  negotiates format  │
//! └──────────────────┘   Box<dyn AudioEndpoint>    └──────────┬──────────┘
//!                                                             │ bind()
//!                                                             ▼
//!                                                  ┌─────────────────────┐
//!                                                  │   RenderCallback    │
//!                                                  │ (host audio thread) │
//!                                                  └─────────────────────┘
//! ```

mod backend;
mod config;
mod convert;
#[cfg(feature = "cpal-backend")]
mod device;
mod error;
mod null_backend;

#[cfg(feature = "cpal-backend")]
mod cpal_backend;

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
mod jack_backend;

pub use backend::{
    create_backend, AudioBackend, AudioEndpoint, DesiredFormat, GainStage, NegotiatedFormat,
    VolumeControl, BITS_PER_SAMPLE,
};
pub use config::{BackendKind, DeviceId, MixerConfig, DEFAULT_CLIENT_NAME, MAX_BUFFER_SIZE};
pub use convert::{deinterleave_scaled, i16_to_f32, remap_frames};
pub use error::{AudioError, AudioResult};
pub use null_backend::{NullBackend, NullProbe};

#[cfg(feature = "cpal-backend")]
pub use cpal_backend::CpalBackend;
#[cfg(feature = "cpal-backend")]
pub use device::{find_device_by_id, get_output_devices, AudioDevice};

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
pub use jack_backend::JackBackend;
