//! Mixer configuration files
//!
//! [`MixerConfig`](crate::audio::MixerConfig) (or any other serde type) is
//! stored as YAML, by default under the user's config directory:
//!
//! ```ignore
//! use ringmix_core::config::{default_config_path, load_config, save_config, CONFIG_FILE};
//!
//! let path = default_config_path(CONFIG_FILE);
//! let config: MixerConfig = load_config(&path);
//! save_config(&config, &path)?;
//! ```

mod io;
mod paths;

pub use io::{load_config, load_mixer_config, read_config, save_config};
pub use paths::{config_dir, default_config_path, CONFIG_FILE};
