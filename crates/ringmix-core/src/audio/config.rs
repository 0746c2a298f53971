//! Audio backend configuration
//!
//! Defines backend selection, device selection and buffer limits for the
//! mixer. The whole struct round-trips through YAML.

use serde::{Deserialize, Serialize};

/// Largest device buffer (in frames) a generator will ever ask for
pub const MAX_BUFFER_SIZE: u32 = 8192;

/// Client name prefix used for JACK endpoints
pub const DEFAULT_CLIENT_NAME: &str = "ringmix";

/// Host audio backend to drive the sound generators with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Pull-callback backend (ALSA/PipeWire, WASAPI, CoreAudio via CPAL)
    Cpal,
    /// Render-on-demand backend using a native JACK client per buffer
    Jack,
    /// Headless backend, renders only when pumped
    Null,
}

impl Default for BackendKind {
    fn default() -> Self {
        if cfg!(all(target_os = "linux", feature = "jack-backend")) {
            BackendKind::Jack
        } else if cfg!(feature = "cpal-backend") {
            BackendKind::Cpal
        } else {
            BackendKind::Null
        }
    }
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Cpal => "cpal",
            BackendKind::Jack => "jack",
            BackendKind::Null => "null",
        }
    }

    /// Parse a backend name as given on a command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cpal" => Some(BackendKind::Cpal),
            "jack" => Some(BackendKind::Jack),
            "null" | "none" => Some(BackendKind::Null),
            _ => None,
        }
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (JACK, ALSA, etc.)
/// This allows selecting devices from different hosts on systems with multiple
/// audio backends available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g., "Jack", "Alsa", "CoreAudio")
    /// If None, uses the default/preferred host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Get a display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the mixer and its backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Which backend opens the per-buffer endpoints
    pub backend: BackendKind,

    /// Output device (None = use system default). Used by CPAL backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceId>,

    /// JACK client name prefix; each endpoint appends its own index
    pub client_name: String,

    /// Connect JACK output ports to `system:playback_N` on open
    pub auto_connect: bool,

    /// Upper bound for the device buffer requested per endpoint (frames)
    pub max_buffer_frames: u32,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            device: None,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            auto_connect: true,
            max_buffer_frames: MAX_BUFFER_SIZE,
        }
    }
}

impl MixerConfig {
    /// Config for the headless backend
    pub fn headless() -> Self {
        Self {
            backend: BackendKind::Null,
            ..Default::default()
        }
    }

    /// Set the backend
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the output device
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    /// Set the maximum buffer size in frames, clamped to [64, MAX_BUFFER_SIZE]
    pub fn with_max_buffer_frames(mut self, frames: u32) -> Self {
        self.max_buffer_frames = frames.clamp(64, MAX_BUFFER_SIZE);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names_round_trip() {
        for kind in [BackendKind::Cpal, BackendKind::Jack, BackendKind::Null] {
            assert_eq!(BackendKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(BackendKind::from_name("NONE"), Some(BackendKind::Null));
        assert_eq!(BackendKind::from_name("sdl"), None);
    }

    #[test]
    fn test_max_buffer_frames_clamped() {
        assert_eq!(MixerConfig::default().with_max_buffer_frames(1).max_buffer_frames, 64);
        assert_eq!(
            MixerConfig::default().with_max_buffer_frames(1 << 20).max_buffer_frames,
            MAX_BUFFER_SIZE
        );
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: MixerConfig = serde_yaml::from_str("backend: cpal\n").unwrap();
        assert_eq!(config.backend, BackendKind::Cpal);
        assert_eq!(config.client_name, DEFAULT_CLIENT_NAME);
        assert_eq!(config.max_buffer_frames, MAX_BUFFER_SIZE);
        assert!(config.device.is_none());
    }

    #[test]
    fn test_device_label() {
        assert_eq!(DeviceId::with_host("hw:0,0", "ALSA").display_label(), "[ALSA] hw:0,0");
        assert_eq!(DeviceId::new("Speakers").display_label(), "Speakers");
    }
}
