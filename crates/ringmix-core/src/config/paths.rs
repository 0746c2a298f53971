//! Standard locations for ringmix configuration files

use std::path::PathBuf;

/// File name of the mixer configuration
pub const CONFIG_FILE: &str = "mixer.yaml";

/// Directory holding ringmix configuration
///
/// Returns `<config dir>/ringmix` (e.g. `~/.config/ringmix` on Linux), or
/// `./ringmix` when the platform has no config directory.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ringmix")
}

/// Full path of `filename` inside [`config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    config_dir().join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_is_app_specific() {
        assert!(config_dir().ends_with("ringmix"));
    }

    #[test]
    fn test_config_path_includes_filename() {
        let path = default_config_path(CONFIG_FILE);
        assert!(path.ends_with("ringmix/mixer.yaml"));
    }
}
