//! Where configuration files live

use std::path::PathBuf;

/// Directory holding handoff configuration
///
/// `$XDG_CONFIG_HOME/handoff` on Linux, the platform equivalent elsewhere,
/// and `./handoff` if the platform has no config directory.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("handoff")
}

/// Path of `filename` inside [`config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    config_dir().join(filename)
}
