//! YAML configuration for handoff applications
//!
//! - generic loading and saving of any serde type
//! - default config locations under the platform config directory
//! - [`EngineConfig`], the description of one capture → filters → playback run
//!
//! ```ignore
//! use handoff_core::config::{default_config_path, load_config, EngineConfig};
//!
//! let config: EngineConfig = load_config(&default_config_path("loopback.yaml"));
//! ```

mod engine;
mod io;
mod paths;

pub use engine::{EngineConfig, DEFAULT_CONFIG_FILE};
pub use io::{load_config, read_config, save_config};
pub use paths::{config_dir, default_config_path};
