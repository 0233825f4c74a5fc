//! Configuration system for gridsession.
//!
//! Provides TOML-based configuration with:
//! - Repository defaults (`[session]`)
//! - Store topology, indexing and idle expiry (`[store]`)
//! - Lifecycle event translation (`[events]`)
//! - Config file layering (XDG user config + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigLayer, DiscoveryOptions, LayerKind, LayerStatus, LoadedConfig, load_config_file,
    load_config_with_options, save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
