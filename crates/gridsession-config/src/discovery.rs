//! Config file discovery and layered merging.
//!
//! Without an explicit file, two layers are merged (later overrides earlier):
//! 1. the user file, `$GRIDSESSION_CONFIG_DIR/config.toml` or the platform
//!    config dir's `gridsession/config.toml`
//! 2. the project file, `./gridsession.toml`
//!
//! An explicit file (`--config`) replaces both. Each layer is validated as it
//! is merged; a layer that would leave the configuration invalid is skipped
//! and reported as a warning naming the file.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{ConfigError, GridSessionConfig, Result};

const PROJECT_CONFIG_FILE: &str = "gridsession.toml";
const USER_CONFIG_FILE: &str = "config.toml";
const APP_NAME: &str = "gridsession";
const CONFIG_DIR_ENV: &str = "GRIDSESSION_CONFIG_DIR";

/// Role a config file plays in the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    User,
    Project,
    /// Named on the command line; replaces discovery.
    Explicit,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            LayerKind::User => "user",
            LayerKind::Project => "project",
            LayerKind::Explicit => "explicit",
        })
    }
}

/// Outcome of looking at one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerStatus {
    Missing,
    Applied,
    /// Present but skipped; carries the reason.
    Rejected(String),
}

impl fmt::Display for LayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerStatus::Missing => f.write_str("missing"),
            LayerStatus::Applied => f.write_str("applied"),
            LayerStatus::Rejected(reason) => write!(f, "rejected: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub kind: LayerKind,
    pub path: PathBuf,
    pub status: LayerStatus,
}

impl ConfigLayer {
    pub fn is_applied(&self) -> bool {
        self.status == LayerStatus::Applied
    }

    /// Warning line for a rejected layer.
    pub fn warning(&self) -> Option<String> {
        match &self.status {
            LayerStatus::Rejected(reason) => Some(format!(
                "ignored {} config {}: {}",
                self.kind,
                self.path.display(),
                reason
            )),
            _ => None,
        }
    }
}

/// Where to look for config layers.
///
/// Unset fields fall back to the current directory and [`xdg_config_dir`].
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub project_dir: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub explicit_file: Option<PathBuf>,
}

impl DiscoveryOptions {
    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(dir.into());
        self
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    pub fn with_explicit_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    fn layer_paths(&self) -> Vec<(LayerKind, PathBuf)> {
        if let Some(path) = &self.explicit_file {
            return vec![(LayerKind::Explicit, path.clone())];
        }

        let mut paths = Vec::with_capacity(2);
        let user = match &self.config_dir {
            Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
            None => xdg_config_path(),
        };
        if let Some(path) = user {
            paths.push((LayerKind::User, path));
        }
        let project = match &self.project_dir {
            Some(dir) => dir.join(PROJECT_CONFIG_FILE),
            None => PathBuf::from(PROJECT_CONFIG_FILE),
        };
        paths.push((LayerKind::Project, project));
        paths
    }
}

/// The merged configuration and every layer considered for it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: GridSessionConfig,
    /// Lowest precedence first.
    pub layers: Vec<ConfigLayer>,
}

impl LoadedConfig {
    pub fn applied_paths(&self) -> Vec<&Path> {
        self.layers
            .iter()
            .filter(|layer| layer.is_applied())
            .map(|layer| layer.path.as_path())
            .collect()
    }

    pub fn rejected(&self) -> impl Iterator<Item = &ConfigLayer> {
        self.layers
            .iter()
            .filter(|layer| matches!(layer.status, LayerStatus::Rejected(_)))
    }

    pub fn warnings(&self) -> Vec<String> {
        self.layers.iter().filter_map(ConfigLayer::warning).collect()
    }
}

/// Discover and merge config layers.
///
/// Discovered layers that are unreadable, malformed or invalid are skipped.
/// An explicit file that cannot be read or parsed is an error, since nothing
/// else would stand in for it.
pub fn load_config_with_options(options: &DiscoveryOptions) -> Result<LoadedConfig> {
    let mut config = GridSessionConfig::new();
    let mut layers = Vec::new();

    for (kind, path) in options.layer_paths() {
        let status = if kind == LayerKind::Explicit {
            let layer = load_config_file(&path)?;
            merge_validated(&mut config, layer)
        } else if !path.is_file() {
            LayerStatus::Missing
        } else {
            match load_config_file(&path) {
                Ok(layer) => merge_validated(&mut config, layer),
                Err(e) => LayerStatus::Rejected(e.to_string()),
            }
        };

        let layer = ConfigLayer { kind, path, status };
        match &layer.status {
            LayerStatus::Applied => {
                debug!(layer = %kind, path = %layer.path.display(), "Applied config layer");
            }
            LayerStatus::Rejected(reason) => {
                debug!(
                    layer = %kind,
                    path = %layer.path.display(),
                    %reason,
                    "Rejected config layer"
                );
            }
            LayerStatus::Missing => {}
        }
        layers.push(layer);
    }

    Ok(LoadedConfig { config, layers })
}

/// Merge `layer` only if the result still validates.
fn merge_validated(config: &mut GridSessionConfig, layer: GridSessionConfig) -> LayerStatus {
    let mut candidate = config.clone();
    candidate.merge(layer);
    match candidate.validate() {
        Ok(()) => {
            *config = candidate;
            LayerStatus::Applied
        }
        Err(e) => LayerStatus::Rejected(e.to_string()),
    }
}

/// Read and parse a single config file without validating it.
pub fn load_config_file(path: &Path) -> Result<GridSessionConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    GridSessionConfig::from_toml(&contents)
}

/// Write `config` as TOML, creating parent directories.
pub fn save_config(config: &GridSessionConfig, path: &Path) -> Result<()> {
    let write_err = |p: &Path, e| ConfigError::WriteFile {
        path: p.display().to_string(),
        source: e,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| write_err(parent, e))?;
    }
    std::fs::write(path, config.to_toml()?).map_err(|e| write_err(path, e))
}

pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// User config directory: `$GRIDSESSION_CONFIG_DIR` if set and non-empty,
/// else the platform config dir.
pub fn xdg_config_dir() -> Option<PathBuf> {
    match std::env::var(CONFIG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join(APP_NAME)),
    }
}
