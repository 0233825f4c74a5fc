//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [session]                # repository defaults
//! [store]                  # backing store topology and expiry
//! [events]                 # lifecycle event translation
//! [logging]                # tracing output
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSessionConfig {
    /// Session repository defaults.
    pub session: Option<SessionConfig>,

    /// Backing store configuration.
    pub store: Option<StoreConfig>,

    /// Event translation configuration.
    pub events: Option<EventsConfig>,

    /// Logging configuration.
    pub logging: Option<LoggingConfig>,
}

impl GridSessionConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: GridSessionConfig) {
        if other.session.is_some() {
            self.session = other.session;
        }

        if other.store.is_some() {
            self.store = other.store;
        }

        if other.events.is_some() {
            self.events = other.events;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Effective session section.
    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    /// Effective store section.
    pub fn store(&self) -> StoreConfig {
        self.store.clone().unwrap_or_default()
    }

    /// Effective events section.
    pub fn events(&self) -> EventsConfig {
        self.events.clone().unwrap_or_default()
    }

    /// Effective logging section.
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Check the effective configuration for values the runtime cannot use.
    pub fn validate(&self) -> Result<()> {
        let store = self.store();
        if store.region_name.trim().is_empty() {
            return Err(invalid("store.region_name", "must not be empty"));
        }
        if store.cleanup_interval_ms == 0 {
            return Err(invalid("store.cleanup_interval_ms", "must be greater than zero"));
        }

        let events = self.events();
        if events.key_prefix.trim().is_empty() {
            return Err(invalid("events.key_prefix", "must not be empty"));
        }
        if events.key_prefix.ends_with(':') {
            return Err(invalid(
                "events.key_prefix",
                "must not end with ':' (the separator is added automatically)",
            ));
        }
        if events.channel_capacity == 0 {
            return Err(invalid("events.channel_capacity", "must be greater than zero"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default maximum inactive interval: 30 minutes.
pub const DEFAULT_MAX_INACTIVE_INTERVAL_SECS: i32 = 30 * 60;

/// Session repository defaults.
///
/// ```toml
/// [session]
/// max_inactive_interval_secs = 1800
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Interval applied to newly created sessions. Negative disables expiry.
    pub max_inactive_interval_secs: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_inactive_interval_secs: DEFAULT_MAX_INACTIVE_INTERVAL_SECS,
        }
    }
}

impl SessionConfig {
    /// Idle timeout for store entries, derived from the session interval.
    ///
    /// Negative intervals clamp to zero, which disables entry expiry.
    pub fn entry_idle_timeout(&self) -> Option<Duration> {
        match self.max_inactive_interval_secs.max(0) {
            0 => None,
            secs => Some(Duration::from_secs(secs as u64)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default store region name.
pub const DEFAULT_REGION_NAME: &str = "ClusteredSessions";

/// Name of the principal-name index.
pub const PRINCIPAL_NAME_INDEX: &str = "principalName";

/// Which store backend topology to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// The process hosts the data itself.
    #[default]
    Peer,
    /// The process forwards every operation to a server-side store.
    Client,
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topology::Peer => write!(f, "peer"),
            Topology::Client => write!(f, "client"),
        }
    }
}

/// Backing store configuration.
///
/// ```toml
/// [store]
/// topology = "peer"
/// region_name = "ClusteredSessions"
/// cleanup_interval_ms = 1000
/// indexes = ["principalName"]
/// register_interest = true
/// expiration = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store topology.
    pub topology: Topology,
    /// Logical region name, used in log output.
    pub region_name: String,
    /// Interval between idle-expiry sweeps, in milliseconds.
    pub cleanup_interval_ms: u64,
    /// Attribute indexes maintained by the peer store.
    pub indexes: Vec<String>,
    /// Whether a client registers interest in all server-side keys.
    pub register_interest: bool,
    /// Whether idle-timeout entry expiry is enabled (peer topology only).
    pub expiration: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            topology: Topology::default(),
            region_name: DEFAULT_REGION_NAME.to_string(),
            cleanup_interval_ms: 1000,
            indexes: vec![PRINCIPAL_NAME_INDEX.to_string()],
            register_interest: true,
            expiration: true,
        }
    }
}

impl StoreConfig {
    /// Sweep interval as a duration.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default key prefix for key-event message bodies.
pub const DEFAULT_KEY_PREFIX: &str = "gridsession:sessions";

/// Which lifecycle event(s) an entry-destroy notification produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestroyEventMode {
    /// Publish a low-level destroyed event.
    #[default]
    Destroyed,
    /// Publish an application-level deleted event.
    Deleted,
    /// Publish both, destroyed first.
    Both,
}

/// Event translation configuration.
///
/// ```toml
/// [events]
/// destroy_event = "destroyed"
/// key_prefix = "gridsession:sessions"
/// channel_capacity = 256
/// key_events = false
/// database = 0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Mapping for entry-destroy notifications.
    pub destroy_event: DestroyEventMode,
    /// Prefix that key-event message bodies must carry before `:<id>`.
    pub key_prefix: String,
    /// Capacity of the broadcast event bus.
    pub channel_capacity: usize,
    /// Whether the peer store also emits key-event messages.
    pub key_events: bool,
    /// Database number used in key-event channel names.
    pub database: u32,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            destroy_event: DestroyEventMode::default(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            channel_capacity: 256,
            key_events: false,
            database: 0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive for gridsession crates.
    pub level: String,
    /// Emit JSON lines on the console instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = GridSessionConfig::from_toml("").unwrap();
        assert_eq!(config.session().max_inactive_interval_secs, 1800);
        assert_eq!(config.store().topology, Topology::Peer);
        assert_eq!(config.store().indexes, vec!["principalName".to_string()]);
        assert_eq!(config.events().destroy_event, DestroyEventMode::Destroyed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config = GridSessionConfig::from_toml(
            r#"
[session]
max_inactive_interval_secs = 60

[store]
topology = "client"
region_name = "Sessions"
register_interest = false

[events]
destroy_event = "both"
key_prefix = "app:sessions"
"#,
        )
        .unwrap();

        assert_eq!(config.session().max_inactive_interval_secs, 60);
        let store = config.store();
        assert_eq!(store.topology, Topology::Client);
        assert_eq!(store.region_name, "Sessions");
        assert!(!store.register_interest);
        // Unspecified fields within a section keep their defaults
        assert!(store.expiration);
        assert_eq!(config.events().destroy_event, DestroyEventMode::Both);
        assert_eq!(config.events().key_prefix, "app:sessions");
    }

    #[test]
    fn test_unknown_topology_rejected() {
        let err = GridSessionConfig::from_toml("[store]\ntopology = \"mesh\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_merge_later_section_wins() {
        let mut base = GridSessionConfig::from_toml("[session]\nmax_inactive_interval_secs = 10\n[logging]\nlevel = \"debug\"\n").unwrap();
        let overlay = GridSessionConfig::from_toml("[session]\nmax_inactive_interval_secs = 20\n").unwrap();

        base.merge(overlay);

        assert_eq!(base.session().max_inactive_interval_secs, 20);
        assert_eq!(base.logging().level, "debug");
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = GridSessionConfig::new();
        config.store = Some(StoreConfig {
            topology: Topology::Client,
            ..Default::default()
        });

        let text = config.to_toml().unwrap();
        let parsed = GridSessionConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validate_key_prefix() {
        let config =
            GridSessionConfig::from_toml("[events]\nkey_prefix = \"app:sessions:\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "events.key_prefix"));
    }

    #[test]
    fn test_validate_zero_capacity() {
        let config = GridSessionConfig::from_toml("[events]\nchannel_capacity = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_entry_idle_timeout() {
        let negative = SessionConfig {
            max_inactive_interval_secs: -1,
        };
        assert_eq!(negative.entry_idle_timeout(), None);

        let thirty = SessionConfig {
            max_inactive_interval_secs: 30,
        };
        assert_eq!(thirty.entry_idle_timeout(), Some(Duration::from_secs(30)));
    }
}
