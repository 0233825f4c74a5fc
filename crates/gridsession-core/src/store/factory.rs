//! Store construction from configuration.

use std::sync::Arc;

use gridsession_config::{GridSessionConfig, Topology};
use tracing::{debug, warn};

use super::{ClientStore, ExpirySweeper, KeyEventSettings, KeyValueStore, PeerStore};
use crate::error::{Error, Result};

/// A store built by [`create_store`], keeping its concrete type available.
#[derive(Clone)]
pub enum StoreBackend {
    Peer(Arc<PeerStore>),
    Client(Arc<ClientStore>),
}

impl StoreBackend {
    /// The backend as a trait object for the repository.
    pub fn as_store(&self) -> Arc<dyn KeyValueStore> {
        match self {
            StoreBackend::Peer(store) => store.clone(),
            StoreBackend::Client(store) => store.clone(),
        }
    }

    pub fn topology(&self) -> Topology {
        match self {
            StoreBackend::Peer(_) => Topology::Peer,
            StoreBackend::Client(_) => Topology::Client,
        }
    }

    /// Start idle-expiry sweeping. Client stores hold no data, so they have nothing to sweep.
    pub fn start_expiry_sweeper(&self, config: &GridSessionConfig) -> Option<ExpirySweeper> {
        match self {
            StoreBackend::Peer(store) if store.idle_timeout().is_some() => {
                Some(store.start_expiry_sweeper(config.store().cleanup_interval()))
            }
            _ => None,
        }
    }
}

/// Build the store described by `config`.
///
/// Peer topology creates a data-holding [`PeerStore`] with the configured
/// indexes, idle expiry and key-event emission. Client topology wraps
/// `server` in a [`ClientStore`] and fails without one.
pub fn create_store(
    config: &GridSessionConfig,
    server: Option<Arc<dyn KeyValueStore>>,
) -> Result<StoreBackend> {
    let store_config = config.store();
    let events = config.events();

    match store_config.topology {
        Topology::Peer => {
            if server.is_some() {
                warn!("Server store ignored for peer topology");
            }
            let idle_timeout = if store_config.expiration {
                config.session().entry_idle_timeout()
            } else {
                None
            };

            let mut store = PeerStore::new(&store_config.region_name).with_idle_timeout(idle_timeout);
            for index in &store_config.indexes {
                store = store.with_index(index);
            }
            if events.key_events {
                store = store.with_key_events(KeyEventSettings {
                    key_prefix: events.key_prefix.clone(),
                    database: events.database,
                });
            }

            debug!(
                region = %store_config.region_name,
                idle_timeout_secs = idle_timeout.map(|t| t.as_secs()),
                indexes = ?store_config.indexes,
                "Created peer store"
            );
            Ok(StoreBackend::Peer(Arc::new(store)))
        }
        Topology::Client => {
            let server = server.ok_or_else(|| {
                Error::InvalidConfiguration(format!(
                    "client topology for region '{}' requires a server store",
                    store_config.region_name
                ))
            })?;
            debug!(
                region = %server.name(),
                register_interest = store_config.register_interest,
                "Created client store"
            );
            Ok(StoreBackend::Client(Arc::new(ClientStore::new(
                server,
                store_config.register_interest,
            ))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsession_config::{SessionConfig, StoreConfig};
    use std::time::Duration;

    fn config(topology: Topology, expiration: bool) -> GridSessionConfig {
        GridSessionConfig {
            session: Some(SessionConfig {
                max_inactive_interval_secs: 60,
            }),
            store: Some(StoreConfig {
                topology,
                expiration,
                ..StoreConfig::default()
            }),
            ..GridSessionConfig::default()
        }
    }

    #[test]
    fn test_peer_store_uses_session_interval_for_idle_timeout() {
        let backend = create_store(&config(Topology::Peer, true), None).unwrap();
        let StoreBackend::Peer(store) = &backend else {
            panic!("expected peer store");
        };
        assert_eq!(store.idle_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(store.name(), "ClusteredSessions");
    }

    #[test]
    fn test_expiration_disabled() {
        let backend = create_store(&config(Topology::Peer, false), None).unwrap();
        let StoreBackend::Peer(store) = &backend else {
            panic!("expected peer store");
        };
        assert_eq!(store.idle_timeout(), None);
        assert!(backend.start_expiry_sweeper(&config(Topology::Peer, false)).is_none());
    }

    #[test]
    fn test_client_requires_server() {
        let err = create_store(&config(Topology::Client, true), None)
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_client_wraps_server() {
        let server = create_store(&config(Topology::Peer, true), None).unwrap();
        let client = create_store(&config(Topology::Client, true), Some(server.as_store())).unwrap();
        assert_eq!(client.topology(), Topology::Client);
        assert!(client.start_expiry_sweeper(&config(Topology::Client, true)).is_none());
    }
}
