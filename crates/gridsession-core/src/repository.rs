//! Session repository over a pluggable store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use gridsession_config::{DEFAULT_MAX_INACTIVE_INTERVAL_SECS, DestroyEventMode, GridSessionConfig};
use tracing::{debug, trace};

use crate::bus::EventBus;
use crate::error::{Error, Result};
use crate::listener::SessionEventTranslator;
use crate::principal::PRINCIPAL_NAME_INDEX_NAME;
use crate::session::Session;
use crate::store::{IndexPredicate, KeyValueStore, Subscription};

/// Creates, stores, fetches and deletes sessions.
///
/// Lifecycle events are not published by the repository itself; they come
/// from the store's notifications, translated by a [`SessionEventTranslator`]
/// attached at build time.
pub struct SessionRepository {
    store: Arc<dyn KeyValueStore>,
    max_inactive_interval_secs: AtomicI32,
}

impl SessionRepository {
    pub fn builder() -> SessionRepositoryBuilder {
        SessionRepositoryBuilder::default()
    }

    /// Builder preloaded with the repository settings from `config`.
    pub fn builder_from_config(config: &GridSessionConfig) -> SessionRepositoryBuilder {
        Self::builder()
            .max_inactive_interval_secs(config.session().max_inactive_interval_secs)
            .destroy_event_mode(config.events().destroy_event)
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Interval applied to sessions created by [`create_session`](Self::create_session).
    pub fn max_inactive_interval_secs(&self) -> i32 {
        self.max_inactive_interval_secs.load(Ordering::Relaxed)
    }

    pub fn set_max_inactive_interval_secs(&self, secs: i32) {
        self.max_inactive_interval_secs.store(secs, Ordering::Relaxed);
    }

    /// A new, unsaved session with the repository's default interval.
    pub fn create_session(&self) -> Session {
        let session = Session::new(self.max_inactive_interval_secs());
        trace!(session_id = %session.id(), "Created session");
        session
    }

    /// Insert or replace the session under its id.
    pub fn save(&self, session: &Session) -> Result<()> {
        let outcome = self.store.put(session.id(), session)?;
        trace!(session_id = %session.id(), ?outcome, "Saved session");
        Ok(())
    }

    /// Fetch a live session, refreshing its last-accessed time.
    ///
    /// An expired session is deleted from the store and reported as absent.
    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let Some(session) = self.store.get(id)? else {
            return Ok(None);
        };
        if session.is_expired() {
            debug!(session_id = %id, "Session expired on read, deleting");
            self.delete(id)?;
            return Ok(None);
        }
        session.touch();
        Ok(Some(session))
    }

    /// Remove the session. Removing a missing session is not an error.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.remove(id)?;
        Ok(())
    }

    /// Live sessions whose `index_name` value equals `value`, keyed by id.
    pub fn find_by_index_name_and_value(
        &self,
        index_name: &str,
        value: &str,
    ) -> Result<HashMap<String, Session>> {
        let matches = self
            .store
            .query(index_name, &IndexPredicate::Equals(value.to_string()))?;
        let found: HashMap<String, Session> = matches
            .into_iter()
            .filter(|s| !s.is_expired())
            .map(|s| (s.id().to_string(), s))
            .collect();
        trace!(index = %index_name, value = %value, count = found.len(), "Index lookup");
        Ok(found)
    }

    pub fn find_by_principal_name(&self, principal_name: &str) -> Result<HashMap<String, Session>> {
        self.find_by_index_name_and_value(PRINCIPAL_NAME_INDEX_NAME, principal_name)
    }
}

/// Builder for [`SessionRepository`].
pub struct SessionRepositoryBuilder {
    store: Option<Arc<dyn KeyValueStore>>,
    max_inactive_interval_secs: i32,
    bus: Option<Arc<dyn EventBus>>,
    destroy_mode: DestroyEventMode,
}

impl Default for SessionRepositoryBuilder {
    fn default() -> Self {
        Self {
            store: None,
            max_inactive_interval_secs: DEFAULT_MAX_INACTIVE_INTERVAL_SECS,
            bus: None,
            destroy_mode: DestroyEventMode::default(),
        }
    }
}

impl SessionRepositoryBuilder {
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn max_inactive_interval_secs(mut self, secs: i32) -> Self {
        self.max_inactive_interval_secs = secs;
        self
    }

    /// Publish lifecycle events derived from the store's notifications.
    pub fn event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn destroy_event_mode(mut self, mode: DestroyEventMode) -> Self {
        self.destroy_mode = mode;
        self
    }

    pub fn build(self) -> Result<SessionRepository> {
        let store = self.store.ok_or_else(|| {
            Error::InvalidConfiguration("a key-value store is required".to_string())
        })?;

        if let Some(bus) = self.bus {
            let translator = SessionEventTranslator::new(bus, self.destroy_mode);
            store.subscribe(Subscription::Entries(Arc::new(translator)))?;
            debug!(region = %store.name(), destroy_mode = ?self.destroy_mode, "Attached session event translator");
        }

        Ok(SessionRepository {
            store,
            max_inactive_interval_secs: AtomicI32::new(self.max_inactive_interval_secs),
        })
    }
}
