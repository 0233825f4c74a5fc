//! In-memory data-holding store.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use super::idle::IdleTracker;
use super::{
    EntryListener, IndexPredicate, KeyValueStore, MessageListener, PutOutcome, StoreResult,
    Subscription,
};
use crate::error::{Error, StoreError};
use crate::session::Session;

/// Pub/sub key-event emission settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEventSettings {
    /// Prefix prepended to session ids in message bodies.
    pub key_prefix: String,
    /// Database number in the `__keyevent@<db>__` channel name.
    pub database: u32,
}

impl KeyEventSettings {
    fn channel(&self, event: &str) -> String {
        format!("__keyevent@{}__:{}", self.database, event)
    }

    fn body(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[derive(Default)]
struct PeerData {
    entries: HashMap<String, Bytes>,
    /// index name -> index value -> keys
    index: HashMap<String, HashMap<String, HashSet<String>>>,
    /// key -> (index name, index value) pairs recorded for it
    indexed_by_key: HashMap<String, Vec<(String, String)>>,
}

impl PeerData {
    fn unindex(&mut self, key: &str) {
        let Some(pairs) = self.indexed_by_key.remove(key) else {
            return;
        };
        for (name, value) in pairs {
            if let Some(values) = self.index.get_mut(&name)
                && let Some(keys) = values.get_mut(&value)
            {
                keys.remove(key);
                if keys.is_empty() {
                    values.remove(&value);
                }
            }
        }
    }

    fn reindex(&mut self, key: &str, session: &Session, indexes: &[String]) {
        self.unindex(key);
        let mut pairs = Vec::new();
        for name in indexes {
            if let Some(value) = session.index_value(name) {
                self.index
                    .entry(name.clone())
                    .or_default()
                    .entry(value.clone())
                    .or_default()
                    .insert(key.to_string());
                pairs.push((name.clone(), value));
            }
        }
        if !pairs.is_empty() {
            self.indexed_by_key.insert(key.to_string(), pairs);
        }
    }
}

/// Authoritative in-memory store.
///
/// Entries are held in encoded form, so every read yields an independent
/// replica. Configured indexes are maintained on every write; queries on
/// other names fall back to a scan. With an idle timeout set, entries not
/// read or written within the timeout are expired by
/// [`expire_idle_entries`](Self::expire_idle_entries), which the optional
/// background sweeper calls periodically.
pub struct PeerStore {
    name: String,
    indexes: Vec<String>,
    key_events: Option<KeyEventSettings>,
    data: RwLock<PeerData>,
    idle: Mutex<IdleTracker>,
    entry_listeners: RwLock<Vec<Arc<dyn EntryListener>>>,
    message_listeners: RwLock<Vec<Arc<dyn MessageListener>>>,
}

impl PeerStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: Vec::new(),
            key_events: None,
            data: RwLock::new(PeerData::default()),
            idle: Mutex::new(IdleTracker::new(None)),
            entry_listeners: RwLock::new(Vec::new()),
            message_listeners: RwLock::new(Vec::new()),
        }
    }

    /// Expire entries idle for longer than `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle = Mutex::new(IdleTracker::new(timeout));
        self
    }

    /// Maintain a secondary index under `name`.
    pub fn with_index(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.indexes.contains(&name) {
            self.indexes.push(name);
        }
        self
    }

    /// Emit key-event messages to subscribed [`MessageListener`]s.
    pub fn with_key_events(mut self, settings: KeyEventSettings) -> Self {
        self.key_events = Some(settings);
        self
    }

    pub fn len(&self) -> usize {
        self.data.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().entries.contains_key(key)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle.lock().timeout()
    }

    /// Remove every idle entry, notifying listeners of each invalidation.
    ///
    /// Returns the number of entries expired.
    pub fn expire_idle_entries(&self) -> usize {
        let expired: Vec<(String, Bytes)> = {
            let mut data = self.data.write();
            let keys = self.idle.lock().drain_idle();
            let mut expired = Vec::with_capacity(keys.len());
            for key in keys {
                if let Some(bytes) = data.entries.remove(&key) {
                    data.unindex(&key);
                    expired.push((key, bytes));
                }
            }
            expired
        };

        if expired.is_empty() {
            return 0;
        }
        debug!(region = %self.name, count = expired.len(), "Expired idle sessions");

        for (key, bytes) in &expired {
            let old = self.decode_for_notification(key, bytes);
            self.notify_entries(|l| l.after_invalidate(key, old.as_ref()));
            self.publish_key_event("expired", key);
        }
        expired.len()
    }

    /// Spawn a thread that expires idle entries every `interval`.
    ///
    /// The thread holds only a weak reference and exits when the store is
    /// dropped or the returned handle is dropped.
    pub fn start_expiry_sweeper(self: &Arc<Self>, interval: Duration) -> ExpirySweeper {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let store: Weak<PeerStore> = Arc::downgrade(self);
        debug!(region = %self.name, interval_ms = interval.as_millis() as u64, "Starting expiry sweeper");

        let handle = std::thread::spawn(move || {
            while let Err(RecvTimeoutError::Timeout) = stop_rx.recv_timeout(interval) {
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.expire_idle_entries();
            }
            trace!("Expiry sweeper stopped");
        });

        ExpirySweeper {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }

    fn decode_for_notification(&self, key: &str, bytes: &Bytes) -> Option<Session> {
        match Session::from_data(bytes) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(region = %self.name, key = %key, error = %e, "Stored session could not be decoded");
                None
            }
        }
    }

    fn notify_entries(&self, f: impl Fn(&dyn EntryListener)) {
        let listeners = self.entry_listeners.read().clone();
        for listener in &listeners {
            f(listener.as_ref());
        }
    }

    fn publish_key_event(&self, event: &str, key: &str) {
        let Some(settings) = &self.key_events else {
            return;
        };
        let listeners = self.message_listeners.read().clone();
        if listeners.is_empty() {
            return;
        }
        let channel = settings.channel(event);
        let body = settings.body(key);
        for listener in &listeners {
            listener.on_message(channel.as_bytes(), body.as_bytes());
        }
    }
}

fn codec_error(e: Error) -> StoreError {
    StoreError::Codec(e.to_string())
}

impl KeyValueStore for PeerStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn put(&self, key: &str, session: &Session) -> StoreResult<PutOutcome> {
        let outcome = {
            let mut data = self.data.write();
            let existing = data.entries.get(key).cloned();

            let (outcome, bytes) = match existing {
                Some(existing) if session.has_delta() => {
                    let replica = Session::from_data(&existing).map_err(codec_error)?;
                    replica
                        .apply_delta(&session.to_delta())
                        .map_err(codec_error)?;
                    data.reindex(key, &replica, &self.indexes);
                    trace!(region = %self.name, session_id = %key, "Applied session delta");
                    (PutOutcome::Updated, replica.to_data())
                }
                existing => {
                    data.reindex(key, session, &self.indexes);
                    let outcome = if existing.is_some() {
                        PutOutcome::Updated
                    } else {
                        PutOutcome::Created
                    };
                    (outcome, session.to_data())
                }
            };

            data.entries.insert(key.to_string(), bytes);
            self.idle.lock().touch(key);
            outcome
        };

        debug!(region = %self.name, session_id = %key, ?outcome, "Stored session");
        if outcome == PutOutcome::Created {
            self.notify_entries(|l| l.after_create(key, Some(session)));
        }
        self.publish_key_event("hset", key);
        Ok(outcome)
    }

    fn get(&self, key: &str) -> StoreResult<Option<Session>> {
        let bytes = {
            let data = self.data.read();
            let Some(bytes) = data.entries.get(key).cloned() else {
                trace!(region = %self.name, session_id = %key, "Session not found");
                return Ok(None);
            };
            self.idle.lock().touch(key);
            bytes
        };
        Session::from_data(&bytes).map(Some).map_err(codec_error)
    }

    fn remove(&self, key: &str) -> StoreResult<Option<Session>> {
        let removed = {
            let mut data = self.data.write();
            let removed = data.entries.remove(key);
            if removed.is_some() {
                data.unindex(key);
                self.idle.lock().forget(key);
            }
            removed
        };

        let Some(bytes) = removed else {
            trace!(region = %self.name, session_id = %key, "Nothing to remove");
            return Ok(None);
        };
        debug!(region = %self.name, session_id = %key, "Removed session");

        let old = self.decode_for_notification(key, &bytes);
        self.notify_entries(|l| l.after_destroy(key, old.as_ref()));
        self.publish_key_event("del", key);
        Ok(old)
    }

    fn query(&self, index_name: &str, predicate: &IndexPredicate) -> StoreResult<Vec<Session>> {
        let matched: Vec<Bytes> = {
            let data = self.data.read();
            if self.indexes.iter().any(|i| i == index_name) {
                let IndexPredicate::Equals(value) = predicate;
                data.index
                    .get(index_name)
                    .and_then(|values| values.get(value))
                    .map(|keys| {
                        keys.iter()
                            .filter_map(|k| data.entries.get(k).cloned())
                            .collect()
                    })
                    .unwrap_or_default()
            } else {
                trace!(region = %self.name, index = %index_name, "Query on unindexed name; scanning");
                let mut matched = Vec::new();
                for bytes in data.entries.values() {
                    let session = Session::from_data(bytes).map_err(codec_error)?;
                    if predicate.matches(session.index_value(index_name).as_deref()) {
                        matched.push(bytes.clone());
                    }
                }
                matched
            }
        };

        matched
            .iter()
            .map(|bytes| Session::from_data(bytes).map_err(codec_error))
            .collect()
    }

    fn subscribe(&self, subscription: Subscription) -> StoreResult<()> {
        match subscription {
            Subscription::Entries(listener) => self.entry_listeners.write().push(listener),
            Subscription::KeyEvents(listener) => {
                if self.key_events.is_none() {
                    warn!(region = %self.name, "Key-event listener registered but key events are disabled");
                }
                self.message_listeners.write().push(listener)
            }
        }
        Ok(())
    }
}

/// Handle to a running expiry sweeper thread. Drop to stop it.
pub struct ExpirySweeper {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
