//! Client-side proxy store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::{
    EntryListener, IndexPredicate, KeyValueStore, PutOutcome, StoreResult, Subscription,
};
use crate::error::StoreError;
use crate::session::Session;

/// A proxy that holds no data of its own.
///
/// Every operation is forwarded to the server store. With interest
/// registered, entry listeners are attached to the server and see every
/// change in the region; without it they only hear about creates and
/// removes issued through this client.
pub struct ClientStore {
    server: Arc<dyn KeyValueStore>,
    register_interest: bool,
    connected: AtomicBool,
    local_listeners: RwLock<Vec<Arc<dyn EntryListener>>>,
}

impl ClientStore {
    pub fn new(server: Arc<dyn KeyValueStore>, register_interest: bool) -> Self {
        Self {
            server,
            register_interest,
            connected: AtomicBool::new(true),
            local_listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Drop the connection. Later operations fail with [`StoreError::Disconnected`].
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            warn!(region = %self.server.name(), "Client store disconnected");
        }
    }

    /// Restore the connection after [`disconnect`](Self::disconnect).
    pub fn reconnect(&self) {
        if !self.connected.swap(true, Ordering::AcqRel) {
            debug!(region = %self.server.name(), "Client store reconnected");
        }
    }

    fn server(&self) -> StoreResult<&dyn KeyValueStore> {
        if self.is_connected() {
            Ok(self.server.as_ref())
        } else {
            Err(StoreError::Disconnected(self.server.name().to_string()))
        }
    }

    fn notify_local(&self, f: impl Fn(&dyn EntryListener)) {
        if self.register_interest {
            return;
        }
        let listeners = self.local_listeners.read().clone();
        for listener in &listeners {
            f(listener.as_ref());
        }
    }
}

impl KeyValueStore for ClientStore {
    fn name(&self) -> &str {
        self.server.name()
    }

    fn put(&self, key: &str, session: &Session) -> StoreResult<PutOutcome> {
        let outcome = self.server()?.put(key, session)?;
        if outcome == PutOutcome::Created {
            self.notify_local(|l| l.after_create(key, Some(session)));
        }
        Ok(outcome)
    }

    fn get(&self, key: &str) -> StoreResult<Option<Session>> {
        self.server()?.get(key)
    }

    fn remove(&self, key: &str) -> StoreResult<Option<Session>> {
        let old = self.server()?.remove(key)?;
        if old.is_some() {
            self.notify_local(|l| l.after_destroy(key, old.as_ref()));
        }
        Ok(old)
    }

    fn query(&self, index_name: &str, predicate: &IndexPredicate) -> StoreResult<Vec<Session>> {
        self.server()?.query(index_name, predicate)
    }

    fn subscribe(&self, subscription: Subscription) -> StoreResult<()> {
        match subscription {
            Subscription::Entries(listener) if !self.register_interest => {
                self.local_listeners.write().push(listener);
                Ok(())
            }
            other => self.server()?.subscribe(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PeerStore;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl EntryListener for Recorder {
        fn after_create(&self, key: &str, _: Option<&Session>) {
            self.0.lock().push(format!("create:{key}"));
        }
        fn after_invalidate(&self, key: &str, _: Option<&Session>) {
            self.0.lock().push(format!("invalidate:{key}"));
        }
        fn after_destroy(&self, key: &str, _: Option<&Session>) {
            self.0.lock().push(format!("destroy:{key}"));
        }
    }

    #[test]
    fn test_operations_reach_server() {
        let server = Arc::new(PeerStore::new("Sessions"));
        let client = ClientStore::new(server.clone(), true);
        let session = Session::with_id("s1").unwrap();

        client.put("s1", &session).unwrap();
        assert!(server.contains_key("s1"));
        assert_eq!(client.get("s1").unwrap().unwrap().id(), "s1");

        client.remove("s1").unwrap();
        assert!(server.is_empty());
    }

    #[test]
    fn test_interest_sees_remote_changes() {
        let server = Arc::new(PeerStore::new("Sessions"));
        let client = ClientStore::new(server.clone(), true);
        let recorder = Arc::new(Recorder::default());
        client
            .subscribe(Subscription::Entries(recorder.clone()))
            .unwrap();

        server.put("remote", &Session::with_id("remote").unwrap()).unwrap();
        client.put("local", &Session::with_id("local").unwrap()).unwrap();

        assert_eq!(*recorder.0.lock(), vec!["create:remote", "create:local"]);
    }

    #[test]
    fn test_without_interest_only_local_changes() {
        let server = Arc::new(PeerStore::new("Sessions"));
        let client = ClientStore::new(server.clone(), false);
        let recorder = Arc::new(Recorder::default());
        client
            .subscribe(Subscription::Entries(recorder.clone()))
            .unwrap();

        server.put("remote", &Session::with_id("remote").unwrap()).unwrap();
        client.put("local", &Session::with_id("local").unwrap()).unwrap();
        client.remove("local").unwrap();

        assert_eq!(*recorder.0.lock(), vec!["create:local", "destroy:local"]);
    }

    #[test]
    fn test_disconnected_operations_fail() {
        let server = Arc::new(PeerStore::new("Sessions"));
        let client = ClientStore::new(server, true);
        client.disconnect();

        let err = client.get("s1").unwrap_err();
        assert!(matches!(err, StoreError::Disconnected(ref region) if region == "Sessions"));

        client.reconnect();
        assert!(client.get("s1").unwrap().is_none());
    }
}
