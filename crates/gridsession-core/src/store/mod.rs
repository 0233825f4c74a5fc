//! Pluggable key-value storage for sessions.
//!
//! [`KeyValueStore`] is the seam between the repository and whatever grid
//! holds the sessions. Two in-memory backends are provided:
//!
//! - [`PeerStore`]: an authoritative data-holding member with secondary
//!   indexes, delta application and idle-timeout expiry.
//! - [`ClientStore`]: a proxy that forwards every operation to a server
//!   store and optionally relays the server's notifications.
//!
//! Use [`create_store`] to pick one from configuration.

mod client;
mod factory;
mod idle;
mod peer;

use std::sync::Arc;

use crate::error::StoreError;
use crate::session::Session;

pub use client::ClientStore;
pub use factory::{StoreBackend, create_store};
pub use idle::IdleTracker;
pub use peer::{ExpirySweeper, KeyEventSettings, PeerStore};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Whether a put inserted a new key or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    Updated,
}

/// Predicate for a secondary-index query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexPredicate {
    /// Index value equals the given string.
    Equals(String),
}

impl IndexPredicate {
    pub fn matches(&self, value: Option<&str>) -> bool {
        match self {
            IndexPredicate::Equals(expected) => value == Some(expected.as_str()),
        }
    }
}

/// Receives entry-level notifications from a store.
///
/// Callbacks run on whichever thread caused the change (a caller thread for
/// puts and removes, the expiry sweeper for idle expiry) after the store has
/// released its locks.
pub trait EntryListener: Send + Sync {
    /// A new key was inserted.
    fn after_create(&self, key: &str, value: Option<&Session>);

    /// An entry was expired by the store.
    fn after_invalidate(&self, key: &str, old_value: Option<&Session>);

    /// An entry was explicitly removed.
    fn after_destroy(&self, key: &str, old_value: Option<&Session>);
}

/// Receives raw pub/sub key-event messages.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, channel: &[u8], body: &[u8]);
}

/// A listener registration.
#[derive(Clone)]
pub enum Subscription {
    Entries(Arc<dyn EntryListener>),
    KeyEvents(Arc<dyn MessageListener>),
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subscription::Entries(_) => f.write_str("Subscription::Entries"),
            Subscription::KeyEvents(_) => f.write_str("Subscription::KeyEvents"),
        }
    }
}

/// Storage backend holding sessions keyed by id.
pub trait KeyValueStore: Send + Sync {
    /// Name of the region this store serves.
    fn name(&self) -> &str;

    /// Insert or replace the session under `key`.
    ///
    /// A session with pending deltas replacing an existing entry is shipped
    /// as a delta; otherwise the full state is written. Either way the
    /// session's deltas are flushed.
    fn put(&self, key: &str, session: &Session) -> StoreResult<PutOutcome>;

    /// Fetch a replica of the session under `key`.
    fn get(&self, key: &str) -> StoreResult<Option<Session>>;

    /// Remove `key`, returning the previous session if any.
    fn remove(&self, key: &str) -> StoreResult<Option<Session>>;

    /// Sessions whose `index_name` value satisfies `predicate`.
    fn query(&self, index_name: &str, predicate: &IndexPredicate) -> StoreResult<Vec<Session>>;

    /// Register a listener.
    fn subscribe(&self, subscription: Subscription) -> StoreResult<()>;
}
