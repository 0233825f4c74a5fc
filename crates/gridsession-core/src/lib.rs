//! Replicated session storage.
//!
//! This crate keeps web sessions in a key-value grid and provides:
//! - Per-attribute delta tracking, so replicas ship only what changed
//! - A compact binary wire format for full and delta replication
//! - A [`SessionRepository`] over any [`KeyValueStore`]
//! - Lifecycle events translated from store notifications or key-event messages
//! - Session lookup by principal name through a secondary index
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gridsession_core::{BroadcastEventBus, PeerStore, SessionRepository};
//!
//! let bus = Arc::new(BroadcastEventBus::new(256));
//! let mut events = bus.subscribe();
//!
//! let repository = SessionRepository::builder()
//!     .store(Arc::new(PeerStore::new("ClusteredSessions").with_index("principalName")))
//!     .event_bus(bus)
//!     .build()?;
//!
//! let session = repository.create_session();
//! session.set_principal_name("jblum");
//! repository.save(&session)?;
//!
//! let mine = repository.find_by_principal_name("jblum")?;
//! ```

mod attributes;
mod bus;
mod codec;
mod error;
mod event;
mod keyevent;
mod listener;
mod principal;
mod repository;
mod session;
mod value;

pub mod store;

pub use attributes::SessionAttributes;
pub use bus::{BroadcastEventBus, EventBus, NoopEventBus, PublishError};
pub use codec::CodecError;
pub use error::{Error, Result, StoreError};
pub use event::{EventOrigin, SessionEvent, SessionEventKind, SessionRef};
pub use keyevent::KeyEventMessageListener;
pub use listener::SessionEventTranslator;
pub use principal::{
    Authentication, HasPrincipalName, PRINCIPAL_NAME_INDEX_NAME, SECURITY_CONTEXT_ATTRIBUTE,
    SecurityContext,
};
pub use repository::{SessionRepository, SessionRepositoryBuilder};
pub use session::{Session, now_millis};
pub use store::{
    ClientStore, EntryListener, IndexPredicate, KeyValueStore, MessageListener, PeerStore,
    PutOutcome, StoreBackend, Subscription, create_store,
};
pub use value::AttributeValue;

pub use gridsession_config::{DestroyEventMode, Topology};
