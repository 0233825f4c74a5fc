//! Lifecycle events produced by stores, translators and key-event messages.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gridsession_core::store::KeyEventSettings;
use gridsession_core::{
    BroadcastEventBus, DestroyEventMode, EventBus, EventOrigin, KeyEventMessageListener,
    KeyValueStore, MessageListener, PeerStore, PublishError, SessionEvent, SessionEventKind,
    SessionRef, SessionRepository, Subscription,
};
use tokio::sync::broadcast::Receiver;

fn drain(rx: &mut Receiver<SessionEvent>) -> Vec<(SessionEventKind, String)> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .map(|e| (e.kind, e.session_id().to_string()))
        .collect()
}

#[test]
fn test_repository_lifecycle_publishes_created_then_deleted() {
    let bus = Arc::new(BroadcastEventBus::new(16));
    let mut rx = bus.subscribe();
    let repo = SessionRepository::builder()
        .store(Arc::new(PeerStore::new("ClusteredSessions")))
        .event_bus(bus)
        .destroy_event_mode(DestroyEventMode::Deleted)
        .build()
        .unwrap();

    let session = repo.create_session();
    repo.save(&session).unwrap();
    let created = rx.try_recv().unwrap();
    assert_eq!(created.kind, SessionEventKind::Created);
    assert_eq!(created.origin, EventOrigin::EntryNotification);
    assert_eq!(created.subject.session().map(|s| s.id()), Some(session.id()));

    repo.delete(session.id()).unwrap();
    assert_eq!(drain(&mut rx), vec![(SessionEventKind::Deleted, session.id().to_string())]);
}

#[test]
fn test_default_destroy_mapping_is_destroyed() {
    let bus = Arc::new(BroadcastEventBus::new(16));
    let mut rx = bus.subscribe();
    let repo = SessionRepository::builder()
        .store(Arc::new(PeerStore::new("ClusteredSessions")))
        .event_bus(bus)
        .build()
        .unwrap();

    let session = repo.create_session();
    repo.save(&session).unwrap();
    repo.delete(session.id()).unwrap();

    let kinds: Vec<_> = drain(&mut rx).into_iter().map(|(k, _)| k).collect();
    assert_eq!(kinds, vec![SessionEventKind::Created, SessionEventKind::Destroyed]);
}

#[test]
fn test_lifecycle_without_subscribers_publishes_quietly() {
    let bus = Arc::new(BroadcastEventBus::new(16));
    let repo = SessionRepository::builder()
        .store(Arc::new(PeerStore::new("ClusteredSessions")))
        .event_bus(bus.clone())
        .build()
        .unwrap();
    assert_eq!(bus.receiver_count(), 0);

    let session = repo.create_session();
    repo.save(&session).unwrap();
    assert!(repo.get_session(session.id()).unwrap().is_some());
    repo.delete(session.id()).unwrap();

    let event = SessionEvent::new(
        SessionEventKind::Created,
        SessionRef::IdOnly(session.id().to_string()),
        EventOrigin::EntryNotification,
    );
    assert_eq!(bus.publish(event), Ok(()));
}

#[test]
fn test_idle_expiry_publishes_expired() {
    let bus = Arc::new(BroadcastEventBus::new(16));
    let mut rx = bus.subscribe();
    let store = Arc::new(
        PeerStore::new("ClusteredSessions").with_idle_timeout(Some(Duration::from_millis(10))),
    );
    let repo = SessionRepository::builder()
        .store(store.clone())
        .event_bus(bus)
        .build()
        .unwrap();

    let session = repo.create_session();
    repo.save(&session).unwrap();
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(store.expire_idle_entries(), 1);

    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![
            (SessionEventKind::Created, session.id().to_string()),
            (SessionEventKind::Expired, session.id().to_string()),
        ]
    );
}

#[test]
fn test_expired_read_publishes_destroy_event() {
    let bus = Arc::new(BroadcastEventBus::new(16));
    let mut rx = bus.subscribe();
    let repo = SessionRepository::builder()
        .store(Arc::new(PeerStore::new("ClusteredSessions")))
        .event_bus(bus)
        .destroy_event_mode(DestroyEventMode::Deleted)
        .build()
        .unwrap();

    let session = repo.create_session();
    session.set_last_accessed_time(0);
    repo.save(&session).unwrap();
    assert!(repo.get_session(session.id()).unwrap().is_none());

    let kinds: Vec<_> = drain(&mut rx).into_iter().map(|(k, _)| k).collect();
    assert_eq!(kinds, vec![SessionEventKind::Created, SessionEventKind::Deleted]);
}

fn key_event_listener() -> (KeyEventMessageListener, Receiver<SessionEvent>) {
    let bus = Arc::new(BroadcastEventBus::new(16));
    let rx = bus.subscribe();
    (KeyEventMessageListener::new(bus, "spring:session:sessions"), rx)
}

#[test]
fn test_key_event_del_publishes_deleted() {
    let (listener, mut rx) = key_event_listener();
    listener.on_message(b"__keyevent@0__:del", b"spring:session:sessions:123");

    let event = rx.try_recv().unwrap();
    assert_eq!(event.kind, SessionEventKind::Deleted);
    assert_eq!(event.session_id(), "123");
    assert!(event.subject.session().is_none());
}

#[test]
fn test_key_event_expired_publishes_expired() {
    let (listener, mut rx) = key_event_listener();
    listener.on_message(b"__keyevent@0__:expired", b"spring:session:sessions:123");

    assert_eq!(drain(&mut rx), vec![(SessionEventKind::Expired, "123".to_string())]);
}

#[test]
fn test_key_event_other_command_is_ignored() {
    let (listener, mut rx) = key_event_listener();
    listener.on_message(b"__keyevent@0__:hset", b"spring:session:sessions:123");
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_key_event_wrong_prefix_is_ignored() {
    let (listener, mut rx) = key_event_listener();
    listener.on_message(b"__keyevent@0__:del", b"other:sessions:123");
    assert!(drain(&mut rx).is_empty());
}

struct FlakyBus {
    calls: AtomicUsize,
    inner: BroadcastEventBus,
}

impl EventBus for FlakyBus {
    fn publish(&self, event: SessionEvent) -> Result<(), PublishError> {
        match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 => Err(PublishError::Rejected("bus unavailable".into())),
            1 => panic!("subscriber failed"),
            _ => self.inner.publish(event),
        }
    }
}

#[test]
fn test_bus_failures_are_contained_and_later_messages_still_flow() {
    let inner = BroadcastEventBus::new(16);
    let mut rx = inner.subscribe();
    let bus = Arc::new(FlakyBus {
        calls: AtomicUsize::new(0),
        inner,
    });
    let listener = KeyEventMessageListener::new(bus.clone(), "spring:session:sessions");

    listener.on_message(b"__keyevent@0__:del", b"spring:session:sessions:1");
    listener.on_message(b"__keyevent@0__:del", b"spring:session:sessions:2");
    listener.on_message(b"__keyevent@0__:del", b"spring:session:sessions:3");

    assert_eq!(bus.calls.load(Ordering::SeqCst), 3);
    assert_eq!(drain(&mut rx), vec![(SessionEventKind::Deleted, "3".to_string())]);
}

#[test]
fn test_peer_store_key_events_drive_the_listener() {
    let bus = Arc::new(BroadcastEventBus::new(16));
    let mut rx = bus.subscribe();
    let store = PeerStore::new("ClusteredSessions").with_key_events(KeyEventSettings {
        key_prefix: "gridsession:sessions".into(),
        database: 0,
    });
    store
        .subscribe(Subscription::KeyEvents(Arc::new(KeyEventMessageListener::new(
            bus,
            "gridsession:sessions",
        ))))
        .unwrap();

    let session = gridsession_core::Session::with_id("abc").unwrap();
    store.put("abc", &session).unwrap();
    store.remove("abc").unwrap();

    let event = rx.try_recv().unwrap();
    assert_eq!(event.kind, SessionEventKind::Deleted);
    assert_eq!(event.origin, EventOrigin::KeyEvent);
    assert_eq!(event.session_id(), "abc");
    assert!(rx.try_recv().is_err());
}
