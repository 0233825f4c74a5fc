//! Translation of store entry notifications into lifecycle events.

use std::sync::Arc;

use gridsession_config::DestroyEventMode;
use tracing::debug;

use crate::bus::{EventBus, publish_logged};
use crate::event::{EventOrigin, SessionEvent, SessionEventKind, SessionRef};
use crate::session::Session;
use crate::store::EntryListener;

/// Publishes a [`SessionEvent`] for every entry notification it receives.
///
/// | Notification | Event |
/// |--------------|-------|
/// | create       | `Created` |
/// | invalidate   | `Expired` |
/// | destroy      | per [`DestroyEventMode`] |
///
/// Publication failures are logged and swallowed.
pub struct SessionEventTranslator {
    bus: Arc<dyn EventBus>,
    destroy_mode: DestroyEventMode,
}

impl SessionEventTranslator {
    pub fn new(bus: Arc<dyn EventBus>, destroy_mode: DestroyEventMode) -> Self {
        Self { bus, destroy_mode }
    }

    fn publish(&self, kind: SessionEventKind, key: &str, value: Option<&Session>) {
        debug!(%kind, session_id = %key, "Translating entry notification");
        let subject = SessionRef::from_notification(key, value);
        publish_logged(
            self.bus.as_ref(),
            SessionEvent::new(kind, subject, EventOrigin::EntryNotification),
        );
    }
}

impl EntryListener for SessionEventTranslator {
    fn after_create(&self, key: &str, value: Option<&Session>) {
        self.publish(SessionEventKind::Created, key, value);
    }

    fn after_invalidate(&self, key: &str, old_value: Option<&Session>) {
        self.publish(SessionEventKind::Expired, key, old_value);
    }

    fn after_destroy(&self, key: &str, old_value: Option<&Session>) {
        match self.destroy_mode {
            DestroyEventMode::Destroyed => {
                self.publish(SessionEventKind::Destroyed, key, old_value)
            }
            DestroyEventMode::Deleted => self.publish(SessionEventKind::Deleted, key, old_value),
            DestroyEventMode::Both => {
                self.publish(SessionEventKind::Destroyed, key, old_value);
                self.publish(SessionEventKind::Deleted, key, old_value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BroadcastEventBus, PublishError};

    fn kinds(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<SessionEventKind> {
        std::iter::from_fn(|| rx.try_recv().ok()).map(|e| e.kind).collect()
    }

    #[test]
    fn test_create_and_invalidate() {
        let bus = Arc::new(BroadcastEventBus::new(8));
        let mut rx = bus.subscribe();
        let translator = SessionEventTranslator::new(bus.clone(), DestroyEventMode::default());
        let session = Session::with_id("s1").unwrap();

        translator.after_create("s1", Some(&session));
        translator.after_invalidate("s1", None);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.kind, SessionEventKind::Created);
        assert!(first.subject.session().is_some());

        let second = rx.try_recv().unwrap();
        assert_eq!(second.kind, SessionEventKind::Expired);
        assert!(matches!(second.subject, SessionRef::IdOnly(ref id) if id == "s1"));
    }

    #[test]
    fn test_destroy_modes() {
        let cases = [
            (DestroyEventMode::Destroyed, vec![SessionEventKind::Destroyed]),
            (DestroyEventMode::Deleted, vec![SessionEventKind::Deleted]),
            (
                DestroyEventMode::Both,
                vec![SessionEventKind::Destroyed, SessionEventKind::Deleted],
            ),
        ];
        for (mode, expected) in cases {
            let bus = Arc::new(BroadcastEventBus::new(8));
            let mut rx = bus.subscribe();
            let translator = SessionEventTranslator::new(bus.clone(), mode);

            translator.after_destroy("s1", None);

            assert_eq!(kinds(&mut rx), expected, "mode {mode:?}");
        }
    }

    struct FailingBus;

    impl EventBus for FailingBus {
        fn publish(&self, _event: SessionEvent) -> Result<(), PublishError> {
            Err(PublishError::Rejected("down".into()))
        }
    }

    #[test]
    fn test_publish_failure_does_not_escape() {
        let translator = SessionEventTranslator::new(Arc::new(FailingBus), DestroyEventMode::Both);
        translator.after_create("s1", None);
        translator.after_destroy("s1", None);
    }
}
