//! Pub/sub key-event message translation.
//!
//! Key-value servers with keyspace notifications publish a message per key
//! change on a channel such as `__keyevent@0__:del`, with the affected key as
//! the body. [`KeyEventMessageListener`] turns the `del` and `expired`
//! messages for session keys into lifecycle events.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::bus::{EventBus, publish_logged};
use crate::event::{EventOrigin, SessionEvent, SessionEventKind, SessionRef};
use crate::store::MessageListener;

pub struct KeyEventMessageListener {
    bus: Arc<dyn EventBus>,
    key_prefix: String,
}

impl KeyEventMessageListener {
    /// `key_prefix` is the part of a session key before `:<id>`.
    pub fn new(bus: Arc<dyn EventBus>, key_prefix: impl Into<String>) -> Self {
        Self {
            bus,
            key_prefix: key_prefix.into(),
        }
    }

    /// Session id carried by a message body, if it names a session key.
    fn session_id<'a>(&self, body: &'a str) -> Option<&'a str> {
        body.strip_prefix(self.key_prefix.as_str())?
            .strip_prefix(':')
            .filter(|id| !id.is_empty())
    }
}

fn event_kind(channel: &str) -> Option<SessionEventKind> {
    match channel.rsplit_once(':')?.1 {
        "del" => Some(SessionEventKind::Deleted),
        "expired" => Some(SessionEventKind::Expired),
        _ => None,
    }
}

impl MessageListener for KeyEventMessageListener {
    fn on_message(&self, channel: &[u8], body: &[u8]) {
        let (Ok(channel), Ok(body)) = (std::str::from_utf8(channel), std::str::from_utf8(body))
        else {
            trace!("Ignoring non-UTF-8 key-event message");
            return;
        };
        let Some(kind) = event_kind(channel) else {
            trace!(channel = %channel, "Ignoring key event");
            return;
        };
        let Some(session_id) = self.session_id(body) else {
            trace!(channel = %channel, key = %body, "Ignoring key outside the session keyspace");
            return;
        };

        debug!(%kind, session_id = %session_id, "Translating key event");
        publish_logged(
            self.bus.as_ref(),
            SessionEvent::new(
                kind,
                SessionRef::IdOnly(session_id.to_string()),
                EventOrigin::KeyEvent,
            ),
        );
    }
}
