//! Typed session lifecycle events.

use chrono::{DateTime, Utc};

use crate::session::Session;

/// What happened to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    Created,
    /// Removed on request by the application.
    Deleted,
    /// Removed by the store because it sat idle too long.
    Expired,
    /// Removed at the store level.
    Destroyed,
}

impl std::fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            SessionEventKind::Created => "created",
            SessionEventKind::Deleted => "deleted",
            SessionEventKind::Expired => "expired",
            SessionEventKind::Destroyed => "destroyed",
        })
    }
}

/// The session an event refers to.
///
/// Notifications that carry no value, such as key-event messages, only
/// identify the session.
#[derive(Debug, Clone)]
pub enum SessionRef {
    Full(Session),
    IdOnly(String),
}

impl SessionRef {
    pub fn id(&self) -> &str {
        match self {
            SessionRef::Full(session) => session.id(),
            SessionRef::IdOnly(id) => id,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionRef::Full(session) => Some(session),
            SessionRef::IdOnly(_) => None,
        }
    }

    /// Full session if present, otherwise the id alone.
    pub(crate) fn from_notification(key: &str, value: Option<&Session>) -> Self {
        match value {
            Some(session) => SessionRef::Full(session.clone()),
            None => SessionRef::IdOnly(key.to_string()),
        }
    }
}

/// Which translator produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// Translated from a store entry notification.
    EntryNotification,
    /// Translated from a pub/sub key-event message.
    KeyEvent,
}

/// A session lifecycle event.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub subject: SessionRef,
    pub origin: EventOrigin,
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    pub fn new(kind: SessionEventKind, subject: SessionRef, origin: EventOrigin) -> Self {
        Self {
            kind,
            subject,
            origin,
            timestamp: Utc::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        self.subject.id()
    }
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} at {}",
            self.kind,
            self.session_id(),
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ")
        )
    }
}
