//! The replicated session entity.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::attributes::SessionAttributes;
use crate::codec::{CodecError, Reader, put_str};
use crate::error::{Error, Result};
use crate::principal::{
    HasPrincipalName, PRINCIPAL_NAME_INDEX_NAME, SECURITY_CONTEXT_ATTRIBUTE, SecurityContext,
};
use crate::value::AttributeValue;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Mutable session fields, guarded by the session's lock.
#[derive(Debug, Clone)]
struct SessionState {
    last_accessed_time: i64,
    max_inactive_interval_secs: i32,
    /// Own-field changes not yet flushed.
    delta: bool,
    attributes: SessionAttributes,
}

impl SessionState {
    fn set_last_accessed_time(&mut self, millis: i64) {
        self.delta |= self.last_accessed_time != millis;
        self.last_accessed_time = millis;
    }

    fn set_max_inactive_interval_secs(&mut self, secs: i32) {
        self.delta |= self.max_inactive_interval_secs != secs;
        self.max_inactive_interval_secs = secs;
    }

    fn principal_name(&self) -> Option<String> {
        if let Some(name) = self
            .attributes
            .get_attribute(PRINCIPAL_NAME_INDEX_NAME)
            .and_then(AttributeValue::as_text)
        {
            return Some(name.to_string());
        }
        self.attributes
            .get_attribute(SECURITY_CONTEXT_ATTRIBUTE)
            .and_then(HasPrincipalName::principal_name)
    }
}

/// A session whose state can be replicated in full or as a delta.
///
/// All mutable state sits behind a single per-instance lock, so a session can
/// be read by a request thread while a replication thread applies a delta to
/// it. Cloning produces an independent replica.
///
/// Sessions compare equal when their ids match and order by creation time.
#[derive(Debug)]
pub struct Session {
    id: String,
    creation_time: i64,
    state: Mutex<SessionState>,
}

impl Session {
    /// Create a session with a fresh random id.
    pub fn new(max_inactive_interval_secs: i32) -> Self {
        let mut session = Self::unchecked(uuid::Uuid::new_v4().to_string(), now_millis());
        session
            .state
            .get_mut()
            .set_max_inactive_interval_secs(max_inactive_interval_secs);
        session
    }

    /// Create a session with a caller-chosen id.
    pub fn with_id(id: impl Into<String>) -> Result<Self> {
        let id = validate_id(id.into())?;
        Ok(Self::unchecked(id, now_millis()))
    }

    fn unchecked(id: String, creation_time: i64) -> Self {
        Self {
            id,
            creation_time,
            state: Mutex::new(SessionState {
                last_accessed_time: creation_time,
                max_inactive_interval_secs: 0,
                delta: false,
                attributes: SessionAttributes::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creation time in epoch milliseconds.
    pub fn creation_time(&self) -> i64 {
        self.creation_time
    }

    /// Last access time in epoch milliseconds.
    pub fn last_accessed_time(&self) -> i64 {
        self.state.lock().last_accessed_time
    }

    pub fn set_last_accessed_time(&self, millis: i64) {
        self.state.lock().set_last_accessed_time(millis);
    }

    /// Mark the session as accessed now.
    pub fn touch(&self) {
        self.set_last_accessed_time(now_millis());
    }

    pub fn max_inactive_interval_secs(&self) -> i32 {
        self.state.lock().max_inactive_interval_secs
    }

    /// Set the idle interval. Negative values disable expiry.
    pub fn set_max_inactive_interval_secs(&self, secs: i32) {
        self.state.lock().set_max_inactive_interval_secs(secs);
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// Whether the session is expired at `now` (epoch milliseconds).
    pub fn is_expired_at(&self, now: i64) -> bool {
        let state = self.state.lock();
        let interval_ms = i64::from(state.max_inactive_interval_secs) * 1000;
        state.max_inactive_interval_secs >= 0 && now - interval_ms >= state.last_accessed_time
    }

    pub fn set_attribute(&self, name: &str, value: impl Into<AttributeValue>) {
        self.state
            .lock()
            .attributes
            .set_attribute(name, Some(value.into()));
    }

    /// Set or clear an attribute. `None` is equivalent to [`remove_attribute`](Self::remove_attribute).
    pub fn set_optional_attribute(&self, name: &str, value: Option<AttributeValue>) {
        self.state.lock().attributes.set_attribute(name, value);
    }

    pub fn remove_attribute(&self, name: &str) {
        self.state.lock().attributes.remove_attribute(name);
    }

    pub fn get_attribute(&self, name: &str) -> Option<AttributeValue> {
        self.state.lock().attributes.get_attribute(name).cloned()
    }

    pub fn attribute_names(&self) -> BTreeSet<String> {
        self.state.lock().attributes.attribute_names()
    }

    /// The security context stored by the host application, if any.
    pub fn security_context(&self) -> Option<SecurityContext> {
        match self.state.lock().attributes.get_attribute(SECURITY_CONTEXT_ATTRIBUTE) {
            Some(AttributeValue::SecurityContext(ctx)) => Some(ctx.clone()),
            _ => None,
        }
    }

    /// Name of the authenticated principal.
    ///
    /// An explicit `principalName` attribute wins; otherwise the name is taken
    /// from the stored security context, if any.
    pub fn principal_name(&self) -> Option<String> {
        self.state.lock().principal_name()
    }

    pub fn set_principal_name(&self, name: impl Into<String>) {
        self.set_attribute(PRINCIPAL_NAME_INDEX_NAME, name.into());
    }

    /// Value of a secondary index for this session.
    pub fn index_value(&self, index_name: &str) -> Option<String> {
        let state = self.state.lock();
        if index_name == PRINCIPAL_NAME_INDEX_NAME {
            return state.principal_name();
        }
        state
            .attributes
            .get_attribute(index_name)
            .and_then(AttributeValue::index_key)
    }

    pub fn has_delta(&self) -> bool {
        let state = self.state.lock();
        state.delta || state.attributes.has_delta()
    }

    /// Encode the full session state. Clears all pending deltas.
    pub fn to_data(&self) -> Bytes {
        let mut state = self.state.lock();
        let mut buf = BytesMut::with_capacity(128);

        put_str(&mut buf, &self.id);
        buf.put_i64(self.creation_time);
        buf.put_i64(state.last_accessed_time);
        buf.put_i32(state.max_inactive_interval_secs);

        match state.principal_name().filter(|p| !p.trim().is_empty()) {
            Some(principal) => {
                buf.put_i32(principal.len() as i32);
                put_str(&mut buf, &principal);
            }
            None => buf.put_i32(0),
        }

        state.attributes.write_full(&mut buf);
        state.delta = false;
        buf.freeze()
    }

    /// Decode a session written by [`to_data`](Self::to_data).
    pub fn from_data(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let id = r.str().map_err(decode_error)?;
        let id = validate_id(id)?;
        let creation_time = r.i64().map_err(decode_error)?;

        let session = Self::unchecked(id, creation_time);
        {
            let mut state = session.state.lock();
            state.last_accessed_time = r.i64().map_err(decode_error)?;
            state.max_inactive_interval_secs = r.i32().map_err(decode_error)?;

            let principal = match r.i32().map_err(decode_error)? {
                len if len > 0 => Some(r.str().map_err(decode_error)?),
                _ => None,
            };

            state.attributes.read_full(&mut r).map_err(decode_error)?;
            if r.remaining() > 0 {
                return Err(Error::Decode(format!(
                    "{} trailing bytes after session record",
                    r.remaining()
                )));
            }

            // Keep the serialized principal when the attributes alone no longer yield it.
            if let Some(principal) = principal
                && state.principal_name().as_deref() != Some(principal.as_str())
            {
                state
                    .attributes
                    .set_attribute(PRINCIPAL_NAME_INDEX_NAME, Some(principal.into()));
                state.attributes.clear_delta();
            }
            state.delta = false;
        }
        Ok(session)
    }

    /// Encode only what changed since the last flush, then clear the deltas.
    pub fn to_delta(&self) -> Bytes {
        let mut state = self.state.lock();
        let mut buf = BytesMut::with_capacity(64);

        buf.put_i64(state.last_accessed_time);
        buf.put_i32(state.max_inactive_interval_secs);
        state.attributes.write_delta(&mut buf);
        state.delta = false;
        buf.freeze()
    }

    /// Apply a delta written by [`to_delta`](Self::to_delta) on another replica.
    pub fn apply_delta(&self, delta: &[u8]) -> Result<()> {
        let mut r = Reader::new(delta);
        let last_accessed_time = r.i64().map_err(invalid_delta)?;
        let max_inactive_interval_secs = r.i32().map_err(invalid_delta)?;

        let mut state = self.state.lock();
        state.attributes.apply_delta(&mut r)?;
        state.set_last_accessed_time(last_accessed_time);
        state.set_max_inactive_interval_secs(max_inactive_interval_secs);
        state.delta = false;
        Ok(())
    }
}

fn validate_id(id: String) -> Result<String> {
    if id.trim().is_empty() {
        return Err(Error::InvalidSessionId);
    }
    Ok(id)
}

fn decode_error(e: CodecError) -> Error {
    Error::Decode(e.to_string())
}

fn invalid_delta(e: CodecError) -> Error {
    Error::InvalidDelta(e.to_string())
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            creation_time: self.creation_time,
            state: Mutex::new(self.state.lock().clone()),
        }
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Session {}

impl Hash for Session {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Session {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Session {
    fn cmp(&self, other: &Self) -> Ordering {
        self.creation_time
            .cmp(&other.creation_time)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (last_accessed, interval, principal) = {
            let state = self.state.lock();
            (
                state.last_accessed_time,
                state.max_inactive_interval_secs,
                state.principal_name(),
            )
        };
        write!(
            f,
            "{{ id = {}, creationTime = {}, lastAccessedTime = {}, maxInactiveIntervalInSeconds = {}, principalName = {} }}",
            self.id,
            format_millis(self.creation_time),
            format_millis(last_accessed),
            interval,
            principal.as_deref().unwrap_or("-"),
        )
    }
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d-%H-%M-%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}
