//! Session attribute storage with delta tracking.
//!
//! [`SessionAttributes`] records every effective change since the last flush
//! so that replicas can be updated with only the changed names. Flushing
//! happens on either a full write or a delta write.
//!
//! The type is not internally synchronized; the owning session's lock
//! serializes access to it.

use std::collections::{BTreeSet, HashMap};

use bytes::{BufMut, BytesMut};

use crate::codec::{CodecError, Reader, put_str};
use crate::error::{Error, Result};
use crate::value::AttributeValue;

/// Attribute map plus the changes not yet flushed to a replica.
#[derive(Debug, Clone, Default)]
pub struct SessionAttributes {
    values: HashMap<String, AttributeValue>,
    pending_delta: HashMap<String, Option<AttributeValue>>,
}

impl SessionAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute. `None` removes it.
    ///
    /// Setting a value equal to the current one does not record a delta.
    pub fn set_attribute(&mut self, name: &str, value: Option<AttributeValue>) {
        let Some(value) = value else {
            self.remove_attribute(name);
            return;
        };

        let previous = self.values.insert(name.to_string(), value.clone());
        if previous.as_ref() != Some(&value) {
            self.pending_delta.insert(name.to_string(), Some(value));
        }
    }

    /// Remove an attribute, recording a null delta if it was present.
    pub fn remove_attribute(&mut self, name: &str) {
        if self.values.remove(name).is_some() {
            self.pending_delta.insert(name.to_string(), None);
        }
    }

    pub fn get_attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    /// Snapshot of the current attribute names.
    pub fn attribute_names(&self) -> BTreeSet<String> {
        self.values.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn has_delta(&self) -> bool {
        !self.pending_delta.is_empty()
    }

    /// Names with unflushed changes.
    pub fn pending_names(&self) -> BTreeSet<String> {
        self.pending_delta.keys().cloned().collect()
    }

    /// Pending change recorded for `name`: `Some(None)` is a recorded removal.
    pub fn pending_change(&self, name: &str) -> Option<Option<&AttributeValue>> {
        self.pending_delta.get(name).map(Option::as_ref)
    }

    pub(crate) fn clear_delta(&mut self) {
        self.pending_delta.clear();
    }

    /// Write every attribute. A full write commits all outstanding changes.
    pub fn write_full(&mut self, buf: &mut BytesMut) {
        buf.put_i32(self.values.len() as i32);
        for (name, value) in &self.values {
            put_str(buf, name);
            value.encode(buf);
        }
        self.pending_delta.clear();
    }

    /// Write only the pending changes, then clear them.
    pub fn write_delta(&mut self, buf: &mut BytesMut) {
        buf.put_i32(self.pending_delta.len() as i32);
        for (name, value) in self.pending_delta.drain() {
            put_str(buf, &name);
            AttributeValue::encode_optional(value.as_ref(), buf);
        }
    }

    /// Replace all attributes with those read from a full write.
    pub(crate) fn read_full(&mut self, r: &mut Reader<'_>) -> std::result::Result<(), CodecError> {
        let count = r.count()?;
        let mut entries = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let name = r.str()?;
            let value = AttributeValue::decode_optional(r)?;
            entries.push((name, value));
        }

        self.values.clear();
        for (name, value) in entries {
            self.set_attribute(&name, value);
        }
        self.pending_delta.clear();
        Ok(())
    }

    /// Apply a delta produced by [`write_delta`](Self::write_delta) on another replica.
    ///
    /// The whole delta is decoded before anything is applied, so a malformed
    /// delta leaves the attributes untouched. Applied names are not re-flagged
    /// as pending; unrelated local changes stay pending.
    pub(crate) fn apply_delta(&mut self, r: &mut Reader<'_>) -> Result<()> {
        let deltas = read_delta_entries(r).map_err(|e| Error::InvalidDelta(e.to_string()))?;

        for (name, value) in deltas {
            self.set_attribute(&name, value);
            self.pending_delta.remove(&name);
        }
        Ok(())
    }
}

fn read_delta_entries(
    r: &mut Reader<'_>,
) -> std::result::Result<Vec<(String, Option<AttributeValue>)>, CodecError> {
    let count = r.count()?;
    let mut deltas = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let name = r.str()?;
        let value = AttributeValue::decode_optional(r)?;
        deltas.push((name, value));
    }
    Ok(deltas)
}
