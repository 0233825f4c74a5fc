//! Attribute values and their tagged wire encoding.

use bytes::{BufMut, BytesMut};

use crate::codec::{CodecError, CodecResult, Reader, put_bytes, put_str};
use crate::principal::{Authentication, HasPrincipalName, SecurityContext};

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_TEXT: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;
const TAG_JSON: u8 = 0x06;
const TAG_SECURITY_CONTEXT: u8 = 0x07;

/// A value stored under a session attribute name.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    SecurityContext(SecurityContext),
}

impl AttributeValue {
    /// Borrow the string payload of a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// String form used as a secondary index key.
    ///
    /// Only scalar values are indexable.
    pub fn index_key(&self) -> Option<String> {
        match self {
            AttributeValue::Bool(b) => Some(b.to_string()),
            AttributeValue::Int(i) => Some(i.to_string()),
            AttributeValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            AttributeValue::Bool(b) => {
                buf.put_u8(TAG_BOOL);
                buf.put_u8(u8::from(*b));
            }
            AttributeValue::Int(i) => {
                buf.put_u8(TAG_INT);
                buf.put_i64(*i);
            }
            AttributeValue::Float(f) => {
                buf.put_u8(TAG_FLOAT);
                buf.put_f64(*f);
            }
            AttributeValue::Text(s) => {
                buf.put_u8(TAG_TEXT);
                put_str(buf, s);
            }
            AttributeValue::Bytes(b) => {
                buf.put_u8(TAG_BYTES);
                put_bytes(buf, b);
            }
            AttributeValue::Json(v) => {
                buf.put_u8(TAG_JSON);
                put_str(buf, &v.to_string());
            }
            AttributeValue::SecurityContext(ctx) => {
                buf.put_u8(TAG_SECURITY_CONTEXT);
                match &ctx.authentication {
                    None => buf.put_u8(0),
                    Some(auth) => {
                        buf.put_u8(1);
                        put_str(buf, &auth.name);
                        buf.put_i32(auth.authorities.len() as i32);
                        for authority in &auth.authorities {
                            put_str(buf, authority);
                        }
                    }
                }
            }
        }
    }

    /// Encode a value slot that may hold the null marker.
    pub(crate) fn encode_optional(value: Option<&AttributeValue>, buf: &mut BytesMut) {
        match value {
            Some(v) => v.encode(buf),
            None => buf.put_u8(TAG_NULL),
        }
    }

    /// Decode a value slot; the null marker decodes to `None`.
    pub(crate) fn decode_optional(r: &mut Reader<'_>) -> CodecResult<Option<AttributeValue>> {
        let value = match r.u8()? {
            TAG_NULL => return Ok(None),
            TAG_BOOL => AttributeValue::Bool(r.u8()? != 0),
            TAG_INT => AttributeValue::Int(r.i64()?),
            TAG_FLOAT => AttributeValue::Float(r.f64()?),
            TAG_TEXT => AttributeValue::Text(r.str()?),
            TAG_BYTES => AttributeValue::Bytes(r.bytes()?),
            TAG_JSON => {
                let text = r.str()?;
                let json = serde_json::from_str(&text)
                    .map_err(|e| CodecError::InvalidJson(e.to_string()))?;
                AttributeValue::Json(json)
            }
            TAG_SECURITY_CONTEXT => {
                let authentication = match r.u8()? {
                    0 => None,
                    _ => {
                        let name = r.str()?;
                        let count = r.count()?;
                        let mut authorities = Vec::with_capacity(count.min(64));
                        for _ in 0..count {
                            authorities.push(r.str()?);
                        }
                        Some(Authentication { name, authorities })
                    }
                };
                AttributeValue::SecurityContext(SecurityContext { authentication })
            }
            tag => return Err(CodecError::UnknownTag(tag)),
        };
        Ok(Some(value))
    }
}

impl HasPrincipalName for AttributeValue {
    fn principal_name(&self) -> Option<String> {
        match self {
            AttributeValue::SecurityContext(ctx) => ctx.principal_name(),
            _ => None,
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Int(i64::from(v))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Text(v)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(v: Vec<u8>) -> Self {
        AttributeValue::Bytes(v)
    }
}

impl From<serde_json::Value> for AttributeValue {
    fn from(v: serde_json::Value) -> Self {
        AttributeValue::Json(v)
    }
}

impl From<SecurityContext> for AttributeValue {
    fn from(v: SecurityContext) -> Self {
        AttributeValue::SecurityContext(v)
    }
}
