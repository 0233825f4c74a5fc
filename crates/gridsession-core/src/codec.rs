//! Binary primitives for the session wire format.
//!
//! All integers are big-endian. Strings are a `u32` byte length followed by
//! UTF-8 bytes. Reads are bounds-checked before touching the buffer, so a
//! truncated record surfaces as [`CodecError::Truncated`] instead of a panic.

use bytes::{Buf, BufMut, BytesMut};

/// Failure while decoding a wire record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The buffer ended before the expected field.
    #[error("truncated record: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A string field was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// A value carried a type tag this build does not know.
    #[error("unknown value type tag {0:#04x}")]
    UnknownTag(u8),

    /// A count or length field was negative.
    #[error("negative length {0}")]
    NegativeLength(i32),

    /// An embedded JSON document failed to parse.
    #[error("invalid JSON value: {0}")]
    InvalidJson(String),
}

pub(crate) type CodecResult<T> = std::result::Result<T, CodecError>;

pub(crate) fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

pub(crate) fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

/// Bounds-checked reader over an encoded record.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, needed: usize) -> CodecResult<()> {
        if self.buf.remaining() < needed {
            return Err(CodecError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self) -> CodecResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn i32(&mut self) -> CodecResult<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    pub(crate) fn i64(&mut self) -> CodecResult<i64> {
        self.need(8)?;
        Ok(self.buf.get_i64())
    }

    pub(crate) fn f64(&mut self) -> CodecResult<f64> {
        self.need(8)?;
        Ok(self.buf.get_f64())
    }

    /// Read a non-negative `i32` count.
    pub(crate) fn count(&mut self) -> CodecResult<usize> {
        let n = self.i32()?;
        if n < 0 {
            return Err(CodecError::NegativeLength(n));
        }
        Ok(n as usize)
    }

    pub(crate) fn bytes(&mut self) -> CodecResult<Vec<u8>> {
        self.need(4)?;
        let len = self.buf.get_u32() as usize;
        self.need(len)?;
        let out = self.buf[..len].to_vec();
        self.buf.advance(len);
        Ok(out)
    }

    pub(crate) fn str(&mut self) -> CodecResult<String> {
        String::from_utf8(self.bytes()?).map_err(|_| CodecError::InvalidUtf8)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }
}
