//! Byte-range translation / 范围读取转换
//!
//! Maps a logical `(offset, length)` request, where `length == -1` means
//! "to the end of the object", onto the form range requests are sent in.

use std::ops::Range;

use super::error::ObjStoreError;

/// Length value meaning "read to the end of the object".
pub const TO_END: i64 = -1;

/// A validated range request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// The entire object, no `Range` header.
    Full,
    /// From `start` through the last byte.
    From(u64),
    /// `start..=end`, both inclusive.
    Inclusive { start: u64, end: u64 },
}

impl ByteRange {
    /// Translate `(offset, length)`; whole-object and ranged reads both go through here.
    pub fn translate(offset: i64, length: i64) -> Result<Self, ObjStoreError> {
        let invalid = || ObjStoreError::InvalidRange { offset, length };

        if offset < 0 {
            return Err(invalid());
        }
        let start = offset as u64;

        match length {
            TO_END if start == 0 => Ok(ByteRange::Full),
            TO_END => Ok(ByteRange::From(start)),
            len if len > 0 => {
                let end = start.checked_add(len as u64 - 1).ok_or_else(invalid)?;
                Ok(ByteRange::Inclusive { start, end })
            }
            _ => Err(invalid()),
        }
    }

    /// HTTP `Range` header value, `None` for the whole object.
    pub fn header_value(&self) -> Option<String> {
        match self {
            ByteRange::Full => None,
            ByteRange::From(start) => Some(format!("bytes={}-", start)),
            ByteRange::Inclusive { start, end } => Some(format!("bytes={}-{}", start, end)),
        }
    }

    /// Resolve against an object of `len` bytes.
    ///
    /// Returns `None` when the range is unsatisfiable (HTTP 416): the first
    /// byte lies at or beyond the end of the object. An end past the last
    /// byte is clamped, as S3 does.
    pub fn slice_bounds(&self, len: u64) -> Option<Range<usize>> {
        let (start, end_exclusive) = match *self {
            ByteRange::Full => return Some(0..len as usize),
            ByteRange::From(start) => (start, len),
            ByteRange::Inclusive { start, end } => (start, end.saturating_add(1).min(len)),
        };
        if start >= len {
            return None;
        }
        Some(start as usize..end_exclusive as usize)
    }
}
