// SPDX-License-Identifier: Apache-2.0
//! Tagged binary streams: the engine's only canonical byte format.
//!
//! Wire format is `{tag: u32 LE, len: u32 LE, payload: len bytes}*` in two
//! dialects sharing one reader:
//!
//! - **Record stream**: content packs, world saves, replay streams. Writers
//!   MUST emit records sorted by `(tag, sort_id, bytes)`; the sort id is the
//!   record's primary key, supplied at push time.
//! - **Key-value payload**: proto bodies and structured sub-payloads.
//!   Writers MUST emit fields sorted by `(tag, bytes)`.
//!
//! The sort-at-write discipline is what makes content and state blobs
//! byte-identical across runs; any code path that emits a stream goes through
//! [`TlvStreamWriter`] or [`TlvKvWriter`].
//!
//! Readers walk linearly, fail on `len > remaining`, and skip unknown tags.

use thiserror::Error;

use crate::fixed::{Fixed32, Fixed64};

/// Errors raised while walking or decoding a tagged stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlvError {
    /// A record header or payload extends past the end of the buffer.
    #[error("truncated stream at offset {offset}")]
    Truncated {
        /// Byte offset of the offending record header.
        offset: usize,
    },

    /// A fixed-layout payload was shorter than its declared contents.
    #[error("payload underrun: wanted {wanted} bytes, {remaining} remaining")]
    Underrun {
        /// Bytes the decoder asked for.
        wanted: usize,
        /// Bytes left in the payload.
        remaining: usize,
    },

    /// A header field holds a value the decoder cannot accept.
    #[error("bad header field {field}: {value}")]
    BadHeader {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: u64,
    },

    /// Blob version is not one this build understands.
    #[error("unsupported version {found}, expected {expected}")]
    Version {
        /// Version found in the blob.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },
}

/// Linear cursor over a `{tag, len, payload}` stream.
#[derive(Debug, Clone)]
pub struct TlvReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> TlvReader<'a> {
    /// Starts reading at the beginning of `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Returns the next `(tag, payload)` pair, or `None` at end of stream.
    pub fn next_record(&mut self) -> Result<Option<(u32, &'a [u8])>, TlvError> {
        if self.offset >= self.bytes.len() {
            return Ok(None);
        }
        let remaining = self.bytes.len() - self.offset;
        if remaining < 8 {
            return Err(TlvError::Truncated { offset: self.offset });
        }
        let tag = read_u32_at(self.bytes, self.offset);
        let len = read_u32_at(self.bytes, self.offset + 4) as usize;
        let start = self.offset + 8;
        if len > self.bytes.len() - start {
            return Err(TlvError::Truncated { offset: self.offset });
        }
        self.offset = start + len;
        Ok(Some((tag, &self.bytes[start..start + len])))
    }
}

fn read_u32_at(bytes: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(b)
}

/// Key-value payload view with linear field lookup.
///
/// Lookups scan the payload each time; payloads are small and the scan keeps
/// the view borrow-only.
#[derive(Debug, Clone, Copy)]
pub struct TlvKv<'a> {
    bytes: &'a [u8],
}

impl<'a> TlvKv<'a> {
    /// Wraps a KV payload.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Raw payload bytes.
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// First field with `tag`, if any. Malformed tails read as absent.
    #[must_use]
    pub fn field(&self, tag: u32) -> Option<&'a [u8]> {
        let mut r = TlvReader::new(self.bytes);
        while let Ok(Some((t, payload))) = r.next_record() {
            if t == tag {
                return Some(payload);
            }
        }
        None
    }

    /// All fields with `tag`, in stream order.
    pub fn fields(&self, tag: u32) -> impl Iterator<Item = &'a [u8]> + '_ {
        let mut r = TlvReader::new(self.bytes);
        std::iter::from_fn(move || loop {
            match r.next_record() {
                Ok(Some((t, payload))) if t == tag => return Some(payload),
                Ok(Some(_)) => {}
                _ => return None,
            }
        })
    }

    /// `u16` field; absent or mis-sized reads as `None`.
    #[must_use]
    pub fn u16_field(&self, tag: u32) -> Option<u16> {
        let p = self.field(tag)?;
        let b: [u8; 2] = p.try_into().ok()?;
        Some(u16::from_le_bytes(b))
    }

    /// `u32` field; absent or mis-sized reads as `None`.
    #[must_use]
    pub fn u32_field(&self, tag: u32) -> Option<u32> {
        let p = self.field(tag)?;
        let b: [u8; 4] = p.try_into().ok()?;
        Some(u32::from_le_bytes(b))
    }

    /// `u64` field; absent or mis-sized reads as `None`.
    #[must_use]
    pub fn u64_field(&self, tag: u32) -> Option<u64> {
        let p = self.field(tag)?;
        let b: [u8; 8] = p.try_into().ok()?;
        Some(u64::from_le_bytes(b))
    }

    /// Q16.16 field; absent or mis-sized reads as `None`.
    #[must_use]
    pub fn fixed32_field(&self, tag: u32) -> Option<Fixed32> {
        let p = self.field(tag)?;
        let b: [u8; 4] = p.try_into().ok()?;
        Some(Fixed32::from_raw(i32::from_le_bytes(b)))
    }

    /// Q32.32 field; absent or mis-sized reads as `None`.
    #[must_use]
    pub fn fixed64_field(&self, tag: u32) -> Option<Fixed64> {
        let p = self.field(tag)?;
        let b: [u8; 8] = p.try_into().ok()?;
        Some(Fixed64::from_raw(i64::from_le_bytes(b)))
    }

    /// UTF-8 string field; absent or invalid reads as `None`.
    #[must_use]
    pub fn str_field(&self, tag: u32) -> Option<&'a str> {
        std::str::from_utf8(self.field(tag)?).ok()
    }
}

/// Deterministic key-value payload builder.
///
/// Fields are sorted by `(tag, bytes)` at finish time, so insertion order
/// never leaks into the output.
#[derive(Debug, Clone, Default)]
pub struct TlvKvWriter {
    fields: Vec<(u32, Vec<u8>)>,
}

impl TlvKvWriter {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `u16` field.
    pub fn field_u16(&mut self, tag: u32, v: u16) {
        self.fields.push((tag, v.to_le_bytes().to_vec()));
    }

    /// Appends a `u32` field.
    pub fn field_u32(&mut self, tag: u32, v: u32) {
        self.fields.push((tag, v.to_le_bytes().to_vec()));
    }

    /// Appends a `u64` field.
    pub fn field_u64(&mut self, tag: u32, v: u64) {
        self.fields.push((tag, v.to_le_bytes().to_vec()));
    }

    /// Appends a Q16.16 field.
    pub fn field_fixed32(&mut self, tag: u32, v: Fixed32) {
        self.fields.push((tag, v.raw().to_le_bytes().to_vec()));
    }

    /// Appends a Q32.32 field.
    pub fn field_fixed64(&mut self, tag: u32, v: Fixed64) {
        self.fields.push((tag, v.raw().to_le_bytes().to_vec()));
    }

    /// Appends a raw blob field.
    pub fn field_bytes(&mut self, tag: u32, bytes: &[u8]) {
        self.fields.push((tag, bytes.to_vec()));
    }

    /// Appends a UTF-8 string field.
    pub fn field_str(&mut self, tag: u32, s: &str) {
        self.fields.push((tag, s.as_bytes().to_vec()));
    }

    /// Sorts and emits the payload bytes.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.fields.sort();
        let mut out = Vec::new();
        for (tag, payload) in &self.fields {
            put_record(&mut out, *tag, payload);
        }
        out
    }
}

/// Deterministic record stream builder.
///
/// Records are sorted by `(tag, sort_id, bytes)` at finish time; `sort_id` is
/// the record's primary key (proto id, chunk id, frame index, …).
#[derive(Debug, Clone, Default)]
pub struct TlvStreamWriter {
    records: Vec<(u32, u32, Vec<u8>)>,
}

impl TlvStreamWriter {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record keyed for sorting by `sort_id`.
    pub fn push(&mut self, tag: u32, sort_id: u32, payload: Vec<u8>) {
        self.records.push((tag, sort_id, payload));
    }

    /// Sorts and emits the stream bytes.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.records.sort();
        let mut out = Vec::new();
        for (tag, _, payload) in &self.records {
            put_record(&mut out, *tag, payload);
        }
        out
    }
}

fn put_record(out: &mut Vec<u8>, tag: u32, payload: &[u8]) {
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

/// Fixed-layout little-endian payload reader for versioned subsystem blobs.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    /// Starts reading at the beginning of `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, wanted: usize) -> Result<&'a [u8], TlvError> {
        if wanted > self.remaining() {
            return Err(TlvError::Underrun { wanted, remaining: self.remaining() });
        }
        let out = &self.bytes[self.offset..self.offset + wanted];
        self.offset += wanted;
        Ok(out)
    }

    /// Reads a `u8`.
    pub fn u8(&mut self) -> Result<u8, TlvError> {
        Ok(self.take(1)?[0])
    }

    /// Reads a little-endian `u16`.
    pub fn u16(&mut self) -> Result<u16, TlvError> {
        let b: [u8; 2] = self.take(2)?.try_into().map_err(|_| TlvError::Underrun {
            wanted: 2,
            remaining: 0,
        })?;
        Ok(u16::from_le_bytes(b))
    }

    /// Reads a little-endian `u32`.
    pub fn u32(&mut self) -> Result<u32, TlvError> {
        let b: [u8; 4] = self.take(4)?.try_into().map_err(|_| TlvError::Underrun {
            wanted: 4,
            remaining: 0,
        })?;
        Ok(u32::from_le_bytes(b))
    }

    /// Reads a little-endian `u64`.
    pub fn u64(&mut self) -> Result<u64, TlvError> {
        let b: [u8; 8] = self.take(8)?.try_into().map_err(|_| TlvError::Underrun {
            wanted: 8,
            remaining: 0,
        })?;
        Ok(u64::from_le_bytes(b))
    }

    /// Reads a little-endian `i32`.
    pub fn i32(&mut self) -> Result<i32, TlvError> {
        Ok(self.u32()? as i32)
    }

    /// Reads a little-endian `i64`.
    pub fn i64(&mut self) -> Result<i64, TlvError> {
        Ok(self.u64()? as i64)
    }

    /// Reads a Q16.16 value.
    pub fn fixed32(&mut self) -> Result<Fixed32, TlvError> {
        Ok(Fixed32::from_raw(self.i32()?))
    }

    /// Reads a Q32.32 value.
    pub fn fixed64(&mut self) -> Result<Fixed64, TlvError> {
        Ok(Fixed64::from_raw(self.i64()?))
    }

    /// Reads a length-prefixed blob (`u32` length then bytes).
    pub fn blob(&mut self) -> Result<&'a [u8], TlvError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    /// Fails unless the blob starts with `expected` as its version word.
    pub fn version(&mut self, expected: u32) -> Result<(), TlvError> {
        let found = self.u32()?;
        if found != expected {
            return Err(TlvError::Version { found, expected });
        }
        Ok(())
    }
}

/// Fixed-layout little-endian payload writer, dual of [`ByteReader`].
#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer beginning with a version word.
    #[must_use]
    pub fn versioned(version: u32) -> Self {
        let mut w = Self::default();
        w.u32(version);
        w
    }

    /// Writes a `u8`.
    pub fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    /// Writes a little-endian `u16`.
    pub fn u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a little-endian `u32`.
    pub fn u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a little-endian `u64`.
    pub fn u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a little-endian `i32`.
    pub fn i32(&mut self, v: i32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a little-endian `i64`.
    pub fn i64(&mut self, v: i64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a Q16.16 value.
    pub fn fixed32(&mut self, v: Fixed32) {
        self.i32(v.raw());
    }

    /// Writes a Q32.32 value.
    pub fn fixed64(&mut self, v: Fixed64) {
        self.i64(v.raw());
    }

    /// Writes a length-prefixed blob.
    pub fn blob(&mut self, bytes: &[u8]) {
        self.u32(bytes.len() as u32);
        self.bytes.extend_from_slice(bytes);
    }

    /// Finishes and returns the bytes.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reader_walks_records_linearly() {
        let mut w = TlvStreamWriter::new();
        w.push(2, 1, vec![0xAA]);
        w.push(1, 1, vec![0xBB, 0xCC]);
        let bytes = w.finish();

        let mut r = TlvReader::new(&bytes);
        assert_eq!(r.next_record().unwrap(), Some((1, &[0xBB, 0xCC][..])));
        assert_eq!(r.next_record().unwrap(), Some((2, &[0xAA][..])));
        assert_eq!(r.next_record().unwrap(), None);
    }

    #[test]
    fn reader_rejects_oversized_len() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        let mut r = TlvReader::new(&bytes);
        assert_eq!(r.next_record(), Err(TlvError::Truncated { offset: 0 }));
    }

    #[test]
    fn kv_writer_sorts_by_tag_then_bytes() {
        let mut a = TlvKvWriter::new();
        a.field_u32(3, 9);
        a.field_u32(1, 7);
        a.field_u32(2, 8);
        let mut b = TlvKvWriter::new();
        b.field_u32(2, 8);
        b.field_u32(3, 9);
        b.field_u32(1, 7);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn stream_writer_sorts_by_tag_then_sort_id() {
        let mut a = TlvStreamWriter::new();
        a.push(1, 20, vec![2]);
        a.push(1, 10, vec![1]);
        let mut b = TlvStreamWriter::new();
        b.push(1, 10, vec![1]);
        b.push(1, 20, vec![2]);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn kv_view_reads_typed_fields() {
        let mut w = TlvKvWriter::new();
        w.field_u32(1, 42);
        w.field_fixed32(2, Fixed32::from_int(-3));
        w.field_str(3, "ore");
        let bytes = w.finish();
        let kv = TlvKv::new(&bytes);
        assert_eq!(kv.u32_field(1), Some(42));
        assert_eq!(kv.fixed32_field(2), Some(Fixed32::from_int(-3)));
        assert_eq!(kv.str_field(3), Some("ore"));
        assert_eq!(kv.u32_field(9), None);
    }

    #[test]
    fn byte_reader_version_gate() {
        let mut w = ByteWriter::versioned(1);
        w.u32(5);
        let bytes = w.finish();
        let mut r = ByteReader::new(&bytes);
        assert!(r.version(1).is_ok());
        assert_eq!(r.u32(), Ok(5));

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.version(2), Err(TlvError::Version { found: 1, expected: 2 }));
    }

    proptest! {
        #[test]
        fn prop_stream_round_trips(records in proptest::collection::vec(
            (0u32..16, 0u32..1000, proptest::collection::vec(any::<u8>(), 0..32)), 0..16)
        ) {
            let mut w = TlvStreamWriter::new();
            for (tag, sort_id, payload) in &records {
                w.push(*tag, *sort_id, payload.clone());
            }
            let bytes = w.finish();
            let mut r = TlvReader::new(&bytes);
            let mut n = 0usize;
            while let Ok(Some(_)) = r.next_record() {
                n += 1;
            }
            prop_assert_eq!(n, records.len());
        }
    }
}
