//! BER encoding and decoding.
//!
//! The USM layer only touches a small ASN.1 subset: INTEGER, OCTET STRING,
//! and SEQUENCE (plus the context-tagged PDU wrapper used by the discovery
//! probe). This module provides a zero-copy [`Decoder`] over [`Bytes`] and
//! an [`EncodeBuf`] that builds messages back-to-front, so nested lengths
//! are known when each header is written and nothing is re-copied.
//!
//! Fields inside [`EncodeBuf::push_sequence`] are therefore pushed in
//! *reverse* field order; see [`crate::usm::UsmSecurityParams::encode_to_buf`]
//! for the idiom.

use bytes::Bytes;

use crate::error::{DecodeErrorKind, Error, Result};

/// BER tag constants.
pub mod tag {
    /// Universal class tags.
    pub mod universal {
        pub const INTEGER: u8 = 0x02;
        pub const OCTET_STRING: u8 = 0x04;
        pub const NULL: u8 = 0x05;
        pub const SEQUENCE: u8 = 0x30;
    }

    /// Context class tags used by SNMP PDUs.
    pub mod context {
        pub const GET_REQUEST: u8 = 0xA0;
        pub const RESPONSE: u8 = 0xA2;
        pub const REPORT: u8 = 0xA8;
    }
}

/// BER decoder that reads from a byte buffer.
pub struct Decoder {
    data: Bytes,
    offset: usize,
}

impl Decoder {
    /// Create a new decoder from bytes.
    pub fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    /// Create a decoder from a byte slice (copies the data).
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Get the current offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Check if we've reached the end.
    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Peek at the next tag without consuming it.
    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    /// Read a single byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        let Some(&byte) = self.data.get(self.offset) else {
            tracing::debug!(target: "snmp_usm::ber", offset = self.offset, kind = %DecodeErrorKind::TruncatedData, "truncated data");
            return Err(Error::Malformed.boxed());
        };
        self.offset += 1;
        Ok(byte)
    }

    /// Read a BER length.
    pub fn read_length(&mut self) -> Result<usize> {
        let first = self.read_byte()?;
        if first < 0x80 {
            // Short form
            return Ok(first as usize);
        }
        if first == 0x80 {
            tracing::debug!(target: "snmp_usm::ber", offset = self.offset, kind = %DecodeErrorKind::IndefiniteLength, "indefinite length");
            return Err(Error::Malformed.boxed());
        }

        // Long form
        let count = (first & 0x7F) as usize;
        if count > 4 {
            tracing::debug!(target: "snmp_usm::ber", offset = self.offset, kind = %DecodeErrorKind::LengthTooLong { octets: count }, "length too long");
            return Err(Error::Malformed.boxed());
        }
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | self.read_byte()? as usize;
        }
        Ok(len)
    }

    /// Read raw bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        // saturating_add keeps an oversized length from bypassing the bounds check
        if self.offset.saturating_add(len) > self.data.len() {
            tracing::debug!(target: "snmp_usm::ber", offset = self.offset, kind = %DecodeErrorKind::InsufficientData { needed: len, available: self.remaining() }, "insufficient data");
            return Err(Error::Malformed.boxed());
        }
        let bytes = self.data.slice(self.offset..self.offset + len);
        self.offset += len;
        Ok(bytes)
    }

    /// Read and expect a specific tag, returning the content length.
    pub fn expect_tag(&mut self, expected: u8) -> Result<usize> {
        let tag = self.read_byte()?;
        if tag != expected {
            tracing::debug!(target: "snmp_usm::ber", offset = self.offset - 1, kind = %DecodeErrorKind::UnexpectedTag { expected, actual: tag }, "unexpected tag");
            return Err(Error::Malformed.boxed());
        }
        self.read_length()
    }

    /// Read a BER integer (signed).
    pub fn read_integer(&mut self) -> Result<i32> {
        let len = self.expect_tag(tag::universal::INTEGER)?;
        if len == 0 {
            tracing::debug!(target: "snmp_usm::ber", offset = self.offset, kind = %DecodeErrorKind::ZeroLengthInteger, "zero-length integer");
            return Err(Error::Malformed.boxed());
        }
        if len > 4 {
            // Permissive: truncate with warning (matches net-snmp)
            tracing::warn!(target: "snmp_usm::ber", offset = self.offset, length = len, "integer too long, truncating to 4 bytes");
        }

        let bytes = self.read_bytes(len)?;

        // Sign extend
        let is_negative = bytes[0] & 0x80 != 0;
        let mut value: i32 = if is_negative { -1 } else { 0 };
        for &byte in bytes.iter().take(4) {
            value = (value << 8) | (byte as i32);
        }
        Ok(value)
    }

    /// Read an OCTET STRING.
    pub fn read_octet_string(&mut self) -> Result<Bytes> {
        let len = self.expect_tag(tag::universal::OCTET_STRING)?;
        self.read_bytes(len)
    }

    /// Read a SEQUENCE, returning a decoder for its contents.
    pub fn read_sequence(&mut self) -> Result<Decoder> {
        self.read_constructed(tag::universal::SEQUENCE)
    }

    /// Read a constructed type with a specific tag, returning a decoder
    /// for its contents.
    pub fn read_constructed(&mut self, expected_tag: u8) -> Result<Decoder> {
        let len = self.expect_tag(expected_tag)?;
        let content = self.read_bytes(len)?;
        Ok(Decoder::new(content))
    }

    /// Skip a TLV (tag-length-value) without parsing.
    pub fn skip_tlv(&mut self) -> Result<()> {
        let _tag = self.read_byte()?;
        let len = self.read_length()?;
        let new_offset = self.offset.saturating_add(len);
        if new_offset > self.data.len() {
            tracing::debug!(target: "snmp_usm::ber", offset = self.offset, kind = %DecodeErrorKind::InsufficientData { needed: len, available: self.remaining() }, "TLV extends past end of data");
            return Err(Error::Malformed.boxed());
        }
        self.offset = new_offset;
        Ok(())
    }

    /// Read one complete TLV and return its raw bytes (tag and length
    /// octets included), without interpreting the content.
    pub fn read_tlv(&mut self) -> Result<Bytes> {
        let start = self.offset;
        self.skip_tlv()?;
        Ok(self.data.slice(start..self.offset))
    }
}

/// BER encoder that builds output back-to-front.
///
/// Content is pushed before its header, so the length of every constructed
/// value is known when the header is written. [`finish`](Self::finish)
/// reverses the buffer into wire order.
#[derive(Default)]
pub struct EncodeBuf {
    // Stored in reverse byte order until finish()
    buf: Vec<u8>,
}

impl EncodeBuf {
    /// Create a new empty buffer.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(128),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn push_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    fn push_slice(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes.iter().rev());
    }

    fn push_length(&mut self, len: usize) {
        if len < 0x80 {
            self.push_byte(len as u8);
        } else {
            let be = (len as u32).to_be_bytes();
            let skip = be.iter().take_while(|&&b| b == 0).count();
            let significant = &be[skip..];
            self.push_slice(significant);
            self.push_byte(0x80 | significant.len() as u8);
        }
    }

    /// Push pre-encoded BER bytes verbatim (e.g. an already-encoded
    /// payload nested inside an outer SEQUENCE).
    pub fn push_raw(&mut self, encoded: &[u8]) {
        self.push_slice(encoded);
    }

    /// Push a primitive TLV with the given tag and content.
    pub fn push_tlv(&mut self, tag: u8, content: &[u8]) {
        self.push_slice(content);
        self.push_length(content.len());
        self.push_byte(tag);
    }

    /// Push an OCTET STRING.
    pub fn push_octet_string(&mut self, value: &[u8]) {
        self.push_tlv(tag::universal::OCTET_STRING, value);
    }

    /// Push a NULL.
    pub fn push_null(&mut self) {
        self.push_tlv(tag::universal::NULL, &[]);
    }

    /// Push a signed INTEGER with minimal two's-complement content.
    pub fn push_integer(&mut self, value: i32) {
        let be = value.to_be_bytes();
        let mut start = 0;
        while start < 3
            && ((be[start] == 0x00 && be[start + 1] & 0x80 == 0)
                || (be[start] == 0xFF && be[start + 1] & 0x80 != 0))
        {
            start += 1;
        }
        self.push_tlv(tag::universal::INTEGER, &be[start..]);
    }

    /// Push an unsigned 32-bit value with the given tag.
    ///
    /// Values with the top bit set get a leading zero octet so they stay
    /// non-negative on the wire.
    pub fn push_unsigned32(&mut self, tag: u8, value: u32) {
        let be = value.to_be_bytes();
        let skip = be.iter().take_while(|&&b| b == 0).count().min(3);
        let significant = &be[skip..];
        if significant[0] & 0x80 != 0 {
            let mut padded = [0u8; 5];
            padded[1..1 + significant.len()].copy_from_slice(significant);
            self.push_tlv(tag, &padded[..1 + significant.len()]);
        } else {
            self.push_tlv(tag, significant);
        }
    }

    /// Push a constructed value; the closure pushes its content (in
    /// reverse field order).
    pub fn push_constructed(&mut self, tag: u8, f: impl FnOnce(&mut Self)) {
        let mark = self.buf.len();
        f(self);
        let len = self.buf.len() - mark;
        self.push_length(len);
        self.push_byte(tag);
    }

    /// Push a SEQUENCE; the closure pushes its content (in reverse field
    /// order).
    pub fn push_sequence(&mut self, f: impl FnOnce(&mut Self)) {
        self.push_constructed(tag::universal::SEQUENCE, f);
    }

    /// Finish encoding and return the wire-order bytes.
    pub fn finish(mut self) -> Bytes {
        self.buf.reverse();
        Bytes::from(self.buf)
    }
}
