//! Canonical BER encoder
//!
//! Produces definite-length encodings with shortest-form length octets
//! and minimal two's-complement integers, as LDAP expects on the wire.

use crate::ber::types::{self, Tag};

/// BER encoder accumulating TLV triplets into one buffer
///
/// Constructed values are written through [`BerEncoder::constructed`],
/// which encodes the nested content first so the definite length is
/// always exact.
#[derive(Debug, Default)]
pub struct BerEncoder {
    buffer: Vec<u8>,
}

impl BerEncoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Write one TLV with pre-encoded content
    pub fn tlv(&mut self, tag: Tag, value: &[u8]) -> &mut Self {
        tag.encode(&mut self.buffer);
        types::encode_length(value.len(), &mut self.buffer);
        self.buffer.extend_from_slice(value);
        self
    }

    /// Write an INTEGER in minimal two's-complement form
    pub fn integer(&mut self, value: i64) -> &mut Self {
        let bytes = minimal_twos_complement(value);
        self.tlv(Tag::INTEGER, &bytes)
    }

    /// Write an ENUMERATED in minimal two's-complement form
    pub fn enumerated(&mut self, value: i64) -> &mut Self {
        let bytes = minimal_twos_complement(value);
        self.tlv(Tag::ENUMERATED, &bytes)
    }

    /// Write an OCTET STRING (zero-length content is valid)
    pub fn octet_string(&mut self, value: &[u8]) -> &mut Self {
        self.tlv(Tag::OCTET_STRING, value)
    }

    /// Write an integer value under a non-universal tag
    pub fn tagged_integer(&mut self, tag: Tag, value: i64) -> &mut Self {
        let bytes = minimal_twos_complement(value);
        self.tlv(tag, &bytes)
    }

    /// Write an OCTET STRING under a non-universal tag
    pub fn tagged_octet_string(&mut self, tag: Tag, value: &[u8]) -> &mut Self {
        self.tlv(tag, value)
    }

    /// Write a BOOLEAN (canonical: 0xFF for true)
    pub fn boolean(&mut self, value: bool) -> &mut Self {
        self.tlv(Tag::BOOLEAN, &[if value { 0xFF } else { 0x00 }])
    }

    /// Write a NULL
    pub fn null(&mut self) -> &mut Self {
        self.tlv(Tag::NULL, &[])
    }

    /// Write a constructed value whose content is produced by `f`
    pub fn constructed(&mut self, tag: Tag, f: impl FnOnce(&mut BerEncoder)) -> &mut Self {
        let mut inner = BerEncoder::new();
        f(&mut inner);
        self.tlv(tag, &inner.buffer)
    }

    /// Write a universal SEQUENCE
    pub fn sequence(&mut self, f: impl FnOnce(&mut BerEncoder)) -> &mut Self {
        self.constructed(Tag::SEQUENCE, f)
    }

    /// Write a universal SET
    pub fn set(&mut self, f: impl FnOnce(&mut BerEncoder)) -> &mut Self {
        self.constructed(Tag::SET, f)
    }

    /// Append already-encoded octets verbatim
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(bytes);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Minimal big-endian two's-complement representation
fn minimal_twos_complement(value: i64) -> Vec<u8> {
    let be = value.to_be_bytes();
    let mut start = 0;
    while start < be.len() - 1 {
        let redundant = (be[start] == 0x00 && be[start + 1] & 0x80 == 0)
            || (be[start] == 0xFF && be[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    be[start..].to_vec()
}
