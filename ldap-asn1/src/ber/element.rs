//! Decoded BER elements
//!
//! An [`Element`] is one tag-length-value unit lifted off the wire:
//! its tag, its raw content octets, and, for constructed elements, the
//! ordered child elements. Elements are immutable once parsed and
//! owned solely by the parse tree that produced them.

use crate::ber::types::{self, Tag};
use ldap_core::{LdapError, LdapResult};

/// Maximum nesting depth accepted by the parser
///
/// LDAP PDUs nest a handful of levels; anything deeper is treated as
/// adversarial input.
pub const MAX_DEPTH: usize = 64;

/// One decoded BER unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: Tag,
    value: Vec<u8>,
    children: Vec<Element>,
}

/// Partially-built constructed element on the parse stack
struct Frame {
    tag: Tag,
    value: Vec<u8>,
    children: Vec<Element>,
    end: usize,
}

impl Element {
    /// Build a primitive element (mainly useful in tests)
    pub fn primitive(tag: Tag, value: Vec<u8>) -> Self {
        Self {
            tag,
            value,
            children: Vec::new(),
        }
    }

    /// Parse one element from the start of `data`
    ///
    /// Constructed elements are parsed breadth-first with an explicit
    /// frame stack; nesting beyond [`MAX_DEPTH`] is rejected rather
    /// than recursed into.
    ///
    /// # Returns
    /// The element and the number of octets consumed.
    ///
    /// # Errors
    /// `Decode` when a tag or length is malformed, a child overruns
    /// its parent's declared length, or the buffer is shorter than a
    /// declared length.
    pub fn parse(data: &[u8]) -> LdapResult<(Self, usize)> {
        let (tag, length, header) = read_header(data)?;
        let total = header + length;
        if data.len() < total {
            return Err(LdapError::Decode(format!(
                "Content overruns buffer: declared {} octets, have {}",
                length,
                data.len() - header
            )));
        }

        if !tag.is_constructed() {
            return Ok((
                Element::primitive(tag, data[header..total].to_vec()),
                total,
            ));
        }

        let mut stack = vec![Frame {
            tag,
            value: data[header..total].to_vec(),
            children: Vec::new(),
            end: total,
        }];
        let mut pos = header;

        loop {
            let Some(top) = stack.last() else {
                return Err(LdapError::Decode("Parse stack underflow".to_string()));
            };
            let end = top.end;
            if pos == end {
                if let Some(frame) = stack.pop() {
                    let element = Element {
                        tag: frame.tag,
                        value: frame.value,
                        children: frame.children,
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => return Ok((element, pos)),
                    }
                }
                continue;
            }

            let (child_tag, child_len, child_header) = read_header(&data[pos..end])?;
            let child_end = pos + child_header + child_len;
            if child_end > end {
                return Err(LdapError::Decode(format!(
                    "Child element overruns parent: ends at {}, parent at {}",
                    child_end, end
                )));
            }

            if child_tag.is_constructed() {
                if stack.len() >= MAX_DEPTH {
                    return Err(LdapError::Decode(format!(
                        "Nesting depth exceeds {}",
                        MAX_DEPTH
                    )));
                }
                stack.push(Frame {
                    tag: child_tag,
                    value: data[pos + child_header..child_end].to_vec(),
                    children: Vec::new(),
                    end: child_end,
                });
                pos += child_header;
            } else {
                let value = data[pos + child_header..child_end].to_vec();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Element::primitive(child_tag, value));
                }
                pos = child_end;
            }
        }
    }

    /// Parse one element and require it to span the whole buffer
    pub fn parse_exact(data: &[u8]) -> LdapResult<Self> {
        let (element, consumed) = Self::parse(data)?;
        if consumed != data.len() {
            return Err(LdapError::Decode(format!(
                "Trailing {} octets after element",
                data.len() - consumed
            )));
        }
        Ok(element)
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Raw content octets (for constructed elements, the concatenation
    /// of all child encodings)
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<&Element> {
        self.children.get(index)
    }

    /// Decode as INTEGER, validating tag and minimal two's-complement form
    pub fn as_integer(&self) -> LdapResult<i64> {
        self.expect_tag(Tag::INTEGER)?;
        decode_twos_complement(&self.value)
    }

    /// Decode as ENUMERATED
    pub fn as_enumerated(&self) -> LdapResult<i64> {
        self.expect_tag(Tag::ENUMERATED)?;
        decode_twos_complement(&self.value)
    }

    /// Decode as OCTET STRING
    ///
    /// Zero-length content is valid and distinct from an absent field.
    pub fn as_octet_string(&self) -> LdapResult<&[u8]> {
        self.expect_tag(Tag::OCTET_STRING)?;
        Ok(&self.value)
    }

    /// Decode as a UTF-8 string carried in an OCTET STRING
    pub fn as_string(&self) -> LdapResult<String> {
        let bytes = self.as_octet_string()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| LdapError::Decode(format!("Invalid UTF-8 in octet string: {}", e)))
    }

    /// Decode as BOOLEAN
    pub fn as_boolean(&self) -> LdapResult<bool> {
        self.expect_tag(Tag::BOOLEAN)?;
        match self.value.as_slice() {
            [0x00] => Ok(false),
            [_] => Ok(true),
            _ => Err(LdapError::Decode(format!(
                "BOOLEAN must be one octet, got {}",
                self.value.len()
            ))),
        }
    }

    /// Decode as NULL
    pub fn as_null(&self) -> LdapResult<()> {
        self.expect_tag(Tag::NULL)?;
        if !self.value.is_empty() {
            return Err(LdapError::Decode(format!(
                "NULL must be empty, got {} octets",
                self.value.len()
            )));
        }
        Ok(())
    }

    fn expect_tag(&self, expected: Tag) -> LdapResult<()> {
        if self.tag != expected {
            return Err(LdapError::Decode(format!(
                "Expected {:?}, got {:?}",
                expected, self.tag
            )));
        }
        Ok(())
    }
}

/// Read one tag + length header
///
/// Returns the tag, the content length, and the header size.
pub(crate) fn read_header(data: &[u8]) -> LdapResult<(Tag, usize, usize)> {
    let (tag, tag_len) = Tag::decode(data)?;
    let (length, len_len) = types::decode_length(&data[tag_len..])?;
    Ok((tag, length, tag_len + len_len))
}

/// Big-endian two's-complement to i64, minimal form enforced
fn decode_twos_complement(bytes: &[u8]) -> LdapResult<i64> {
    if bytes.is_empty() {
        return Err(LdapError::Decode("Empty integer content".to_string()));
    }
    if bytes.len() > 8 {
        return Err(LdapError::Decode(format!(
            "Integer too wide: {} octets",
            bytes.len()
        )));
    }
    if bytes.len() > 1 {
        let redundant = (bytes[0] == 0x00 && bytes[1] & 0x80 == 0)
            || (bytes[0] == 0xFF && bytes[1] & 0x80 != 0);
        if redundant {
            return Err(LdapError::Decode(
                "Integer not in minimal two's-complement form".to_string(),
            ));
        }
    }

    let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in bytes {
        value = (value << 8) | b as i64;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber::encoder::BerEncoder;

    #[test]
    fn test_parse_primitive() {
        // INTEGER 5
        let (element, consumed) = Element::parse(&[0x02, 0x01, 0x05]).unwrap();
        assert_eq!(consumed, 3);
        assert_eq!(element.as_integer().unwrap(), 5);
        assert!(element.children().is_empty());
    }

    #[test]
    fn test_parse_constructed() {
        // SEQUENCE { INTEGER 3, OCTET STRING "ab" }
        let data = [0x30, 0x07, 0x02, 0x01, 0x03, 0x04, 0x02, b'a', b'b'];
        let element = Element::parse_exact(&data).unwrap();
        assert_eq!(element.tag(), Tag::SEQUENCE);
        assert_eq!(element.children().len(), 2);
        assert_eq!(element.child(0).unwrap().as_integer().unwrap(), 3);
        assert_eq!(element.child(1).unwrap().as_octet_string().unwrap(), b"ab");
        // Raw content covers both children
        assert_eq!(element.value().len(), 7);
    }

    #[test]
    fn test_parse_nested() {
        // SEQUENCE { SEQUENCE { INTEGER 1 }, ENUMERATED 0 }
        let data = [0x30, 0x08, 0x30, 0x03, 0x02, 0x01, 0x01, 0x0A, 0x01, 0x00];
        let element = Element::parse_exact(&data).unwrap();
        let inner = element.child(0).unwrap();
        assert_eq!(inner.tag(), Tag::SEQUENCE);
        assert_eq!(inner.child(0).unwrap().as_integer().unwrap(), 1);
        assert_eq!(element.child(1).unwrap().as_enumerated().unwrap(), 0);
    }

    #[test]
    fn test_child_overrun_rejected() {
        // SEQUENCE declares 3 octets but its child declares 4
        let data = [0x30, 0x03, 0x04, 0x04, 0xAA];
        assert!(Element::parse(&data).is_err());
    }

    #[test]
    fn test_depth_cap() {
        // MAX_DEPTH + 8 nested sequences
        let mut data = vec![0x02, 0x01, 0x00];
        for _ in 0..(MAX_DEPTH + 8) {
            let len = data.len();
            let mut wrapped = if len < 128 {
                vec![0x30, len as u8]
            } else {
                vec![0x30, 0x82, (len >> 8) as u8, len as u8]
            };
            wrapped.extend_from_slice(&data);
            data = wrapped;
        }
        let err = Element::parse(&data).unwrap_err();
        assert!(err.to_string().contains("depth"));
    }

    #[test]
    fn test_zero_length_octet_string() {
        let element = Element::parse_exact(&[0x04, 0x00]).unwrap();
        assert_eq!(element.as_octet_string().unwrap(), b"");
        assert_eq!(element.as_string().unwrap(), "");
    }

    #[test]
    fn test_negative_integer_minimal() {
        // -128 encodes as a single 0x80 octet
        let element = Element::parse_exact(&[0x02, 0x01, 0x80]).unwrap();
        assert_eq!(element.as_integer().unwrap(), -128);

        // 0xFF 0x80 is a redundant encoding of -128
        let element = Element::parse_exact(&[0x02, 0x02, 0xFF, 0x80]).unwrap();
        assert!(element.as_integer().is_err());
    }

    #[test]
    fn test_integer_round_trip() {
        for value in [0i64, 1, -1, 127, 128, -128, -129, 255, 65535, -65536, i64::MAX, i64::MIN] {
            let mut enc = BerEncoder::new();
            enc.integer(value);
            let element = Element::parse_exact(enc.as_bytes()).unwrap();
            assert_eq!(element.as_integer().unwrap(), value, "value {}", value);
        }
    }

    #[test]
    fn test_boolean() {
        assert!(!Element::parse_exact(&[0x01, 0x01, 0x00]).unwrap().as_boolean().unwrap());
        assert!(Element::parse_exact(&[0x01, 0x01, 0xFF]).unwrap().as_boolean().unwrap());
        assert!(Element::parse_exact(&[0x01, 0x02, 0x00, 0x00])
            .unwrap()
            .as_boolean()
            .is_err());
    }

    #[test]
    fn test_wrong_tag_never_coerced() {
        let element = Element::parse_exact(&[0x04, 0x01, 0x05]).unwrap();
        assert!(element.as_integer().is_err());
    }

    #[test]
    fn test_trailing_octets_rejected() {
        assert!(Element::parse_exact(&[0x02, 0x01, 0x05, 0x00]).is_err());
    }
}
