//! BER tag and length primitives

use ldap_core::{LdapError, LdapResult};

/// ASN.1 tag class (bits 8-7 of the identifier octet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagClass {
    /// Universal class (00)
    Universal = 0,
    /// Application class (01)
    Application = 1,
    /// Context-specific class (10)
    ContextSpecific = 2,
    /// Private class (11)
    Private = 3,
}

impl TagClass {
    /// Extract the class from an identifier octet
    pub fn from_identifier(octet: u8) -> Self {
        match (octet >> 6) & 0x03 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        }
    }

    /// Class bits positioned for an identifier octet
    pub fn bits(self) -> u8 {
        (self as u8) << 6
    }
}

/// BER tag: class, constructed flag, and tag number
///
/// Tag numbers 0-30 encode in a single identifier octet; larger
/// numbers use the high-tag-number form with base-128 continuation
/// octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    class: TagClass,
    constructed: bool,
    number: u32,
}

impl Tag {
    /// UNIVERSAL 1, primitive
    pub const BOOLEAN: Tag = Tag::universal(false, 1);
    /// UNIVERSAL 2, primitive
    pub const INTEGER: Tag = Tag::universal(false, 2);
    /// UNIVERSAL 4, primitive
    pub const OCTET_STRING: Tag = Tag::universal(false, 4);
    /// UNIVERSAL 5, primitive
    pub const NULL: Tag = Tag::universal(false, 5);
    /// UNIVERSAL 10, primitive
    pub const ENUMERATED: Tag = Tag::universal(false, 10);
    /// UNIVERSAL 16, constructed
    pub const SEQUENCE: Tag = Tag::universal(true, 16);
    /// UNIVERSAL 17, constructed
    pub const SET: Tag = Tag::universal(true, 17);

    pub const fn new(class: TagClass, constructed: bool, number: u32) -> Self {
        Self {
            class,
            constructed,
            number,
        }
    }

    pub const fn universal(constructed: bool, number: u32) -> Self {
        Self::new(TagClass::Universal, constructed, number)
    }

    pub const fn application(constructed: bool, number: u32) -> Self {
        Self::new(TagClass::Application, constructed, number)
    }

    pub const fn context(constructed: bool, number: u32) -> Self {
        Self::new(TagClass::ContextSpecific, constructed, number)
    }

    pub fn class(&self) -> TagClass {
        self.class
    }

    pub fn is_constructed(&self) -> bool {
        self.constructed
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Append the encoded identifier octets to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        let leading = self.class.bits() | if self.constructed { 0x20 } else { 0x00 };
        if self.number <= 30 {
            out.push(leading | self.number as u8);
            return;
        }
        // High-tag-number form: 0x1F marker then base-128 octets,
        // all but the last with the continuation bit set.
        out.push(leading | 0x1F);
        let mut groups = [0u8; 5];
        let mut n = 0;
        let mut remaining = self.number;
        loop {
            groups[n] = (remaining & 0x7F) as u8;
            n += 1;
            remaining >>= 7;
            if remaining == 0 {
                break;
            }
        }
        for i in (0..n).rev() {
            if i > 0 {
                out.push(groups[i] | 0x80);
            } else {
                out.push(groups[i]);
            }
        }
    }

    /// Decode a tag from the start of `data`
    ///
    /// # Returns
    /// The tag and the number of octets consumed.
    ///
    /// # Errors
    /// `Decode` on an empty buffer or a truncated or oversized
    /// high-tag-number form.
    pub fn decode(data: &[u8]) -> LdapResult<(Self, usize)> {
        let first = *data
            .first()
            .ok_or_else(|| LdapError::Decode("Empty buffer while reading tag".to_string()))?;
        let class = TagClass::from_identifier(first);
        let constructed = (first & 0x20) != 0;
        let low = first & 0x1F;

        if low < 0x1F {
            return Ok((Self::new(class, constructed, low as u32), 1));
        }

        let mut number = 0u32;
        let mut pos = 1;
        loop {
            let octet = *data.get(pos).ok_or_else(|| {
                LdapError::Decode("Truncated high-tag-number form".to_string())
            })?;
            number = number
                .checked_mul(128)
                .and_then(|n| n.checked_add((octet & 0x7F) as u32))
                .ok_or_else(|| LdapError::Decode("Tag number too large".to_string()))?;
            pos += 1;
            if octet & 0x80 == 0 {
                break;
            }
        }
        Ok((Self::new(class, constructed, number), pos))
    }
}

/// Append shortest-form definite length octets to `out`
pub fn encode_length(length: usize, out: &mut Vec<u8>) {
    if length < 128 {
        out.push(length as u8);
        return;
    }
    let bytes = length.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

/// Decode definite length octets from the start of `data`
///
/// # Returns
/// The content length and the number of octets consumed.
///
/// # Errors
/// `Decode` on a truncated buffer, on the indefinite form (`0x80`,
/// unsupported), or on a length wider than four octets.
pub fn decode_length(data: &[u8]) -> LdapResult<(usize, usize)> {
    let first = *data
        .first()
        .ok_or_else(|| LdapError::Decode("Empty buffer while reading length".to_string()))?;

    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let count = (first & 0x7F) as usize;
    if count == 0 {
        return Err(LdapError::Decode(
            "Indefinite length encoding is not supported".to_string(),
        ));
    }
    if count > 4 {
        return Err(LdapError::Decode(format!(
            "Length of length too large: {} octets",
            count
        )));
    }
    if data.len() < 1 + count {
        return Err(LdapError::Decode(format!(
            "Truncated length: need {} octets, have {}",
            1 + count,
            data.len().saturating_sub(1)
        )));
    }

    let mut length = 0usize;
    for &octet in &data[1..1 + count] {
        length = (length << 8) | octet as usize;
    }
    Ok((length, 1 + count))
}
