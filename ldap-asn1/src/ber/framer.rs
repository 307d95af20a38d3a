//! Streaming PDU extraction
//!
//! The transport delivers bytes at arbitrary chunk boundaries; the
//! framer buffers them and yields one complete top-level PDU at a
//! time. Every LDAP message is a universal SEQUENCE, so anything else
//! at the top level means the stream framing is lost and the
//! connection has to be torn down.

use crate::ber::types;
use bytes::{Bytes, BytesMut};
use ldap_core::{LdapError, LdapResult};

/// Default cap on a single PDU (1 MiB)
pub const DEFAULT_MAX_PDU_SIZE: usize = 1024 * 1024;

const SEQUENCE_IDENTIFIER: u8 = 0x30;

/// Accumulates stream bytes and splits off complete PDUs
#[derive(Debug)]
pub struct PduFramer {
    buffer: BytesMut,
    max_pdu_size: usize,
}

impl PduFramer {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_PDU_SIZE)
    }

    pub fn with_max_size(max_pdu_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_pdu_size,
        }
    }

    /// Append freshly-read stream bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of buffered, not-yet-framed bytes
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Try to split off the next complete PDU
    ///
    /// # Returns
    /// - `Ok(Some(pdu))`: one complete top-level SEQUENCE
    /// - `Ok(None)`: more bytes are needed
    /// - `Err`: the stream framing is unrecoverable (wrong top-level
    ///   tag, indefinite length, or a PDU beyond the size cap)
    pub fn next_pdu(&mut self) -> LdapResult<Option<Bytes>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        if self.buffer[0] != SEQUENCE_IDENTIFIER {
            return Err(LdapError::Decode(format!(
                "Expected SEQUENCE at top level, got identifier 0x{:02X}",
                self.buffer[0]
            )));
        }
        if self.buffer.len() < 2 {
            return Ok(None);
        }

        let first = self.buffer[1];
        let (length, header) = if first & 0x80 == 0 {
            (first as usize, 2)
        } else {
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
            if self.buffer.len() < 2 + count {
                return Ok(None);
            }
            let (length, consumed) = types::decode_length(&self.buffer[1..])?;
            (length, 1 + consumed)
        };

        let total = header + length;
        if total > self.max_pdu_size {
            return Err(LdapError::Decode(format!(
                "PDU of {} bytes exceeds maximum of {}",
                total, self.max_pdu_size
            )));
        }
        if self.buffer.len() < total {
            return Ok(None);
        }
        Ok(Some(self.buffer.split_to(total).freeze()))
    }
}

impl Default for PduFramer {
    fn default() -> Self {
        Self::new()
    }
}
