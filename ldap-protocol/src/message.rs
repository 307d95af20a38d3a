//! Message envelope
//!
//! `LDAPMessage ::= SEQUENCE { messageID INTEGER, protocolOp CHOICE
//! {...}, controls [0] Controls OPTIONAL }`. The envelope wraps every
//! request and every response on the wire.

use crate::controls::Control;
use crate::oid;
use crate::request::Request;
use ldap_asn1::ber::{BerEncoder, Element, Tag, TagClass};
use ldap_core::{LdapError, LdapResult};

/// Application tag numbers of the protocol operations
pub mod op_tag {
    pub const BIND_REQUEST: u32 = 0;
    pub const BIND_RESPONSE: u32 = 1;
    pub const UNBIND_REQUEST: u32 = 2;
    pub const SEARCH_REQUEST: u32 = 3;
    pub const SEARCH_RESULT_ENTRY: u32 = 4;
    pub const SEARCH_RESULT_DONE: u32 = 5;
    pub const MODIFY_RESPONSE: u32 = 7;
    pub const ADD_RESPONSE: u32 = 9;
    pub const DELETE_RESPONSE: u32 = 11;
    pub const MODIFY_DN_RESPONSE: u32 = 13;
    pub const COMPARE_RESPONSE: u32 = 15;
    pub const ABANDON_REQUEST: u32 = 16;
    pub const SEARCH_RESULT_REFERENCE: u32 = 19;
    pub const EXTENDED_REQUEST: u32 = 23;
    pub const EXTENDED_RESPONSE: u32 = 24;
    pub const INTERMEDIATE_RESPONSE: u32 = 25;
}

/// Encode one request into a complete PDU
pub fn encode_request(message_id: u32, request: &dyn Request, controls: &[Control]) -> Vec<u8> {
    let mut encoder = BerEncoder::new();
    encoder.sequence(|message| {
        message.integer(message_id as i64);
        request.encode_op(message);
        if !controls.is_empty() {
            message.constructed(Tag::context(true, 0), |wrapped| {
                for control in controls {
                    control.encode(wrapped);
                }
            });
        }
    });
    encoder.into_bytes()
}

/// One decoded message envelope
///
/// Holds the full parse tree so response decoders can dispatch their
/// path handlers over it without reparsing.
#[derive(Debug, Clone)]
pub struct Envelope {
    root: Element,
    message_id: u32,
    op_tag: u32,
}

impl Envelope {
    /// Decode a complete PDU into an envelope
    ///
    /// # Errors
    /// `Decode` when the PDU is not `SEQUENCE { INTEGER, APPLICATION
    /// op, ... }` or the message id is outside `0..=i32::MAX`.
    pub fn decode(pdu: &[u8]) -> LdapResult<Self> {
        let root = Element::parse_exact(pdu)?;
        if root.tag() != Tag::SEQUENCE {
            return Err(LdapError::Decode(format!(
                "Message must be a SEQUENCE, got {:?}",
                root.tag()
            )));
        }

        let message_id = root
            .child(0)
            .ok_or_else(|| LdapError::Decode("Message missing messageID".to_string()))?
            .as_integer()?;
        if message_id < 0 || message_id > i32::MAX as i64 {
            return Err(LdapError::Decode(format!(
                "Message id out of range: {}",
                message_id
            )));
        }

        let op = root
            .child(1)
            .ok_or_else(|| LdapError::Decode("Message missing protocolOp".to_string()))?;
        if op.tag().class() != TagClass::Application {
            return Err(LdapError::Decode(format!(
                "protocolOp must be APPLICATION tagged, got {:?}",
                op.tag()
            )));
        }
        let op_tag = op.tag().number();

        Ok(Self {
            root,
            message_id: message_id as u32,
            op_tag,
        })
    }

    pub fn message_id(&self) -> u32 {
        self.message_id
    }

    pub fn op_tag(&self) -> u32 {
        self.op_tag
    }

    /// Full parse tree including the envelope SEQUENCE
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// The protocol op element (decode guarantees the child exists)
    pub fn op(&self) -> &Element {
        &self.root.children()[1]
    }

    /// Decode the optional `[0]` response controls
    pub fn controls(&self) -> LdapResult<Vec<Control>> {
        let Some(wrapper) = self
            .root
            .children()
            .get(2)
            .filter(|e| e.tag() == Tag::context(true, 0))
        else {
            return Ok(Vec::new());
        };
        wrapper.children().iter().map(Control::decode).collect()
    }

    /// Whether this is an unsolicited notification (RFC 4511 §4.4)
    pub fn is_unsolicited(&self) -> bool {
        self.message_id == 0 && self.op_tag == op_tag::EXTENDED_RESPONSE
    }

    /// Whether this is the notice-of-disconnection notification
    ///
    /// The server sends it right before dropping the connection; no
    /// response to any outstanding request will follow.
    pub fn is_notice_of_disconnection(&self) -> bool {
        if !self.is_unsolicited() {
            return false;
        }
        // responseName is [10] within the extended response
        self.op()
            .children()
            .iter()
            .any(|e| e.tag() == Tag::context(false, 10) && e.value() == oid::NOTICE_OF_DISCONNECTION.as_bytes())
    }
}
