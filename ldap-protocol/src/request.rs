//! Request encoding
//!
//! A [`Request`] writes its protocol op into the message envelope the
//! connection builds around it. The concrete types here are the ones
//! the connection core itself needs; anything else goes through
//! [`RawRequest`] with externally produced op bytes.

use crate::message::op_tag;
use crate::oid;
use ldap_asn1::ber::{BerEncoder, Tag};

/// A protocol operation that can be placed into a message envelope
pub trait Request: Send + Sync {
    /// Write the APPLICATION-tagged protocol op
    fn encode_op(&self, encoder: &mut BerEncoder);
}

/// Search scope (RFC 4511 §4.5.1.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Object = 0,
    OneLevel = 1,
    Subtree = 2,
}

/// Alias dereference policy (RFC 4511 §4.5.1.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefAliases {
    Never = 0,
    Searching = 1,
    FindingBase = 2,
    Always = 3,
}

/// Search request with a presence filter
///
/// Covers what connection validation needs: an object-scope search for
/// `(objectClass=*)` returning no attributes. Richer filters belong to
/// an external operation catalog.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub base_dn: String,
    pub scope: SearchScope,
    pub deref_aliases: DerefAliases,
    pub size_limit: i64,
    pub time_limit: i64,
    pub types_only: bool,
    /// Attribute description of a `(attr=*)` presence filter
    pub present_attribute: String,
    pub attributes: Vec<String>,
}

impl SearchRequest {
    pub fn new(base_dn: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            scope: SearchScope::Subtree,
            deref_aliases: DerefAliases::Never,
            size_limit: 0,
            time_limit: 0,
            types_only: false,
            present_attribute: "objectClass".to_string(),
            attributes: Vec::new(),
        }
    }

    /// The no-op search used to validate a connection: object scope at
    /// the root DSE, `(objectClass=*)`, no attributes returned
    pub fn no_op() -> Self {
        let mut request = Self::new("");
        request.scope = SearchScope::Object;
        request.size_limit = 1;
        // "1.1" requests no attributes at all
        request.attributes = vec!["1.1".to_string()];
        request
    }
}

impl Request for SearchRequest {
    fn encode_op(&self, encoder: &mut BerEncoder) {
        encoder.constructed(Tag::application(true, op_tag::SEARCH_REQUEST), |op| {
            op.octet_string(self.base_dn.as_bytes());
            op.enumerated(self.scope as i64);
            op.enumerated(self.deref_aliases as i64);
            op.integer(self.size_limit);
            op.integer(self.time_limit);
            op.boolean(self.types_only);
            // present filter is [7] AttributeDescription
            op.tagged_octet_string(Tag::context(false, 7), self.present_attribute.as_bytes());
            op.sequence(|attrs| {
                for attribute in &self.attributes {
                    attrs.octet_string(attribute.as_bytes());
                }
            });
        });
    }
}

/// Extended request (RFC 4511 §4.12)
#[derive(Debug, Clone)]
pub struct ExtendedRequest {
    oid: String,
    value: Option<Vec<u8>>,
}

impl ExtendedRequest {
    pub fn new(oid: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: Vec<u8>) -> Self {
        self.value = Some(value);
        self
    }

    /// The StartTLS extended request
    pub fn start_tls() -> Self {
        Self::new(oid::START_TLS)
    }

    pub fn oid(&self) -> &str {
        &self.oid
    }
}

impl Request for ExtendedRequest {
    fn encode_op(&self, encoder: &mut BerEncoder) {
        encoder.constructed(Tag::application(true, op_tag::EXTENDED_REQUEST), |op| {
            op.tagged_octet_string(Tag::context(false, 0), self.oid.as_bytes());
            if let Some(value) = &self.value {
                op.tagged_octet_string(Tag::context(false, 1), value);
            }
        });
    }
}

/// Unbind request: terminates the session, no response follows
#[derive(Debug, Clone, Copy)]
pub struct UnbindRequest;

impl Request for UnbindRequest {
    fn encode_op(&self, encoder: &mut BerEncoder) {
        encoder.tlv(Tag::application(false, op_tag::UNBIND_REQUEST), &[]);
    }
}

/// Abandon request: asks the server to stop work on a message id,
/// no response follows
#[derive(Debug, Clone, Copy)]
pub struct AbandonRequest {
    pub message_id: u32,
}

impl AbandonRequest {
    pub fn new(message_id: u32) -> Self {
        Self { message_id }
    }
}

impl Request for AbandonRequest {
    fn encode_op(&self, encoder: &mut BerEncoder) {
        encoder.tagged_integer(
            Tag::application(false, op_tag::ABANDON_REQUEST),
            self.message_id as i64,
        );
    }
}

/// Escape hatch: an already-encoded protocol op
///
/// External operation catalogs encode their ops themselves and submit
/// them through this type; the connection still owns the envelope and
/// the message id.
#[derive(Debug, Clone)]
pub struct RawRequest {
    op: Vec<u8>,
}

impl RawRequest {
    pub fn new(op: Vec<u8>) -> Self {
        Self { op }
    }
}

impl Request for RawRequest {
    fn encode_op(&self, encoder: &mut BerEncoder) {
        encoder.raw(&self.op);
    }
}
