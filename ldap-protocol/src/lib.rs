//! LDAP protocol message model
//!
//! Requests encode themselves into a message envelope; responses are
//! decoded from envelopes through path-registered handlers. The
//! operation catalog here is deliberately small: the generic shapes
//! the connection core itself needs, plus a raw escape hatch for
//! external catalogs.

pub mod controls;
pub mod message;
pub mod oid;
pub mod request;
pub mod response;

pub use controls::Control;
pub use message::{Envelope, encode_request, op_tag};
pub use request::{
    AbandonRequest, DerefAliases, ExtendedRequest, RawRequest, Request, SearchRequest,
    SearchScope, UnbindRequest,
};
pub use response::{
    Attribute, ExtendedResponse, IntermediateResponse, LdapResponse, Response, SearchItem,
    SearchResult, SearchResultEntry, SearchResultReference,
};
