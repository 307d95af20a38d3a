//! BER/DER codec for the LDAP wire protocol
//!
//! LDAP PDUs are ASN.1 values encoded with the Basic Encoding Rules
//! (ITU-T X.690). This crate provides:
//!
//! - tag and length primitives ([`ber::Tag`], [`ber::TagClass`])
//! - an immutable parse tree ([`ber::Element`])
//! - path-addressed handler dispatch ([`ber::DerPath`],
//!   [`ber::PduDecoder`])
//! - a canonical encoder ([`ber::BerEncoder`])
//! - streaming PDU extraction from arbitrary chunk boundaries
//!   ([`ber::PduFramer`])
//!
//! # Known limitation
//!
//! Indefinite-length encodings (X.690 §8.1.3.6) are rejected with a
//! decode error. LDAP servers emit definite lengths in practice, and
//! refusing the form outright is safer than guessing at a stream
//! reconstruction.

pub mod ber;

pub use ber::{BerEncoder, DerPath, Element, PduDecoder, PduFramer, Tag, TagClass};
