//! Core types for the LDAP client workspace
//!
//! This crate provides the shared error taxonomy, LDAP result codes,
//! and the LDAP URL type used by every other crate in the workspace.

pub mod error;
pub mod result_code;
pub mod url;

pub use error::{LdapError, LdapResult};
pub use result_code::ResultCode;
pub use url::{LdapUrl, Scheme};
