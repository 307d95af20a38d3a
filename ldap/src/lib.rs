//! Async LDAP protocol client
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `ldap-core`: Error taxonomy, result codes, LDAP URLs
//! - `ldap-asn1`: BER/DER codec with path-addressed decoding
//! - `ldap-transport`: Transport layer (TCP, TLS upgrade)
//! - `ldap-protocol`: Protocol message model (requests, responses,
//!   controls)
//! - `ldap-client`: Connection lifecycle, correlation, reconnect,
//!   strategies, validators
//!
//! # Usage
//!
//! ```no_run
//! use ldap::client::{Connection, ConnectionConfig};
//! use ldap::protocol::SearchRequest;
//!
//! # async fn example() -> ldap::LdapResult<()> {
//! let config = ConnectionConfig::builder()
//!     .url("ldap://ds1.example.com")?
//!     .url("ldap://ds2.example.com")?
//!     .build()?;
//!
//! let mut connection = Connection::new(config);
//! connection.open().await?;
//!
//! let mut handle = connection.operate(&SearchRequest::no_op()).await?;
//! let result = handle.await_search().await?;
//! println!("{} entries, {:?}", result.entry_count(), result.result_code());
//!
//! connection.close().await?;
//! # Ok(())
//! # }
//! ```

// Re-export core types
pub use ldap_core::{LdapError, LdapResult, LdapUrl, ResultCode, Scheme};

// Re-export the codec
pub mod asn1 {
    pub use ldap_asn1::*;
}

// Re-export the transport layer
pub mod transport {
    pub use ldap_transport::*;
}

// Re-export the protocol message model
pub mod protocol {
    pub use ldap_protocol::*;
}

// Re-export the client API
pub mod client {
    pub use ldap_client::*;
}
