//! Transport layer module for the LDAP client
//!
//! This crate provides the stream contracts the connection driver
//! reads and writes through, a TCP implementation with optional TLS,
//! and a factory that selects a transport from an LDAP URL.

pub mod factory;
pub mod stream;
pub mod tcp;
pub mod tls;

pub use factory::{TransportFactory, TransportOptions};
pub use stream::{StreamAccessor, Transport};
pub use tcp::{TcpSettings, TcpTransport};
pub use tls::TlsConfig;
