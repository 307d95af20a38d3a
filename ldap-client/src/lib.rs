//! LDAP connection core
//!
//! This crate provides the connection lifecycle: endpoint selection,
//! TLS setup, request/response correlation with pipelining, automatic
//! reconnect with pluggable retry policies, and connection validation.

pub mod config;
pub mod connection;
pub mod retry;
pub mod strategy;
pub mod validator;

pub use config::{ConnectionConfig, ConnectionConfigBuilder};
pub use connection::{Connection, ConnectionState, OperationHandle};
pub use retry::{BackoffRetryPolicy, OneReconnectAttempt, RetryMetadata, RetryPolicy};
pub use strategy::{ActivePassive, ConnectionStrategy, Random, RoundRobin};
pub use validator::{ConnectionValidator, SearchValidator};
