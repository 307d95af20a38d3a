//! Connection validators
//!
//! A validator decides whether a connection is still usable before a
//! pooling collaborator hands it out again. Validation runs through
//! the normal operation dispatch path and is bounded by the response
//! timeout like any other operation.

use crate::connection::Connection;
use async_trait::async_trait;
use ldap_protocol::SearchRequest;

/// Health check for an open connection
#[async_trait]
pub trait ConnectionValidator: Send + Sync {
    /// Returns false when the connection should be discarded
    async fn validate(&self, connection: &Connection) -> bool;
}

/// Validates by issuing a no-op search against the root DSE
#[derive(Debug, Clone)]
pub struct SearchValidator {
    request: SearchRequest,
}

impl SearchValidator {
    pub fn new() -> Self {
        Self {
            request: SearchRequest::no_op(),
        }
    }

    pub fn with_request(request: SearchRequest) -> Self {
        Self { request }
    }
}

impl Default for SearchValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionValidator for SearchValidator {
    async fn validate(&self, connection: &Connection) -> bool {
        let mut handle = match connection.operate(&self.request).await {
            Ok(handle) => handle,
            Err(_) => return false,
        };
        // Any definite terminal result counts; the server answered
        handle.await_search().await.is_ok()
    }
}
