//! Operation handles
//!
//! The driver pushes every message correlated to an operation into
//! the handle's channel; callers pull them with [`OperationHandle::next`]
//! or one of the await conveniences. A handle resolves exactly once:
//! with a terminal response, a typed failure, or a timeout.

use super::driver::Command;
use ldap_core::{LdapError, LdapResult};
use ldap_protocol::{ExtendedResponse, LdapResponse, Response, SearchResult};
use std::time::Duration;
use tokio::sync::mpsc;

/// What the driver delivers for one registered message id
pub(crate) enum OpEvent {
    Response(Response),
    Failed(LdapError),
}

/// Caller-side view of one outstanding operation
pub struct OperationHandle {
    message_id: u32,
    events: mpsc::UnboundedReceiver<OpEvent>,
    commands: mpsc::UnboundedSender<Command>,
    response_timeout: Duration,
    finished: bool,
}

impl OperationHandle {
    pub(crate) fn new(
        message_id: u32,
        events: mpsc::UnboundedReceiver<OpEvent>,
        commands: mpsc::UnboundedSender<Command>,
        response_timeout: Duration,
    ) -> Self {
        Self {
            message_id,
            events,
            commands,
            response_timeout,
            finished: false,
        }
    }

    /// The message id this operation was sent with
    pub fn message_id(&self) -> u32 {
        self.message_id
    }

    /// Receive the next message for this operation
    ///
    /// Returns `Ok(None)` once the terminal message has been
    /// delivered. The response timeout is an inactivity bound: it
    /// rearms on every received message.
    ///
    /// # Errors
    /// `ResponseTimeout` when nothing arrives in time (the
    /// registration is removed); `Closed`/`ReconnectExhausted`/
    /// `ReconnectInProgress` when the connection fails underneath the
    /// operation.
    pub async fn next(&mut self) -> LdapResult<Option<Response>> {
        if self.finished {
            return Ok(None);
        }
        match tokio::time::timeout(self.response_timeout, self.events.recv()).await {
            Err(_) => {
                self.finished = true;
                let _ = self.commands.send(Command::Deregister {
                    message_id: self.message_id,
                });
                Err(LdapError::ResponseTimeout)
            }
            Ok(None) => {
                self.finished = true;
                Err(LdapError::closed())
            }
            Ok(Some(OpEvent::Failed(e))) => {
                self.finished = true;
                Err(e)
            }
            Ok(Some(OpEvent::Response(response))) => {
                if response.is_terminal() {
                    self.finished = true;
                }
                Ok(Some(response))
            }
        }
    }

    /// Drain to the terminal message and return its LDAPResult fields
    pub async fn await_result(&mut self) -> LdapResult<LdapResponse> {
        loop {
            match self.next().await? {
                Some(Response::Result(response)) => return Ok(response),
                Some(Response::Extended(extended)) => return Ok(extended.response().clone()),
                Some(_) => {}
                None => return Err(LdapError::closed()),
            }
        }
    }

    /// Drain to the terminal message, expecting an extended response
    pub async fn await_extended(&mut self) -> LdapResult<ExtendedResponse> {
        loop {
            match self.next().await? {
                Some(Response::Extended(extended)) => return Ok(extended),
                Some(Response::Result(_)) => {
                    return Err(LdapError::Decode(
                        "Expected an extended response".to_string(),
                    ));
                }
                Some(_) => {}
                None => return Err(LdapError::closed()),
            }
        }
    }

    /// Collect entries and references in arrival order until the
    /// terminal search result arrives
    pub async fn await_search(&mut self) -> LdapResult<SearchResult> {
        let mut result = SearchResult::new();
        loop {
            match self.next().await? {
                Some(Response::SearchEntry(entry)) => result.push_entry(entry),
                Some(Response::SearchReference(reference)) => result.push_reference(reference),
                Some(Response::Intermediate(_)) => {}
                Some(Response::Result(done)) => {
                    result.set_done(done);
                    return Ok(result);
                }
                Some(Response::Extended(extended)) => {
                    result.set_done(extended.response().clone());
                    return Ok(result);
                }
                None => return Err(LdapError::closed()),
            }
        }
    }

    /// Abandon the operation: the server is asked to stop, no further
    /// messages are delivered, and no response is expected
    pub fn abandon(mut self) -> LdapResult<()> {
        self.finished = true;
        self.commands
            .send(Command::Abandon {
                target: self.message_id,
            })
            .map_err(|_| LdapError::closed())
    }
}

impl Drop for OperationHandle {
    fn drop(&mut self) {
        // A handle dropped mid-operation must release its correlation
        // entry, or the driver keeps the stashed PDU and replays it on
        // reconnect with nobody awaiting it
        if !self.finished {
            let _ = self.commands.send(Command::Deregister {
                message_id: self.message_id,
            });
        }
    }
}
