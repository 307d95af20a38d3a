//! LDAP connection
//!
//! A [`Connection`] owns the lifecycle state machine and a driver
//! task. Callers submit requests through [`Connection::operate`] and
//! read results from the returned [`OperationHandle`]; many operations
//! may be outstanding at once on one connection.

pub(crate) mod driver;
pub mod handle;
pub mod state;

pub use handle::OperationHandle;
pub use state::ConnectionState;

use crate::config::ConnectionConfig;
use crate::retry::RetryMetadata;
use crate::validator::{ConnectionValidator, SearchValidator};
use driver::{Command, Driver, lock};
use ldap_core::{LdapError, LdapResult};
use ldap_protocol::{Control, Request, encode_request};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Next message id: 31-bit, wrapping, never zero
///
/// Zero is reserved for unsolicited notifications. Uniqueness among
/// outstanding operations holds as long as fewer than 2^31 - 1 are in
/// flight at once.
pub(crate) fn next_message_id(counter: &AtomicU32) -> u32 {
    loop {
        let id = counter.fetch_add(1, Ordering::Relaxed) & 0x7FFF_FFFF;
        if id != 0 {
            return id;
        }
    }
}

/// One LDAP connection with pipelined operations
pub struct Connection {
    config: Arc<ConnectionConfig>,
    state: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    counter: Arc<AtomicU32>,
    metadata: Arc<Mutex<RetryMetadata>>,
    driver: Option<JoinHandle<()>>,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Self {
        let (state, state_rx) = watch::channel(ConnectionState::Closed);
        Self {
            config: Arc::new(config),
            state: Arc::new(state),
            state_rx,
            commands: None,
            counter: Arc::new(AtomicU32::new(1)),
            metadata: Arc::new(Mutex::new(RetryMetadata::new())),
            driver: None,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Snapshot of the retry metadata for inspection
    pub fn retry_metadata(&self) -> RetryMetadata {
        lock(&self.metadata).clone()
    }

    /// Open the connection
    ///
    /// The strategy orders the configured endpoints; each is attempted
    /// within the connect timeout, ldaps endpoints complete their TLS
    /// handshake during open, and StartTLS negotiates before the
    /// connection becomes usable. On success the driver task starts
    /// and the state becomes `Open`.
    ///
    /// # Errors
    /// The last endpoint's connect error when every candidate fails;
    /// the state returns to `Closed`.
    pub async fn open(&mut self) -> LdapResult<()> {
        self.state()
            .validate_transition(ConnectionState::Connecting)?;
        let _ = self.state.send(ConnectionState::Connecting);
        lock(&self.metadata).begin_sequence();

        match driver::establish(&self.config, &self.metadata, &self.counter).await {
            Ok(transport) => {
                let (commands, commands_rx) = mpsc::unbounded_channel();
                self.driver = Some(Driver::spawn(
                    transport,
                    commands_rx,
                    Arc::clone(&self.state),
                    Arc::clone(&self.config),
                    Arc::clone(&self.metadata),
                    Arc::clone(&self.counter),
                ));
                self.commands = Some(commands);
                let _ = self.state.send(ConnectionState::Open);
                Ok(())
            }
            Err(e) => {
                let _ = self.state.send(ConnectionState::Closed);
                Err(e)
            }
        }
    }

    /// Submit one operation and get a handle to its responses
    pub async fn operate(&self, request: &dyn Request) -> LdapResult<OperationHandle> {
        self.operate_with_controls(request, &[]).await
    }

    pub async fn operate_with_controls(
        &self,
        request: &dyn Request,
        controls: &[Control],
    ) -> LdapResult<OperationHandle> {
        let commands = self.commands.as_ref().ok_or_else(LdapError::closed)?;
        self.await_usable().await?;

        let message_id = next_message_id(&self.counter);
        let pdu = encode_request(message_id, request, controls);
        let (events, events_rx) = mpsc::unbounded_channel();
        commands
            .send(Command::Operate {
                message_id,
                pdu,
                events,
            })
            .map_err(|_| LdapError::closed())?;

        Ok(OperationHandle::new(
            message_id,
            events_rx,
            commands.clone(),
            self.config.response_timeout(),
        ))
    }

    /// Run the configured validator (default: no-op search)
    pub async fn validate(&self) -> bool {
        match self.config.connection_validator() {
            Some(validator) => validator.validate(self).await,
            None => SearchValidator::new().validate(self).await,
        }
    }

    /// Close the connection
    ///
    /// Idempotent from any state. An open transport gets a courtesy
    /// unbind; every outstanding handle resolves with a closed error.
    pub async fn close(&mut self) -> LdapResult<()> {
        if let Some(commands) = self.commands.take() {
            let (ack, ack_rx) = oneshot::channel();
            if commands.send(Command::Close { ack }).is_ok() {
                let _ = tokio::time::timeout(self.config.response_timeout(), ack_rx).await;
            }
        }
        if let Some(driver) = self.driver.take() {
            // The ack already arrived or timed out; do not wait again
            driver.abort();
            let _ = driver.await;
        }
        let _ = self.state.send(ConnectionState::Closed);
        Ok(())
    }

    /// Wait for a usable state
    ///
    /// `Open` proceeds at once; `Reconnecting` blocks up to the
    /// reconnect timeout for a transition back to `Open`.
    async fn await_usable(&self) -> LdapResult<()> {
        let mut rx = self.state_rx.clone();
        let current = *rx.borrow_and_update();
        match current {
            ConnectionState::Open => Ok(()),
            ConnectionState::Reconnecting => {
                let wait = async {
                    loop {
                        if rx.changed().await.is_err() {
                            return Err(LdapError::closed());
                        }
                        match *rx.borrow_and_update() {
                            ConnectionState::Open => return Ok(()),
                            ConnectionState::Closed => return Err(LdapError::ReconnectExhausted),
                            _ => {}
                        }
                    }
                };
                tokio::time::timeout(self.config.reconnect_timeout(), wait)
                    .await
                    .map_err(|_| LdapError::ReconnectInProgress)?
            }
            ConnectionState::Closed | ConnectionState::Connecting => Err(LdapError::closed()),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Best effort; the driver also exits when the channel closes
        if let Some(commands) = self.commands.take() {
            let (ack, _ack_rx) = oneshot::channel();
            let _ = commands.send(Command::Close { ack });
        }
    }
}
