//! Connection driver task
//!
//! One driver task per open connection owns the transport, the PDU
//! framer, and the correlation table. It is the single reader of the
//! inbound byte stream, and all writes go through it, so PDU bytes
//! never interleave and the stream decodes strictly in order.

use super::handle::OpEvent;
use super::next_message_id;
use super::state::ConnectionState;
use crate::config::ConnectionConfig;
use crate::retry::RetryMetadata;
use ldap_asn1::ber::PduFramer;
use ldap_core::{LdapError, LdapResult};
use ldap_protocol::{
    AbandonRequest, Envelope, ExtendedRequest, ExtendedResponse, Response, UnbindRequest,
    encode_request,
};
use ldap_transport::{Transport, TransportFactory, TransportOptions};
use std::collections::HashMap;
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const READ_BUF_SIZE: usize = 8192;

/// Commands submitted to the driver by the connection and its handles
pub(crate) enum Command {
    Operate {
        message_id: u32,
        pdu: Vec<u8>,
        events: mpsc::UnboundedSender<OpEvent>,
    },
    Abandon {
        target: u32,
    },
    Deregister {
        message_id: u32,
    },
    Close {
        ack: oneshot::Sender<()>,
    },
}

/// Correlation entry for one outstanding operation
///
/// The encoded PDU is kept for replay after a reconnect.
struct OpState {
    events: mpsc::UnboundedSender<OpEvent>,
    pdu: Vec<u8>,
}

/// Lock that survives a poisoned mutex; metadata updates are plain
/// field writes and cannot leave the value inconsistent
pub(crate) fn lock(metadata: &Mutex<RetryMetadata>) -> MutexGuard<'_, RetryMetadata> {
    metadata.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) struct Driver {
    transport: Box<dyn Transport>,
    framer: PduFramer,
    correlation: HashMap<u32, OpState>,
    commands: mpsc::UnboundedReceiver<Command>,
    state: Arc<watch::Sender<ConnectionState>>,
    config: Arc<ConnectionConfig>,
    metadata: Arc<Mutex<RetryMetadata>>,
    counter: Arc<AtomicU32>,
}

enum Step {
    Command(Option<Command>),
    Read(LdapResult<usize>),
}

impl Driver {
    pub(crate) fn spawn(
        transport: Box<dyn Transport>,
        commands: mpsc::UnboundedReceiver<Command>,
        state: Arc<watch::Sender<ConnectionState>>,
        config: Arc<ConnectionConfig>,
        metadata: Arc<Mutex<RetryMetadata>>,
        counter: Arc<AtomicU32>,
    ) -> JoinHandle<()> {
        let driver = Driver {
            transport,
            framer: PduFramer::new(),
            correlation: HashMap::new(),
            commands,
            state,
            config,
            metadata,
            counter,
        };
        tokio::spawn(driver.run())
    }

    async fn run(mut self) {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let step = {
                let Driver {
                    transport,
                    commands,
                    ..
                } = &mut self;
                tokio::select! {
                    command = commands.recv() => Step::Command(command),
                    result = transport.read(&mut buf) => Step::Read(result),
                }
            };

            let keep_going = match step {
                // Connection dropped without close(); shut down quietly
                Step::Command(None) => {
                    self.shutdown(None).await;
                    false
                }
                Step::Command(Some(command)) => self.handle_command(command).await,
                Step::Read(Ok(0)) => self.handle_disconnect("stream closed by peer").await,
                Step::Read(Ok(n)) => match self.process_bytes(&buf[..n]) {
                    Ok(false) => true,
                    Ok(true) => self.handle_disconnect("notice of disconnection").await,
                    Err(e) => {
                        log::warn!("Unrecoverable framing error: {}", e);
                        self.handle_disconnect("framing error").await
                    }
                },
                Step::Read(Err(e)) => {
                    log::warn!("Read failed: {}", e);
                    self.handle_disconnect("read error").await
                }
            };
            if !keep_going {
                return;
            }
        }
    }

    /// Returns false when the driver should exit
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Operate {
                message_id,
                pdu,
                events,
            } => {
                // Register before writing so a fast response always
                // finds its entry
                self.correlation.insert(
                    message_id,
                    OpState {
                        events,
                        pdu: pdu.clone(),
                    },
                );
                if let Err(e) = self.write_pdu(&pdu).await {
                    log::warn!("Write failed for message {}: {}", message_id, e);
                    return self.handle_disconnect("write failure").await;
                }
                true
            }
            Command::Abandon { target } => {
                self.correlation.remove(&target);
                let message_id = next_message_id(&self.counter);
                let pdu = encode_request(message_id, &AbandonRequest::new(target), &[]);
                if let Err(e) = self.write_pdu(&pdu).await {
                    log::warn!("Abandon write failed: {}", e);
                    return self.handle_disconnect("write failure").await;
                }
                true
            }
            Command::Deregister { message_id } => {
                self.correlation.remove(&message_id);
                true
            }
            Command::Close { ack } => {
                self.shutdown(Some(ack)).await;
                false
            }
        }
    }

    async fn write_pdu(&mut self, pdu: &[u8]) -> LdapResult<()> {
        self.transport.write_all(pdu).await?;
        self.transport.flush().await
    }

    /// Feed inbound bytes through the framer and deliver every
    /// complete PDU
    ///
    /// Returns `Ok(true)` when the peer announced a disconnection.
    ///
    /// # Errors
    /// A framing error; the stream position is lost and the transport
    /// must be torn down.
    fn process_bytes(&mut self, bytes: &[u8]) -> LdapResult<bool> {
        self.framer.extend(bytes);
        let mut disconnect = false;
        while let Some(pdu) = self.framer.next_pdu()? {
            if self.deliver(&pdu) {
                disconnect = true;
            }
        }
        Ok(disconnect)
    }

    /// Route one complete PDU to its registered handle
    ///
    /// Returns true when the message asks for a disconnect. Unmatched
    /// message ids are discarded; a malformed protocol op fails only
    /// the operation it belongs to.
    fn deliver(&mut self, pdu: &[u8]) -> bool {
        let envelope = match Envelope::decode(pdu) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("Discarding undecodable message: {}", e);
                return false;
            }
        };

        if envelope.is_unsolicited() {
            if envelope.is_notice_of_disconnection() {
                log::warn!("Server sent notice of disconnection");
                return true;
            }
            log::info!("Discarding unsolicited notification");
            return false;
        }

        let message_id = envelope.message_id();
        let Some(op) = self.correlation.get(&message_id) else {
            log::debug!("Discarding message for unknown id {}", message_id);
            return false;
        };

        match Response::decode(&envelope) {
            Ok(response) => {
                let terminal = response.is_terminal();
                let delivered = op.events.send(OpEvent::Response(response)).is_ok();
                if terminal || !delivered {
                    self.correlation.remove(&message_id);
                }
            }
            Err(e) => {
                let _ = op.events.send(OpEvent::Failed(e));
                self.correlation.remove(&message_id);
            }
        }
        false
    }

    /// Transport lost while open; run the reconnect loop
    ///
    /// Returns false when the connection gives up and the driver
    /// should exit.
    async fn handle_disconnect(&mut self, reason: &str) -> bool {
        log::warn!("Connection lost: {}", reason);
        let _ = self.transport.close().await;
        self.framer = PduFramer::new();

        if !self.config.auto_reconnect() {
            self.fail_all(LdapError::closed);
            let _ = self.state.send(ConnectionState::Closed);
            return false;
        }

        let _ = self.state.send(ConnectionState::Reconnecting);
        if !self.config.auto_replay() {
            self.fail_all(|| LdapError::ReconnectInProgress);
        }
        lock(&self.metadata).begin_sequence();

        loop {
            // The policy may sleep for backoff; keep it off this task
            let snapshot = lock(&self.metadata).clone();
            let policy = self.config.auto_reconnect_condition();
            let retry = tokio::task::spawn_blocking(move || policy.should_retry(&snapshot))
                .await
                .unwrap_or(false);
            if !retry {
                log::warn!("Reconnect attempts exhausted");
                self.fail_all(|| LdapError::ReconnectExhausted);
                let _ = self.state.send(ConnectionState::Closed);
                return false;
            }

            match establish(&self.config, &self.metadata, &self.counter).await {
                Ok(transport) => {
                    self.transport = transport;
                    self.framer = PduFramer::new();
                    if self.config.auto_replay() && !self.correlation.is_empty() {
                        if let Err(e) = self.replay().await {
                            log::warn!("Replay failed: {}", e);
                            let _ = self.transport.close().await;
                            lock(&self.metadata).record_failure();
                            continue;
                        }
                    }
                    log::info!("Reconnected");
                    let _ = self.state.send(ConnectionState::Open);
                    return true;
                }
                Err(e) => {
                    log::warn!("Reconnect attempt failed: {}", e);
                }
            }
        }
    }

    /// Resend every stashed in-flight operation with its original
    /// message id
    async fn replay(&mut self) -> LdapResult<()> {
        let pdus: Vec<(u32, Vec<u8>)> = self
            .correlation
            .iter()
            .map(|(id, op)| (*id, op.pdu.clone()))
            .collect();
        for (message_id, pdu) in pdus {
            log::debug!("Replaying message {}", message_id);
            self.write_pdu(&pdu).await?;
        }
        Ok(())
    }

    async fn shutdown(&mut self, ack: Option<oneshot::Sender<()>>) {
        if !self.transport.is_closed() {
            // Courtesy unbind; errors do not matter at this point
            let message_id = next_message_id(&self.counter);
            let pdu = encode_request(message_id, &UnbindRequest, &[]);
            if let Err(e) = self.write_pdu(&pdu).await {
                log::debug!("Unbind write failed: {}", e);
            }
        }
        let _ = self.transport.close().await;
        self.fail_all(LdapError::closed);
        let _ = self.state.send(ConnectionState::Closed);
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    fn fail_all(&mut self, error: impl Fn() -> LdapError) {
        for (_, op) in self.correlation.drain() {
            let _ = op.events.send(OpEvent::Failed(error()));
        }
    }
}

/// Walk the strategy-ordered endpoints until one accepts
///
/// Records one metadata failure per failed endpoint try and a success
/// on the first transport that opens fully (TLS included).
pub(crate) async fn establish(
    config: &ConnectionConfig,
    metadata: &Mutex<RetryMetadata>,
    counter: &AtomicU32,
) -> LdapResult<Box<dyn Transport>> {
    let ordered = config.connection_strategy().order(config.ldap_urls());
    let mut last_error = None;
    for url in ordered {
        match open_endpoint(config, counter, &url).await {
            Ok(transport) => {
                log::debug!("Connected to {}", url);
                lock(metadata).record_success();
                return Ok(transport);
            }
            Err(e) => {
                log::warn!("Failed to connect to {}: {}", url, e);
                lock(metadata).record_failure();
                last_error = Some(e);
            }
        }
    }
    Err(last_error
        .unwrap_or_else(|| LdapError::InvalidConfig("No endpoints configured".to_string())))
}

async fn open_endpoint(
    config: &ConnectionConfig,
    counter: &AtomicU32,
    url: &ldap_core::LdapUrl,
) -> LdapResult<Box<dyn Transport>> {
    let mut options =
        TransportOptions::new().with_connect_timeout(Some(config.connect_timeout()));
    if let Some(tls) = config.tls() {
        options = options.with_tls(tls.clone());
    }

    let mut transport = TransportFactory::transport(url, &options)?;
    transport.open().await?;

    if config.use_start_tls() {
        let negotiated = tokio::time::timeout(
            config.starttls_timeout(),
            starttls_negotiate(&mut transport, config, counter),
        )
        .await;
        match negotiated {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = transport.close().await;
                return Err(e);
            }
            Err(_) => {
                let _ = transport.close().await;
                return Err(LdapError::ConnectTimeout);
            }
        }
    }
    Ok(transport)
}

/// StartTLS round trip on a freshly opened plaintext transport
///
/// Runs before the driver exists, so nothing else can be reading or
/// writing this stream.
async fn starttls_negotiate(
    transport: &mut Box<dyn Transport>,
    config: &ConnectionConfig,
    counter: &AtomicU32,
) -> LdapResult<()> {
    let message_id = next_message_id(counter);
    let pdu = encode_request(message_id, &ExtendedRequest::start_tls(), &[]);
    transport.write_all(&pdu).await?;
    transport.flush().await?;

    let mut framer = PduFramer::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let envelope = loop {
        if let Some(pdu) = framer.next_pdu()? {
            break Envelope::decode(&pdu)?;
        }
        let n = transport.read(&mut buf).await?;
        if n == 0 {
            return Err(LdapError::closed());
        }
        framer.extend(&buf[..n]);
    };

    // The local framer dies with this function; bytes after the
    // StartTLS response would be lost across the upgrade
    if framer.buffered() > 0 {
        return Err(LdapError::Decode(format!(
            "{} unexpected octets on the stream before TLS negotiation",
            framer.buffered()
        )));
    }

    if envelope.message_id() != message_id {
        return Err(LdapError::Decode(format!(
            "StartTLS response for unexpected message id {}",
            envelope.message_id()
        )));
    }
    let response = ExtendedResponse::decode(&envelope)?;
    if !response.response().is_success() {
        return Err(LdapError::TlsHandshake(format!(
            "StartTLS refused: {:?}",
            response.response().result_code()
        )));
    }

    let tls = config.tls().ok_or_else(|| {
        LdapError::InvalidConfig("StartTLS requires a TLS configuration".to_string())
    })?;
    transport.start_tls(tls).await
}
