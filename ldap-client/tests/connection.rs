//! Connection behavior against scripted in-process servers

mod common;

use common::{done_pdu, entry_pdu, extended_response_pdu, read_envelope, reference_pdu};
use ldap_asn1::ber::PduFramer;
use ldap_client::{Connection, ConnectionConfig, ConnectionState};
use ldap_core::LdapError;
use ldap_protocol::{Response, SearchRequest, op_tag};
use ldap_transport::TlsConfig;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

fn config_for(port: u16) -> ConnectionConfig {
    ConnectionConfig::builder()
        .url(format!("ldap://127.0.0.1:{}", port))
        .unwrap()
        .connect_timeout(Duration::from_secs(5))
        .response_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_search_lifecycle_and_ordering() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut framer = PduFramer::new();
        while let Some(envelope) = read_envelope(&mut socket, &mut framer).await {
            match envelope.op_tag() {
                op_tag::SEARCH_REQUEST => {
                    let id = envelope.message_id();
                    socket.write_all(&entry_pdu(id, "uid=1")).await.unwrap();
                    socket.write_all(&entry_pdu(id, "uid=2")).await.unwrap();
                    socket
                        .write_all(&reference_pdu(id, "ldap://other.example.com/"))
                        .await
                        .unwrap();
                    socket.write_all(&done_pdu(id, 0)).await.unwrap();
                }
                op_tag::UNBIND_REQUEST => break,
                other => panic!("unexpected op {}", other),
            }
        }
    });

    let mut connection = Connection::new(config_for(port));
    assert_eq!(connection.state(), ConnectionState::Closed);
    connection.open().await.unwrap();
    assert!(connection.is_open());

    let mut handle = connection.operate(&SearchRequest::no_op()).await.unwrap();

    // Entries and the reference arrive in order, then the terminal result
    let mut seen = Vec::new();
    loop {
        match handle.next().await.unwrap() {
            Some(Response::SearchEntry(entry)) => seen.push(entry.object_name().to_string()),
            Some(Response::SearchReference(reference)) => {
                assert_eq!(seen, ["uid=1", "uid=2"]);
                assert_eq!(reference.uris(), ["ldap://other.example.com/"]);
                seen.push("ref".to_string());
            }
            Some(Response::Result(done)) => {
                assert_eq!(seen, ["uid=1", "uid=2", "ref"]);
                assert!(done.is_success());
            }
            Some(other) => panic!("unexpected response: {:?}", other),
            None => break,
        }
    }

    connection.close().await.unwrap();
    assert_eq!(connection.state(), ConnectionState::Closed);
    // Idempotent from any state
    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_pipelining_delivers_out_of_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut framer = PduFramer::new();
        let mut ids = Vec::new();
        while ids.len() < 3 {
            let envelope = read_envelope(&mut socket, &mut framer).await.unwrap();
            if envelope.op_tag() == op_tag::SEARCH_REQUEST {
                ids.push(envelope.message_id());
            }
        }
        // Respond in reverse submission order
        for id in ids.iter().rev() {
            socket.write_all(&done_pdu(*id, 0)).await.unwrap();
        }
    });

    let mut connection = Connection::new(config_for(port));
    connection.open().await.unwrap();

    let request = SearchRequest::no_op();
    let mut h1 = connection.operate(&request).await.unwrap();
    let mut h2 = connection.operate(&request).await.unwrap();
    let mut h3 = connection.operate(&request).await.unwrap();

    // No two outstanding operations share a message id
    assert_ne!(h1.message_id(), h2.message_id());
    assert_ne!(h2.message_id(), h3.message_id());
    assert_ne!(h1.message_id(), h3.message_id());

    // Every handle resolves even though delivery order is reversed
    assert!(h1.await_result().await.unwrap().is_success());
    assert!(h2.await_result().await.unwrap().is_success());
    assert!(h3.await_result().await.unwrap().is_success());

    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_response_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut framer = PduFramer::new();
        // Swallow everything, answer nothing
        while read_envelope(&mut socket, &mut framer).await.is_some() {}
    });

    let config = ConnectionConfig::builder()
        .url(format!("ldap://127.0.0.1:{}", port))
        .unwrap()
        .response_timeout(Duration::from_millis(200))
        .build()
        .unwrap();

    let mut connection = Connection::new(config);
    connection.open().await.unwrap();

    let started = Instant::now();
    let mut handle = connection.operate(&SearchRequest::no_op()).await.unwrap();
    let err = handle.await_result().await.unwrap_err();
    assert!(matches!(err, LdapError::ResponseTimeout));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(200), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "{:?}", elapsed);

    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_active_passive_failover() {
    // Bind and drop a listener so the first endpoint refuses
    let refused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let refused_port = refused.local_addr().unwrap().port();
    drop(refused);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let good_port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut framer = PduFramer::new();
        while read_envelope(&mut socket, &mut framer).await.is_some() {}
    });

    let config = ConnectionConfig::builder()
        .url(format!("ldap://127.0.0.1:{}", refused_port))
        .unwrap()
        .url(format!("ldap://127.0.0.1:{}", good_port))
        .unwrap()
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let mut connection = Connection::new(config);
    connection.open().await.unwrap();
    assert!(connection.is_open());

    // One failed endpoint try, then one successful one
    let metadata = connection.retry_metadata();
    assert_eq!(metadata.attempts(), 1);
    assert!(metadata.opened());
    assert!(metadata.last_failure().is_some());
    assert!(metadata.last_success().is_some());

    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_failed_first_open_does_not_reconnect() {
    let refused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = refused.local_addr().unwrap().port();
    drop(refused);

    let mut connection = Connection::new(config_for(port));
    let err = connection.open().await.unwrap_err();
    assert!(matches!(
        err,
        LdapError::Connect(_) | LdapError::ConnectTimeout
    ));
    assert_eq!(connection.state(), ConnectionState::Closed);

    let metadata = connection.retry_metadata();
    assert!(!metadata.opened());
    assert_eq!(metadata.attempts(), 1);
}

#[tokio::test]
async fn test_reconnect_once_after_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        // First connection drops right away; the reconnect attempt is
        // served for real
        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);

        let (mut socket, _) = listener.accept().await.unwrap();
        let mut framer = PduFramer::new();
        while let Some(envelope) = read_envelope(&mut socket, &mut framer).await {
            if envelope.op_tag() == op_tag::SEARCH_REQUEST {
                socket
                    .write_all(&done_pdu(envelope.message_id(), 0))
                    .await
                    .unwrap();
            }
        }
    });

    let mut connection = Connection::new(config_for(port));
    connection.open().await.unwrap();

    // The operation lands either before or after the drop is noticed;
    // replay covers the first case, the reconnect wait the second
    let mut handle = connection.operate(&SearchRequest::no_op()).await.unwrap();
    let result = handle.await_result().await.unwrap();
    assert!(result.is_success());
    assert_eq!(connection.state(), ConnectionState::Open);
    assert!(connection.retry_metadata().opened());

    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_exhausted_fails_outstanding() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (got_request_tx, got_request_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut framer = PduFramer::new();
        let envelope = read_envelope(&mut socket, &mut framer).await.unwrap();
        assert_eq!(envelope.op_tag(), op_tag::SEARCH_REQUEST);
        // Stop accepting before dropping the connection so the single
        // reconnect attempt is refused
        drop(listener);
        drop(socket);
        let _ = got_request_tx.send(());
    });

    let mut connection = Connection::new(config_for(port));
    connection.open().await.unwrap();

    let mut handle = connection.operate(&SearchRequest::no_op()).await.unwrap();
    got_request_rx.await.unwrap();

    let err = handle.await_result().await.unwrap_err();
    assert!(matches!(err, LdapError::ReconnectExhausted));
    assert_eq!(connection.state(), ConnectionState::Closed);

    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_unmatched_message_id_discarded() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut framer = PduFramer::new();
        let envelope = read_envelope(&mut socket, &mut framer).await.unwrap();
        let id = envelope.message_id();
        // A response nobody asked for, then the real one
        socket.write_all(&done_pdu(id + 7, 0)).await.unwrap();
        socket.write_all(&done_pdu(id, 0)).await.unwrap();
        while read_envelope(&mut socket, &mut framer).await.is_some() {}
    });

    let mut connection = Connection::new(config_for(port));
    connection.open().await.unwrap();

    let mut handle = connection.operate(&SearchRequest::no_op()).await.unwrap();
    assert!(handle.await_result().await.unwrap().is_success());
    // The stray message did not disturb the connection
    assert!(connection.is_open());

    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_abandon_sends_abandon_request() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (abandoned_tx, abandoned_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut framer = PduFramer::new();
        let search = read_envelope(&mut socket, &mut framer).await.unwrap();
        assert_eq!(search.op_tag(), op_tag::SEARCH_REQUEST);

        let abandon = read_envelope(&mut socket, &mut framer).await.unwrap();
        assert_eq!(abandon.op_tag(), op_tag::ABANDON_REQUEST);
        assert_eq!(abandon.op().value(), [search.message_id() as u8]);
        let _ = abandoned_tx.send(());

        while read_envelope(&mut socket, &mut framer).await.is_some() {}
    });

    let mut connection = Connection::new(config_for(port));
    connection.open().await.unwrap();

    let handle = connection.operate(&SearchRequest::no_op()).await.unwrap();
    handle.abandon().unwrap();
    abandoned_rx.await.unwrap();

    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_dropped_handle_releases_its_registration() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut framer = PduFramer::new();
        let first = read_envelope(&mut socket, &mut framer).await.unwrap();
        let second = read_envelope(&mut socket, &mut framer).await.unwrap();
        // Drop the connection without answering either operation
        drop(socket);

        // Only the still-awaited operation may be replayed
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut framer = PduFramer::new();
        let replayed = read_envelope(&mut socket, &mut framer).await.unwrap();
        assert_eq!(replayed.message_id(), second.message_id());
        socket
            .write_all(&done_pdu(replayed.message_id(), 0))
            .await
            .unwrap();
        while let Some(envelope) = read_envelope(&mut socket, &mut framer).await {
            assert_ne!(
                (envelope.op_tag(), envelope.message_id()),
                (op_tag::SEARCH_REQUEST, first.message_id())
            );
        }
    });

    let mut connection = Connection::new(config_for(port));
    connection.open().await.unwrap();

    let abandoned = connection.operate(&SearchRequest::no_op()).await.unwrap();
    let abandoned_id = abandoned.message_id();
    drop(abandoned);

    // The deregistration precedes this submission in the command order
    let mut kept = connection.operate(&SearchRequest::no_op()).await.unwrap();
    assert_ne!(kept.message_id(), abandoned_id);
    assert!(kept.await_result().await.unwrap().is_success());

    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_starttls_refusal_fails_open() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut framer = PduFramer::new();
        let envelope = read_envelope(&mut socket, &mut framer).await.unwrap();
        assert_eq!(envelope.op_tag(), op_tag::EXTENDED_REQUEST);
        // protocolError
        socket
            .write_all(&extended_response_pdu(envelope.message_id(), 2))
            .await
            .unwrap();
        while read_envelope(&mut socket, &mut framer).await.is_some() {}
    });

    let config = ConnectionConfig::builder()
        .url(format!("ldap://127.0.0.1:{}", port))
        .unwrap()
        .use_start_tls(true)
        .tls(TlsConfig::insecure().unwrap())
        .build()
        .unwrap();

    let mut connection = Connection::new(config);
    let err = connection.open().await.unwrap_err();
    assert!(matches!(err, LdapError::TlsHandshake(_)), "{:?}", err);
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_starttls_rejects_trailing_stream_data() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut framer = PduFramer::new();
        let envelope = read_envelope(&mut socket, &mut framer).await.unwrap();
        assert_eq!(envelope.op_tag(), op_tag::EXTENDED_REQUEST);
        // A success response with more plaintext right behind it
        let mut bytes = extended_response_pdu(envelope.message_id(), 0);
        bytes.extend_from_slice(&done_pdu(99, 0));
        socket.write_all(&bytes).await.unwrap();
        while read_envelope(&mut socket, &mut framer).await.is_some() {}
    });

    let config = ConnectionConfig::builder()
        .url(format!("ldap://127.0.0.1:{}", port))
        .unwrap()
        .use_start_tls(true)
        .tls(TlsConfig::insecure().unwrap())
        .build()
        .unwrap();

    let mut connection = Connection::new(config);
    let err = connection.open().await.unwrap_err();
    assert!(matches!(err, LdapError::Decode(_)), "{:?}", err);
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_close_fails_outstanding_exactly_once() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut framer = PduFramer::new();
        // Swallow everything, answer nothing
        while read_envelope(&mut socket, &mut framer).await.is_some() {}
    });

    let mut connection = Connection::new(config_for(port));
    connection.open().await.unwrap();

    let mut handle = connection.operate(&SearchRequest::no_op()).await.unwrap();
    connection.close().await.unwrap();

    let err = handle.await_result().await.unwrap_err();
    assert!(matches!(err, LdapError::Closed(_)), "{:?}", err);
    // Resolved once; the handle yields nothing further
    assert!(handle.next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_search_validator() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut framer = PduFramer::new();
        while let Some(envelope) = read_envelope(&mut socket, &mut framer).await {
            if envelope.op_tag() == op_tag::SEARCH_REQUEST {
                socket
                    .write_all(&done_pdu(envelope.message_id(), 0))
                    .await
                    .unwrap();
            }
        }
    });

    let mut connection = Connection::new(config_for(port));
    connection.open().await.unwrap();
    assert!(connection.validate().await);
    connection.close().await.unwrap();

    // A closed connection never validates
    assert!(!connection.validate().await);
}
