//! Scripted in-process LDAP server pieces shared by the tests

#![allow(dead_code)]

use ldap_asn1::ber::{BerEncoder, PduFramer, Tag};
use ldap_protocol::{Envelope, op_tag};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Read one complete envelope off the socket, or None on EOF
pub async fn read_envelope(socket: &mut TcpStream, framer: &mut PduFramer) -> Option<Envelope> {
    let mut buf = [0u8; 4096];
    loop {
        if let Some(pdu) = framer.next_pdu().unwrap() {
            return Some(Envelope::decode(&pdu).unwrap());
        }
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return None;
        }
        framer.extend(&buf[..n]);
    }
}

pub fn done_pdu(message_id: u32, code: i64) -> Vec<u8> {
    let mut enc = BerEncoder::new();
    enc.sequence(|msg| {
        msg.integer(message_id as i64);
        msg.constructed(Tag::application(true, op_tag::SEARCH_RESULT_DONE), |op| {
            op.enumerated(code);
            op.octet_string(b"");
            op.octet_string(b"");
        });
    });
    enc.into_bytes()
}

pub fn entry_pdu(message_id: u32, dn: &str) -> Vec<u8> {
    let mut enc = BerEncoder::new();
    enc.sequence(|msg| {
        msg.integer(message_id as i64);
        msg.constructed(Tag::application(true, op_tag::SEARCH_RESULT_ENTRY), |op| {
            op.octet_string(dn.as_bytes());
            op.sequence(|attrs| {
                attrs.sequence(|attr| {
                    attr.octet_string(b"objectClass");
                    attr.set(|vals| {
                        vals.octet_string(b"top");
                    });
                });
            });
        });
    });
    enc.into_bytes()
}

pub fn extended_response_pdu(message_id: u32, code: i64) -> Vec<u8> {
    let mut enc = BerEncoder::new();
    enc.sequence(|msg| {
        msg.integer(message_id as i64);
        msg.constructed(Tag::application(true, op_tag::EXTENDED_RESPONSE), |op| {
            op.enumerated(code);
            op.octet_string(b"");
            op.octet_string(b"");
        });
    });
    enc.into_bytes()
}

pub fn reference_pdu(message_id: u32, uri: &str) -> Vec<u8> {
    let mut enc = BerEncoder::new();
    enc.sequence(|msg| {
        msg.integer(message_id as i64);
        msg.constructed(
            Tag::application(true, op_tag::SEARCH_RESULT_REFERENCE),
            |op| {
                op.octet_string(uri.as_bytes());
            },
        );
    });
    enc.into_bytes()
}
