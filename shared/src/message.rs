//! The framed message envelope.
//!
//! Layout: `type:u8 ∥ payload_len:u32 ∥ payload ∥ err_len:u16 ∥ err_utf8`,
//! little-endian. The payload is opaque here; the `error` field carries a
//! failure-class token such as `error.player.not_found`, empty on success.

use crate::codec::{DecodeError, Reader, Writer};
use crate::types::MessageType;

/// A decoded application message: discriminator, opaque payload and an
/// error token. Handlers re-decode the payload per type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: MessageType,
    pub payload: Vec<u8>,
    pub error: String,
}

impl Message {
    pub fn new(msg_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            msg_type,
            payload,
            error: String::new(),
        }
    }

    /// A payload-less reply carrying only an error token.
    pub fn error(msg_type: MessageType, token: &str) -> Self {
        Self {
            msg_type,
            payload: Vec::new(),
            error: token.to_string(),
        }
    }

    /// Encodes the envelope. Encoding is total for any in-memory value the
    /// server constructs; payloads never approach the `u32` length limit.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(7 + self.payload.len() + self.error.len());
        w.u8(self.msg_type as u8);
        w.u32(self.payload.len() as u32);
        w.raw(&self.payload);
        w.u16(self.error.len() as u16);
        w.raw(self.error.as_bytes());
        w.into_vec()
    }

    /// Decodes an envelope, validating both length prefixes against the
    /// input before any allocation sized by them.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let msg_type = MessageType::from_u8(r.u8()?);
        let payload = r.bytes_u32()?.to_vec();
        let error = r.str_u16()?;
        Ok(Self {
            msg_type,
            payload,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let msg = Message::new(MessageType::Chat, vec![1, 2, 3, 4]);
        let decoded = Message::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_error_envelope_roundtrip() {
        let msg = Message::error(MessageType::Login, "error.player.not_found");
        let decoded = Message::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.msg_type, MessageType::Login);
        assert!(decoded.payload.is_empty());
        assert_eq!(decoded.error, "error.player.not_found");
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let msg = Message::new(MessageType::PingPong, Vec::new());
        let encoded = msg.encode();
        assert_eq!(encoded.len(), 7);
        assert_eq!(Message::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn test_truncated_envelope_rejected() {
        let msg = Message::new(MessageType::Chat, vec![0; 16]);
        let encoded = msg.encode();
        for cut in [0, 1, 4, encoded.len() - 1] {
            assert!(Message::decode(&encoded[..cut]).is_err());
        }
    }

    #[test]
    fn test_payload_length_overrun_rejected() {
        // type 2, payload_len claims 1 MiB, nothing follows
        let mut data = vec![2u8];
        data.extend_from_slice(&(1024u32 * 1024).to_le_bytes());
        assert_eq!(Message::decode(&data), Err(DecodeError::LengthOverrun));
    }

    #[test]
    fn test_unknown_type_byte_decodes_to_unknown() {
        let mut data = vec![200u8];
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        let decoded = Message::decode(&data).unwrap();
        assert_eq!(decoded.msg_type, MessageType::Unknown);
    }
}
