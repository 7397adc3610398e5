//! Datagram control packets and envelope fragmentation.
//!
//! Every datagram starts with a control byte:
//!
//! - `NORMAL (0x01)` — one fragment of an encoded envelope, addressed by
//!   `(session_id, message_id, index, total)`.
//! - `ACK (0xFD)` — the receiver fully reassembled an ack-required message.
//! - `RESEND (0xFE)` — the receiver asks for specific missing fragments.
//!
//! The formats are symmetric: the server stamps the destination session's
//! id on outbound fragments, clients stamp their own.

use crate::codec::{DecodeError, Reader, Writer};
use crate::MAX_FRAGMENT_BODY;

pub const NORMAL_PACKET: u8 = 0x01;
pub const ACK_PACKET: u8 = 0xFD;
pub const RESEND_PACKET: u8 = 0xFE;

/// One `NORMAL` datagram, borrowing its fragment body from the receive
/// buffer.
///
/// Layout: `0x01 ∥ session_id:u32 ∥ message_id:u32 ∥ index:u8 ∥ total:u8 ∥
/// body`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    pub session_id: u32,
    pub message_id: u32,
    pub index: u8,
    pub total: u8,
    pub body: &'a [u8],
}

impl<'a> Fragment<'a> {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(11 + self.body.len());
        w.u8(NORMAL_PACKET);
        w.u32(self.session_id);
        w.u32(self.message_id);
        w.u8(self.index);
        w.u8(self.total);
        w.raw(self.body);
        w.into_vec()
    }
}

/// A `RESEND` request listing missing fragment indices.
///
/// Layout: `0xFE ∥ message_id:u32 ∥ count:u8 ∥ indices[count]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResendRequest {
    pub message_id: u32,
    pub indices: Vec<u8>,
}

impl ResendRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(6 + self.indices.len());
        w.u8(RESEND_PACKET);
        w.u32(self.message_id);
        w.u8(self.indices.len() as u8);
        w.raw(&self.indices);
        w.into_vec()
    }
}

/// An `ACK` for a fully reassembled ack-required message.
///
/// Layout: `0xFD ∥ message_id:u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub message_id: u32,
}

impl Ack {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(5);
        w.u8(ACK_PACKET);
        w.u32(self.message_id);
        w.into_vec()
    }
}

/// Any datagram the protocol understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram<'a> {
    Fragment(Fragment<'a>),
    Resend(ResendRequest),
    Ack(Ack),
}

impl<'a> Datagram<'a> {
    /// Parses a raw datagram by its control byte. Malformed packets are an
    /// error for the caller to log and drop.
    pub fn parse(data: &'a [u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        match r.u8()? {
            NORMAL_PACKET => {
                let session_id = r.u32()?;
                let message_id = r.u32()?;
                let index = r.u8()?;
                let total = r.u8()?;
                if total == 0 || index >= total {
                    return Err(DecodeError::InvalidValue("fragment index"));
                }
                let body = r.take(r.remaining())?;
                Ok(Self::Fragment(Fragment {
                    session_id,
                    message_id,
                    index,
                    total,
                    body,
                }))
            }
            RESEND_PACKET => {
                let message_id = r.u32()?;
                let count = r.u8()? as usize;
                if r.remaining() < count {
                    return Err(DecodeError::LengthOverrun);
                }
                let indices = r.take(count)?.to_vec();
                Ok(Self::Resend(ResendRequest {
                    message_id,
                    indices,
                }))
            }
            ACK_PACKET => {
                let message_id = r.u32()?;
                Ok(Self::Ack(Ack { message_id }))
            }
            other => Err(DecodeError::UnknownControl(other)),
        }
    }
}

/// Splits an encoded envelope into `NORMAL` packets ready to send.
///
/// An empty input still yields one fragment so the receiver learns the
/// message exists. Fails when the input cannot fit 255 fragments.
pub fn split_into_fragments(
    session_id: u32,
    message_id: u32,
    data: &[u8],
) -> Result<Vec<Vec<u8>>, DecodeError> {
    let total = data.len().div_ceil(MAX_FRAGMENT_BODY).max(1);
    if total > u8::MAX as usize {
        return Err(DecodeError::InvalidValue("message too large for datagram"));
    }

    let mut packets = Vec::with_capacity(total);
    for index in 0..total {
        let start = index * MAX_FRAGMENT_BODY;
        let end = (start + MAX_FRAGMENT_BODY).min(data.len());
        packets.push(
            Fragment {
                session_id,
                message_id,
                index: index as u8,
                total: total as u8,
                body: &data[start..end],
            }
            .encode(),
        );
    }
    Ok(packets)
}

/// Joins reassembled fragment bodies back into the original envelope bytes.
pub fn join_fragments(bodies: &[Vec<u8>]) -> Vec<u8> {
    let mut data = Vec::with_capacity(bodies.iter().map(Vec::len).sum());
    for body in bodies {
        data.extend_from_slice(body);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_UDP_PAYLOAD;

    #[test]
    fn test_fragment_roundtrip() {
        let body = [9u8; 32];
        let fragment = Fragment {
            session_id: 11,
            message_id: 42,
            index: 1,
            total: 3,
            body: &body,
        };
        let encoded = fragment.encode();
        match Datagram::parse(&encoded).unwrap() {
            Datagram::Fragment(parsed) => assert_eq!(parsed, fragment),
            other => panic!("expected fragment, got {:?}", other),
        }
    }

    #[test]
    fn test_resend_roundtrip() {
        let request = ResendRequest {
            message_id: 7,
            indices: vec![1, 4, 5],
        };
        match Datagram::parse(&request.encode()).unwrap() {
            Datagram::Resend(parsed) => assert_eq!(parsed, request),
            other => panic!("expected resend, got {:?}", other),
        }
    }

    #[test]
    fn test_ack_roundtrip() {
        let ack = Ack { message_id: 99 };
        match Datagram::parse(&ack.encode()).unwrap() {
            Datagram::Ack(parsed) => assert_eq!(parsed, ack),
            other => panic!("expected ack, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_control_byte_rejected() {
        assert_eq!(
            Datagram::parse(&[0x42, 0, 0, 0, 0]),
            Err(DecodeError::UnknownControl(0x42))
        );
    }

    #[test]
    fn test_fragment_index_out_of_range_rejected() {
        // index 3 with total 3 is invalid
        let mut packet = Fragment {
            session_id: 1,
            message_id: 1,
            index: 0,
            total: 3,
            body: &[],
        }
        .encode();
        packet[9] = 3;
        assert!(Datagram::parse(&packet).is_err());
    }

    #[test]
    fn test_resend_count_overrun_rejected() {
        // count claims 5 indices, only 2 present
        let mut data = vec![RESEND_PACKET];
        data.extend_from_slice(&1u32.to_le_bytes());
        data.push(5);
        data.extend_from_slice(&[0, 1]);
        assert_eq!(Datagram::parse(&data), Err(DecodeError::LengthOverrun));
    }

    #[test]
    fn test_split_small_payload_single_fragment() {
        let packets = split_into_fragments(1, 2, b"hello").unwrap();
        assert_eq!(packets.len(), 1);
        match Datagram::parse(&packets[0]).unwrap() {
            Datagram::Fragment(f) => {
                assert_eq!(f.index, 0);
                assert_eq!(f.total, 1);
                assert_eq!(f.body, b"hello");
            }
            other => panic!("expected fragment, got {:?}", other),
        }
    }

    #[test]
    fn test_split_empty_payload_single_fragment() {
        let packets = split_into_fragments(1, 2, &[]).unwrap();
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn test_split_4807_bytes_yields_five_fragments() {
        // A 4800-byte sync-state payload wrapped in the 7-byte envelope.
        let data = vec![0xABu8; 4807];
        let packets = split_into_fragments(1, 2, &data).unwrap();
        assert_eq!(packets.len(), 5);
        for packet in &packets {
            assert!(packet.len() <= MAX_UDP_PAYLOAD);
        }
    }

    #[test]
    fn test_reassembly_in_reverse_order() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let packets = split_into_fragments(3, 9, &data).unwrap();

        let mut bodies = vec![Vec::new(); packets.len()];
        // Deliver in reverse order, as a reordering network would.
        for packet in packets.iter().rev() {
            match Datagram::parse(packet).unwrap() {
                Datagram::Fragment(f) => bodies[f.index as usize] = f.body.to_vec(),
                other => panic!("expected fragment, got {:?}", other),
            }
        }
        assert_eq!(join_fragments(&bodies), data);
    }

    #[test]
    fn test_split_too_large_rejected() {
        let data = vec![0u8; MAX_FRAGMENT_BODY * 256];
        assert!(split_into_fragments(1, 1, &data).is_err());
    }
}
