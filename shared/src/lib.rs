//! # Shared Wire Protocol Library
//!
//! This crate contains everything the server and a conforming client must
//! agree on: the message-type registry, the framed message envelope, the
//! typed message bodies, the datagram control-packet formats, and the small
//! domain enums that appear on the wire.
//!
//! ## Protocol layers
//!
//! ### Envelope ([`message`])
//! Every application message is a `(type, payload, error)` triple encoded as
//! `type:u8 ∥ payload_len:u32 ∥ payload ∥ err_len:u16 ∥ err`, little-endian
//! throughout. The payload stays opaque at this layer; handlers re-decode it
//! per type using the codecs in [`codec`].
//!
//! ### Stream framing
//! On the reliable stream each envelope is preceded by a `u32` little-endian
//! length. Framing itself lives server-side; the constant
//! [`MAX_STREAM_FRAME`] is the shared contract.
//!
//! ### Datagram packets ([`fragment`])
//! On the datagram channel an envelope is split into numbered fragments and
//! wrapped in `NORMAL` packets. `RESEND` and `ACK` packets implement
//! selective retransmission and delivery acknowledgement.
//!
//! ## Design notes
//!
//! The byte layout of every frame is a deployment contract, so encoding and
//! decoding are written out explicitly rather than derived. Decoders check
//! the remaining input length before allocating anything sized by it, and
//! all fallible paths return [`DecodeError`] instead of panicking.

pub mod codec;
pub mod fragment;
pub mod message;
pub mod types;

pub use codec::{
    ChatBody, ChunkData, ChunkRequest, CountryRecord, DecodeError, MovementEvent, MovementInput,
    PlayerDataRequest, PlayerLeft, PlayerSnapshot, SyncState, TileRecord, Welcome,
};
pub use fragment::{join_fragments, split_into_fragments, Ack, Datagram, Fragment, ResendRequest};
pub use message::Message;
pub use types::{ChatKind, MessageType, PlayerRank, TileType, UnitType};

/// Largest datagram the protocol ever emits, headers included.
pub const MAX_UDP_PAYLOAD: usize = 1200;

/// Bytes of `NORMAL` packet header preceding each fragment body:
/// control byte, session id, message id, fragment index, fragment total.
pub const FRAGMENT_HEADER_LEN: usize = 1 + 4 + 4 + 1 + 1;

/// Largest fragment body that fits a single datagram.
pub const MAX_FRAGMENT_BODY: usize = MAX_UDP_PAYLOAD - FRAGMENT_HEADER_LEN;

/// Upper bound on a single stream frame body.
pub const MAX_STREAM_FRAME: usize = 1024 * 1024;

/// Side length of a map chunk in tiles. The chunk-data payload layout is
/// fixed to a 16x16 window, so this is a wire constant rather than a
/// configuration value.
pub const CHUNK_SIZE: i32 = 16;

/// Tiles carried by one chunk-data payload.
pub const CHUNK_TILE_COUNT: usize = (CHUNK_SIZE * CHUNK_SIZE) as usize;

/// Longest nickname accepted anywhere in the protocol.
pub const MAX_NICKNAME_LEN: usize = 255;
