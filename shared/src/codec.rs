//! Typed message bodies and their binary codecs.
//!
//! Each body documents its own layout. All integers and floats are
//! little-endian; strings are UTF-8 with a length prefix (`u8` for names,
//! `u16` for chat text). Decoders never trust a length prefix without
//! checking it against the remaining input.

use std::error::Error;
use std::fmt;

use crate::types::{ChatKind, TileType};
use crate::{CHUNK_TILE_COUNT, MAX_NICKNAME_LEN};

/// Failure while decoding a frame or a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended before the structure was complete.
    Truncated,
    /// A length prefix pointed past the end of the input.
    LengthOverrun,
    /// A string field held invalid UTF-8.
    InvalidUtf8,
    /// An enum field held an unregistered value.
    InvalidValue(&'static str),
    /// A datagram's control byte was not NORMAL, RESEND or ACK.
    UnknownControl(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "input truncated"),
            Self::LengthOverrun => write!(f, "length prefix overruns input"),
            Self::InvalidUtf8 => write!(f, "invalid utf-8 in string field"),
            Self::InvalidValue(field) => write!(f, "invalid value for {}", field),
            Self::UnknownControl(byte) => write!(f, "unknown control byte 0x{:02x}", byte),
        }
    }
}

impl Error for DecodeError {}

/// Bounds-checked little-endian cursor over a byte slice.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn f32(&mut self) -> Result<f32, DecodeError> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Length-prefixed bytes; the prefix is validated against the
    /// remaining input before anything is sliced.
    pub fn bytes_u8(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.u8()? as usize;
        if self.remaining() < len {
            return Err(DecodeError::LengthOverrun);
        }
        self.take(len)
    }

    pub fn bytes_u16(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.u16()? as usize;
        if self.remaining() < len {
            return Err(DecodeError::LengthOverrun);
        }
        self.take(len)
    }

    pub fn bytes_u32(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.u32()? as usize;
        if self.remaining() < len {
            return Err(DecodeError::LengthOverrun);
        }
        self.take(len)
    }

    pub fn str_u8(&mut self) -> Result<String, DecodeError> {
        let bytes = self.bytes_u8()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    pub fn str_u16(&mut self) -> Result<String, DecodeError> {
        let bytes = self.bytes_u16()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }
}

/// Little-endian byte sink mirroring [`Reader`].
pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// `u8` length prefix; the caller guarantees `bytes.len() <= 255`.
    pub fn bytes_u8(&mut self, bytes: &[u8]) {
        self.u8(bytes.len() as u8);
        self.raw(bytes);
    }

    pub fn bytes_u16(&mut self, bytes: &[u8]) {
        self.u16(bytes.len() as u16);
        self.raw(bytes);
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// `WELCOME` payload: the session id assigned at stream accept.
///
/// Layout: `session_id:u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Welcome {
    pub session_id: u32,
}

impl Welcome {
    pub fn encode(&self) -> Vec<u8> {
        self.session_id.to_le_bytes().to_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        Ok(Self {
            session_id: r.u32()?,
        })
    }
}

/// `LOGIN` request payload.
///
/// Layout: `nick_len:u8 ∥ nickname`.
pub fn encode_login(nickname: &str) -> Result<Vec<u8>, DecodeError> {
    if nickname.len() > MAX_NICKNAME_LEN {
        return Err(DecodeError::InvalidValue("nickname"));
    }
    let mut w = Writer::with_capacity(1 + nickname.len());
    w.bytes_u8(nickname.as_bytes());
    Ok(w.into_vec())
}

pub fn decode_login(data: &[u8]) -> Result<String, DecodeError> {
    Reader::new(data).str_u8()
}

/// Chat message body.
///
/// Layout: `kind:u8 ∥ from_len:u8 ∥ from ∥ text_len:u16 ∥ text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatBody {
    pub kind: ChatKind,
    pub from: String,
    pub text: String,
}

impl ChatBody {
    pub fn player(from: &str, text: &str) -> Self {
        Self {
            kind: ChatKind::Player,
            from: from.to_string(),
            text: text.to_string(),
        }
    }

    pub fn system(text: &str) -> Self {
        Self {
            kind: ChatKind::System,
            from: String::new(),
            text: text.to_string(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(4 + self.from.len() + self.text.len());
        w.u8(self.kind as u8);
        w.bytes_u8(&self.from.as_bytes()[..self.from.len().min(MAX_NICKNAME_LEN)]);
        w.bytes_u16(self.text.as_bytes());
        w.into_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let kind = ChatKind::from_u8(r.u8()?).ok_or(DecodeError::InvalidValue("chat kind"))?;
        let from = r.str_u8()?;
        let text = r.str_u16()?;
        Ok(Self { kind, from, text })
    }
}

/// Movement intent sent by a client.
///
/// Layout: `dir_x:f32 ∥ dir_y:f32 ∥ timestamp:f32`. The timestamp is a
/// client-side monotonic tick counter used only for staleness rejection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementInput {
    pub dir_x: f32,
    pub dir_y: f32,
    pub timestamp: f32,
}

impl MovementInput {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(12);
        w.f32(self.dir_x);
        w.f32(self.dir_y);
        w.f32(self.timestamp);
        w.into_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        Ok(Self {
            dir_x: r.f32()?,
            dir_y: r.f32()?,
            timestamp: r.f32()?,
        })
    }
}

/// Authoritative movement event published by the tick loop.
///
/// Layout: `player_id:u32 ∥ x:f32 ∥ y:f32 ∥ dir_x:f32 ∥ dir_y:f32 ∥
/// speed:f32 ∥ last_input_ticks:f32`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementEvent {
    pub player_id: u32,
    pub x: f32,
    pub y: f32,
    pub dir_x: f32,
    pub dir_y: f32,
    pub speed: f32,
    pub last_input_ticks: f32,
}

impl MovementEvent {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(28);
        w.u32(self.player_id);
        w.f32(self.x);
        w.f32(self.y);
        w.f32(self.dir_x);
        w.f32(self.dir_y);
        w.f32(self.speed);
        w.f32(self.last_input_ticks);
        w.into_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        Ok(Self {
            player_id: r.u32()?,
            x: r.f32()?,
            y: r.f32()?,
            dir_x: r.f32()?,
            dir_y: r.f32()?,
            speed: r.f32()?,
            last_input_ticks: r.f32()?,
        })
    }
}

/// Full player state as sent on login replies, join events and sync state.
///
/// Layout: `id:u32 ∥ country_id:u8 ∥ exp:u32 ∥ rank:u8 ∥ health:u32 ∥
/// max_health:u32 ∥ x:f32 ∥ y:f32 ∥ dir_x:f32 ∥ dir_y:f32 ∥ unit_flag:u8 ∥
/// unit_id:u16 ∥ nick_len:u8 ∥ nickname`. An absent unit is encoded as
/// flag 0 with a zero id.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub id: u32,
    pub nickname: String,
    pub country_id: u8,
    pub exp: u32,
    pub rank: u8,
    pub health: u32,
    pub max_health: u32,
    pub x: f32,
    pub y: f32,
    pub dir_x: f32,
    pub dir_y: f32,
    pub unit_id: Option<u16>,
}

impl PlayerSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        if self.nickname.len() > MAX_NICKNAME_LEN {
            return Err(DecodeError::InvalidValue("nickname"));
        }
        let mut w = Writer::with_capacity(38 + self.nickname.len());
        w.u32(self.id);
        w.u8(self.country_id);
        w.u32(self.exp);
        w.u8(self.rank);
        w.u32(self.health);
        w.u32(self.max_health);
        w.f32(self.x);
        w.f32(self.y);
        w.f32(self.dir_x);
        w.f32(self.dir_y);
        match self.unit_id {
            Some(id) => {
                w.u8(1);
                w.u16(id);
            }
            None => {
                w.u8(0);
                w.u16(0);
            }
        }
        w.bytes_u8(self.nickname.as_bytes());
        Ok(w.into_vec())
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        Self::read(&mut r)
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let id = r.u32()?;
        let country_id = r.u8()?;
        let exp = r.u32()?;
        let rank = r.u8()?;
        let health = r.u32()?;
        let max_health = r.u32()?;
        let x = r.f32()?;
        let y = r.f32()?;
        let dir_x = r.f32()?;
        let dir_y = r.f32()?;
        let unit_flag = r.u8()?;
        let unit_raw = r.u16()?;
        let nickname = r.str_u8()?;
        Ok(Self {
            id,
            nickname,
            country_id,
            exp,
            rank,
            health,
            max_health,
            x,
            y,
            dir_x,
            dir_y,
            unit_id: (unit_flag == 1).then_some(unit_raw),
        })
    }
}

/// Country table entry.
///
/// Layout: `id:u8 ∥ name_len:u8 ∥ name ∥ code_len:u8 ∥ code ∥ ai:u8`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryRecord {
    pub id: u8,
    pub name: String,
    pub code: String,
    pub is_ai_controlled: bool,
}

impl CountryRecord {
    fn write(&self, w: &mut Writer) {
        w.u8(self.id);
        w.bytes_u8(&self.name.as_bytes()[..self.name.len().min(MAX_NICKNAME_LEN)]);
        w.bytes_u8(&self.code.as_bytes()[..self.code.len().min(MAX_NICKNAME_LEN)]);
        w.u8(self.is_ai_controlled as u8);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            id: r.u8()?,
            name: r.str_u8()?,
            code: r.str_u8()?,
            is_ai_controlled: r.u8()? != 0,
        })
    }
}

/// `SYNC_STATE` payload: nearby players, the country table and the online
/// count, sent once after a successful login.
///
/// Layout: `player_count:u16 ∥ players… ∥ country_count:u16 ∥ countries… ∥
/// online_count:u32`.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub players: Vec<PlayerSnapshot>,
    pub countries: Vec<CountryRecord>,
    pub online_count: u32,
}

impl SyncState {
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        let mut w = Writer::new();
        w.u16(self.players.len() as u16);
        for player in &self.players {
            w.raw(&player.encode()?);
        }
        w.u16(self.countries.len() as u16);
        for country in &self.countries {
            country.write(&mut w);
        }
        w.u32(self.online_count);
        Ok(w.into_vec())
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let player_count = r.u16()?;
        let mut players = Vec::with_capacity(player_count.min(1024) as usize);
        for _ in 0..player_count {
            players.push(PlayerSnapshot::read(&mut r)?);
        }
        let country_count = r.u16()?;
        let mut countries = Vec::with_capacity(country_count.min(1024) as usize);
        for _ in 0..country_count {
            countries.push(CountryRecord::read(&mut r)?);
        }
        let online_count = r.u32()?;
        Ok(Self {
            players,
            countries,
            online_count,
        })
    }
}

/// `PLAYER_DATA` request payload.
///
/// Layout: `player_id:u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerDataRequest {
    pub player_id: u32,
}

impl PlayerDataRequest {
    pub fn encode(&self) -> Vec<u8> {
        self.player_id.to_le_bytes().to_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        Ok(Self {
            player_id: r.u32()?,
        })
    }
}

/// `PLAYER_LEFT` payload.
///
/// Layout: `player_id:u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerLeft {
    pub player_id: u32,
}

impl PlayerLeft {
    pub fn encode(&self) -> Vec<u8> {
        self.player_id.to_le_bytes().to_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        Ok(Self {
            player_id: r.u32()?,
        })
    }
}

/// `CHUNK_REQUEST` payload.
///
/// Layout: `chunk_x:u16 ∥ chunk_y:u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRequest {
    pub chunk_x: u16,
    pub chunk_y: u16,
}

impl ChunkRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(4);
        w.u16(self.chunk_x);
        w.u16(self.chunk_y);
        w.into_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        Ok(Self {
            chunk_x: r.u16()?,
            chunk_y: r.u16()?,
        })
    }
}

/// One tile inside a chunk-data payload, 7 bytes on the wire.
///
/// Layout: `country_id:u8 ∥ is_border:u8 ∥ type:u8 ∥ prefab_id:u16 ∥
/// occupier_flag:u8 ∥ occupier_id:u8`. A missing occupier is flag 0, id 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRecord {
    pub country_id: u8,
    pub is_border: bool,
    pub tile_type: TileType,
    pub prefab_id: u16,
    pub occupier_id: Option<u8>,
}

impl TileRecord {
    /// Placeholder emitted for coordinates the world has no tile for.
    pub fn water() -> Self {
        Self {
            country_id: 0,
            is_border: false,
            tile_type: TileType::Water,
            prefab_id: 0,
            occupier_id: None,
        }
    }

    fn write(&self, w: &mut Writer) {
        w.u8(self.country_id);
        w.u8(self.is_border as u8);
        w.u8(self.tile_type as u8);
        w.u16(self.prefab_id);
        match self.occupier_id {
            Some(id) => {
                w.u8(1);
                w.u8(id);
            }
            None => {
                w.u8(0);
                w.u8(0);
            }
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let country_id = r.u8()?;
        let is_border = r.u8()? != 0;
        let tile_type =
            TileType::from_u8(r.u8()?).ok_or(DecodeError::InvalidValue("tile type"))?;
        let prefab_id = r.u16()?;
        let occupier_flag = r.u8()?;
        let occupier_raw = r.u8()?;
        Ok(Self {
            country_id,
            is_border,
            tile_type,
            prefab_id,
            occupier_id: (occupier_flag == 1).then_some(occupier_raw),
        })
    }
}

/// `CHUNK_DATA` payload: a full 16x16 tile window.
///
/// Layout: `chunk_x:u16 ∥ chunk_y:u16 ∥ 256 × TileRecord`, tiles ordered by
/// `(x, y)` with x varying fastest. The payload is always exactly
/// `4 + 256 × 7 = 1796` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkData {
    pub chunk_x: u16,
    pub chunk_y: u16,
    pub tiles: Vec<TileRecord>,
}

impl ChunkData {
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        if self.tiles.len() != CHUNK_TILE_COUNT {
            return Err(DecodeError::InvalidValue("chunk tile count"));
        }
        let mut w = Writer::with_capacity(4 + CHUNK_TILE_COUNT * 7);
        w.u16(self.chunk_x);
        w.u16(self.chunk_y);
        for tile in &self.tiles {
            tile.write(&mut w);
        }
        Ok(w.into_vec())
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let chunk_x = r.u16()?;
        let chunk_y = r.u16()?;
        let mut tiles = Vec::with_capacity(CHUNK_TILE_COUNT);
        for _ in 0..CHUNK_TILE_COUNT {
            tiles.push(TileRecord::read(&mut r)?);
        }
        Ok(Self {
            chunk_x,
            chunk_y,
            tiles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PlayerSnapshot {
        PlayerSnapshot {
            id: 7,
            nickname: "Ryuzaki".to_string(),
            country_id: 3,
            exp: 1200,
            rank: 1,
            health: 90,
            max_health: 100,
            x: 100.5,
            y: 64.25,
            dir_x: 0.0,
            dir_y: -1.0,
            unit_id: Some(2),
        }
    }

    #[test]
    fn test_welcome_roundtrip() {
        let welcome = Welcome {
            session_id: 0xDEAD_BEEF,
        };
        assert_eq!(Welcome::decode(&welcome.encode()).unwrap(), welcome);
    }

    #[test]
    fn test_login_roundtrip() {
        let encoded = encode_login("Ryuzaki").unwrap();
        assert_eq!(decode_login(&encoded).unwrap(), "Ryuzaki");
    }

    #[test]
    fn test_login_nickname_boundary() {
        let max = "a".repeat(255);
        let encoded = encode_login(&max).unwrap();
        assert_eq!(decode_login(&encoded).unwrap(), max);

        let too_long = "a".repeat(256);
        assert!(encode_login(&too_long).is_err());
    }

    #[test]
    fn test_login_length_overrun_rejected() {
        // Prefix claims 10 bytes, only 3 present.
        let data = [10u8, b'a', b'b', b'c'];
        assert_eq!(decode_login(&data), Err(DecodeError::LengthOverrun));
    }

    #[test]
    fn test_chat_roundtrip() {
        let body = ChatBody::player("Ryuzaki", "hello world");
        assert_eq!(ChatBody::decode(&body.encode()).unwrap(), body);

        let notice = ChatBody::system("server restarting");
        assert_eq!(ChatBody::decode(&notice.encode()).unwrap(), notice);
    }

    #[test]
    fn test_movement_input_roundtrip() {
        let input = MovementInput {
            dir_x: 0.7,
            dir_y: -0.7,
            timestamp: 1234.5,
        };
        assert_eq!(MovementInput::decode(&input.encode()).unwrap(), input);
    }

    #[test]
    fn test_movement_input_truncated() {
        let input = MovementInput {
            dir_x: 1.0,
            dir_y: 0.0,
            timestamp: 1.0,
        };
        let encoded = input.encode();
        assert_eq!(
            MovementInput::decode(&encoded[..8]),
            Err(DecodeError::Truncated)
        );
    }

    #[test]
    fn test_movement_event_roundtrip() {
        let event = MovementEvent {
            player_id: 9,
            x: 100.0,
            y: 100.75,
            dir_x: 1.0,
            dir_y: 0.0,
            speed: 15.0,
            last_input_ticks: 42.0,
        };
        assert_eq!(MovementEvent::decode(&event.encode()).unwrap(), event);
    }

    #[test]
    fn test_player_snapshot_roundtrip() {
        let snap = snapshot();
        let encoded = snap.encode().unwrap();
        assert_eq!(PlayerSnapshot::decode(&encoded).unwrap(), snap);

        let mut no_unit = snapshot();
        no_unit.unit_id = None;
        let encoded = no_unit.encode().unwrap();
        assert_eq!(PlayerSnapshot::decode(&encoded).unwrap(), no_unit);
    }

    #[test]
    fn test_sync_state_roundtrip() {
        let state = SyncState {
            players: vec![snapshot()],
            countries: vec![
                CountryRecord {
                    id: 1,
                    name: "Norway".to_string(),
                    code: "NO".to_string(),
                    is_ai_controlled: false,
                },
                CountryRecord {
                    id: 2,
                    name: "Japan".to_string(),
                    code: "JP".to_string(),
                    is_ai_controlled: true,
                },
            ],
            online_count: 17,
        };
        let encoded = state.encode().unwrap();
        assert_eq!(SyncState::decode(&encoded).unwrap(), state);
    }

    #[test]
    fn test_empty_sync_state() {
        let state = SyncState {
            players: vec![],
            countries: vec![],
            online_count: 1,
        };
        let decoded = SyncState::decode(&state.encode().unwrap()).unwrap();
        assert!(decoded.players.is_empty());
        assert_eq!(decoded.online_count, 1);
    }

    #[test]
    fn test_chunk_request_roundtrip() {
        let req = ChunkRequest {
            chunk_x: 512,
            chunk_y: 256,
        };
        assert_eq!(ChunkRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn test_chunk_data_payload_size() {
        let data = ChunkData {
            chunk_x: 3,
            chunk_y: 4,
            tiles: vec![TileRecord::water(); CHUNK_TILE_COUNT],
        };
        let encoded = data.encode().unwrap();
        assert_eq!(encoded.len(), 4 + CHUNK_TILE_COUNT * 7);
        assert_eq!(ChunkData::decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_chunk_data_rejects_wrong_tile_count() {
        let data = ChunkData {
            chunk_x: 0,
            chunk_y: 0,
            tiles: vec![TileRecord::water(); 255],
        };
        assert!(data.encode().is_err());
    }

    #[test]
    fn test_chunk_data_occupier_encoding() {
        let mut tiles = vec![TileRecord::water(); CHUNK_TILE_COUNT];
        tiles[0] = TileRecord {
            country_id: 5,
            is_border: true,
            tile_type: TileType::Ground,
            prefab_id: 77,
            occupier_id: Some(9),
        };
        let data = ChunkData {
            chunk_x: 1,
            chunk_y: 1,
            tiles,
        };
        let decoded = ChunkData::decode(&data.encode().unwrap()).unwrap();
        assert_eq!(decoded.tiles[0].occupier_id, Some(9));
        assert!(decoded.tiles[0].is_border);
        assert_eq!(decoded.tiles[1].occupier_id, None);
    }
}
