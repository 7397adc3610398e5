//! Protocol enums shared by client and server.
//!
//! The numeric values of [`MessageType`] are part of the deployment
//! contract; reordering them breaks every connected client.

/// Application message types carried in the envelope's first byte.
///
/// Ordinals are stable. `Unknown` doubles as the decode fallback for
/// unregistered bytes so a malformed peer cannot crash the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Welcome = 0,
    Login = 1,
    Chat = 2,
    System = 3,
    Unauthorized = 4,
    Unknown = 5,
    PlayerMovement = 6,
    PlayerJoined = 7,
    PlayerLeft = 8,
    PlayerData = 9,
    PingPong = 10,
    SyncState = 11,
    UnitAction = 12,
    ChunkRequest = 13,
    ChunkData = 14,
    Disconnect = 15,
}

impl MessageType {
    /// Maps a wire byte to its message type, folding unregistered values
    /// into `Unknown`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Welcome,
            1 => Self::Login,
            2 => Self::Chat,
            3 => Self::System,
            4 => Self::Unauthorized,
            6 => Self::PlayerMovement,
            7 => Self::PlayerJoined,
            8 => Self::PlayerLeft,
            9 => Self::PlayerData,
            10 => Self::PingPong,
            11 => Self::SyncState,
            12 => Self::UnitAction,
            13 => Self::ChunkRequest,
            14 => Self::ChunkData,
            15 => Self::Disconnect,
            _ => Self::Unknown,
        }
    }

    /// Whether a datagram delivery of this type must be acknowledged by the
    /// receiver. The set is a deployment contract: state-bearing messages
    /// are retransmitted until acked, everything else is fire-and-forget.
    pub fn requires_ack(self) -> bool {
        matches!(
            self,
            Self::Login | Self::SyncState | Self::ChunkData | Self::PlayerJoined | Self::PlayerLeft
        )
    }
}

/// Terrain class of a map tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TileType {
    Ground = 0,
    Water = 1,
    Building = 2,
}

impl TileType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ground),
            1 => Some(Self::Water),
            2 => Some(Self::Building),
            _ => None,
        }
    }
}

/// Controlled-unit classes. Walkability on the tile grid is decided by
/// unit type: foot and tracked units need ground, naval units need water,
/// airborne units are unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnitType {
    Infantry = 1,
    Tank = 2,
    Ship = 3,
    BattleShip = 4,
    Helicopter = 5,
    FighterJet = 6,
}

impl UnitType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Infantry),
            2 => Some(Self::Tank),
            3 => Some(Self::Ship),
            4 => Some(Self::BattleShip),
            5 => Some(Self::Helicopter),
            6 => Some(Self::FighterJet),
            _ => None,
        }
    }

    /// Whether a unit of this type may stand on the given tile.
    pub fn can_traverse(self, tile: TileType) -> bool {
        match self {
            Self::Infantry | Self::Tank => tile == TileType::Ground,
            Self::Ship | Self::BattleShip => tile == TileType::Water,
            Self::Helicopter | Self::FighterJet => true,
        }
    }
}

/// Player progression ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlayerRank {
    Citizen = 1,
    Soldier = 2,
    General = 3,
    Diplomat = 4,
    Leader = 5,
}

impl PlayerRank {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Citizen),
            2 => Some(Self::Soldier),
            3 => Some(Self::General),
            4 => Some(Self::Diplomat),
            5 => Some(Self::Leader),
            _ => None,
        }
    }
}

/// Origin tag on a chat body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChatKind {
    Player = 0,
    System = 1,
}

impl ChatKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Player),
            1 => Some(Self::System),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for value in 0u8..16 {
            let t = MessageType::from_u8(value);
            assert_eq!(t as u8, value);
        }
    }

    #[test]
    fn test_unregistered_byte_folds_to_unknown() {
        assert_eq!(MessageType::from_u8(16), MessageType::Unknown);
        assert_eq!(MessageType::from_u8(255), MessageType::Unknown);
    }

    #[test]
    fn test_ack_required_set() {
        assert!(MessageType::Login.requires_ack());
        assert!(MessageType::SyncState.requires_ack());
        assert!(MessageType::ChunkData.requires_ack());
        assert!(MessageType::PlayerJoined.requires_ack());
        assert!(MessageType::PlayerLeft.requires_ack());

        assert!(!MessageType::PlayerMovement.requires_ack());
        assert!(!MessageType::PingPong.requires_ack());
        assert!(!MessageType::Chat.requires_ack());
    }

    #[test]
    fn test_walkability_rules() {
        assert!(UnitType::Infantry.can_traverse(TileType::Ground));
        assert!(!UnitType::Infantry.can_traverse(TileType::Water));
        assert!(UnitType::Tank.can_traverse(TileType::Ground));
        assert!(!UnitType::Tank.can_traverse(TileType::Building));

        assert!(UnitType::Ship.can_traverse(TileType::Water));
        assert!(!UnitType::Ship.can_traverse(TileType::Ground));
        assert!(UnitType::BattleShip.can_traverse(TileType::Water));

        assert!(UnitType::Helicopter.can_traverse(TileType::Water));
        assert!(UnitType::FighterJet.can_traverse(TileType::Building));
    }
}
