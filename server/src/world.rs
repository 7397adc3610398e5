//! Authoritative world state.
//!
//! One reader-writer lock guards everything in [`World`]: the session map,
//! the country and unit tables, the tile grid, the dirty-tile set and the
//! moving-players index. Readers dominate; the writers are the tick loop
//! (moving-set membership), handlers (tile mutations), the persistence sink
//! (dirty-set swap) and session registry changes.
//!
//! Lock order is world before session, never the reverse.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use shared::{PlayerSnapshot, TileType, UnitType, CHUNK_SIZE};

use crate::session::Session;

/// Walking speed for a player without a controlled unit, tiles/second.
pub const DEFAULT_SPEED: f32 = 15.0;

/// Read-mostly country table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Country {
    pub id: u8,
    pub name: String,
    pub code: String,
    pub is_ai_controlled: bool,
}

/// Controllable unit archetype. Walkability and speed derive from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unit {
    pub id: u16,
    pub unit_type: UnitType,
    pub max_speed: f32,
}

/// One cell of the tile grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
    pub owner_country_id: u8,
    pub tile_type: TileType,
    pub prefab_id: Option<u16>,
    pub is_border: bool,
    pub occupier_country_id: Option<u8>,
    /// Unix seconds of the occupation, when occupied.
    pub occupied_at: Option<i64>,
}

/// A connected player's authoritative state.
///
/// Position is owned by the tick loop; every other component reads it under
/// the per-session lock. `last_input_ticks` is the client's own monotonic
/// input clock, used only to reject stale movement inputs.
#[derive(Debug, Clone)]
pub struct Player {
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
    pub last_input_ticks: f32,
    pub last_updated: Instant,
}

impl Player {
    /// The chunk this player currently stands in.
    pub fn chunk_coord(&self) -> (i32, i32) {
        (
            (self.x.floor() as i32).div_euclid(CHUNK_SIZE),
            (self.y.floor() as i32).div_euclid(CHUNK_SIZE),
        )
    }

    pub fn is_moving(&self) -> bool {
        self.dir_x != 0.0 || self.dir_y != 0.0
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            nickname: self.nickname.clone(),
            country_id: self.country_id,
            exp: self.exp,
            rank: self.rank,
            health: self.health,
            max_health: self.max_health,
            x: self.x,
            y: self.y,
            dir_x: self.dir_x,
            dir_y: self.dir_y,
            unit_id: self.unit_id,
        }
    }
}

/// Everything guarded by the world lock.
pub struct World {
    /// Connected sessions by session id.
    pub sessions: HashMap<u32, Arc<Session>>,
    pub countries: HashMap<u8, Country>,
    pub units: HashMap<u16, Unit>,
    /// Tile grid keyed by integer coordinates. Coordinates the generator
    /// never produced have no entry; readers treat them as water.
    pub tiles: HashMap<(i32, i32), Tile>,
    /// Tiles mutated since the last persistence checkpoint.
    pub dirty_tiles: HashSet<(i32, i32)>,
    /// `player_id -> session_id` for players the tick loop integrates.
    pub moving_players: HashMap<u32, u32>,
}

impl World {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            countries: HashMap::new(),
            units: HashMap::new(),
            tiles: HashMap::new(),
            dirty_tiles: HashSet::new(),
            moving_players: HashMap::new(),
        }
    }

    pub fn tile_at(&self, x: i32, y: i32) -> Option<&Tile> {
        self.tiles.get(&(x, y))
    }

    /// Unit type governing a player's movement; players without a unit walk
    /// as infantry.
    pub fn unit_type_of(&self, player: &Player) -> UnitType {
        player
            .unit_id
            .and_then(|id| self.units.get(&id))
            .map(|unit| unit.unit_type)
            .unwrap_or(UnitType::Infantry)
    }

    /// Movement speed for a player, falling back to walking speed.
    pub fn speed_of(&self, player: &Player) -> f32 {
        player
            .unit_id
            .and_then(|id| self.units.get(&id))
            .map(|unit| unit.max_speed)
            .unwrap_or(DEFAULT_SPEED)
    }

    /// Inserts or replaces a tile and marks it for the next checkpoint.
    pub fn update_tile(&mut self, tile: Tile) {
        let key = (tile.x, tile.y);
        self.tiles.insert(key, tile);
        self.dirty_tiles.insert(key);
    }

    /// Swaps the dirty set for an empty one and resolves the tiles it named.
    pub fn take_dirty_tiles(&mut self) -> (Vec<(i32, i32)>, Vec<Tile>) {
        let keys: Vec<(i32, i32)> = std::mem::take(&mut self.dirty_tiles).into_iter().collect();
        let tiles = keys
            .iter()
            .filter_map(|key| self.tiles.get(key).cloned())
            .collect();
        (keys, tiles)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
