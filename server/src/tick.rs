//! The authoritative simulation tick.
//!
//! Runs at a fixed rate and is the only writer of player positions. Each
//! tick integrates every player in the moving set, validates the candidate
//! position against the tile grid and the player's unit type, commits or
//! rejects it whole, and publishes the result to observers in range over
//! the datagram channel.

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use shared::{Message, MessageType, MovementEvent, UnitType};

use crate::broadcast::Transport;
use crate::network::GameServer;
use crate::session::Session;
use crate::world::DEFAULT_SPEED;

/// Simulation timestep.
pub const FIXED_DELTA_TIME: Duration = Duration::from_millis(50);

/// A player whose newest input is older than this stops being integrated.
pub const INPUT_TIMEOUT: Duration = Duration::from_secs(1);

struct Candidate {
    player_id: u32,
    session: Arc<Session>,
    cand_x: f32,
    cand_y: f32,
    dir_x: f32,
    dir_y: f32,
    speed: f32,
    last_input_ticks: f32,
}

/// Fixed-interval loop driving [`step`].
pub async fn run(server: Arc<GameServer>) {
    let mut interval = tokio::time::interval(FIXED_DELTA_TIME);
    loop {
        interval.tick().await;
        step(&server, FIXED_DELTA_TIME.as_secs_f32()).await;
    }
}

/// Advances the simulation by `dt` seconds.
pub async fn step(server: &GameServer, dt: f32) {
    // Snapshot the moving set, its sessions and the unit table under one
    // read lock. Entries whose session is gone are expired below.
    let (entries, mut expired, units) = {
        let world = server.world.read().await;
        let mut entries = Vec::with_capacity(world.moving_players.len());
        let mut expired = Vec::new();
        for (&player_id, &session_id) in &world.moving_players {
            match world.sessions.get(&session_id) {
                Some(session) => entries.push((player_id, Arc::clone(session))),
                None => expired.push(player_id),
            }
        }
        (entries, expired, world.units.clone())
    };

    // Integrate motion from each player's current state. Positions are not
    // touched yet; the commit happens only after grid validation.
    let mut candidates = Vec::with_capacity(entries.len());
    for (player_id, session) in entries {
        let state = session.state.read().await;
        let Some(player) = state.player.as_ref() else {
            expired.push(player_id);
            continue;
        };
        if player.last_updated.elapsed() >= INPUT_TIMEOUT {
            expired.push(player_id);
            continue;
        }

        let unit = player.unit_id.and_then(|id| units.get(&id));
        let speed = unit.map(|u| u.max_speed).unwrap_or(DEFAULT_SPEED);
        let unit_type = unit.map(|u| u.unit_type).unwrap_or(UnitType::Infantry);

        let mag = (player.dir_x * player.dir_x + player.dir_y * player.dir_y).sqrt();
        let (cand_x, cand_y) = if mag > 0.0 {
            (
                player.x + player.dir_x / mag * speed * dt,
                player.y + player.dir_y / mag * speed * dt,
            )
        } else {
            (player.x, player.y)
        };

        candidates.push((
            Candidate {
                player_id,
                session: Arc::clone(&session),
                cand_x,
                cand_y,
                dir_x: player.dir_x,
                dir_y: player.dir_y,
                speed,
                last_input_ticks: player.last_input_ticks,
            },
            unit_type,
        ));
    }

    // Grid validation under a single world read lock.
    let verdicts: Vec<(Candidate, bool)> = {
        let world = server.world.read().await;
        candidates
            .into_iter()
            .map(|(cand, unit_type)| {
                let tile = world.tile_at(cand.cand_x.floor() as i32, cand.cand_y.floor() as i32);
                let walkable = match tile {
                    Some(tile) => unit_type.can_traverse(tile.tile_type),
                    // No tile generated there: stay put this tick.
                    None => false,
                };
                (cand, walkable)
            })
            .collect()
    };

    // Commit approved positions and publish the authoritative result for
    // every integrated player, moved or blocked.
    let mut events = Vec::with_capacity(verdicts.len());
    for (cand, walkable) in verdicts {
        let mut state = cand.session.state.write().await;
        let Some(player) = state.player.as_mut() else {
            continue;
        };
        if walkable {
            player.x = cand.cand_x;
            player.y = cand.cand_y;
        }
        events.push(MovementEvent {
            player_id: cand.player_id,
            x: player.x,
            y: player.y,
            dir_x: cand.dir_x,
            dir_y: cand.dir_y,
            speed: cand.speed,
            last_input_ticks: cand.last_input_ticks,
        });
    }

    if !expired.is_empty() {
        debug!("expiring {} moving players", expired.len());
        let mut world = server.world.write().await;
        for player_id in &expired {
            world.moving_players.remove(player_id);
        }
    }

    for event in events {
        server
            .broadcast_in_range(
                Message::new(MessageType::PlayerMovement, event.encode()),
                event.x,
                event.y,
                Transport::Datagram,
                None,
            )
            .await;
    }
}
