//! One handler per application message type.
//!
//! Every handler verifies its prerequisite state, performs at most one
//! authoritative mutation, and enqueues broadcasts through the interest
//! manager. Session fields are mutated under the session lock, world state
//! under the world lock, and never both at once. Nothing here blocks on the
//! database while holding either.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use shared::{
    ChatBody, ChunkData, ChunkRequest, CountryRecord, Message, MessageType, MovementInput,
    PlayerDataRequest, SyncState, TileRecord, CHUNK_SIZE, CHUNK_TILE_COUNT,
};

use crate::broadcast::Transport;
use crate::error_tokens as tokens;
use crate::network::GameServer;
use crate::session::Session;
use crate::world::{Country, Tile};

/// Routes a decoded message to its handler. Also the single place where
/// the session heartbeat is refreshed.
pub async fn dispatch(server: &GameServer, session: &Arc<Session>, msg: Message) {
    session.touch().await;
    match msg.msg_type {
        MessageType::Login => handle_login(server, session, &msg.payload).await,
        MessageType::Chat => handle_chat(server, session, &msg.payload).await,
        MessageType::PlayerMovement => handle_movement(server, session, &msg.payload).await,
        MessageType::PlayerData => handle_player_data(server, session, &msg.payload).await,
        MessageType::ChunkRequest => handle_chunk_request(server, session, &msg.payload).await,
        MessageType::PingPong => handle_ping(server, session, msg).await,
        MessageType::Disconnect => server.disconnect_session(session).await,
        other => {
            debug!("session {}: no handler for {:?}", session.id, other);
        }
    }
}

async fn reply_error(server: &GameServer, session: &Arc<Session>, msg_type: MessageType, token: &str) {
    server
        .send_to(session, &Message::error(msg_type, token), Transport::Stream)
        .await;
}

/// Attaches a persisted player to the session, announces the join to
/// observers in range and hands the client its initial world view.
async fn handle_login(server: &GameServer, session: &Arc<Session>, payload: &[u8]) {
    let nickname = match shared::codec::decode_login(payload) {
        Ok(nickname) => nickname,
        Err(e) => {
            debug!("session {}: bad login payload: {}", session.id, e);
            reply_error(server, session, MessageType::Login, tokens::INVALID_REQUEST).await;
            return;
        }
    };
    if nickname.trim().is_empty() {
        reply_error(server, session, MessageType::Login, tokens::NICKNAME_REQUIRED).await;
        return;
    }

    // Nickname uniqueness among connected sessions, case-insensitive.
    let already_connected = {
        let world = server.world.read().await;
        let mut found = false;
        for other in world.sessions.values() {
            if other.id == session.id {
                continue;
            }
            let state = other.state.read().await;
            if let Some(player) = &state.player {
                if player.nickname.eq_ignore_ascii_case(&nickname) {
                    found = true;
                    break;
                }
            }
        }
        found
    };
    if already_connected {
        reply_error(server, session, MessageType::Login, tokens::ALREADY_CONNECTED).await;
        return;
    }

    // World lock released above: the store call must not run under it.
    let player = match server.store.find_player_by_nickname(&nickname).await {
        Ok(Some(player)) => player,
        Ok(None) => {
            reply_error(server, session, MessageType::Login, tokens::PLAYER_NOT_FOUND).await;
            return;
        }
        Err(e) => {
            warn!("login lookup for {} failed: {}", nickname, e);
            reply_error(server, session, MessageType::Login, tokens::LOGIN_UNAVAILABLE).await;
            return;
        }
    };

    let snapshot = player.snapshot();
    let (px, py) = (player.x, player.y);
    session.state.write().await.player = Some(player);

    let snapshot_bytes = match snapshot.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("snapshot encode for {} failed: {}", snapshot.nickname, e);
            reply_error(server, session, MessageType::Login, tokens::LOGIN_UNAVAILABLE).await;
            return;
        }
    };
    info!("session {}: {} logged in", session.id, snapshot.nickname);

    server
        .send_to(
            session,
            &Message::new(MessageType::Login, snapshot_bytes.clone()),
            Transport::Stream,
        )
        .await;

    server
        .broadcast_in_range(
            Message::new(MessageType::PlayerJoined, snapshot_bytes),
            px,
            py,
            Transport::Stream,
            Some(session.id),
        )
        .await;

    let sync = build_sync_state(server, session.id, px, py).await;
    match sync.encode() {
        Ok(bytes) => {
            server
                .send_to(
                    session,
                    &Message::new(MessageType::SyncState, bytes),
                    Transport::Stream,
                )
                .await;
        }
        Err(e) => warn!("sync state encode failed: {}", e),
    }
}

/// Nearby players plus the country table, sent once after login.
async fn build_sync_state(server: &GameServer, session_id: u32, px: f32, py: f32) -> SyncState {
    let radius = server.config.max_view_distance;
    let world = server.world.read().await;

    let mut players = Vec::new();
    for other in world.sessions.values() {
        if other.id == session_id {
            continue;
        }
        let state = other.state.read().await;
        if let Some(player) = &state.player {
            let dx = player.x - px;
            let dy = player.y - py;
            if (dx * dx + dy * dy).sqrt() <= radius {
                players.push(player.snapshot());
            }
        }
    }

    let mut countries: Vec<CountryRecord> = world.countries.values().map(country_record).collect();
    countries.sort_by_key(|c| c.id);

    SyncState {
        players,
        countries,
        online_count: world.sessions.len() as u32,
    }
}

fn country_record(country: &Country) -> CountryRecord {
    CountryRecord {
        id: country.id,
        name: country.name.clone(),
        code: country.code.clone(),
        is_ai_controlled: country.is_ai_controlled,
    }
}

/// Slash command grammar for the chat channel.
#[derive(Debug, PartialEq)]
enum ChatCommand<'a> {
    Help,
    Whisper { target: &'a str, text: &'a str },
    Notice { text: &'a str },
    Teleport { target: &'a str, x: f32, y: f32 },
}

fn parse_command(text: &str) -> Result<ChatCommand<'_>, &'static str> {
    let mut parts = text.splitn(2, char::is_whitespace);
    let word = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match word {
        "/help" => Ok(ChatCommand::Help),
        "/w" => {
            let mut args = rest.splitn(2, char::is_whitespace);
            let target = args.next().unwrap_or("");
            let text = args.next().unwrap_or("").trim();
            if target.is_empty() || text.is_empty() {
                return Err(tokens::CHAT_USAGE_WHISPER);
            }
            Ok(ChatCommand::Whisper { target, text })
        }
        "/notice" => {
            if rest.is_empty() {
                return Err(tokens::CHAT_USAGE_NOTICE);
            }
            Ok(ChatCommand::Notice { text: rest })
        }
        "/tp" => {
            let args: Vec<&str> = rest.split_whitespace().collect();
            if args.len() != 3 {
                return Err(tokens::CHAT_USAGE_TELEPORT);
            }
            let x = args[1].parse().map_err(|_| tokens::CHAT_USAGE_TELEPORT)?;
            let y = args[2].parse().map_err(|_| tokens::CHAT_USAGE_TELEPORT)?;
            Ok(ChatCommand::Teleport {
                target: args[0],
                x,
                y,
            })
        }
        _ => Err(tokens::CHAT_UNKNOWN_COMMAND),
    }
}

const HELP_TEXT: &str =
    "Commands: /help, /w <player> <text>, /notice <text>, /tp <player|@me> <x> <y>";

async fn handle_chat(server: &GameServer, session: &Arc<Session>, payload: &[u8]) {
    let Some(nickname) = session.nickname().await else {
        reply_error(server, session, MessageType::Unauthorized, tokens::LOGIN_REQUIRED).await;
        return;
    };

    let body = match ChatBody::decode(payload) {
        Ok(body) => body,
        Err(e) => {
            debug!("session {}: bad chat payload: {}", session.id, e);
            reply_error(server, session, MessageType::Chat, tokens::CHAT_INVALID).await;
            return;
        }
    };

    let text = body.text.trim();
    if text.is_empty() {
        reply_error(server, session, MessageType::Chat, tokens::CHAT_EMPTY).await;
        return;
    }

    if text.starts_with('/') {
        match parse_command(text) {
            Ok(command) => run_command(server, session, &nickname, command).await,
            Err(token) => reply_error(server, session, MessageType::Chat, token).await,
        }
        return;
    }

    // Ordinary chat is global; the server stamps the sender.
    let relay = ChatBody::player(&nickname, text);
    server
        .broadcast(
            Message::new(MessageType::Chat, relay.encode()),
            Transport::Stream,
            None,
        )
        .await;
}

async fn run_command(
    server: &GameServer,
    session: &Arc<Session>,
    nickname: &str,
    command: ChatCommand<'_>,
) {
    match command {
        ChatCommand::Help => {
            let help = ChatBody::system(HELP_TEXT);
            server
                .send_to(
                    session,
                    &Message::new(MessageType::Chat, help.encode()),
                    Transport::Stream,
                )
                .await;
        }
        ChatCommand::Whisper { target, text } => {
            let Some(recipient) = find_session_by_nickname(server, target).await else {
                reply_error(server, session, MessageType::Chat, tokens::PLAYER_NOT_FOUND).await;
                return;
            };
            let whisper = ChatBody::player(nickname, text);
            server
                .send_to(
                    &recipient,
                    &Message::new(MessageType::Chat, whisper.encode()),
                    Transport::Stream,
                )
                .await;
        }
        ChatCommand::Notice { text } => {
            let notice = ChatBody::system(text);
            server
                .broadcast(
                    Message::new(MessageType::Chat, notice.encode()),
                    Transport::Stream,
                    None,
                )
                .await;
        }
        ChatCommand::Teleport { target, x, y } => {
            let destination = if target == "@me" {
                Some(Arc::clone(session))
            } else {
                find_session_by_nickname(server, target).await
            };
            let Some(target_session) = destination else {
                reply_error(server, session, MessageType::Chat, tokens::PLAYER_NOT_FOUND).await;
                return;
            };

            let player_id = {
                let mut state = target_session.state.write().await;
                let Some(player) = state.player.as_mut() else {
                    reply_error(server, session, MessageType::Chat, tokens::PLAYER_NOT_FOUND).await;
                    return;
                };
                player.x = x;
                player.y = y;
                player.last_updated = Instant::now();
                player.id
            };
            // The next tick picks the teleport up and publishes it.
            server
                .world
                .write()
                .await
                .moving_players
                .insert(player_id, target_session.id);
            info!("{} teleported player {} to ({}, {})", nickname, player_id, x, y);
        }
    }
}

async fn find_session_by_nickname(server: &GameServer, nickname: &str) -> Option<Arc<Session>> {
    let world = server.world.read().await;
    for session in world.sessions.values() {
        let state = session.state.read().await;
        if let Some(player) = &state.player {
            if player.nickname.eq_ignore_ascii_case(nickname) {
                return Some(Arc::clone(session));
            }
        }
    }
    None
}

/// Records a client's movement intent. The tick loop is the sole mover;
/// this only updates direction and the staleness clock.
async fn handle_movement(server: &GameServer, session: &Arc<Session>, payload: &[u8]) {
    let input = match MovementInput::decode(payload) {
        Ok(input) => input,
        Err(e) => {
            debug!("session {}: bad movement payload: {}", session.id, e);
            return;
        }
    };

    let update = {
        let mut state = session.state.write().await;
        match state.player.as_mut() {
            Some(player) => {
                if input.timestamp <= player.last_input_ticks {
                    // Stale or replayed input.
                    return;
                }
                player.dir_x = input.dir_x;
                player.dir_y = input.dir_y;
                player.last_input_ticks = input.timestamp;
                player.last_updated = Instant::now();
                Some(player.is_moving().then_some(player.id))
            }
            None => None,
        }
    };

    match update {
        None => {
            reply_error(server, session, MessageType::Unauthorized, tokens::LOGIN_REQUIRED).await;
        }
        Some(Some(player_id)) => {
            server
                .world
                .write()
                .await
                .moving_players
                .insert(player_id, session.id);
        }
        Some(None) => {}
    }
}

/// Returns another connected player's snapshot, but only to requesters
/// within view radius; anything else is silently dropped.
async fn handle_player_data(server: &GameServer, session: &Arc<Session>, payload: &[u8]) {
    let Some((rx, ry)) = session.position().await else {
        reply_error(server, session, MessageType::Unauthorized, tokens::LOGIN_REQUIRED).await;
        return;
    };
    let request = match PlayerDataRequest::decode(payload) {
        Ok(request) => request,
        Err(_) => {
            reply_error(server, session, MessageType::PlayerData, tokens::INVALID_REQUEST).await;
            return;
        }
    };

    let found = {
        let world = server.world.read().await;
        let mut found = None;
        for other in world.sessions.values() {
            let state = other.state.read().await;
            if let Some(player) = &state.player {
                if player.id == request.player_id {
                    found = Some((player.snapshot(), player.x, player.y));
                    break;
                }
            }
        }
        found
    };

    let Some((snapshot, tx, ty)) = found else {
        debug!("player data request for unknown player {}", request.player_id);
        return;
    };

    let dx = tx - rx;
    let dy = ty - ry;
    if (dx * dx + dy * dy).sqrt() > server.config.max_view_distance {
        return;
    }

    match snapshot.encode() {
        Ok(bytes) => {
            server
                .send_to(
                    session,
                    &Message::new(MessageType::PlayerData, bytes),
                    Transport::Stream,
                )
                .await;
        }
        Err(e) => warn!("player snapshot encode failed: {}", e),
    }
}

/// Whether a requested chunk is inside the requester's allowed view. The
/// comparison is squared-integer Euclidean with the `sqrt(2)` relaxation:
/// `dx² + dy² > 2·max²` rejects.
fn chunk_in_view(requested: (i64, i64), current: (i64, i64), max_chunk_view_distance: i64) -> bool {
    let dx = requested.0 - current.0;
    let dy = requested.1 - current.1;
    dx * dx + dy * dy <= 2 * max_chunk_view_distance * max_chunk_view_distance
}

fn tile_record(tile: &Tile) -> TileRecord {
    TileRecord {
        country_id: tile.owner_country_id,
        is_border: tile.is_border,
        tile_type: tile.tile_type,
        prefab_id: tile.prefab_id.unwrap_or(0),
        occupier_id: tile.occupier_country_id,
    }
}

/// Streams one 16x16 tile window to a client that is close enough to see
/// it. Out-of-range requests are dropped without a reply.
async fn handle_chunk_request(server: &GameServer, session: &Arc<Session>, payload: &[u8]) {
    let Some((px, py)) = session.position().await else {
        reply_error(server, session, MessageType::Unauthorized, tokens::LOGIN_REQUIRED).await;
        return;
    };
    let request = match ChunkRequest::decode(payload) {
        Ok(request) => request,
        Err(_) => {
            reply_error(server, session, MessageType::ChunkRequest, tokens::INVALID_REQUEST).await;
            return;
        }
    };

    let current = (
        (px.floor() as i64).div_euclid(CHUNK_SIZE as i64),
        (py.floor() as i64).div_euclid(CHUNK_SIZE as i64),
    );
    let requested = (request.chunk_x as i64, request.chunk_y as i64);
    if !chunk_in_view(requested, current, server.config.max_chunk_view_distance as i64) {
        debug!(
            "session {}: chunk ({}, {}) out of view from {:?}",
            session.id, request.chunk_x, request.chunk_y, current
        );
        return;
    }

    let chunk = {
        let world = server.world.read().await;
        let base_x = request.chunk_x as i32 * CHUNK_SIZE;
        let base_y = request.chunk_y as i32 * CHUNK_SIZE;
        let mut tiles = Vec::with_capacity(CHUNK_TILE_COUNT);
        for y in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                let record = world
                    .tile_at(base_x + x, base_y + y)
                    .map(tile_record)
                    .unwrap_or_else(TileRecord::water);
                tiles.push(record);
            }
        }
        ChunkData {
            chunk_x: request.chunk_x,
            chunk_y: request.chunk_y,
            tiles,
        }
    };

    // Encode also enforces the 256-tile contract.
    match chunk.encode() {
        Ok(bytes) => {
            server
                .send_to(
                    session,
                    &Message::new(MessageType::ChunkData, bytes),
                    Transport::Stream,
                )
                .await;
        }
        Err(e) => warn!("chunk encode failed: {}", e),
    }
}

/// Echoes the message back unchanged on the datagram channel.
async fn handle_ping(server: &GameServer, session: &Arc<Session>, msg: Message) {
    server.send_to(session, &msg, Transport::Datagram).await;
}
