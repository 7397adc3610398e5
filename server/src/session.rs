//! Session lifecycle and the session registry.
//!
//! A session is one logical client: a reliable stream (always present, as
//! an outbound writer channel) plus at most one bound datagram peer. The
//! registry lives in the world state; the operations here are the only code
//! that mutates it.
//!
//! Sessions die three ways — stream close, explicit disconnect, heartbeat
//! timeout — and all three funnel through `disconnect_session` so the
//! player is persisted and observers are told exactly once.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::{mpsc, RwLock};

use shared::Message;

use crate::network::GameServer;
use crate::world::Player;

/// A session goes idle after this long without any inbound message.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the reaper scans for idle sessions.
pub const REAPER_INTERVAL: Duration = Duration::from_secs(30);

/// Fields guarded by the per-session lock.
pub struct SessionState {
    /// Attached player; absent until a successful login.
    pub player: Option<Player>,
    /// Datagram peer, bound on the first datagram carrying this session id.
    pub udp_addr: Option<SocketAddr>,
    /// Refreshed on every inbound application message on either transport.
    pub last_heartbeat: Instant,
}

/// One connected client.
pub struct Session {
    /// Opaque 32-bit id, unique and stable for the session's lifetime.
    pub id: u32,
    stream_tx: mpsc::UnboundedSender<Vec<u8>>,
    pub state: RwLock<SessionState>,
}

impl Session {
    pub fn new(id: u32, stream_tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            id,
            stream_tx,
            state: RwLock::new(SessionState {
                player: None,
                udp_addr: None,
                last_heartbeat: Instant::now(),
            }),
        }
    }

    /// Queues a message on the reliable stream. The writer task owns the
    /// socket, so a slow peer never blocks the caller.
    pub fn send_stream(&self, msg: &Message) {
        let body = msg.encode();
        let mut frame = Vec::with_capacity(4 + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(&body);
        if self.stream_tx.send(frame).is_err() {
            debug!("session {}: stream writer gone, dropping message", self.id);
        }
    }

    /// Refreshes the heartbeat clock.
    pub async fn touch(&self) {
        self.state.write().await.last_heartbeat = Instant::now();
    }

    pub async fn is_idle(&self, timeout: Duration) -> bool {
        self.state.read().await.last_heartbeat.elapsed() > timeout
    }

    /// Player position, when logged in.
    pub async fn position(&self) -> Option<(f32, f32)> {
        let state = self.state.read().await;
        state.player.as_ref().map(|p| (p.x, p.y))
    }

    pub async fn player_id(&self) -> Option<u32> {
        let state = self.state.read().await;
        state.player.as_ref().map(|p| p.id)
    }

    pub async fn nickname(&self) -> Option<String> {
        let state = self.state.read().await;
        state.player.as_ref().map(|p| p.nickname.clone())
    }
}

impl GameServer {
    /// Registers a new session under a fresh random id.
    ///
    /// Fails when the registry is at capacity; the caller is expected to
    /// send `error.server.full` and close.
    pub async fn create_session(
        &self,
        stream_tx: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Option<Arc<Session>> {
        let mut world = self.world.write().await;
        if world.sessions.len() >= self.config.max_players {
            warn!("registry full ({} sessions), rejecting", world.sessions.len());
            return None;
        }

        // Uniformly random id, redrawn on collision.
        let mut id: u32 = rand::random();
        while world.sessions.contains_key(&id) {
            id = rand::random();
        }

        let session = Arc::new(Session::new(id, stream_tx));
        world.sessions.insert(id, Arc::clone(&session));
        info!("session {} created ({} online)", id, world.sessions.len());
        Some(session)
    }

    /// Binds the datagram peer address for a session on first contact.
    /// Returns false when the session is already bound to another address,
    /// in which case the datagram must be dropped.
    pub async fn bind_datagram(&self, session: &Session, addr: SocketAddr) -> bool {
        let mut state = session.state.write().await;
        match state.udp_addr {
            None => {
                state.udp_addr = Some(addr);
                info!("session {}: bound udp peer {}", session.id, addr);
                true
            }
            Some(bound) if bound == addr => true,
            Some(bound) => {
                warn!(
                    "session {}: datagram from {} but bound to {}, dropping",
                    session.id, addr, bound
                );
                false
            }
        }
    }

    pub async fn lookup_session(&self, session_id: u32) -> Option<Arc<Session>> {
        self.world.read().await.sessions.get(&session_id).cloned()
    }

    /// Tears down a session: persists the player best-effort, removes it
    /// from the registry and tells observers in range. Safe to call twice;
    /// only the call that actually removes the session does any work.
    pub async fn disconnect_session(&self, session: &Arc<Session>) {
        let player = {
            let mut world = self.world.write().await;
            if world.sessions.remove(&session.id).is_none() {
                return;
            }
            let player = session.state.read().await.player.clone();
            if let Some(ref p) = player {
                world.moving_players.remove(&p.id);
            }
            player
        };

        info!("session {} disconnected", session.id);

        if let Some(player) = player {
            if let Err(e) = self.store.save_players(&[player.clone()]).await {
                warn!("failed to persist player {}: {}", player.nickname, e);
            }
            let left = shared::PlayerLeft {
                player_id: player.id,
            };
            self.broadcast_in_range(
                Message::new(shared::MessageType::PlayerLeft, left.encode()),
                player.x,
                player.y,
                crate::broadcast::Transport::Stream,
                Some(session.id),
            )
            .await;
        }
    }

    /// Periodic idle-session reaper.
    pub async fn run_session_reaper(self: Arc<Self>) {
        let mut interval = tokio::time::interval(REAPER_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;

            let sessions: Vec<Arc<Session>> = {
                let world = self.world.read().await;
                world.sessions.values().cloned().collect()
            };

            for session in sessions {
                if session.is_idle(HEARTBEAT_TIMEOUT).await {
                    info!("session {} idle beyond timeout, evicting", session.id);
                    self.disconnect_session(&session).await;
                }
            }
        }
    }
}
