//! Interest management: who hears about what, and over which transport.
//!
//! Both primitives copy the session list under the world lock, release it,
//! and only then touch individual sessions. Every delivery runs on its own
//! task so one slow recipient cannot stall the tick loop or a handler.

use std::sync::Arc;

use shared::Message;

use crate::network::GameServer;
use crate::reliability::Netcode;
use crate::session::Session;

/// Which channel carries an outgoing message.
///
/// Movement and ping ride datagrams; login, chat, join/leave, sync-state
/// and chunk data ride the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stream,
    Datagram,
}

/// One delivery to one session; the unit of fan-out.
async fn deliver(net: Arc<Netcode>, session: Arc<Session>, msg: Message, transport: Transport) {
    match transport {
        Transport::Stream => session.send_stream(&msg),
        Transport::Datagram => net.send_datagram(session, msg).await,
    }
}

impl GameServer {
    /// Sends one message to one session over the chosen transport.
    pub async fn send_to(&self, session: &Arc<Session>, msg: &Message, transport: Transport) {
        deliver(
            Arc::clone(&self.net),
            Arc::clone(session),
            msg.clone(),
            transport,
        )
        .await;
    }

    /// Delivers `msg` to every logged-in session, optionally excluding one
    /// (typically the originator).
    pub async fn broadcast(&self, msg: Message, transport: Transport, except: Option<u32>) {
        let sessions: Vec<Arc<Session>> = {
            let world = self.world.read().await;
            world.sessions.values().cloned().collect()
        };

        for session in sessions {
            if Some(session.id) == except {
                continue;
            }
            if session.player_id().await.is_none() {
                continue;
            }
            tokio::spawn(deliver(
                Arc::clone(&self.net),
                session,
                msg.clone(),
                transport,
            ));
        }
    }

    /// Delivers `msg` to every logged-in session whose player is within
    /// the view radius of `(cx, cy)`. Distance is Euclidean in tile units
    /// and read under the per-session lock at the moment of the send
    /// decision.
    pub async fn broadcast_in_range(
        &self,
        msg: Message,
        cx: f32,
        cy: f32,
        transport: Transport,
        except: Option<u32>,
    ) {
        let radius = self.config.max_view_distance;
        let sessions: Vec<Arc<Session>> = {
            let world = self.world.read().await;
            world.sessions.values().cloned().collect()
        };

        for session in sessions {
            if Some(session.id) == except {
                continue;
            }
            let Some((x, y)) = session.position().await else {
                continue;
            };
            let dx = x - cx;
            let dy = y - cy;
            if (dx * dx + dy * dy).sqrt() > radius {
                continue;
            }
            tokio::spawn(deliver(
                Arc::clone(&self.net),
                session,
                msg.clone(),
                transport,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use tokio::net::UdpSocket;
    use tokio::sync::mpsc;

    use shared::MessageType;

    use crate::config::test_config;
    use crate::persistence::Store;
    use crate::world::Player;

    async fn test_server() -> Arc<GameServer> {
        let udp = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        Arc::new(GameServer::new(test_config(), Store::disconnected(), udp))
    }

    fn player_at(id: u32, x: f32, y: f32) -> Player {
        Player {
            id,
            nickname: format!("player{}", id),
            country_id: 1,
            exp: 0,
            rank: 1,
            health: 100,
            max_health: 100,
            x,
            y,
            dir_x: 0.0,
            dir_y: 0.0,
            unit_id: None,
            last_input_ticks: 0.0,
            last_updated: Instant::now(),
        }
    }

    async fn add_session(
        server: &Arc<GameServer>,
        id: u32,
        player: Option<Player>,
    ) -> (Arc<Session>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(id, tx));
        session.state.write().await.player = player;
        server
            .world
            .write()
            .await
            .sessions
            .insert(id, Arc::clone(&session));
        (session, rx)
    }

    async fn recv_message(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Option<Message> {
        let frame = tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv())
            .await
            .ok()??;
        Message::decode(&frame[4..]).ok()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_logged_in_sessions_only() {
        let server = test_server().await;
        let (_a, mut rx_a) = add_session(&server, 1, Some(player_at(10, 0.0, 0.0))).await;
        let (_b, mut rx_b) = add_session(&server, 2, None).await;

        server
            .broadcast(
                Message::new(MessageType::Chat, vec![7]),
                Transport::Stream,
                None,
            )
            .await;

        let got = recv_message(&mut rx_a).await.unwrap();
        assert_eq!(got.msg_type, MessageType::Chat);
        assert!(recv_message(&mut rx_b).await.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_excludes_originator() {
        let server = test_server().await;
        let (_a, mut rx_a) = add_session(&server, 1, Some(player_at(10, 0.0, 0.0))).await;
        let (_b, mut rx_b) = add_session(&server, 2, Some(player_at(11, 1.0, 1.0))).await;

        server
            .broadcast(
                Message::new(MessageType::Chat, vec![]),
                Transport::Stream,
                Some(1),
            )
            .await;

        assert!(recv_message(&mut rx_a).await.is_none());
        assert!(recv_message(&mut rx_b).await.is_some());
    }

    #[tokio::test]
    async fn test_in_range_gate() {
        let server = test_server().await;
        // View radius is 48 tiles (16 * 3).
        let (_near, mut rx_near) = add_session(&server, 1, Some(player_at(10, 10.0, 0.0))).await;
        let (_far, mut rx_far) = add_session(&server, 2, Some(player_at(11, 100.0, 0.0))).await;

        server
            .broadcast_in_range(
                Message::new(MessageType::PlayerJoined, vec![]),
                0.0,
                0.0,
                Transport::Stream,
                None,
            )
            .await;

        assert!(recv_message(&mut rx_near).await.is_some());
        assert!(recv_message(&mut rx_far).await.is_none());
    }

    #[tokio::test]
    async fn test_in_range_boundary_is_inclusive() {
        let server = test_server().await;
        let (_edge, mut rx_edge) = add_session(&server, 1, Some(player_at(10, 48.0, 0.0))).await;
        let (_beyond, mut rx_beyond) = add_session(&server, 2, Some(player_at(11, 48.5, 0.0))).await;

        server
            .broadcast_in_range(
                Message::new(MessageType::PlayerMovement, vec![]),
                0.0,
                0.0,
                Transport::Stream,
                None,
            )
            .await;

        assert!(recv_message(&mut rx_edge).await.is_some());
        assert!(recv_message(&mut rx_beyond).await.is_none());
    }
}
