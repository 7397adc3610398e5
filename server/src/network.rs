//! Listeners and the central server value.
//!
//! The same port is bound twice: a TCP listener for the reliable stream and
//! a UDP socket for the datagram channel. Each TCP connection gets a reader
//! task and a writer task; the writer drains the session's outbound channel
//! so broadcasts never block on a slow peer. The UDP socket is shared and
//! demultiplexed by the session id carried in every `NORMAL` packet.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{mpsc, RwLock};

use shared::{Datagram, Message, MessageType, Welcome, MAX_STREAM_FRAME};

use crate::config::Config;
use crate::error_tokens;
use crate::handlers;
use crate::persistence::Store;
use crate::reliability::Netcode;
use crate::session::Session;
use crate::world::{Country, Tile, Unit, World};

/// Process-wide server state, constructed once at startup.
///
/// The datagram reliability tables live in [`Netcode`] as fields of this
/// value rather than globals; their lifetime is the server's lifetime.
pub struct GameServer {
    pub config: Config,
    pub world: RwLock<World>,
    pub store: Store,
    pub net: Arc<Netcode>,
}

impl GameServer {
    pub fn new(config: Config, store: Store, udp: Arc<UdpSocket>) -> Self {
        Self {
            config,
            world: RwLock::new(World::new()),
            store,
            net: Arc::new(Netcode::new(udp)),
        }
    }

    /// Seeds the world with the persisted data sets loaded at startup.
    pub async fn load_world(&self, countries: Vec<Country>, units: Vec<Unit>, tiles: Vec<Tile>) {
        let mut world = self.world.write().await;
        for country in countries {
            world.countries.insert(country.id, country);
        }
        for unit in units {
            world.units.insert(unit.id, unit);
        }
        for tile in tiles {
            world.tiles.insert((tile.x, tile.y), tile);
        }
        info!(
            "world loaded: {} countries, {} units, {} tiles",
            world.countries.len(),
            world.units.len(),
            world.tiles.len()
        );
    }

    /// Accept loop for the reliable stream listener.
    pub async fn run_tcp_listener(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("stream connection from {}", addr);
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        server.handle_stream_connection(stream).await;
                    });
                }
                Err(e) => {
                    error!("accept failed: {}", e);
                }
            }
        }
    }

    /// Owns one TCP connection from accept to teardown.
    async fn handle_stream_connection(self: Arc<Self>, stream: TcpStream) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed: {}", e);
        }
        let (reader, writer) = stream.into_split();

        let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::spawn(run_stream_writer(writer, rx));

        // First action after accept: assign a session id, or turn the
        // client away when the registry is full.
        let session = match self.create_session(tx.clone()).await {
            Some(session) => session,
            None => {
                let reject = Message::error(MessageType::System, error_tokens::SERVER_FULL);
                let body = reject.encode();
                let mut frame = Vec::with_capacity(4 + body.len());
                frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
                frame.extend_from_slice(&body);
                let _ = tx.send(frame);
                return;
            }
        };

        let welcome = Welcome {
            session_id: session.id,
        };
        session.send_stream(&Message::new(MessageType::Welcome, welcome.encode()));

        self.run_stream_reader(reader, &session).await;

        // Stream closed or peer asked to leave; either way the session ends.
        self.disconnect_session(&session).await;
    }

    /// Blocking read loop for one stream peer. Handler invocations for this
    /// peer run in the order the peer sent them.
    async fn run_stream_reader(&self, mut reader: OwnedReadHalf, session: &Arc<Session>) {
        let mut len_buf = [0u8; 4];
        loop {
            if reader.read_exact(&mut len_buf).await.is_err() {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_STREAM_FRAME {
                warn!("session {}: oversized frame ({} bytes)", session.id, len);
                break;
            }

            let mut body = vec![0u8; len];
            if reader.read_exact(&mut body).await.is_err() {
                break;
            }

            match Message::decode(&body) {
                Ok(msg) => {
                    let disconnect = msg.msg_type == MessageType::Disconnect;
                    handlers::dispatch(self, session, msg).await;
                    if disconnect {
                        break;
                    }
                }
                Err(e) => {
                    warn!("session {}: undecodable frame: {}", session.id, e);
                }
            }
        }
    }

    /// Receive loop for the shared datagram socket.
    pub async fn run_udp_listener(self: Arc<Self>) {
        let mut buf = [0u8; 2048];
        loop {
            let (len, addr) = match self.net.udp.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    error!("udp recv failed: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    continue;
                }
            };

            match Datagram::parse(&buf[..len]) {
                Ok(Datagram::Fragment(fragment)) => {
                    if let Some((session, msg)) = self.handle_fragment(addr, fragment).await {
                        let server = Arc::clone(&self);
                        tokio::spawn(async move {
                            handlers::dispatch(&server, &session, msg).await;
                        });
                    }
                }
                Ok(Datagram::Resend(request)) => {
                    self.net.handle_resend(addr, request).await;
                }
                Ok(Datagram::Ack(ack)) => {
                    self.net.handle_ack(addr, ack).await;
                }
                Err(e) => {
                    debug!("malformed datagram from {}: {}", addr, e);
                }
            }
        }
    }
}

/// Drains a session's outbound frames onto the TCP socket.
async fn run_stream_writer(writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    let mut writer = BufWriter::new(writer);
    while let Some(frame) = rx.recv().await {
        if writer.write_all(&frame).await.is_err() {
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
    }
}
