//! Datagram reliability: reassembly, selective retransmission and acks.
//!
//! Outbound: an envelope is fragmented, every fragment is sent, and the
//! whole set is cached. Ack-required messages get a waiter task that
//! retransmits on a short timeout; everything else stays cached long enough
//! to service `RESEND` requests.
//!
//! Inbound: fragments accumulate in per-message buffers. A sweeper asks for
//! missing pieces of buffers that have gone silent, with a per-fragment
//! retry budget, and abandons buffers whose budget is spent.
//!
//! All of this state lives in [`Netcode`], one shared value owned by the
//! server for its whole lifetime.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;

use shared::{join_fragments, split_into_fragments, Ack, Fragment, Message, ResendRequest};

use crate::network::GameServer;
use crate::session::Session;

/// A receive buffer goes silent after this long without a new fragment.
pub const REASSEMBLY_SILENCE: Duration = Duration::from_secs(2);

/// Sweep cadence for silent buffers.
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// How many times one missing fragment index may be requested.
pub const MAX_RETRY_PER_CHUNK: u32 = 3;

/// Minimum spacing between two requests for the same index.
pub const RETRY_COOLDOWN: Duration = Duration::from_secs(1);

/// Ack wait per attempt for ack-required sends.
pub const ACK_TIMEOUT: Duration = Duration::from_millis(50);

/// Full-retransmit attempts before an ack-required send is abandoned.
pub const ACK_MAX_RETRIES: u32 = 3;

/// Fire-and-forget sends stay cached this long for RESEND servicing.
pub const SENT_CACHE_TTL: Duration = Duration::from_secs(10);

/// An in-progress reassembly of one fragmented message.
pub struct ReassemblyBuffer {
    pub total: u8,
    pub fragments: Vec<Option<Vec<u8>>>,
    pub received: u8,
    pub last_update: Instant,
    /// Datagram peer the fragments came from; RESENDs go back there.
    pub addr: SocketAddr,
    pub tries: HashMap<u8, u32>,
    pub last_request: HashMap<u8, Instant>,
}

impl ReassemblyBuffer {
    pub fn new(total: u8, addr: SocketAddr) -> Self {
        Self {
            total,
            fragments: vec![None; total as usize],
            received: 0,
            last_update: Instant::now(),
            addr,
            tries: HashMap::new(),
            last_request: HashMap::new(),
        }
    }

    /// Stores a fragment body; duplicates at the same index are ignored.
    pub fn store(&mut self, index: u8, body: &[u8]) {
        if let Some(slot) = self.fragments.get_mut(index as usize) {
            if slot.is_none() {
                *slot = Some(body.to_vec());
                self.received += 1;
            }
        }
        self.last_update = Instant::now();
    }

    pub fn is_complete(&self) -> bool {
        self.received >= self.total
    }

    /// Missing indices eligible for a resend request right now. Updates the
    /// per-index bookkeeping for every index it returns. The second value
    /// is true when every missing index has used its full retry budget.
    pub fn collect_missing(&mut self, now: Instant) -> (Vec<u8>, bool) {
        let mut missing = Vec::new();
        let mut exhausted = true;
        for index in 0..self.total {
            if self.fragments[index as usize].is_some() {
                continue;
            }
            let tries = self.tries.get(&index).copied().unwrap_or(0);
            if tries >= MAX_RETRY_PER_CHUNK {
                continue;
            }
            exhausted = false;
            if let Some(last) = self.last_request.get(&index) {
                if now.duration_since(*last) < RETRY_COOLDOWN {
                    continue;
                }
            }
            missing.push(index);
            self.tries.insert(index, tries + 1);
            self.last_request.insert(index, now);
        }
        (missing, exhausted)
    }
}

/// A fragmented message we sent, kept for retransmission.
pub struct SentMessage {
    /// Fully encoded `NORMAL` packets, resendable as-is.
    pub packets: Vec<Vec<u8>>,
    pub session_id: u32,
    pub addr: SocketAddr,
    pub sent_at: Instant,
    /// Present only for ack-required message types.
    pub ack: Option<Arc<Notify>>,
}

/// The datagram socket plus all reliability state. Cheap to share across
/// tasks; torn down with the server.
pub struct Netcode {
    pub udp: Arc<UdpSocket>,
    /// Open reassembly buffers keyed by `(session_id, message_id)`.
    reassembly: Mutex<HashMap<(u32, u32), ReassemblyBuffer>>,
    /// Recently sent fragmented messages.
    sent: Mutex<HashMap<u32, SentMessage>>,
    next_message_id: AtomicU32,
}

impl Netcode {
    pub fn new(udp: Arc<UdpSocket>) -> Self {
        Self {
            udp,
            reassembly: Mutex::new(HashMap::new()),
            sent: Mutex::new(HashMap::new()),
            next_message_id: AtomicU32::new(1),
        }
    }

    /// Fragments and transmits a message on the datagram channel. A session
    /// with no bound datagram peer silently loses the message; the stream
    /// is the channel for anything that cannot be lost.
    pub async fn send_datagram(self: Arc<Self>, session: Arc<Session>, msg: Message) {
        let Some(addr) = session.state.read().await.udp_addr else {
            debug!("session {}: no datagram peer bound, dropping send", session.id);
            return;
        };

        let data = msg.encode();
        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let packets = match split_into_fragments(session.id, message_id, &data) {
            Ok(packets) => packets,
            Err(e) => {
                warn!("session {}: cannot fragment message: {}", session.id, e);
                return;
            }
        };

        for packet in &packets {
            if let Err(e) = self.udp.send_to(packet, addr).await {
                warn!("udp send to {} failed: {}", addr, e);
                break;
            }
        }

        let ack = msg.msg_type.requires_ack().then(|| Arc::new(Notify::new()));
        self.sent.lock().await.insert(
            message_id,
            SentMessage {
                packets,
                session_id: session.id,
                addr,
                sent_at: Instant::now(),
                ack: ack.clone(),
            },
        );

        if let Some(notify) = ack {
            tokio::spawn(Arc::clone(&self).await_ack(message_id, notify));
        }
    }

    /// Companion task for an ack-required send: waits 50 ms per attempt,
    /// retransmits the full fragment set on each timeout, and frees the
    /// cache entry on ack or after the retry budget is spent.
    async fn await_ack(self: Arc<Self>, message_id: u32, notify: Arc<Notify>) {
        for _ in 0..ACK_MAX_RETRIES {
            if timeout(ACK_TIMEOUT, notify.notified()).await.is_ok() {
                self.sent.lock().await.remove(&message_id);
                return;
            }

            let resend = {
                let sent = self.sent.lock().await;
                sent.get(&message_id)
                    .map(|entry| (entry.packets.clone(), entry.addr))
            };
            match resend {
                Some((packets, addr)) => {
                    debug!("message {}: ack timeout, retransmitting", message_id);
                    for packet in &packets {
                        if self.udp.send_to(packet, addr).await.is_err() {
                            break;
                        }
                    }
                }
                None => return,
            }
        }
        debug!("message {}: unacked after {} attempts", message_id, ACK_MAX_RETRIES);
        self.sent.lock().await.remove(&message_id);
    }

    /// Services a peer's request for fragments it never received.
    pub async fn handle_resend(&self, src: SocketAddr, request: ResendRequest) {
        let packets = {
            let sent = self.sent.lock().await;
            let Some(entry) = sent.get(&request.message_id) else {
                debug!("resend request for unknown message {}", request.message_id);
                return;
            };
            if entry.addr != src {
                warn!(
                    "resend for message {} from {} but sent to {}, dropping",
                    request.message_id, src, entry.addr
                );
                return;
            }
            request
                .indices
                .iter()
                .filter_map(|&index| entry.packets.get(index as usize).cloned())
                .collect::<Vec<_>>()
        };

        for packet in &packets {
            if let Err(e) = self.udp.send_to(packet, src).await {
                debug!("resend to {} failed: {}", src, e);
                break;
            }
        }
    }

    /// Signals the waiter of an ack-required send.
    pub async fn handle_ack(&self, src: SocketAddr, ack: Ack) {
        let sent = self.sent.lock().await;
        let Some(entry) = sent.get(&ack.message_id) else {
            return;
        };
        if entry.addr != src {
            warn!(
                "ack for message {} from {} but sent to {}, ignoring",
                ack.message_id, src, entry.addr
            );
            return;
        }
        if let Some(notify) = &entry.ack {
            notify.notify_one();
        }
    }

    /// One pass of the missing-fragment sweeper: requests eligible missing
    /// indices of silent buffers and abandons buffers whose budget is gone.
    pub async fn sweep_reassembly(&self) {
        let now = Instant::now();
        let mut requests = Vec::new();
        {
            let mut table = self.reassembly.lock().await;
            table.retain(|&(session_id, message_id), buffer| {
                if buffer.is_complete() {
                    return true;
                }
                if now.duration_since(buffer.last_update) < REASSEMBLY_SILENCE {
                    return true;
                }
                let (missing, exhausted) = buffer.collect_missing(now);
                if !missing.is_empty() {
                    info!(
                        "session {}: requesting resend of message {} indices {:?}",
                        session_id, message_id, missing
                    );
                    requests.push((
                        buffer.addr,
                        ResendRequest {
                            message_id,
                            indices: missing,
                        },
                    ));
                }
                if exhausted {
                    warn!(
                        "session {}: abandoning message {} ({}/{} fragments)",
                        session_id, message_id, buffer.received, buffer.total
                    );
                }
                !exhausted
            });
        }

        for (addr, request) in requests {
            if let Err(e) = self.udp.send_to(&request.encode(), addr).await {
                debug!("resend request to {} failed: {}", addr, e);
            }
        }
    }

    /// Periodic sweeper task.
    pub async fn run_reassembly_sweeper(self: Arc<Self>) {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            self.sweep_reassembly().await;
        }
    }

    /// Evicts sent-cache entries past their RESEND-servicing window.
    /// Ack-required entries are freed by their waiter tasks well before the
    /// TTL; this pass is the backstop for fire-and-forget sends.
    pub async fn run_sent_cache_reaper(self: Arc<Self>) {
        let mut interval = tokio::time::interval(SENT_CACHE_TTL);
        loop {
            interval.tick().await;
            let mut sent = self.sent.lock().await;
            sent.retain(|_, entry| entry.sent_at.elapsed() < SENT_CACHE_TTL);
        }
    }
}

impl GameServer {
    /// Processes one inbound `NORMAL` packet: session lookup, address
    /// binding, reassembly. Returns the session and the decoded message
    /// once the final fragment lands.
    pub async fn handle_fragment(
        &self,
        src: SocketAddr,
        fragment: Fragment<'_>,
    ) -> Option<(Arc<Session>, Message)> {
        let Some(session) = self.lookup_session(fragment.session_id).await else {
            debug!("fragment for unknown session {} from {}", fragment.session_id, src);
            return None;
        };

        // Bind-on-first-datagram; a mismatched source is a spoof and is
        // dropped without touching the buffer.
        if !self.bind_datagram(&session, src).await {
            return None;
        }

        let message_id = fragment.message_id;
        let completed = {
            let mut table = self.net.reassembly.lock().await;
            let buffer = table
                .entry((fragment.session_id, message_id))
                .or_insert_with(|| ReassemblyBuffer::new(fragment.total, src));
            buffer.store(fragment.index, fragment.body);
            if buffer.is_complete() {
                table.remove(&(fragment.session_id, message_id))
            } else {
                None
            }
        };

        let buffer = completed?;
        let bodies: Vec<Vec<u8>> = buffer.fragments.into_iter().flatten().collect();
        let data = join_fragments(&bodies);

        match Message::decode(&data) {
            Ok(msg) => {
                if msg.msg_type.requires_ack() {
                    let ack = Ack { message_id };
                    if let Err(e) = self.net.udp.send_to(&ack.encode(), src).await {
                        debug!("ack send to {} failed: {}", src, e);
                    }
                }
                Some((session, msg))
            }
            Err(e) => {
                warn!(
                    "session {}: reassembled message {} undecodable: {}",
                    fragment.session_id, message_id, e
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn test_store_and_complete() {
        let mut buffer = ReassemblyBuffer::new(3, addr());
        buffer.store(2, b"c");
        buffer.store(0, b"a");
        assert!(!buffer.is_complete());
        buffer.store(1, b"b");
        assert!(buffer.is_complete());

        let bodies: Vec<Vec<u8>> = buffer.fragments.into_iter().flatten().collect();
        assert_eq!(join_fragments(&bodies), b"abc");
    }

    #[test]
    fn test_duplicate_fragments_ignored() {
        let mut buffer = ReassemblyBuffer::new(2, addr());
        buffer.store(0, b"first");
        buffer.store(0, b"second");
        assert_eq!(buffer.received, 1);
        assert_eq!(buffer.fragments[0].as_deref(), Some(&b"first"[..]));
    }

    #[test]
    fn test_out_of_range_index_ignored() {
        let mut buffer = ReassemblyBuffer::new(2, addr());
        buffer.store(5, b"x");
        assert_eq!(buffer.received, 0);
    }

    #[test]
    fn test_collect_missing_respects_retry_budget() {
        let mut buffer = ReassemblyBuffer::new(2, addr());
        buffer.store(0, b"a");

        let mut now = Instant::now();
        for attempt in 0..MAX_RETRY_PER_CHUNK {
            let (missing, exhausted) = buffer.collect_missing(now);
            assert_eq!(missing, vec![1], "attempt {}", attempt);
            assert!(!exhausted);
            now += RETRY_COOLDOWN;
        }

        // Budget spent: nothing left to request, buffer is abandonable.
        let (missing, exhausted) = buffer.collect_missing(now);
        assert!(missing.is_empty());
        assert!(exhausted);
    }

    #[test]
    fn test_collect_missing_respects_cooldown() {
        let mut buffer = ReassemblyBuffer::new(2, addr());
        buffer.store(0, b"a");

        let now = Instant::now();
        let (missing, _) = buffer.collect_missing(now);
        assert_eq!(missing, vec![1]);

        // Immediately again: still cooling down, but not exhausted.
        let (missing, exhausted) = buffer.collect_missing(now + Duration::from_millis(100));
        assert!(missing.is_empty());
        assert!(!exhausted);
    }

    #[test]
    fn test_collect_missing_multiple_indices() {
        let mut buffer = ReassemblyBuffer::new(5, addr());
        buffer.store(1, b"b");
        buffer.store(3, b"d");
        let (missing, exhausted) = buffer.collect_missing(Instant::now());
        assert_eq!(missing, vec![0, 2, 4]);
        assert!(!exhausted);
    }

    #[tokio::test]
    async fn test_ack_frees_sent_entry() {
        let udp = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let net = Arc::new(Netcode::new(udp));
        let peer: SocketAddr = "127.0.0.1:9001".parse().unwrap();

        let notify = Arc::new(Notify::new());
        net.sent.lock().await.insert(
            5,
            SentMessage {
                packets: vec![vec![1, 2, 3]],
                session_id: 1,
                addr: peer,
                sent_at: Instant::now(),
                ack: Some(Arc::clone(&notify)),
            },
        );

        let waiter = tokio::spawn(Arc::clone(&net).await_ack(5, Arc::clone(&notify)));
        net.handle_ack(peer, Ack { message_id: 5 }).await;
        waiter.await.unwrap();

        assert!(!net.sent.lock().await.contains_key(&5));
    }

    #[tokio::test]
    async fn test_unacked_message_gives_up_after_budget() {
        let udp = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let net = Arc::new(Netcode::new(udp));
        let peer: SocketAddr = "127.0.0.1:9001".parse().unwrap();

        let notify = Arc::new(Notify::new());
        net.sent.lock().await.insert(
            6,
            SentMessage {
                packets: vec![vec![9]],
                session_id: 1,
                addr: peer,
                sent_at: Instant::now(),
                ack: Some(Arc::clone(&notify)),
            },
        );

        Arc::clone(&net).await_ack(6, notify).await;
        assert!(!net.sent.lock().await.contains_key(&6));
    }

    #[tokio::test]
    async fn test_ack_from_wrong_address_ignored() {
        let udp = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let net = Arc::new(Netcode::new(udp));
        let peer: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let wrong: SocketAddr = "127.0.0.1:9002".parse().unwrap();

        let notify = Arc::new(Notify::new());
        net.sent.lock().await.insert(
            7,
            SentMessage {
                packets: vec![vec![9]],
                session_id: 1,
                addr: peer,
                sent_at: Instant::now(),
                ack: Some(Arc::clone(&notify)),
            },
        );

        net.handle_ack(wrong, Ack { message_id: 7 }).await;
        // No permit was stored: the waiter would still be waiting. Verify
        // via the non-blocking path: a correct ack still works.
        net.handle_ack(peer, Ack { message_id: 7 }).await;
        Arc::clone(&net).await_ack(7, notify).await;
        assert!(!net.sent.lock().await.contains_key(&7));
    }
}
