//! # Authoritative Game Server Library
//!
//! The server side of a persistent grid-based multiplayer world. Clients
//! connect over a dual transport — a reliable TCP stream for control and
//! state synchronisation plus UDP datagrams for high-frequency movement —
//! authenticate by nickname, stream 16x16 map chunks around their position,
//! move under server-side physics and chat, with their state checkpointed
//! to Postgres.
//!
//! ## Architecture
//!
//! Everything hangs off one [`network::GameServer`] value constructed at
//! startup: the world state behind a reader-writer lock, the session
//! registry, the datagram reliability tables and the persistence store.
//! Per-connection tasks feed decoded messages to the handlers; a
//! fixed-rate tick task integrates movement and publishes results through
//! the interest manager; periodic tasks sweep reassembly buffers, evict
//! idle sessions and checkpoint state.
//!
//! ## Module Organization
//!
//! - [`config`] — environment-driven configuration
//! - [`network`] — listeners, framing, the central server value
//! - [`session`] — session lifecycle and registry
//! - [`reliability`] — fragmentation reassembly, acks, retransmission
//! - [`world`] — tiles, countries, units, the moving-players index
//! - [`broadcast`] — interest management over both transports
//! - [`tick`] — the authoritative simulation loop
//! - [`handlers`] — one handler per application message type
//! - [`persistence`] — Postgres store and the checkpoint sink
//! - [`worldgen`] — GeoJSON to tile-grid generation
//!
//! The wire protocol itself lives in the `shared` crate.

pub mod broadcast;
pub mod config;
pub mod error_tokens;
pub mod handlers;
pub mod network;
pub mod persistence;
pub mod reliability;
pub mod session;
pub mod tick;
pub mod world;
pub mod worldgen;
