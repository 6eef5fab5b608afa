//! # Grid Arena Server Library
//!
//! This library provides the authoritative server for the grid arena. It owns
//! the canonical participant records, validates every command clients send,
//! resolves collisions and damage, and streams per-observer partial updates
//! so each client can keep its mirror of the world in sync.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Every participant runs through a small state machine: idle, moving,
//! dashing, casting, dead. The server re-validates each command with the same
//! rule function the client predicts with, so a well-behaved client almost
//! never sees a rejection.
//!
//! ### Command Gate
//! Each connection has its own sliding-window and minimum-interval limiter.
//! Excess commands are rejected before they reach the state machine.
//!
//! ### Snapshot Deltas
//! Each connection has an independent sync schedule. On every due sync the
//! server diffs the registry against what that observer was last told and
//! sends only the participants that changed, including a single explicit
//! zero when a timer expires.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! The server processes packets, ticks, deferred cast completions and the
//! liveness sweep on one loop. Deferred work captures ids, never references,
//! and re-resolves the participant when it fires.
//!
//! ### UDP-Based Communication
//! Packets are `bincode`-encoded [`shared::Packet`] values over a single UDP
//! socket. Receiving, sending and timeout checking run as separate tasks that
//! talk to the main loop over channels.
//!
//! ## Module Organization
//!
//! - `client_manager`: connection lifecycle, gates, snapshot caches, sync schedules
//! - `delta`: per-observer snapshot delta encoder
//! - `game`: state machine, collision resolver, respawn scheduler
//! - `network`: UDP server and main loop
//! - `registry`: participant records and spawn allocation
//! - `scheduler`: deferred events
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:8080".to_string(),
//!         ..ServerConfig::default()
//!     };
//!     let mut server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod delta;
pub mod game;
pub mod network;
pub mod registry;
pub mod scheduler;

use shared::{CLIENT_TIMEOUT, MAP_SEED, SYNC_INTERVAL};
use std::time::Duration;

/// Runtime settings for [`network::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Main loop period. Should be no longer than `sync_interval`.
    pub tick_duration: Duration,
    /// Period of each connection's delta sync.
    pub sync_interval: Duration,
    pub max_clients: usize,
    pub client_timeout: Duration,
    pub map_seed: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            tick_duration: Duration::from_millis(10),
            sync_interval: Duration::from_secs_f64(SYNC_INTERVAL),
            max_clients: 32,
            client_timeout: Duration::from_secs_f64(CLIENT_TIMEOUT),
            map_seed: MAP_SEED,
        }
    }
}
