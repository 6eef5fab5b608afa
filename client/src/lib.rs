//! # Grid Arena Client Library
//!
//! This library provides the client side of the grid arena: a text console
//! that reads commands, predicts their effect locally, and keeps a mirror of
//! the server's world up to date.
//!
//! ## Architecture Overview
//!
//! ### Client-Side Prediction
//! Commands are checked against the same rule function and the same Command
//! Gate the server uses. A command the server would certainly reject is never
//! sent; one it will accept shows up locally with no round-trip delay.
//!
//! ### Server Reconciliation
//! Confirmations whose position differs slightly from the prediction are
//! absorbed by interpolation. Rejections snap the mirror to the server's
//! position and purge the queued inputs.
//!
//! ### Clock Translation
//! The server sends absolute timestamps from its own clock. Every message is
//! translated into the local time base with a fresh [`shared::ClockTranslator`],
//! so drift is overwritten rather than accumulated.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The client mirror: own predicted participant, remote participants,
//! pending-action queue, dash auto-stepping and render interpolation.
//!
//! ### Input Module (`input`)
//! Parses console lines into sequenced commands.
//!
//! ### Network Module (`network`)
//! UDP socket, handshake, heartbeat, optional simulated latency, and the
//! frame loop that drives the mirror.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut client = Client::new("127.0.0.1:8080", 0).await?;
//!     client.run().await
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
