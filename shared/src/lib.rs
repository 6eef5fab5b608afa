//! Logic shared by the authoritative server and the predicting client.
//!
//! Nothing in this crate performs I/O. Every function that depends on time
//! takes `now` explicitly, in seconds, so the server and the client can feed
//! it their own clocks and tests can feed it fixed values.

pub mod clock;
pub mod error;
pub mod gate;
pub mod grid;
pub mod protocol;
pub mod rules;
pub mod state;

pub use clock::{now_secs, ClockTranslator};
pub use error::{CommandError, RejectReason};
pub use gate::{CommandGate, GateConfig};
pub use grid::Grid;
pub use protocol::{Packet, ParticipantDelta};
pub use rules::{apply_outcome, hit_available, validate, Command, Outcome};
pub use state::{Activity, Cell, Direction, ParticipantState};

pub const PROTOCOL_VERSION: u32 = 2;

/// Largest UDP payload over IPv4; receive buffers on both sides use this size.
pub const MAX_PACKET_SIZE: usize = 65_507;

pub const GRID_WIDTH: i32 = 50;
pub const GRID_HEIGHT: i32 = 50;
pub const MAP_SEED: u32 = 0x5eed_1234;

pub const MAX_HEALTH: u8 = 3;

pub const HIT_COOLDOWN: f64 = 1.0;
pub const RESPAWN_DELAY: f64 = 3.0;
pub const DASH_DURATION: f64 = 0.25;
pub const DASH_COOLDOWN: f64 = 3.0;
pub const CAST_TIME: f64 = 1.5;
pub const MANA_COOLDOWN: f64 = 5.0;

pub const MOVE_INTERVAL: f64 = 0.15;
pub const DASH_COMMAND_INTERVAL: f64 = 0.5;
pub const RATE_LIMIT_WINDOW: f64 = 1.0;
pub const RATE_LIMIT_MAX_COMMANDS: usize = 10;

pub const SYNC_INTERVAL: f64 = 0.05;
pub const CLIENT_TIMEOUT: f64 = 5.0;

/// Queued directional inputs the client keeps while a step is animating.
pub const MAX_PENDING_ACTIONS: usize = 2;

pub const COLOR_PALETTE: [&str; 8] = [
    "blue", "red", "green", "purple", "orange", "cyan", "magenta", "yellow",
];
