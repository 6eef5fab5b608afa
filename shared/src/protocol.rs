use crate::error::{CommandError, RejectReason};
use crate::state::{Cell, Direction, ParticipantState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client -> server
    Connect {
        client_version: u32,
    },
    Move {
        direction: Direction,
    },
    Dash {
        direction: Direction,
    },
    CastHeal,
    DebugSetHealth {
        value: u8,
    },
    Heartbeat,
    Disconnect,

    // Server -> client
    InitialState {
        client_id: u32,
        own: ParticipantState,
        map_seed: u32,
        others: Vec<ParticipantState>,
    },
    ParticipantJoined {
        participant: ParticipantState,
    },
    ParticipantLeft {
        id: u32,
    },
    StateDelta {
        deltas: Vec<ParticipantDelta>,
    },
    MoveAccepted {
        x: i32,
        y: i32,
    },
    /// Carries the authoritative position so the client can snap to it.
    MoveRejected {
        reason: RejectReason,
        x: i32,
        y: i32,
    },
    DashAccepted {
        dash_end_time: f64,
        dash_direction: Direction,
        dash_cooldown_end_time: f64,
    },
    /// Authoritative dash fields after a refused dash.
    DashRejected {
        reason: CommandError,
        dash_end_time: f64,
        dash_direction: Option<Direction>,
        dash_cooldown_end_time: f64,
    },
    DashStarted {
        id: u32,
        dash_end_time: f64,
        dash_direction: Direction,
    },
    CastAccepted {
        mana_cast_end_time: f64,
        mana_cooldown_end_time: f64,
    },
    /// Authoritative cast fields and health after a refused cast.
    CastRejected {
        reason: CommandError,
        is_casting_mana: bool,
        mana_cast_end_time: f64,
        mana_cooldown_end_time: f64,
        health: u8,
    },
    CastCompleted {
        new_health: u8,
    },
    HealthChanged {
        id: u32,
        health: u8,
    },
    /// Also sent with `damage_dealt == 0` for a collision inside the hit cooldown.
    HitLanded {
        attacker_id: u32,
        target_id: u32,
        damage_dealt: u8,
        target_new_health: u8,
        attacker_pos: Cell,
        target_pos: Cell,
    },
    Died {
        id: u32,
        respawn_time: f64,
        position: Cell,
    },
    Respawned {
        id: u32,
        health: u8,
        position: Cell,
    },
    Disconnected {
        reason: String,
    },
}

/// Partial participant record sent in a `StateDelta`.
///
/// Volatile fields are always present. Timestamp fields are `None` when not
/// reported this tick and `Some(0.0)` exactly once when they have just expired.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ParticipantDelta {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub target_x: i32,
    pub target_y: i32,
    pub health: u8,
    pub is_dead: bool,
    pub is_dashing: bool,
    pub is_casting_mana: bool,
    pub dash_cooldown_end_time: Option<f64>,
    pub dash_end_time: Option<f64>,
    pub dash_direction: Option<Direction>,
    pub mana_cooldown_end_time: Option<f64>,
    pub mana_cast_end_time: Option<f64>,
}

impl ParticipantDelta {
    /// Volatile fields of `state` with no timestamp fields set.
    pub fn volatile(state: &ParticipantState, now: f64) -> Self {
        Self {
            id: state.id,
            x: state.x,
            y: state.y,
            target_x: state.target_x,
            target_y: state.target_y,
            health: state.health,
            is_dead: state.is_dead,
            is_dashing: state.is_dashing(now),
            is_casting_mana: state.is_casting_mana,
            dash_cooldown_end_time: None,
            dash_end_time: None,
            dash_direction: None,
            mana_cooldown_end_time: None,
            mana_cast_end_time: None,
        }
    }
}
