//! The one validation function shared by the authoritative resolver and the
//! client predictor.
//!
//! [`validate`] never mutates anything. It decides what a command *would* do
//! against a participant record, the wall grid and the occupancy of the map;
//! the caller then applies the [`Outcome`] to its own copy of the state.

use crate::error::CommandError;
use crate::grid::Grid;
use crate::state::{Cell, Direction, ParticipantState};
use crate::{CAST_TIME, DASH_COOLDOWN, DASH_DURATION, HIT_COOLDOWN, MANA_COOLDOWN, MAX_HEALTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Move(Direction),
    Dash(Direction),
    CastHeal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// Target cell is free; position and target both become `to`.
    Moved { to: Cell },
    /// Target cell holds another live participant; the mover stays put.
    Collided { occupant: u32, at: Cell },
    DashStarted {
        direction: Direction,
        dash_end_time: f64,
        dash_cooldown_end_time: f64,
    },
    CastStarted {
        mana_cast_end_time: f64,
        mana_cooldown_end_time: f64,
    },
}

/// Checks `command` for `state` at time `now`.
///
/// `occupant_at` reports the id of a live participant standing on a cell;
/// it may return the mover's own id, which is ignored.
pub fn validate<F>(
    state: &ParticipantState,
    command: Command,
    grid: &Grid,
    occupant_at: F,
    now: f64,
) -> Result<Outcome, CommandError>
where
    F: Fn(Cell) -> Option<u32>,
{
    match command {
        Command::Move(direction) => validate_move(state, direction, grid, occupant_at, now),
        Command::Dash(direction) => validate_dash(state, direction, now),
        Command::CastHeal => validate_cast(state, now),
    }
}

fn validate_move<F>(
    state: &ParticipantState,
    direction: Direction,
    grid: &Grid,
    occupant_at: F,
    now: f64,
) -> Result<Outcome, CommandError>
where
    F: Fn(Cell) -> Option<u32>,
{
    if state.is_dead {
        return Err(CommandError::Dead);
    }
    if state.is_casting_mana {
        return Err(CommandError::Casting);
    }
    if state.is_dashing(now) && state.dash_direction.is_some_and(|d| d != direction) {
        return Err(CommandError::WrongDashDirection);
    }

    let to = state.cell().step(direction);
    if !grid.in_bounds(to.x, to.y) {
        return Err(CommandError::OutOfBounds);
    }
    if grid.is_wall(to.x, to.y) {
        return Err(CommandError::BlockedByWall);
    }

    match occupant_at(to) {
        Some(occupant) if occupant != state.id => Ok(Outcome::Collided { occupant, at: to }),
        _ => Ok(Outcome::Moved { to }),
    }
}

fn validate_dash(
    state: &ParticipantState,
    direction: Direction,
    now: f64,
) -> Result<Outcome, CommandError> {
    if state.is_dead {
        return Err(CommandError::Dead);
    }
    if state.dash_cooldown_end_time > now {
        return Err(CommandError::OnCooldown);
    }
    if state.is_dashing(now) {
        return Err(CommandError::AlreadyDashing);
    }
    Ok(Outcome::DashStarted {
        direction,
        dash_end_time: now + DASH_DURATION,
        dash_cooldown_end_time: now + DASH_COOLDOWN,
    })
}

// Dashing does not block a cast.
fn validate_cast(state: &ParticipantState, now: f64) -> Result<Outcome, CommandError> {
    if state.is_dead {
        return Err(CommandError::Dead);
    }
    if state.mana_cooldown_end_time > now {
        return Err(CommandError::OnCooldown);
    }
    if state.is_casting_mana {
        return Err(CommandError::AlreadyCasting);
    }
    if state.health >= MAX_HEALTH {
        return Err(CommandError::FullHealth);
    }
    Ok(Outcome::CastStarted {
        mana_cast_end_time: now + CAST_TIME,
        mana_cooldown_end_time: now + MANA_COOLDOWN,
    })
}

/// Whether `attacker` may deal damage on a collision at `now`.
pub fn hit_available(attacker: &ParticipantState, now: f64) -> bool {
    now - attacker.last_hit_time >= HIT_COOLDOWN
}

/// Applies the state changes of a non-collision outcome to a record.
/// Collisions are resolved by the caller since only the server deals damage.
pub fn apply_outcome(state: &mut ParticipantState, outcome: &Outcome) {
    match *outcome {
        Outcome::Moved { to } => state.place(to),
        Outcome::Collided { .. } => {}
        Outcome::DashStarted {
            direction,
            dash_end_time,
            dash_cooldown_end_time,
        } => {
            state.dash_end_time = dash_end_time;
            state.dash_cooldown_end_time = dash_cooldown_end_time;
            state.dash_direction = Some(direction);
        }
        Outcome::CastStarted {
            mana_cast_end_time,
            mana_cooldown_end_time,
        } => {
            state.is_casting_mana = true;
            state.mana_cast_end_time = mana_cast_end_time;
            state.mana_cooldown_end_time = mana_cooldown_end_time;
        }
    }
}
