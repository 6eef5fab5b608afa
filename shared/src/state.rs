//! Participant records shared by the authoritative server and the client mirror.
//!
//! The server keeps every timestamp in absolute server-clock seconds. The client
//! keeps the same record shape, but after clock translation its timestamps live
//! in the client's own time base.

use crate::MAX_HEALTH;
use serde::{Deserialize, Serialize};

/// One of the four cardinal actions a participant can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Grid offset for one step. `y` grows downwards.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "up" | "w" => Some(Direction::Up),
            "down" | "s" => Some(Direction::Down),
            "left" | "a" => Some(Direction::Left),
            "right" | "d" => Some(Direction::Right),
            _ => None,
        }
    }
}

/// Integer grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn step(self, direction: Direction) -> Cell {
        let (dx, dy) = direction.delta();
        Cell::new(self.x + dx, self.y + dy)
    }

    pub fn manhattan(self, other: Cell) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Logical state, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Activity {
    Dead,
    Casting,
    Dashing,
    Moving,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantState {
    pub id: u32,
    pub color: String,
    pub x: i32,
    pub y: i32,
    pub target_x: i32,
    pub target_y: i32,
    pub health: u8,
    pub is_dead: bool,
    pub dash_cooldown_end_time: f64,
    pub dash_end_time: f64,
    pub dash_direction: Option<Direction>,
    pub mana_cooldown_end_time: f64,
    pub mana_cast_end_time: f64,
    pub is_casting_mana: bool,
    pub last_hit_time: f64,
    pub respawn_time: f64,
}

impl ParticipantState {
    pub fn new(id: u32, color: impl Into<String>, cell: Cell) -> Self {
        Self {
            id,
            color: color.into(),
            x: cell.x,
            y: cell.y,
            target_x: cell.x,
            target_y: cell.y,
            health: MAX_HEALTH,
            is_dead: false,
            dash_cooldown_end_time: 0.0,
            dash_end_time: 0.0,
            dash_direction: None,
            mana_cooldown_end_time: 0.0,
            mana_cast_end_time: 0.0,
            is_casting_mana: false,
            // Far enough in the past that the first hit is always available.
            last_hit_time: f64::NEG_INFINITY,
            respawn_time: 0.0,
        }
    }

    pub fn cell(&self) -> Cell {
        Cell::new(self.x, self.y)
    }

    pub fn target(&self) -> Cell {
        Cell::new(self.target_x, self.target_y)
    }

    /// Sets both position and target, i.e. a completed single-step move.
    pub fn place(&mut self, cell: Cell) {
        self.x = cell.x;
        self.y = cell.y;
        self.target_x = cell.x;
        self.target_y = cell.y;
    }

    pub fn is_dashing(&self, now: f64) -> bool {
        self.dash_end_time > now
    }

    /// Drops the dash lock once its window has closed.
    pub fn expire_dash(&mut self, now: f64) -> bool {
        if self.dash_direction.is_some() && !self.is_dashing(now) {
            self.dash_direction = None;
            return true;
        }
        false
    }

    pub fn activity(&self, now: f64) -> Activity {
        if self.is_dead {
            Activity::Dead
        } else if self.is_casting_mana {
            Activity::Casting
        } else if self.is_dashing(now) {
            Activity::Dashing
        } else if self.cell() != self.target() {
            Activity::Moving
        } else {
            Activity::Idle
        }
    }

    /// Applies damage and reports whether this hit was lethal.
    pub fn take_damage(&mut self, amount: u8, now: f64, respawn_delay: f64) -> bool {
        if self.is_dead {
            return false;
        }
        self.health = self.health.saturating_sub(amount);
        if self.health == 0 {
            self.die(now, respawn_delay);
            return true;
        }
        false
    }

    pub fn die(&mut self, now: f64, respawn_delay: f64) {
        self.health = 0;
        self.is_dead = true;
        self.respawn_time = now + respawn_delay;
        self.is_casting_mana = false;
        self.mana_cast_end_time = 0.0;
        self.dash_end_time = 0.0;
        self.dash_direction = None;
    }

    pub fn respawn_due(&self, now: f64) -> bool {
        self.is_dead && self.respawn_time > 0.0 && now >= self.respawn_time
    }

    pub fn revive(&mut self, cell: Cell) {
        self.health = MAX_HEALTH;
        self.is_dead = false;
        self.respawn_time = 0.0;
        self.place(cell);
    }
}
