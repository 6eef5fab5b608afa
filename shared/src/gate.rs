//! Command Gate: rate limiting in front of the state machine.
//!
//! The same gate runs on the client (to avoid sending commands the server will
//! drop) and on the server (where it is the ground truth).

use crate::error::CommandError;
use crate::{DASH_COMMAND_INTERVAL, MOVE_INTERVAL, RATE_LIMIT_MAX_COMMANDS, RATE_LIMIT_WINDOW};
use std::collections::VecDeque;

/// Divisor applied to the move interval inside a dash window.
pub const DASH_INTERVAL_DIVISOR: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateConfig {
    pub window: f64,
    pub max_commands: usize,
    pub move_interval: f64,
    pub dash_interval: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            window: RATE_LIMIT_WINDOW,
            max_commands: RATE_LIMIT_MAX_COMMANDS,
            move_interval: MOVE_INTERVAL,
            dash_interval: DASH_COMMAND_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandGate {
    config: GateConfig,
    /// Acceptance times of move commands inside the trailing window.
    recent: VecDeque<f64>,
    last_move_at: Option<f64>,
    last_dash_at: Option<f64>,
}

impl CommandGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            recent: VecDeque::with_capacity(config.max_commands),
            last_move_at: None,
            last_dash_at: None,
        }
    }

    /// Minimum spacing between moves, quartered while dashing.
    pub fn move_interval(&self, dashing: bool) -> f64 {
        if dashing {
            self.config.move_interval / DASH_INTERVAL_DIVISOR
        } else {
            self.config.move_interval
        }
    }

    /// Whether a move would pass at `now`, without recording it.
    pub fn can_move(&self, now: f64, dashing: bool) -> bool {
        let in_window = self
            .recent
            .iter()
            .filter(|&&t| now - t < self.config.window)
            .count();
        if in_window >= self.config.max_commands {
            return false;
        }
        match self.last_move_at {
            Some(last) => now - last >= self.move_interval(dashing),
            None => true,
        }
    }

    /// Admits a move command and records it, or reports `RateLimited`.
    pub fn check_move(&mut self, now: f64, dashing: bool) -> Result<(), CommandError> {
        self.prune(now);
        if !self.can_move(now, dashing) {
            return Err(CommandError::RateLimited);
        }
        self.recent.push_back(now);
        self.last_move_at = Some(now);
        Ok(())
    }

    pub fn can_dash(&self, now: f64) -> bool {
        match self.last_dash_at {
            Some(last) => now - last >= self.config.dash_interval,
            None => true,
        }
    }

    /// Fixed-interval limiter for dash commands; no burst allowance.
    pub fn check_dash(&mut self, now: f64) -> Result<(), CommandError> {
        if !self.can_dash(now) {
            return Err(CommandError::RateLimited);
        }
        self.last_dash_at = Some(now);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.recent.clear();
        self.last_move_at = None;
        self.last_dash_at = None;
    }

    fn prune(&mut self, now: f64) {
        while let Some(&front) = self.recent.front() {
            if now - front >= self.config.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for CommandGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}
