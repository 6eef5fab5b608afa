//! Per-observer snapshot delta encoding.
//!
//! Each connection keeps an [`ObserverSnapshotCache`] holding what it was last
//! told about every other participant. Only participants that appear in a diff
//! get their cache entry refreshed; an omitted participant keeps its old entry
//! because, from that observer's point of view, nothing changed.

use shared::{Direction, ParticipantDelta, ParticipantState};
use std::collections::HashMap;

/// Last values sent to one observer about one participant.
///
/// Timestamp fields hold the value last reported, or `0.0` once expiry has
/// been telegraphed (or the field was never active).
#[derive(Debug, Clone, PartialEq)]
struct SentFields {
    x: i32,
    y: i32,
    target_x: i32,
    target_y: i32,
    health: u8,
    is_dead: bool,
    is_dashing: bool,
    is_casting_mana: bool,
    dash_cooldown_end_time: f64,
    dash_end_time: f64,
    dash_direction: Option<Direction>,
    mana_cooldown_end_time: f64,
    mana_cast_end_time: f64,
}

impl SentFields {
    fn volatile_matches(&self, delta: &ParticipantDelta) -> bool {
        self.x == delta.x
            && self.y == delta.y
            && self.target_x == delta.target_x
            && self.target_y == delta.target_y
            && self.health == delta.health
            && self.is_dead == delta.is_dead
            && self.is_dashing == delta.is_dashing
            && self.is_casting_mana == delta.is_casting_mana
    }

    fn from_delta(delta: &ParticipantDelta) -> Self {
        Self {
            x: delta.x,
            y: delta.y,
            target_x: delta.target_x,
            target_y: delta.target_y,
            health: delta.health,
            is_dead: delta.is_dead,
            is_dashing: delta.is_dashing,
            is_casting_mana: delta.is_casting_mana,
            dash_cooldown_end_time: delta.dash_cooldown_end_time.unwrap_or(0.0),
            dash_end_time: delta.dash_end_time.unwrap_or(0.0),
            dash_direction: delta.dash_direction,
            mana_cooldown_end_time: delta.mana_cooldown_end_time.unwrap_or(0.0),
            mana_cast_end_time: delta.mana_cast_end_time.unwrap_or(0.0),
        }
    }
}

/// What to put on the wire for one timestamp field this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
enum TimerReport {
    /// Active; send the value.
    Active(f64),
    /// Was reported active and has now expired; send a literal zero once.
    JustExpired,
    /// Expired and already reported as such.
    Quiet,
}

impl TimerReport {
    fn classify(current: f64, last_sent: f64, now: f64) -> Self {
        if current > now {
            TimerReport::Active(current)
        } else if last_sent > 0.0 {
            TimerReport::JustExpired
        } else {
            TimerReport::Quiet
        }
    }

    fn changed(self, last_sent: f64) -> bool {
        match self {
            TimerReport::Active(value) => value != last_sent,
            TimerReport::JustExpired => true,
            TimerReport::Quiet => false,
        }
    }

    fn wire(self) -> Option<f64> {
        match self {
            TimerReport::Active(value) => Some(value),
            TimerReport::JustExpired => Some(0.0),
            TimerReport::Quiet => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ObserverSnapshotCache {
    sent: HashMap<u32, SentFields>,
}

impl ObserverSnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the diff for `observer_id` and refreshes the cache for every
    /// participant included in it.
    pub fn encode<'a, I>(
        &mut self,
        observer_id: u32,
        participants: I,
        now: f64,
    ) -> Vec<ParticipantDelta>
    where
        I: IntoIterator<Item = &'a ParticipantState>,
    {
        let mut deltas = Vec::new();

        for p in participants {
            if p.id == observer_id {
                continue;
            }
            if let Some(delta) = self.diff(p, now) {
                self.sent.insert(p.id, SentFields::from_delta(&delta));
                deltas.push(delta);
            }
        }

        deltas
    }

    /// Drops the entry of a participant that left.
    pub fn forget(&mut self, participant_id: u32) {
        self.sent.remove(&participant_id);
    }

    pub fn knows(&self, participant_id: u32) -> bool {
        self.sent.contains_key(&participant_id)
    }

    fn diff(&self, p: &ParticipantState, now: f64) -> Option<ParticipantDelta> {
        let mut delta = ParticipantDelta::volatile(p, now);
        let last = self.sent.get(&p.id);
        let last_or_zero = |f: fn(&SentFields) -> f64| last.map(f).unwrap_or(0.0);

        let dash_cd = TimerReport::classify(
            p.dash_cooldown_end_time,
            last_or_zero(|s| s.dash_cooldown_end_time),
            now,
        );
        let dash_end =
            TimerReport::classify(p.dash_end_time, last_or_zero(|s| s.dash_end_time), now);
        let mana_cd = TimerReport::classify(
            p.mana_cooldown_end_time,
            last_or_zero(|s| s.mana_cooldown_end_time),
            now,
        );
        let mana_cast = TimerReport::classify(
            p.mana_cast_end_time,
            last_or_zero(|s| s.mana_cast_end_time),
            now,
        );

        let timers_changed = dash_cd.changed(last_or_zero(|s| s.dash_cooldown_end_time))
            || dash_end.changed(last_or_zero(|s| s.dash_end_time))
            || mana_cd.changed(last_or_zero(|s| s.mana_cooldown_end_time))
            || mana_cast.changed(last_or_zero(|s| s.mana_cast_end_time));

        let volatile_changed = match last {
            Some(sent) => !sent.volatile_matches(&delta),
            None => true,
        };

        if !volatile_changed && !timers_changed {
            return None;
        }

        delta.dash_cooldown_end_time = dash_cd.wire();
        delta.dash_end_time = dash_end.wire();
        if let TimerReport::Active(_) = dash_end {
            delta.dash_direction = p.dash_direction;
        }
        delta.mana_cooldown_end_time = mana_cd.wire();
        delta.mana_cast_end_time = mana_cast.wire();
        Some(delta)
    }
}
