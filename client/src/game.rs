//! Client mirror of the arena.
//!
//! The mirror predicts the local participant with the same rules the server
//! uses, queues up to [`MAX_PENDING_ACTIONS`] directional inputs while a step
//! is still cooling down, and reconciles against whatever the server says.
//! Every server timestamp is run through a [`ClockTranslator`] before it is
//! stored, so all times held here are in the client's own time base.

use log::{debug, info, warn};
use shared::{
    apply_outcome, validate, Cell, ClockTranslator, Command, CommandGate, Direction, Grid, Outcome,
    Packet, ParticipantDelta, ParticipantState, GRID_HEIGHT, GRID_WIDTH, MAX_PENDING_ACTIONS,
    MOVE_INTERVAL,
};
use std::collections::{BTreeMap, VecDeque};

/// Render distance, in cells, beyond which interpolation snaps instead.
const SNAP_DISTANCE: f32 = 2.5;

/// Another participant as seen by this client.
#[derive(Debug, Clone)]
pub struct RemoteParticipant {
    pub state: ParticipantState,
    pub render_x: f32,
    pub render_y: f32,
}

impl RemoteParticipant {
    fn new(state: ParticipantState) -> Self {
        Self {
            render_x: state.x as f32,
            render_y: state.y as f32,
            state,
        }
    }
}

pub struct ClientMirrorState {
    client_id: Option<u32>,
    own: Option<ParticipantState>,
    render_x: f32,
    render_y: f32,
    grid: Option<Grid>,
    others: BTreeMap<u32, RemoteParticipant>,
    gate: CommandGate,
    pending: VecDeque<Direction>,
    /// Moves sent that the server has not answered yet.
    unacked_moves: u32,
    /// Set once an auto dash step hits something; cleared by the next dash.
    dash_blocked: bool,
}

impl ClientMirrorState {
    pub fn new() -> Self {
        Self {
            client_id: None,
            own: None,
            render_x: 0.0,
            render_y: 0.0,
            grid: None,
            others: BTreeMap::new(),
            gate: CommandGate::default(),
            pending: VecDeque::with_capacity(MAX_PENDING_ACTIONS),
            unacked_moves: 0,
            dash_blocked: false,
        }
    }

    pub fn client_id(&self) -> Option<u32> {
        self.client_id
    }

    pub fn own(&self) -> Option<&ParticipantState> {
        self.own.as_ref()
    }

    pub fn others(&self) -> impl Iterator<Item = &RemoteParticipant> {
        self.others.values()
    }

    pub fn other(&self, id: u32) -> Option<&RemoteParticipant> {
        self.others.get(&id)
    }

    pub fn render_position(&self) -> (f32, f32) {
        (self.render_x, self.render_y)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn unacked_moves(&self) -> u32 {
        self.unacked_moves
    }

    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    /// Replaces the wall grid; normally it is generated from the map seed.
    pub fn load_grid(&mut self, grid: Grid) {
        self.grid = Some(grid);
    }

    pub fn is_ready(&self) -> bool {
        self.own.is_some() && self.grid.is_some()
    }

    /// Predicts `command` and returns the packet to send, if any.
    ///
    /// Commands the server would certainly reject are dropped here. Moves the
    /// gate is not ready for are queued instead.
    pub fn issue(&mut self, command: Command, now: f64) -> Option<Packet> {
        match command {
            Command::Move(direction) => {
                let dashing = self.own.as_ref()?.is_dashing(now);
                if !self.pending.is_empty() || !self.gate.can_move(now, dashing) {
                    self.enqueue(direction);
                    return None;
                }
                self.try_move(direction, now)
            }
            Command::Dash(direction) => self.try_dash(direction, now),
            Command::CastHeal => self.try_cast(now),
        }
    }

    fn enqueue(&mut self, direction: Direction) {
        if self.pending.len() < MAX_PENDING_ACTIONS {
            self.pending.push_back(direction);
        } else {
            debug!("Input queue full, dropping {:?}", direction);
        }
    }

    fn try_move(&mut self, direction: Direction, now: f64) -> Option<Packet> {
        let own = self.own.as_ref()?;
        let grid = self.grid.as_ref()?;
        let others = &self.others;
        let dashing = own.is_dashing(now);
        let result = validate(
            own,
            Command::Move(direction),
            grid,
            |cell| occupant(others, cell),
            now,
        );

        match result {
            Ok(outcome) => {
                if let Err(e) = self.gate.check_move(now, dashing) {
                    debug!("Local gate refused move: {}", e);
                    return None;
                }
                match outcome {
                    Outcome::Moved { .. } => {
                        if let Some(own) = self.own.as_mut() {
                            apply_outcome(own, &outcome);
                        }
                    }
                    Outcome::Collided { occupant, .. } => {
                        debug!("Bumping into participant {}", occupant);
                        if dashing {
                            self.dash_blocked = true;
                        }
                    }
                    _ => {}
                }
                self.unacked_moves += 1;
                Some(Packet::Move { direction })
            }
            Err(e) => {
                debug!("Move {:?} not sent: {}", direction, e);
                if dashing {
                    self.dash_blocked = true;
                }
                None
            }
        }
    }

    fn try_dash(&mut self, direction: Direction, now: f64) -> Option<Packet> {
        if !self.gate.can_dash(now) {
            return None;
        }
        let grid = self.grid.as_ref()?;
        let own = self.own.as_mut()?;
        match validate(own, Command::Dash(direction), grid, |_| None, now) {
            Ok(outcome) => {
                self.gate.check_dash(now).ok()?;
                apply_outcome(own, &outcome);
                self.dash_blocked = false;
                self.pending.clear();
                Some(Packet::Dash { direction })
            }
            Err(e) => {
                debug!("Dash not sent: {}", e);
                None
            }
        }
    }

    fn try_cast(&mut self, now: f64) -> Option<Packet> {
        let grid = self.grid.as_ref()?;
        let own = self.own.as_mut()?;
        match validate(own, Command::CastHeal, grid, |_| None, now) {
            Ok(outcome) => {
                apply_outcome(own, &outcome);
                self.pending.clear();
                Some(Packet::CastHeal)
            }
            Err(e) => {
                debug!("Cast not sent: {}", e);
                None
            }
        }
    }

    /// Frame step: interpolation, local expiry, queued input and dash steps.
    pub fn update(&mut self, now: f64, dt: f32) -> Vec<Packet> {
        let mut out = Vec::new();
        let Some(own) = self.own.as_mut() else {
            return out;
        };

        own.expire_dash(now);
        if own.is_casting_mana && own.mana_cast_end_time <= now {
            // Health arrives with the server's confirmation.
            own.is_casting_mana = false;
        }

        let dashing = own.is_dashing(now);
        let max_step = dt / self.gate.move_interval(dashing) as f32;
        approach(&mut self.render_x, own.x as f32, max_step);
        approach(&mut self.render_y, own.y as f32, max_step);
        let dash_direction = own.dash_direction;

        for other in self.others.values_mut() {
            other.state.expire_dash(now);
            let step = dt / remote_interval(&other.state, now) as f32;
            approach(&mut other.render_x, other.state.x as f32, step);
            approach(&mut other.render_y, other.state.y as f32, step);
        }

        if !self.gate.can_move(now, dashing) {
            return out;
        }
        let next = match dash_direction {
            Some(direction) if dashing => {
                if self.dash_blocked {
                    None
                } else {
                    Some(direction)
                }
            }
            _ => self.pending.pop_front(),
        };
        if let Some(direction) = next {
            out.extend(self.try_move(direction, now));
        }
        out
    }

    /// Applies one server event to the mirror.
    pub fn apply_server_packet(&mut self, packet: Packet, clock: &ClockTranslator) {
        match packet {
            Packet::InitialState {
                client_id,
                own,
                map_seed,
                others,
            } => {
                info!(
                    "Joined as {} ({}) at ({}, {})",
                    client_id, own.color, own.x, own.y
                );
                self.client_id = Some(client_id);
                self.render_x = own.x as f32;
                self.render_y = own.y as f32;
                self.own = Some(translate(own, clock));
                self.grid = Some(Grid::generate(map_seed, GRID_WIDTH, GRID_HEIGHT));
                self.others = others
                    .into_iter()
                    .map(|p| (p.id, RemoteParticipant::new(translate(p, clock))))
                    .collect();
                self.pending.clear();
                self.unacked_moves = 0;
                self.gate.reset();
            }

            Packet::ParticipantJoined { participant } => {
                if Some(participant.id) == self.client_id {
                    return;
                }
                info!("Participant {} joined", participant.id);
                self.others.insert(
                    participant.id,
                    RemoteParticipant::new(translate(participant, clock)),
                );
            }

            Packet::ParticipantLeft { id } => {
                if self.others.remove(&id).is_some() {
                    info!("Participant {} left", id);
                }
            }

            Packet::StateDelta { deltas } => {
                for delta in deltas {
                    self.apply_delta(delta, clock);
                }
            }

            Packet::MoveAccepted { x, y } => {
                self.unacked_moves = self.unacked_moves.saturating_sub(1);
                let Some(own) = self.own.as_mut() else {
                    return;
                };
                if self.unacked_moves == 0 && own.cell() != Cell::new(x, y) {
                    debug!(
                        "Reconciling ({}, {}) -> ({}, {})",
                        own.x, own.y, x, y
                    );
                    // Interpolation catches the render position up.
                    own.place(Cell::new(x, y));
                }
            }

            Packet::MoveRejected { reason, x, y } => {
                self.unacked_moves = self.unacked_moves.saturating_sub(1);
                let Some(own) = self.own.as_mut() else {
                    return;
                };
                debug!("Move rejected ({:?}), snapping to ({}, {})", reason, x, y);
                own.place(Cell::new(x, y));
                self.render_x = x as f32;
                self.render_y = y as f32;
                self.pending.clear();
                self.dash_blocked = true;
            }

            Packet::DashAccepted {
                dash_end_time,
                dash_direction,
                dash_cooldown_end_time,
            } => {
                if let Some(own) = self.own.as_mut() {
                    own.dash_end_time = clock.to_local(dash_end_time);
                    own.dash_cooldown_end_time = clock.to_local(dash_cooldown_end_time);
                    own.dash_direction = Some(dash_direction);
                }
            }

            Packet::DashRejected {
                reason,
                dash_end_time,
                dash_direction,
                dash_cooldown_end_time,
            } => {
                debug!("Dash rejected: {}", reason);
                if let Some(own) = self.own.as_mut() {
                    own.dash_end_time = clock.to_local(dash_end_time);
                    own.dash_cooldown_end_time = clock.to_local(dash_cooldown_end_time);
                    own.dash_direction = if own.dash_end_time > 0.0 {
                        dash_direction
                    } else {
                        None
                    };
                }
                self.dash_blocked = true;
            }

            Packet::DashStarted {
                id,
                dash_end_time,
                dash_direction,
            } => {
                if let Some(other) = self.others.get_mut(&id) {
                    other.state.dash_end_time = clock.to_local(dash_end_time);
                    other.state.dash_direction = Some(dash_direction);
                }
            }

            Packet::CastAccepted {
                mana_cast_end_time,
                mana_cooldown_end_time,
            } => {
                if let Some(own) = self.own.as_mut() {
                    own.is_casting_mana = true;
                    own.mana_cast_end_time = clock.to_local(mana_cast_end_time);
                    own.mana_cooldown_end_time = clock.to_local(mana_cooldown_end_time);
                }
            }

            Packet::CastRejected {
                reason,
                is_casting_mana,
                mana_cast_end_time,
                mana_cooldown_end_time,
                health,
            } => {
                debug!("Cast rejected: {}", reason);
                if let Some(own) = self.own.as_mut() {
                    own.is_casting_mana = is_casting_mana;
                    own.mana_cast_end_time = clock.to_local(mana_cast_end_time);
                    own.mana_cooldown_end_time = clock.to_local(mana_cooldown_end_time);
                    own.health = health;
                }
            }

            Packet::CastCompleted { new_health } => {
                if let Some(own) = self.own.as_mut() {
                    own.health = new_health;
                    own.is_casting_mana = false;
                    own.mana_cast_end_time = 0.0;
                    info!("Healed to {}", new_health);
                }
            }

            Packet::HealthChanged { id, health } => {
                if let Some(p) = self.participant_mut(id) {
                    p.health = health;
                }
            }

            Packet::HitLanded {
                attacker_id,
                target_id,
                damage_dealt,
                target_new_health,
                ..
            } => {
                if damage_dealt > 0 {
                    info!(
                        "{} hit {} for {} ({} left)",
                        attacker_id, target_id, damage_dealt, target_new_health
                    );
                } else {
                    debug!("{} bumped {}", attacker_id, target_id);
                }
                if let Some(p) = self.participant_mut(target_id) {
                    p.health = target_new_health;
                }
            }

            Packet::Died {
                id,
                respawn_time,
                position,
            } => {
                info!("Participant {} died at ({}, {})", id, position.x, position.y);
                if Some(id) == self.client_id {
                    self.pending.clear();
                    self.unacked_moves = 0;
                }
                if let Some(p) = self.participant_mut(id) {
                    p.die(0.0, 0.0);
                    p.respawn_time = clock.to_local(respawn_time);
                    p.place(position);
                }
            }

            Packet::Respawned {
                id,
                health,
                position,
            } => {
                info!(
                    "Participant {} respawned at ({}, {})",
                    id, position.x, position.y
                );
                if Some(id) == self.client_id {
                    self.render_x = position.x as f32;
                    self.render_y = position.y as f32;
                } else if let Some(other) = self.others.get_mut(&id) {
                    other.render_x = position.x as f32;
                    other.render_y = position.y as f32;
                }
                if let Some(p) = self.participant_mut(id) {
                    p.revive(position);
                    p.health = health;
                }
            }

            other => warn!("Unexpected packet {:?}", other),
        }
    }

    fn participant_mut(&mut self, id: u32) -> Option<&mut ParticipantState> {
        if Some(id) == self.client_id {
            self.own.as_mut()
        } else {
            self.others.get_mut(&id).map(|o| &mut o.state)
        }
    }

    fn apply_delta(&mut self, delta: ParticipantDelta, clock: &ClockTranslator) {
        if Some(delta.id) == self.client_id {
            return;
        }
        let other = self.others.entry(delta.id).or_insert_with(|| {
            debug!("Delta for unknown participant {}", delta.id);
            RemoteParticipant::new(ParticipantState::new(
                delta.id,
                "gray",
                Cell::new(delta.x, delta.y),
            ))
        });
        let s = &mut other.state;

        s.x = delta.x;
        s.y = delta.y;
        s.target_x = delta.target_x;
        s.target_y = delta.target_y;
        s.health = delta.health;
        s.is_dead = delta.is_dead;
        s.is_casting_mana = delta.is_casting_mana;
        if !s.is_dead {
            s.respawn_time = 0.0;
        }

        if let Some(ts) = delta.dash_cooldown_end_time {
            s.dash_cooldown_end_time = clock.to_local(ts);
        }
        if let Some(ts) = delta.dash_end_time {
            s.dash_end_time = clock.to_local(ts);
            s.dash_direction = if ts > 0.0 { delta.dash_direction } else { None };
        }
        if let Some(ts) = delta.mana_cooldown_end_time {
            s.mana_cooldown_end_time = clock.to_local(ts);
        }
        if let Some(ts) = delta.mana_cast_end_time {
            s.mana_cast_end_time = clock.to_local(ts);
        }
    }

    /// One-line description for the console.
    pub fn summary(&self, now: f64) -> String {
        match &self.own {
            Some(own) => format!(
                "#{} at ({}, {}) hp {} {:?}, {} others, dash cd {:.1}s, heal cd {:.1}s",
                own.id,
                own.x,
                own.y,
                own.health,
                own.activity(now),
                self.others.len(),
                (own.dash_cooldown_end_time - now).max(0.0),
                (own.mana_cooldown_end_time - now).max(0.0),
            ),
            None => "not joined".to_string(),
        }
    }
}

impl Default for ClientMirrorState {
    fn default() -> Self {
        Self::new()
    }
}

fn occupant(others: &BTreeMap<u32, RemoteParticipant>, cell: Cell) -> Option<u32> {
    others
        .values()
        .find(|o| !o.state.is_dead && o.state.cell() == cell)
        .map(|o| o.state.id)
}

/// Moves server timestamps of a full record into the local time base.
fn translate(mut state: ParticipantState, clock: &ClockTranslator) -> ParticipantState {
    state.dash_cooldown_end_time = clock.to_local(state.dash_cooldown_end_time);
    state.dash_end_time = clock.to_local(state.dash_end_time);
    state.mana_cooldown_end_time = clock.to_local(state.mana_cooldown_end_time);
    state.mana_cast_end_time = clock.to_local(state.mana_cast_end_time);
    state.respawn_time = clock.to_local(state.respawn_time);
    if state.dash_end_time <= 0.0 {
        state.dash_direction = None;
    }
    state
}

fn remote_interval(state: &ParticipantState, now: f64) -> f64 {
    if state.is_dashing(now) {
        MOVE_INTERVAL / shared::gate::DASH_INTERVAL_DIVISOR
    } else {
        MOVE_INTERVAL
    }
}

fn approach(current: &mut f32, target: f32, max_step: f32) {
    let diff = target - *current;
    if diff.abs() > SNAP_DISTANCE || diff.abs() <= max_step {
        *current = target;
    } else {
        *current += max_step * diff.signum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{RejectReason, DASH_COOLDOWN, DASH_DURATION};

    fn clock(now: f64) -> ClockTranslator {
        ClockTranslator::new(now, now)
    }

    fn joined_at(x: i32, y: i32, grid: Grid) -> ClientMirrorState {
        let mut mirror = ClientMirrorState::new();
        mirror.apply_server_packet(
            Packet::InitialState {
                client_id: 1,
                own: ParticipantState::new(1, "blue", Cell::new(x, y)),
                map_seed: 0,
                others: Vec::new(),
            },
            &clock(0.0),
        );
        mirror.load_grid(grid);
        mirror
    }

    fn add_other(mirror: &mut ClientMirrorState, id: u32, x: i32, y: i32) {
        mirror.apply_server_packet(
            Packet::ParticipantJoined {
                participant: ParticipantState::new(id, "red", Cell::new(x, y)),
            },
            &clock(0.0),
        );
    }

    #[test]
    fn test_move_predicted_immediately() {
        let mut mirror = joined_at(5, 5, Grid::open(10, 10));
        let packet = mirror.issue(Command::Move(Direction::Right), 10.0);
        assert_eq!(
            packet,
            Some(Packet::Move {
                direction: Direction::Right
            })
        );
        assert_eq!(mirror.own().unwrap().cell(), Cell::new(6, 5));
        assert_eq!(mirror.unacked_moves(), 1);
    }

    #[test]
    fn test_certain_rejection_is_never_sent() {
        let mut grid = Grid::open(10, 10);
        grid.set_wall(6, 5, true);
        let mut mirror = joined_at(5, 5, grid);
        assert!(mirror.issue(Command::Move(Direction::Right), 10.0).is_none());
        assert_eq!(mirror.own().unwrap().cell(), Cell::new(5, 5));
        assert_eq!(mirror.unacked_moves(), 0);

        let mut mirror = joined_at(0, 0, Grid::open(10, 10));
        assert!(mirror.issue(Command::Move(Direction::Up), 10.0).is_none());
    }

    #[test]
    fn test_collision_is_sent_without_moving() {
        let mut mirror = joined_at(5, 5, Grid::open(10, 10));
        add_other(&mut mirror, 2, 6, 5);
        assert!(mirror.issue(Command::Move(Direction::Right), 10.0).is_some());
        assert_eq!(mirror.own().unwrap().cell(), Cell::new(5, 5));
    }

    #[test]
    fn test_queue_is_bounded_and_drains_with_gate() {
        let mut mirror = joined_at(5, 5, Grid::open(20, 20));
        assert!(mirror.issue(Command::Move(Direction::Right), 0.0).is_some());
        for _ in 0..3 {
            assert!(mirror.issue(Command::Move(Direction::Right), 0.01).is_none());
        }
        assert_eq!(mirror.pending_len(), MAX_PENDING_ACTIONS);

        assert!(mirror.update(0.05, 0.016).is_empty());
        assert_eq!(mirror.update(MOVE_INTERVAL, 0.016).len(), 1);
        assert_eq!(mirror.own().unwrap().cell(), Cell::new(7, 5));
        assert_eq!(mirror.update(2.0 * MOVE_INTERVAL + 0.01, 0.016).len(), 1);
        assert_eq!(mirror.own().unwrap().cell(), Cell::new(8, 5));
        assert_eq!(mirror.pending_len(), 0);
    }

    #[test]
    fn test_rejection_snaps_and_purges_queue() {
        let mut mirror = joined_at(5, 5, Grid::open(20, 20));
        mirror.issue(Command::Move(Direction::Right), 10.0);
        mirror.issue(Command::Move(Direction::Right), 10.01);
        assert_eq!(mirror.pending_len(), 1);

        mirror.apply_server_packet(
            Packet::MoveRejected {
                reason: RejectReason::BlockedByParticipant,
                x: 5,
                y: 5,
            },
            &clock(10.1),
        );
        assert_eq!(mirror.own().unwrap().cell(), Cell::new(5, 5));
        assert_eq!(mirror.render_position(), (5.0, 5.0));
        assert_eq!(mirror.pending_len(), 0);
        assert_eq!(mirror.unacked_moves(), 0);
    }

    #[test]
    fn test_accepted_discrepancy_reconciles_without_snapping_render() {
        let mut mirror = joined_at(5, 5, Grid::open(20, 20));
        mirror.issue(Command::Move(Direction::Right), 10.0);
        mirror.apply_server_packet(Packet::MoveAccepted { x: 6, y: 6 }, &clock(10.1));
        assert_eq!(mirror.own().unwrap().cell(), Cell::new(6, 6));
        assert_eq!(mirror.render_position(), (5.0, 5.0));

        mirror.update(10.2, MOVE_INTERVAL as f32);
        assert_eq!(mirror.render_position(), (6.0, 6.0));
    }

    #[test]
    fn test_dash_auto_steps_until_wall() {
        let mut grid = Grid::open(20, 20);
        grid.set_wall(13, 10, true);
        let mut mirror = joined_at(10, 10, grid);

        assert_eq!(
            mirror.issue(Command::Dash(Direction::Right), 10.0),
            Some(Packet::Dash {
                direction: Direction::Right
            })
        );
        let own = mirror.own().unwrap();
        assert_eq!(own.dash_end_time, 10.0 + DASH_DURATION);
        assert_eq!(own.dash_cooldown_end_time, 10.0 + DASH_COOLDOWN);

        let mut sent = 0;
        let mut t = 10.0;
        while t < 10.0 + DASH_DURATION {
            sent += mirror.update(t, 0.01).len();
            t += 0.01;
        }
        assert_eq!(sent, 2);
        assert_eq!(mirror.own().unwrap().cell(), Cell::new(12, 10));

        mirror.update(10.0 + DASH_DURATION + 0.01, 0.01);
        assert_eq!(mirror.own().unwrap().dash_direction, None);
    }

    #[test]
    fn test_dash_locks_direction() {
        let mut mirror = joined_at(10, 10, Grid::open(20, 20));
        mirror.issue(Command::Dash(Direction::Right), 10.0);
        mirror.update(10.0, 0.0);
        assert!(mirror.issue(Command::Move(Direction::Up), 10.2).is_none());
        assert_eq!(mirror.own().unwrap().y, 10);
    }

    #[test]
    fn test_server_timestamps_translated_to_local_base() {
        let mut mirror = joined_at(10, 10, Grid::open(20, 20));
        // Server clock reads 1000.0 while the local clock reads 5.0.
        mirror.apply_server_packet(
            Packet::DashAccepted {
                dash_end_time: 1000.25,
                dash_direction: Direction::Left,
                dash_cooldown_end_time: 1003.0,
            },
            &ClockTranslator::new(5.0, 1000.0),
        );
        let own = mirror.own().unwrap();
        assert_approx_eq!(own.dash_end_time, 5.25, 1e-9);
        assert_approx_eq!(own.dash_cooldown_end_time, 8.0, 1e-9);
    }

    #[test]
    fn test_delta_updates_remote_and_telegraphed_expiry_clears() {
        let mut mirror = joined_at(10, 10, Grid::open(20, 20));
        add_other(&mut mirror, 2, 3, 3);

        let mut delta = ParticipantDelta::volatile(
            &ParticipantState::new(2, "red", Cell::new(4, 3)),
            0.0,
        );
        delta.dash_end_time = Some(100.25);
        delta.dash_direction = Some(Direction::Right);
        mirror.apply_server_packet(
            Packet::StateDelta {
                deltas: vec![delta.clone()],
            },
            &clock(100.0),
        );
        let other = &mirror.other(2).unwrap().state;
        assert_eq!(other.cell(), Cell::new(4, 3));
        assert_eq!(other.dash_direction, Some(Direction::Right));

        delta.dash_end_time = Some(0.0);
        delta.dash_direction = None;
        mirror.apply_server_packet(
            Packet::StateDelta {
                deltas: vec![delta],
            },
            &clock(100.3),
        );
        let other = &mirror.other(2).unwrap().state;
        assert_eq!(other.dash_end_time, 0.0);
        assert_eq!(other.dash_direction, None);
    }

    #[test]
    fn test_death_and_respawn_of_own_participant() {
        let mut mirror = joined_at(10, 10, Grid::open(50, 50));
        mirror.apply_server_packet(
            Packet::Died {
                id: 1,
                respawn_time: 13.0,
                position: Cell::new(10, 10),
            },
            &clock(10.0),
        );
        let own = mirror.own().unwrap();
        assert!(own.is_dead);
        assert_eq!(own.health, 0);
        assert!(mirror.issue(Command::Move(Direction::Up), 11.0).is_none());

        mirror.apply_server_packet(
            Packet::Respawned {
                id: 1,
                health: 3,
                position: Cell::new(25, 25),
            },
            &clock(13.0),
        );
        let own = mirror.own().unwrap();
        assert!(!own.is_dead);
        assert_eq!(own.health, 3);
        assert_eq!(own.cell(), Cell::new(25, 25));
        assert_eq!(mirror.render_position(), (25.0, 25.0));
    }

    #[test]
    fn test_refused_cast_restores_server_fields() {
        let mut mirror = joined_at(10, 10, Grid::open(20, 20));
        mirror.apply_server_packet(Packet::HealthChanged { id: 1, health: 2 }, &clock(0.0));
        assert_eq!(mirror.issue(Command::CastHeal, 10.0), Some(Packet::CastHeal));
        assert!(mirror.own().unwrap().is_casting_mana);

        mirror.apply_server_packet(
            Packet::CastRejected {
                reason: shared::CommandError::FullHealth,
                is_casting_mana: false,
                mana_cast_end_time: 0.0,
                mana_cooldown_end_time: 0.0,
                health: 3,
            },
            &clock(10.1),
        );
        let own = mirror.own().unwrap();
        assert!(!own.is_casting_mana);
        assert_eq!(own.mana_cooldown_end_time, 0.0);
        assert_eq!(own.health, 3);
        assert_eq!(
            mirror.issue(Command::Move(Direction::Right), 10.5),
            Some(Packet::Move {
                direction: Direction::Right
            })
        );
    }

    #[test]
    fn test_refused_dash_stops_auto_steps() {
        let mut mirror = joined_at(10, 10, Grid::open(20, 20));
        assert!(mirror.issue(Command::Dash(Direction::Right), 10.0).is_some());

        mirror.apply_server_packet(
            Packet::DashRejected {
                reason: shared::CommandError::OnCooldown,
                dash_end_time: 0.0,
                dash_direction: None,
                dash_cooldown_end_time: 11.0,
            },
            &clock(10.0),
        );
        let own = mirror.own().unwrap();
        assert_eq!(own.dash_direction, None);
        assert!(!own.is_dashing(10.05));
        assert_approx_eq!(own.dash_cooldown_end_time, 11.0, 1e-9);

        let mut t = 10.0;
        while t < 10.3 {
            assert!(mirror.update(t, 0.01).is_empty());
            t += 0.01;
        }
        assert_eq!(mirror.own().unwrap().cell(), Cell::new(10, 10));
    }

    #[test]
    fn test_cast_blocks_movement_until_completion() {
        let mut mirror = joined_at(10, 10, Grid::open(20, 20));
        mirror.apply_server_packet(Packet::HealthChanged { id: 1, health: 2 }, &clock(0.0));
        assert_eq!(mirror.issue(Command::CastHeal, 10.0), Some(Packet::CastHeal));
        assert!(mirror.issue(Command::Move(Direction::Up), 10.5).is_none());
        assert_eq!(mirror.own().unwrap().y, 10);

        mirror.apply_server_packet(Packet::CastCompleted { new_health: 3 }, &clock(11.5));
        let own = mirror.own().unwrap();
        assert!(!own.is_casting_mana);
        assert_eq!(own.health, 3);
    }
}
