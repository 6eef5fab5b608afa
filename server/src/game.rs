//! Authoritative state machine and collision resolver.
//!
//! Every entry point assumes the Command Gate has already admitted the
//! command, mutates the registry, and returns the packets that must go out
//! because of it. Nothing here touches the network.

use crate::registry::ParticipantRegistry;
use crate::scheduler::{ScheduledEvent, Scheduler};
use log::{debug, info, warn};
use shared::{
    apply_outcome, hit_available, validate, Cell, Command, CommandError, Direction, Grid, Outcome,
    Packet, ParticipantState, RejectReason, GRID_HEIGHT, GRID_WIDTH, MAX_HEALTH, RESPAWN_DELAY,
};
use std::sync::OnceLock;

const HIT_DAMAGE: u8 = 1;
const HEAL_AMOUNT: u8 = 1;

/// A packet addressed to one client or to everyone.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    ToClient { client_id: u32, packet: Packet },
    Broadcast { packet: Packet, exclude: Option<u32> },
}

impl Outgoing {
    fn to(client_id: u32, packet: Packet) -> Self {
        Outgoing::ToClient { client_id, packet }
    }

    fn all(packet: Packet) -> Self {
        Outgoing::Broadcast {
            packet,
            exclude: None,
        }
    }

    fn others(exclude: u32, packet: Packet) -> Self {
        Outgoing::Broadcast {
            packet,
            exclude: Some(exclude),
        }
    }
}

pub struct GameState {
    pub tick: u32,
    map_seed: u32,
    /// Generated on first join and never regenerated.
    grid: OnceLock<Grid>,
    registry: ParticipantRegistry,
    scheduler: Scheduler,
}

impl GameState {
    pub fn new(map_seed: u32) -> Self {
        Self::with_registry(map_seed, ParticipantRegistry::new())
    }

    pub fn with_registry(map_seed: u32, registry: ParticipantRegistry) -> Self {
        Self {
            tick: 0,
            map_seed,
            grid: OnceLock::new(),
            registry,
            scheduler: Scheduler::new(),
        }
    }

    /// Uses a prepared grid instead of generating one from the seed.
    pub fn with_grid(grid: Grid, registry: ParticipantRegistry) -> Self {
        let state = Self::with_registry(0, registry);
        let _ = state.grid.set(grid);
        state
    }

    pub fn map_seed(&self) -> u32 {
        self.map_seed
    }

    pub fn grid(&self) -> &Grid {
        let seed = self.map_seed;
        self.grid.get_or_init(|| generate_map(seed))
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    pub fn participant(&self, id: u32) -> Option<&ParticipantState> {
        self.registry.get(id)
    }

    pub fn participant_mut(&mut self, id: u32) -> Option<&mut ParticipantState> {
        self.registry.get_mut(id)
    }

    pub fn pending_events(&self) -> usize {
        self.scheduler.len()
    }

    /// Spawns a participant for a new connection. `None` means no free cell.
    pub fn add_participant(&mut self, id: u32) -> Option<Vec<Outgoing>> {
        let seed = self.map_seed;
        let grid = self.grid.get_or_init(|| generate_map(seed));
        let own = self.registry.create(id, grid)?.clone();

        let others: Vec<ParticipantState> =
            self.registry.iter().filter(|p| p.id != id).cloned().collect();

        Some(vec![
            Outgoing::to(
                id,
                Packet::InitialState {
                    client_id: id,
                    own: own.clone(),
                    map_seed: self.map_seed,
                    others,
                },
            ),
            Outgoing::others(id, Packet::ParticipantJoined { participant: own }),
        ])
    }

    pub fn remove_participant(&mut self, id: u32) -> Vec<Outgoing> {
        match self.registry.remove(id) {
            Some(_) => vec![Outgoing::others(id, Packet::ParticipantLeft { id })],
            None => Vec::new(),
        }
    }

    /// Reports a move that the Command Gate refused.
    pub fn reject_rate_limited(&self, id: u32) -> Vec<Outgoing> {
        match self.registry.get(id) {
            Some(p) => vec![Outgoing::to(
                id,
                Packet::MoveRejected {
                    reason: RejectReason::RateLimited,
                    x: p.x,
                    y: p.y,
                },
            )],
            None => Vec::new(),
        }
    }

    /// Reports a dash that the Command Gate refused.
    pub fn reject_dash_rate_limited(&self, id: u32) -> Vec<Outgoing> {
        match self.registry.get(id) {
            Some(p) => vec![Outgoing::to(
                id,
                dash_rejection(p, CommandError::RateLimited),
            )],
            None => Vec::new(),
        }
    }

    pub fn handle_move(&mut self, id: u32, direction: Direction, now: f64) -> Vec<Outgoing> {
        let mut out = Vec::new();
        let seed = self.map_seed;
        let grid = self.grid.get_or_init(|| generate_map(seed));
        let registry = &self.registry;
        let Some(mover) = registry.get(id) else {
            return out;
        };

        let result = validate(
            mover,
            Command::Move(direction),
            grid,
            |cell| registry.occupant_at(cell),
            now,
        );

        match result {
            Err(err) => {
                debug!("Move {:?} from {} rejected: {}", direction, id, err);
                out.push(Outgoing::to(
                    id,
                    Packet::MoveRejected {
                        reason: err.into(),
                        x: mover.x,
                        y: mover.y,
                    },
                ));
            }
            Ok(Outcome::Moved { to }) => {
                let Some(mover) = self.registry.get_mut(id) else {
                    return out;
                };
                mover.place(to);
                if grid.is_wall(mover.x, mover.y) {
                    out.extend(correct_position(mover, grid));
                } else {
                    out.push(Outgoing::to(id, Packet::MoveAccepted { x: to.x, y: to.y }));
                }
            }
            Ok(Outcome::Collided { occupant, at }) => {
                self.resolve_collision(id, occupant, at, now, &mut out);
            }
            Ok(other) => {
                warn!("Unexpected outcome {:?} for a move", other);
            }
        }
        out
    }

    fn resolve_collision(
        &mut self,
        attacker_id: u32,
        target_id: u32,
        target_pos: Cell,
        now: f64,
        out: &mut Vec<Outgoing>,
    ) {
        let Some(attacker) = self.registry.get(attacker_id) else {
            return;
        };
        let attacker_pos = attacker.cell();
        let can_hit = hit_available(attacker, now);

        out.push(Outgoing::to(
            attacker_id,
            Packet::MoveRejected {
                reason: RejectReason::BlockedByParticipant,
                x: attacker_pos.x,
                y: attacker_pos.y,
            },
        ));

        let Some(target) = self.registry.get_mut(target_id) else {
            return;
        };

        if !can_hit {
            debug!(
                "Participant {} bumped {} inside hit cooldown",
                attacker_id, target_id
            );
            out.push(Outgoing::all(Packet::HitLanded {
                attacker_id,
                target_id,
                damage_dealt: 0,
                target_new_health: target.health,
                attacker_pos,
                target_pos,
            }));
            return;
        }

        let lethal = target.take_damage(HIT_DAMAGE, now, RESPAWN_DELAY);
        let target_health = target.health;
        let respawn_time = target.respawn_time;

        out.push(Outgoing::all(Packet::HitLanded {
            attacker_id,
            target_id,
            damage_dealt: HIT_DAMAGE,
            target_new_health: target_health,
            attacker_pos,
            target_pos,
        }));
        out.push(Outgoing::all(Packet::HealthChanged {
            id: target_id,
            health: target_health,
        }));
        if lethal {
            info!(
                "Participant {} killed by {}, respawn at {:.2}",
                target_id, attacker_id, respawn_time
            );
            out.push(Outgoing::all(Packet::Died {
                id: target_id,
                respawn_time,
                position: target_pos,
            }));
        }

        if let Some(attacker) = self.registry.get_mut(attacker_id) {
            attacker.last_hit_time = now;
        }
    }

    /// Opens a dash window. Movement itself still goes through
    /// [`GameState::handle_move`], one cell per command.
    pub fn handle_dash(&mut self, id: u32, direction: Direction, now: f64) -> Vec<Outgoing> {
        let seed = self.map_seed;
        let grid = self.grid.get_or_init(|| generate_map(seed));
        let Some(p) = self.registry.get_mut(id) else {
            return Vec::new();
        };

        match validate(p, Command::Dash(direction), grid, |_| None, now) {
            Ok(outcome @ Outcome::DashStarted { .. }) => {
                apply_outcome(p, &outcome);
                debug!("Participant {} dashing {:?}", id, direction);
                vec![
                    Outgoing::to(
                        id,
                        Packet::DashAccepted {
                            dash_end_time: p.dash_end_time,
                            dash_direction: direction,
                            dash_cooldown_end_time: p.dash_cooldown_end_time,
                        },
                    ),
                    Outgoing::others(
                        id,
                        Packet::DashStarted {
                            id,
                            dash_end_time: p.dash_end_time,
                            dash_direction: direction,
                        },
                    ),
                ]
            }
            Ok(_) => Vec::new(),
            Err(err) => {
                debug!("Dash from {} rejected: {}", id, err);
                vec![Outgoing::to(id, dash_rejection(p, err))]
            }
        }
    }

    pub fn handle_cast(&mut self, id: u32, now: f64) -> Vec<Outgoing> {
        let seed = self.map_seed;
        let grid = self.grid.get_or_init(|| generate_map(seed));
        let Some(p) = self.registry.get_mut(id) else {
            return Vec::new();
        };

        match validate(p, Command::CastHeal, grid, |_| None, now) {
            Ok(outcome @ Outcome::CastStarted { .. }) => {
                apply_outcome(p, &outcome);
                self.scheduler.schedule(
                    p.mana_cast_end_time,
                    ScheduledEvent::CompleteCast { participant_id: id },
                );
                debug!("Participant {} casting until {:.2}", id, p.mana_cast_end_time);
                vec![Outgoing::to(
                    id,
                    Packet::CastAccepted {
                        mana_cast_end_time: p.mana_cast_end_time,
                        mana_cooldown_end_time: p.mana_cooldown_end_time,
                    },
                )]
            }
            Ok(_) => Vec::new(),
            Err(err) => {
                debug!("Cast from {} rejected: {}", id, err);
                vec![Outgoing::to(id, cast_rejection(p, err))]
            }
        }
    }

    /// Fires a deferred cast completion. The participant is looked up again
    /// because it may have left, died or been interrupted in the meantime.
    fn complete_cast(&mut self, id: u32, now: f64) -> Vec<Outgoing> {
        let Some(p) = self.registry.get_mut(id) else {
            debug!("Cast completion for departed participant {}", id);
            return Vec::new();
        };
        if !p.is_casting_mana || p.mana_cast_end_time > now {
            return Vec::new();
        }

        p.health = (p.health + HEAL_AMOUNT).min(MAX_HEALTH);
        p.is_casting_mana = false;
        let health = p.health;
        debug!("Participant {} healed to {}", id, health);

        vec![
            Outgoing::all(Packet::HealthChanged { id, health }),
            Outgoing::to(id, Packet::CastCompleted { new_health: health }),
        ]
    }

    pub fn debug_set_health(&mut self, id: u32, value: u8, now: f64) -> Vec<Outgoing> {
        let Some(p) = self.registry.get_mut(id) else {
            return Vec::new();
        };
        if p.is_dead {
            debug!("Ignoring debug health for dead participant {}", id);
            return Vec::new();
        }

        let value = value.min(MAX_HEALTH);
        let mut out = Vec::new();
        if value == 0 {
            p.die(now, RESPAWN_DELAY);
            out.push(Outgoing::all(Packet::HealthChanged { id, health: 0 }));
            out.push(Outgoing::all(Packet::Died {
                id,
                respawn_time: p.respawn_time,
                position: p.cell(),
            }));
        } else {
            p.health = value;
            out.push(Outgoing::all(Packet::HealthChanged { id, health: value }));
        }
        out
    }

    /// Per-tick housekeeping: deferred events, dash expiry, wall self-heal
    /// and respawns.
    pub fn update(&mut self, now: f64) -> Vec<Outgoing> {
        self.tick = self.tick.wrapping_add(1);
        let mut out = Vec::new();

        for event in self.scheduler.drain_due(now) {
            match event {
                ScheduledEvent::CompleteCast { participant_id } => {
                    out.extend(self.complete_cast(participant_id, now));
                }
            }
        }

        let seed = self.map_seed;
        let grid = self.grid.get_or_init(|| generate_map(seed));
        for p in self.registry.iter_mut() {
            p.expire_dash(now);
            if !p.is_dead && grid.is_wall(p.x, p.y) {
                out.extend(correct_position(p, grid));
            }
        }

        out.extend(self.check_respawns(now));
        out
    }

    /// Respawn Scheduler: revives everyone whose deadline has passed.
    pub fn check_respawns(&mut self, now: f64) -> Vec<Outgoing> {
        let seed = self.map_seed;
        let grid = self.grid.get_or_init(|| generate_map(seed));
        let center = grid.center();
        let spot = grid
            .find_nearest_valid_position(center.x, center.y)
            .unwrap_or(center);

        let mut out = Vec::new();
        for p in self.registry.iter_mut() {
            if !p.respawn_due(now) {
                continue;
            }
            p.revive(spot);
            info!("Participant {} respawned at ({}, {})", p.id, spot.x, spot.y);
            out.push(Outgoing::all(Packet::Respawned {
                id: p.id,
                health: p.health,
                position: spot,
            }));
            out.push(Outgoing::all(Packet::HealthChanged {
                id: p.id,
                health: p.health,
            }));
        }
        out
    }
}

fn generate_map(seed: u32) -> Grid {
    info!("Generating {}x{} map from seed {:#x}", GRID_WIDTH, GRID_HEIGHT, seed);
    Grid::generate(seed, GRID_WIDTH, GRID_HEIGHT)
}

fn dash_rejection(p: &ParticipantState, reason: CommandError) -> Packet {
    Packet::DashRejected {
        reason,
        dash_end_time: p.dash_end_time,
        dash_direction: p.dash_direction,
        dash_cooldown_end_time: p.dash_cooldown_end_time,
    }
}

fn cast_rejection(p: &ParticipantState, reason: CommandError) -> Packet {
    Packet::CastRejected {
        reason,
        is_casting_mana: p.is_casting_mana,
        mana_cast_end_time: p.mana_cast_end_time,
        mana_cooldown_end_time: p.mana_cooldown_end_time,
        health: p.health,
    }
}

/// Snaps a participant found inside a wall to the nearest open cell.
fn correct_position(p: &mut ParticipantState, grid: &Grid) -> Vec<Outgoing> {
    let Some(cell) = grid.find_nearest_valid_position(p.x, p.y) else {
        return Vec::new();
    };
    warn!(
        "Participant {} found inside wall at ({}, {}), moved to ({}, {})",
        p.id, p.x, p.y, cell.x, cell.y
    );
    p.place(cell);
    vec![Outgoing::to(
        p.id,
        Packet::MoveRejected {
            reason: RejectReason::PositionCorrected,
            x: cell.x,
            y: cell.y,
        },
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{CAST_TIME, DASH_COOLDOWN, DASH_DURATION, HIT_COOLDOWN};

    fn game_with(grid: Grid) -> GameState {
        GameState::with_grid(grid, ParticipantRegistry::seeded(11))
    }

    fn spawn_at(game: &mut GameState, id: u32, x: i32, y: i32) {
        game.add_participant(id).unwrap();
        game.participant_mut(id).unwrap().place(Cell::new(x, y));
    }

    fn direct_packets(out: &[Outgoing], client: u32) -> Vec<&Packet> {
        out.iter()
            .filter_map(|o| match o {
                Outgoing::ToClient { client_id, packet } if *client_id == client => Some(packet),
                _ => None,
            })
            .collect()
    }

    fn broadcasts(out: &[Outgoing]) -> Vec<&Packet> {
        out.iter()
            .filter_map(|o| match o {
                Outgoing::Broadcast { packet, .. } => Some(packet),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_add_participant_sends_initial_state_and_join() {
        let mut game = game_with(Grid::open(20, 20));
        game.add_participant(1).unwrap();
        let out = game.add_participant(2).unwrap();

        match direct_packets(&out, 2)[0] {
            Packet::InitialState {
                client_id, others, ..
            } => {
                assert_eq!(*client_id, 2);
                assert_eq!(others.len(), 1);
                assert_eq!(others[0].id, 1);
            }
            other => panic!("Unexpected packet {:?}", other),
        }
        assert!(matches!(
            out[1],
            Outgoing::Broadcast {
                packet: Packet::ParticipantJoined { .. },
                exclude: Some(2)
            }
        ));
    }

    #[test]
    fn test_map_generated_lazily_once() {
        let mut game = GameState::with_registry(42, ParticipantRegistry::seeded(1));
        assert!(game.grid.get().is_none());
        game.add_participant(1).unwrap();
        let first = game.grid().clone();
        game.add_participant(2).unwrap();
        assert_eq!(&first, game.grid());
        assert_eq!(first, Grid::generate(42, GRID_WIDTH, GRID_HEIGHT));
    }

    #[test]
    fn test_move_into_wall_changes_nothing() {
        let mut grid = Grid::open(10, 10);
        grid.set_wall(6, 5, true);
        let mut game = game_with(grid);
        spawn_at(&mut game, 1, 5, 5);

        let out = game.handle_move(1, Direction::Right, 1.0);
        let p = game.participant(1).unwrap();
        assert_eq!(p.cell(), Cell::new(5, 5));
        assert_eq!(p.target(), Cell::new(5, 5));
        assert_eq!(
            direct_packets(&out, 1),
            vec![&Packet::MoveRejected {
                reason: RejectReason::BlockedByWall,
                x: 5,
                y: 5
            }]
        );
    }

    #[test]
    fn test_move_out_of_bounds_changes_nothing() {
        let mut game = game_with(Grid::open(10, 10));
        spawn_at(&mut game, 1, 0, 0);
        game.handle_move(1, Direction::Left, 1.0);
        game.handle_move(1, Direction::Up, 2.0);
        assert_eq!(game.participant(1).unwrap().cell(), Cell::new(0, 0));
    }

    #[test]
    fn test_move_success_sets_position_and_target() {
        let mut game = game_with(Grid::open(10, 10));
        spawn_at(&mut game, 1, 5, 5);
        let out = game.handle_move(1, Direction::Down, 1.0);
        let p = game.participant(1).unwrap();
        assert_eq!(p.cell(), Cell::new(5, 6));
        assert_eq!(p.target(), Cell::new(5, 6));
        assert_eq!(
            direct_packets(&out, 1),
            vec![&Packet::MoveAccepted { x: 5, y: 6 }]
        );
    }

    #[test]
    fn test_collision_deals_damage_respecting_hit_cooldown() {
        let mut game = game_with(Grid::open(10, 10));
        spawn_at(&mut game, 1, 5, 5);
        spawn_at(&mut game, 2, 6, 5);

        let out = game.handle_move(1, Direction::Right, 10.0);
        assert_eq!(game.participant(1).unwrap().cell(), Cell::new(5, 5));
        assert_eq!(game.participant(2).unwrap().cell(), Cell::new(6, 5));
        assert_eq!(game.participant(2).unwrap().health, MAX_HEALTH - 1);
        assert_eq!(game.participant(1).unwrap().last_hit_time, 10.0);
        assert!(broadcasts(&out).iter().any(|p| matches!(
            p,
            Packet::HitLanded {
                damage_dealt: 1,
                ..
            }
        )));

        // Inside the cooldown: collision reported, no damage.
        let out = game.handle_move(1, Direction::Right, 10.0 + HIT_COOLDOWN / 2.0);
        assert_eq!(game.participant(2).unwrap().health, MAX_HEALTH - 1);
        assert!(broadcasts(&out).iter().any(|p| matches!(
            p,
            Packet::HitLanded {
                damage_dealt: 0,
                ..
            }
        )));
        assert_eq!(game.participant(1).unwrap().last_hit_time, 10.0);

        game.handle_move(1, Direction::Right, 10.0 + HIT_COOLDOWN);
        assert_eq!(game.participant(2).unwrap().health, MAX_HEALTH - 2);
        assert_eq!(game.participant(2).unwrap().cell(), Cell::new(6, 5));
    }

    #[test]
    fn test_lethal_hit_and_respawn() {
        let mut game = game_with(Grid::open(10, 10));
        spawn_at(&mut game, 1, 2, 2);
        spawn_at(&mut game, 2, 3, 2);
        game.participant_mut(2).unwrap().health = 1;

        let out = game.handle_move(1, Direction::Right, 20.0);
        let target = game.participant(2).unwrap();
        assert!(target.is_dead);
        assert_eq!(target.health, 0);
        assert_eq!(target.respawn_time, 20.0 + RESPAWN_DELAY);
        assert!(broadcasts(&out)
            .iter()
            .any(|p| matches!(p, Packet::Died { id: 2, .. })));

        // Dead participants no longer occupy their cell.
        game.handle_move(1, Direction::Right, 20.5);
        assert_eq!(game.participant(1).unwrap().cell(), Cell::new(3, 2));

        assert!(game.update(20.0 + RESPAWN_DELAY - 0.1).is_empty());
        let out = game.update(20.0 + RESPAWN_DELAY);
        let target = game.participant(2).unwrap();
        assert!(!target.is_dead);
        assert_eq!(target.health, MAX_HEALTH);
        assert_eq!(target.respawn_time, 0.0);
        assert_eq!(target.cell(), Cell::new(5, 5));
        assert!(broadcasts(&out).contains(&&Packet::Respawned {
            id: 2,
            health: MAX_HEALTH,
            position: Cell::new(5, 5),
        }));
    }

    #[test]
    fn test_respawn_uses_nearest_cell_when_center_is_wall() {
        let mut grid = Grid::open(10, 10);
        grid.set_wall(5, 5, true);
        grid.set_wall(5, 4, true);
        let mut game = game_with(grid);
        spawn_at(&mut game, 1, 0, 0);
        game.debug_set_health(1, 0, 1.0);
        game.update(1.0 + RESPAWN_DELAY);
        assert_eq!(game.participant(1).unwrap().cell(), Cell::new(4, 5));
    }

    #[test]
    fn test_dash_sets_window_without_moving() {
        let mut game = game_with(Grid::open(20, 20));
        spawn_at(&mut game, 1, 10, 10);
        let out = game.handle_dash(1, Direction::Right, 5.0);
        let p = game.participant(1).unwrap();
        assert_eq!(p.cell(), Cell::new(10, 10));
        assert_eq!(p.dash_direction, Some(Direction::Right));
        assert_approx_eq!(p.dash_end_time, 5.25, 1e-9);
        assert_eq!(out.len(), 2);

        let rejected = game.handle_move(1, Direction::Up, 5.1);
        assert_eq!(game.participant(1).unwrap().cell(), Cell::new(10, 10));
        assert!(matches!(
            direct_packets(&rejected, 1)[0],
            Packet::MoveRejected {
                reason: RejectReason::Invalid,
                ..
            }
        ));

        game.update(5.0 + DASH_DURATION);
        assert_eq!(game.participant(1).unwrap().dash_direction, None);
    }

    #[test]
    fn test_repeated_dash_and_cast_do_not_extend_cooldowns() {
        let mut game = game_with(Grid::open(20, 20));
        spawn_at(&mut game, 1, 10, 10);
        game.participant_mut(1).unwrap().health = 1;

        game.handle_dash(1, Direction::Left, 1.0);
        game.handle_cast(1, 1.0);
        let dash_cd = game.participant(1).unwrap().dash_cooldown_end_time;
        let mana_cd = game.participant(1).unwrap().mana_cooldown_end_time;

        for i in 1..10 {
            let t = 1.0 + i as f64 * 0.1;
            let dash = game.handle_dash(1, Direction::Left, t);
            assert!(matches!(
                direct_packets(&dash, 1).as_slice(),
                [Packet::DashRejected {
                    reason: CommandError::OnCooldown,
                    ..
                }]
            ));
            let cast = game.handle_cast(1, t);
            assert!(matches!(
                direct_packets(&cast, 1).as_slice(),
                [Packet::CastRejected {
                    reason: CommandError::OnCooldown,
                    ..
                }]
            ));
            assert!(broadcasts(&dash).is_empty() && broadcasts(&cast).is_empty());
        }
        let p = game.participant(1).unwrap();
        assert_eq!(p.dash_cooldown_end_time, dash_cd);
        assert_eq!(p.mana_cooldown_end_time, mana_cd);
        assert_eq!(p.health, 1);
    }

    #[test]
    fn test_refused_cast_reports_authoritative_fields() {
        let mut game = game_with(Grid::open(20, 20));
        spawn_at(&mut game, 1, 10, 10);

        let out = game.handle_cast(1, 10.0);
        assert_eq!(
            direct_packets(&out, 1),
            vec![&Packet::CastRejected {
                reason: CommandError::FullHealth,
                is_casting_mana: false,
                mana_cast_end_time: 0.0,
                mana_cooldown_end_time: 0.0,
                health: MAX_HEALTH,
            }]
        );
        assert!(!game.participant(1).unwrap().is_casting_mana);
    }

    #[test]
    fn test_refused_dash_reports_authoritative_fields() {
        let mut game = game_with(Grid::open(20, 20));
        spawn_at(&mut game, 1, 10, 10);
        game.handle_dash(1, Direction::Up, 2.0);

        let out = game.handle_dash(1, Direction::Left, 2.1);
        match direct_packets(&out, 1)[0] {
            Packet::DashRejected {
                reason,
                dash_end_time,
                dash_direction,
                dash_cooldown_end_time,
            } => {
                assert_eq!(*reason, CommandError::OnCooldown);
                assert_approx_eq!(*dash_end_time, 2.0 + DASH_DURATION, 1e-9);
                assert_eq!(*dash_direction, Some(Direction::Up));
                assert_approx_eq!(*dash_cooldown_end_time, 2.0 + DASH_COOLDOWN, 1e-9);
            }
            other => panic!("Unexpected packet {:?}", other),
        }

        let limited = game.reject_dash_rate_limited(1);
        assert!(matches!(
            direct_packets(&limited, 1)[0],
            Packet::DashRejected {
                reason: CommandError::RateLimited,
                ..
            }
        ));
        assert!(game.reject_dash_rate_limited(99).is_empty());
    }

    #[test]
    fn test_cast_completes_after_cast_time() {
        let mut game = game_with(Grid::open(20, 20));
        spawn_at(&mut game, 1, 10, 10);
        game.participant_mut(1).unwrap().health = 2;

        game.handle_cast(1, 1.0);
        assert!(game.participant(1).unwrap().is_casting_mana);
        assert!(game.update(1.0 + CAST_TIME - 0.1).is_empty());

        let out = game.update(1.0 + CAST_TIME);
        let p = game.participant(1).unwrap();
        assert!(!p.is_casting_mana);
        assert_eq!(p.health, 3);
        assert!(direct_packets(&out, 1).contains(&&Packet::CastCompleted { new_health: 3 }));
        assert!(broadcasts(&out).contains(&&Packet::HealthChanged { id: 1, health: 3 }));
    }

    #[test]
    fn test_cast_completion_for_removed_participant_is_noop() {
        let mut game = game_with(Grid::open(20, 20));
        spawn_at(&mut game, 1, 10, 10);
        game.participant_mut(1).unwrap().health = 2;
        game.handle_cast(1, 1.0);
        game.remove_participant(1);
        assert!(game.update(1.0 + CAST_TIME).is_empty());
        assert_eq!(game.pending_events(), 0);
    }

    #[test]
    fn test_death_interrupts_cast() {
        let mut game = game_with(Grid::open(20, 20));
        spawn_at(&mut game, 1, 10, 10);
        game.participant_mut(1).unwrap().health = 2;
        game.handle_cast(1, 1.0);
        game.debug_set_health(1, 0, 1.2);
        let out = game.update(1.0 + CAST_TIME);
        assert!(out.is_empty());
        assert_eq!(game.participant(1).unwrap().health, 0);
    }

    #[test]
    fn test_debug_set_health() {
        let mut game = game_with(Grid::open(20, 20));
        spawn_at(&mut game, 1, 10, 10);
        game.debug_set_health(1, 200, 0.0);
        assert_eq!(game.participant(1).unwrap().health, MAX_HEALTH);
        game.debug_set_health(1, 2, 0.0);
        assert_eq!(game.participant(1).unwrap().health, 2);
        game.debug_set_health(1, 0, 0.0);
        assert!(game.participant(1).unwrap().is_dead);
        assert!(game.debug_set_health(1, 3, 0.5).is_empty());
        assert!(game.participant(1).unwrap().is_dead);
    }

    #[test]
    fn test_participant_inside_wall_is_corrected() {
        let mut game = game_with(Grid::open(10, 10));
        spawn_at(&mut game, 1, 3, 3);
        if let Some(grid) = game.grid.get_mut() {
            grid.set_wall(3, 3, true);
        }
        let out = game.update(1.0);
        assert_eq!(game.participant(1).unwrap().cell(), Cell::new(3, 2));
        assert!(matches!(
            direct_packets(&out, 1)[0],
            Packet::MoveRejected {
                reason: RejectReason::PositionCorrected,
                ..
            }
        ));
    }

    #[test]
    fn test_is_dead_iff_health_zero() {
        let mut game = game_with(Grid::open(10, 10));
        spawn_at(&mut game, 1, 4, 4);
        spawn_at(&mut game, 2, 5, 4);
        let mut now = 0.0;
        for _ in 0..12 {
            now += HIT_COOLDOWN;
            game.handle_move(1, Direction::Right, now);
            game.update(now);
            for p in game.registry().iter() {
                assert_eq!(p.is_dead, p.health == 0);
            }
        }
    }
}
