//! Authoritative participant records and spawn allocation.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Cell, Grid, ParticipantState, COLOR_PALETTE};
use std::collections::{BTreeMap, HashSet};

/// Random samples tried around the centre before the deterministic sweeps.
const SPAWN_SAMPLES: usize = 32;
const SPAWN_SAMPLE_RADIUS: i32 = 4;
const SPAWN_SWEEP_RADIUS: i32 = 12;

/// Owns every participant record, keyed by connection id.
///
/// A `BTreeMap` keeps iteration order stable, so deltas and broadcasts come
/// out in id order.
pub struct ParticipantRegistry {
    participants: BTreeMap<u32, ParticipantState>,
    /// Spawn cells handed out and not yet released.
    claimed_spawns: HashSet<Cell>,
    spawn_of: BTreeMap<u32, Cell>,
    next_color: usize,
    rng: StdRng,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            participants: BTreeMap::new(),
            claimed_spawns: HashSet::new(),
            spawn_of: BTreeMap::new(),
            next_color: 0,
            rng,
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Creates a participant on a free spawn cell near the map centre.
    /// Returns `None` if the map has no free cell at all.
    pub fn create(&mut self, id: u32, grid: &Grid) -> Option<&ParticipantState> {
        let spawn = self.allocate_spawn(grid)?;
        let color = COLOR_PALETTE[self.next_color % COLOR_PALETTE.len()];
        self.next_color += 1;

        self.claimed_spawns.insert(spawn);
        self.spawn_of.insert(id, spawn);
        self.participants
            .insert(id, ParticipantState::new(id, color, spawn));
        info!(
            "Participant {} spawned at ({}, {}) as {}",
            id, spawn.x, spawn.y, color
        );
        self.participants.get(&id)
    }

    /// Removes a participant and releases its spawn cell.
    pub fn remove(&mut self, id: u32) -> Option<ParticipantState> {
        if let Some(spawn) = self.spawn_of.remove(&id) {
            self.claimed_spawns.remove(&spawn);
        }
        let removed = self.participants.remove(&id);
        if removed.is_some() {
            info!("Participant {} removed", id);
        }
        removed
    }

    pub fn get(&self, id: u32) -> Option<&ParticipantState> {
        self.participants.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut ParticipantState> {
        self.participants.get_mut(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.participants.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParticipantState> {
        self.participants.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ParticipantState> {
        self.participants.values_mut()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.participants.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Id of the live participant standing on `cell`, if any.
    pub fn occupant_at(&self, cell: Cell) -> Option<u32> {
        self.participants
            .values()
            .find(|p| !p.is_dead && p.cell() == cell)
            .map(|p| p.id)
    }

    fn is_free(&self, grid: &Grid, cell: Cell) -> bool {
        !grid.is_wall(cell.x, cell.y)
            && !self.claimed_spawns.contains(&cell)
            && self.occupant_at(cell).is_none()
    }

    /// Random samples near the centre, then an expanding ring sweep, then the
    /// whole grid.
    fn allocate_spawn(&mut self, grid: &Grid) -> Option<Cell> {
        let center = grid.center();

        for _ in 0..SPAWN_SAMPLES {
            let cell = Cell::new(
                center.x + self.rng.gen_range(-SPAWN_SAMPLE_RADIUS..=SPAWN_SAMPLE_RADIUS),
                center.y + self.rng.gen_range(-SPAWN_SAMPLE_RADIUS..=SPAWN_SAMPLE_RADIUS),
            );
            if self.is_free(grid, cell) {
                return Some(cell);
            }
        }
        debug!("Random spawn sampling failed, sweeping rings around centre");

        for radius in 0..=SPAWN_SWEEP_RADIUS {
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx.abs().max(dy.abs()) != radius {
                        continue;
                    }
                    let cell = Cell::new(center.x + dx, center.y + dy);
                    if self.is_free(grid, cell) {
                        return Some(cell);
                    }
                }
            }
        }
        debug!("Ring sweep failed, sweeping full grid");

        grid.open_cells().find(|&cell| self.is_free(grid, cell))
    }
}

impl Default for ParticipantRegistry {
    fn default() -> Self {
        Self::new()
    }
}
