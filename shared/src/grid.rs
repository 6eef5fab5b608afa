//! Wall grid generated from a shared seed.
//!
//! Server and client both call [`Grid::generate`] with the seed sent in the
//! initial state and must end up with identical walls.

use crate::state::Cell;

/// Small deterministic generator so both sides agree on the map bit for bit.
#[derive(Clone, Debug)]
struct SeedRng {
    seed: u32,
}

impl SeedRng {
    fn new(seed: u32) -> Self {
        Self { seed }
    }

    fn next_f32(&mut self) -> f32 {
        self.seed = self.seed.wrapping_add(0x6d2b_79f5);
        let mut t = self.seed;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        let out = t ^ (t >> 14);
        (out as f64 / 4_294_967_296.0) as f32
    }

    fn int(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        let span = (max - min + 1) as f32;
        min + (self.next_f32() * span).floor() as i32
    }
}

const WALL_SEGMENTS_PER_100_CELLS: i32 = 2;
const MAX_SEGMENT_LENGTH: i32 = 6;
const CLEAR_RADIUS: i32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: i32,
    height: i32,
    walls: Vec<bool>,
}

impl Grid {
    /// A grid without any walls.
    pub fn open(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            walls: vec![false; (width * height) as usize],
        }
    }

    /// Scatters straight wall segments, keeping the area around the centre clear
    /// so spawning and respawning always have room.
    pub fn generate(seed: u32, width: i32, height: i32) -> Self {
        let mut grid = Self::open(width, height);
        let mut rng = SeedRng::new(seed);
        let center = grid.center();
        let segments = (grid.width * grid.height) / 100 * WALL_SEGMENTS_PER_100_CELLS;

        for _ in 0..segments {
            let x = rng.int(0, grid.width - 1);
            let y = rng.int(0, grid.height - 1);
            let horizontal = rng.next_f32() < 0.5;
            let length = rng.int(2, MAX_SEGMENT_LENGTH);
            for i in 0..length {
                let cell = if horizontal {
                    Cell::new(x + i, y)
                } else {
                    Cell::new(x, y + i)
                };
                if cell.manhattan(center) <= CLEAR_RADIUS {
                    continue;
                }
                grid.set_wall(cell.x, cell.y, true);
            }
        }

        grid
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn center(&self) -> Cell {
        Cell::new(self.width / 2, self.height / 2)
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    /// Out-of-bounds cells count as walls.
    pub fn is_wall(&self, x: i32, y: i32) -> bool {
        if !self.in_bounds(x, y) {
            return true;
        }
        self.walls[self.index(x, y)]
    }

    pub fn set_wall(&mut self, x: i32, y: i32, wall: bool) {
        if self.in_bounds(x, y) {
            let idx = self.index(x, y);
            self.walls[idx] = wall;
        }
    }

    /// Closest open cell by Manhattan distance; ties go to the lower row, then
    /// the lower column. `None` only if every cell is a wall.
    pub fn find_nearest_valid_position(&self, x: i32, y: i32) -> Option<Cell> {
        if !self.is_wall(x, y) {
            return Some(Cell::new(x, y));
        }
        let origin = Cell::new(x, y);
        let mut best: Option<(i32, i32, i32)> = None;
        for cy in 0..self.height {
            for cx in 0..self.width {
                if self.walls[self.index(cx, cy)] {
                    continue;
                }
                let key = (origin.manhattan(Cell::new(cx, cy)), cy, cx);
                if best.map(|b| key < b).unwrap_or(true) {
                    best = Some(key);
                }
            }
        }
        best.map(|(_, cy, cx)| Cell::new(cx, cy))
    }

    /// Every open cell in row-major order.
    pub fn open_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width)
                .filter(move |&x| !self.walls[self.index(x, y)])
                .map(move |x| Cell::new(x, y))
        })
    }

    fn index(&self, x: i32, y: i32) -> usize {
        (y * self.width + x) as usize
    }
}
