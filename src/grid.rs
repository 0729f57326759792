//! Tile grid and fog-of-war visibility model.
//!
//! The grid uses a coordinate system where:
//! - Tile (0, 0) is the bottom-left corner
//! - Positive X is to the right
//! - Positive Y is up
//!
//! Visibility is recomputed every tick: `set_all_unobserved` clears the
//! observed flags, then the navigation loop re-marks the tiles the robot can
//! currently vouch for. A tile once seen does not stay revealed after the
//! robot moves away.

use crate::pose::Pose;
use crate::utils::heading_to_grid_step;

/// Occupancy state of a single tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileType {
    Unknown,
    Empty,
    Blocked,
    Goal,
}

/// One tile: occupancy, whether it is currently observed, and the letter
/// printed on the physical play mat it represents.
#[derive(Clone, Copy, Debug)]
pub struct TileState {
    pub kind: TileType,
    pub observed: bool,
    pub label: char,
}

/// Labels on the physical alphabet play mat, read row by row from the top.
const MAT_LABELS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Fixed-size 2D grid of tile states.
#[derive(Clone, Debug)]
pub struct TileGrid {
    width: usize,
    height: usize,
    tiles: Vec<TileState>,
}

impl TileGrid {
    /// Create a grid with every tile `Empty` and unobserved, the goal tile
    /// set, and mat labels assigned.
    pub fn new(width: usize, height: usize, goal: (usize, usize)) -> Self {
        let mut tiles = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                // Mat labels run left-to-right from the top row down
                let i = x + (height - y - 1) * width;
                tiles.push(TileState {
                    kind: TileType::Empty,
                    observed: false,
                    label: MAT_LABELS[i % MAT_LABELS.len()] as char,
                });
            }
        }
        let mut grid = Self {
            width,
            height,
            tiles,
        };
        let goal_idx = grid.idx(goal.0, goal.1);
        grid.tiles[goal_idx].kind = TileType::Goal;
        grid
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn idx(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Whether signed tile coordinates fall inside the grid.
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && (x as usize) < self.width && y >= 0 && (y as usize) < self.height
    }

    pub fn get(&self, x: usize, y: usize) -> Option<TileState> {
        if x < self.width && y < self.height {
            Some(self.tiles[self.idx(x, y)])
        } else {
            None
        }
    }

    /// Mark a tile observed with the inferred occupancy. Goal tiles keep
    /// their kind; only the observed flag changes.
    pub fn set_observed_tile(&mut self, x: usize, y: usize, kind: TileType) {
        let i = self.idx(x, y);
        let tile = &mut self.tiles[i];
        if tile.kind != TileType::Goal {
            tile.kind = kind;
        }
        tile.observed = true;
    }

    /// Reset the fog-of-war; called at the start of every tick.
    pub fn set_all_unobserved(&mut self) {
        for tile in &mut self.tiles {
            tile.observed = false;
        }
    }

    /// Coordinates of the goal tile, if one is set.
    pub fn goal_tile(&self) -> Option<(usize, usize)> {
        (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .find(|&(x, y)| self.tiles[self.idx(x, y)].kind == TileType::Goal)
    }

    /// Move the goal to a new tile (renderer drag-and-drop while
    /// disconnected). Returns false if the target is off-grid.
    pub fn relocate_goal(&mut self, x: usize, y: usize) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        if let Some((ox, oy)) = self.goal_tile() {
            let i = self.idx(ox, oy);
            self.tiles[i].kind = TileType::Empty;
        }
        let i = self.idx(x, y);
        self.tiles[i].kind = TileType::Goal;
        true
    }

    /// Plain-text render for the monitor loop: one row per line, top row
    /// first. Unobserved tiles show their mat label in fog; the robot is
    /// drawn as an arrow for its quantized heading.
    pub fn render_ascii(&self, robot: &Pose) -> String {
        let robot_tile = (robot.x.floor() as i32, robot.y.floor() as i32);
        let arrow = match heading_to_grid_step(robot.theta) {
            (1, 0) => '>',
            (0, 1) => '^',
            (-1, 0) => '<',
            _ => 'v',
        };

        let mut out = String::with_capacity((self.width * 2 + 1) * self.height);
        for y in (0..self.height).rev() {
            for x in 0..self.width {
                let tile = self.tiles[self.idx(x, y)];
                let c = if (x as i32, y as i32) == robot_tile {
                    arrow
                } else if !tile.observed {
                    tile.label.to_ascii_lowercase()
                } else {
                    match tile.kind {
                        TileType::Unknown => '?',
                        TileType::Empty => '.',
                        TileType::Blocked => '#',
                        TileType::Goal => 'G',
                    }
                };
                out.push(c);
                out.push(' ');
            }
            out.push('\n');
        }
        out
    }
}
