//! Grid coordinates, headings and the occupancy board

use crate::peer::PeerId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A cell coordinate on the square grid
///
/// `x` grows to the right and `y` grows downwards, so `(0, 0)` is the
/// top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Returns the neighbouring cell one step along `heading`
    ///
    /// The result is clamped into `0..size` on both axes. A peer pinned
    /// against a wall therefore gets its own position back, which the
    /// simulator treats as an in-place collision.
    pub fn step(self, heading: Direction, size: usize) -> Position {
        let max = size.saturating_sub(1);
        match heading {
            Direction::Up => Position::new(self.x, self.y.saturating_sub(1)),
            Direction::Down => Position::new(self.x, (self.y + 1).min(max)),
            Direction::Left => Position::new(self.x.saturating_sub(1), self.y),
            Direction::Right => Position::new((self.x + 1).min(max), self.y),
        }
    }

    pub fn in_bounds(self, size: usize) -> bool {
        self.x < size && self.y < size
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One of the four cardinal headings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// True for headings that move along the x axis
    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        };
        f.write_str(name)
    }
}

/// Occupancy marker of a single board cell
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Empty,
    Trail(PeerId),
    Head(PeerId),
    Dead(PeerId),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// The peer owning this marker, if any
    pub fn owner(&self) -> Option<&PeerId> {
        match self {
            Cell::Empty => None,
            Cell::Trail(id) | Cell::Head(id) | Cell::Dead(id) => Some(id),
        }
    }
}

/// Fixed-size square grid of cell markers
///
/// Stored row-major. Every accessor is bounds-checked; no coordinate can make
/// the board panic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    size: usize,
    cells: Vec<Cell>,
}

impl Board {
    /// Largest supported side length
    pub const MAX_SIZE: usize = 1024;

    /// Creates an empty board. Sizes above [`Board::MAX_SIZE`] are clamped.
    pub fn new(size: usize) -> Self {
        let size = size.min(Self::MAX_SIZE);
        let cells = size.checked_mul(size).unwrap_or(0);
        Self {
            size,
            cells: vec![Cell::Empty; cells],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.in_bounds(self.size)
    }

    pub fn get(&self, pos: Position) -> Option<&Cell> {
        if self.contains(pos) {
            self.cells.get(pos.y * self.size + pos.x)
        } else {
            None
        }
    }

    /// Writes `cell` at `pos`. Returns false, leaving the board untouched,
    /// when `pos` is outside the grid.
    pub fn set(&mut self, pos: Position, cell: Cell) -> bool {
        if !self.contains(pos) {
            return false;
        }
        match self.cells.get_mut(pos.y * self.size + pos.x) {
            Some(slot) => {
                *slot = cell;
                true
            }
            None => false,
        }
    }

    /// Out-of-range positions count as occupied (walls)
    pub fn is_occupied(&self, pos: Position) -> bool {
        self.get(pos).map_or(true, |cell| !cell.is_empty())
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.size.max(1))
    }

    /// Number of cells carrying a marker of any kind
    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|cell| !cell.is_empty()).count()
    }

    /// Positions of every cell matching `predicate`, in row-major order
    pub fn positions_where<F>(&self, predicate: F) -> Vec<Position>
    where
        F: Fn(&Cell) -> bool,
    {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| predicate(cell))
            .map(|(index, _)| Position::new(index % self.size, index / self.size))
            .collect()
    }
}
