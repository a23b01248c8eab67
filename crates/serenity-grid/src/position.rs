//! Grid coordinates, headings and direction sets.
//!
//! Positions are integer `(x, y)` pairs with `y` growing southwards, so
//! North is `(0, -1)`. All distances on the grid are Chebyshev distances
//! (`max(|dx|, |dy|)`), which makes the eight cells around a position all
//! sit at distance 1.

use std::fmt;

use bitflags::bitflags;
use glam::IVec2;
use serde::{Deserialize, Serialize};

// =============================================================================
// GridPosition
// =============================================================================

/// An immutable integer position on the grid, compared by value.
///
/// # Example
///
/// ```
/// use serenity_grid::{Direction, GridPosition};
///
/// let origin = GridPosition::new(5, 5);
/// assert_eq!(origin.offset(Direction::North), GridPosition::new(5, 4));
/// assert_eq!(origin.chebyshev_distance(GridPosition::new(7, 4)), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridPosition {
    /// Column, growing eastwards.
    pub x: i32,
    /// Row, growing southwards.
    pub y: i32,
}

impl GridPosition {
    /// Creates a new position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns this position as a `glam` vector for offset arithmetic.
    #[must_use]
    pub const fn as_ivec2(self) -> IVec2 {
        IVec2::new(self.x, self.y)
    }

    /// Returns the neighbouring position one step in `direction`.
    ///
    /// The result is not bounds-checked.
    #[must_use]
    pub fn offset(self, direction: Direction) -> Self {
        (self.as_ivec2() + direction.offset()).into()
    }

    /// Chebyshev distance between two positions: `max(|dx|, |dy|)`.
    #[must_use]
    pub fn chebyshev_distance(self, other: Self) -> u32 {
        let delta = self.as_ivec2() - other.as_ivec2();
        delta.x.unsigned_abs().max(delta.y.unsigned_abs())
    }
}

impl From<IVec2> for GridPosition {
    fn from(v: IVec2) -> Self {
        Self::new(v.x, v.y)
    }
}

impl From<GridPosition> for IVec2 {
    fn from(p: GridPosition) -> Self {
        p.as_ivec2()
    }
}

impl fmt::Display for GridPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// =============================================================================
// Direction
// =============================================================================

/// One of the four headings a ship can move in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Towards row 0.
    North,
    /// Towards the last row.
    South,
    /// Towards the last column.
    East,
    /// Towards column 0.
    West,
}

impl Direction {
    /// All headings, in a fixed order.
    pub const ALL: [Self; 4] = [Self::North, Self::South, Self::East, Self::West];

    /// Grid offset for one step in this direction.
    #[must_use]
    pub const fn offset(self) -> IVec2 {
        match self {
            Self::North => IVec2::new(0, -1),
            Self::South => IVec2::new(0, 1),
            Self::East => IVec2::new(1, 0),
            Self::West => IVec2::new(-1, 0),
        }
    }

    /// The single-bit [`Directions`] set for this heading.
    #[must_use]
    pub const fn flag(self) -> Directions {
        match self {
            Self::North => Directions::NORTH,
            Self::South => Directions::SOUTH,
            Self::East => Directions::EAST,
            Self::West => Directions::WEST,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::North => write!(f, "north"),
            Self::South => write!(f, "south"),
            Self::East => write!(f, "east"),
            Self::West => write!(f, "west"),
        }
    }
}

// =============================================================================
// Directions
// =============================================================================

bitflags! {
    /// A set of headings, as returned by
    /// [`Map::available_moves_for_ship`](crate::Map::available_moves_for_ship).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Directions: u8 {
        /// North is legal.
        const NORTH = 1;
        /// South is legal.
        const SOUTH = 1 << 1;
        /// East is legal.
        const EAST = 1 << 2;
        /// West is legal.
        const WEST = 1 << 3;
    }
}

impl Directions {
    /// Returns true if `direction` is in the set.
    #[must_use]
    pub const fn allows(self, direction: Direction) -> bool {
        self.contains(direction.flag())
    }
}

impl FromIterator<Direction> for Directions {
    fn from_iter<I: IntoIterator<Item = Direction>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |set, direction| set | direction.flag())
    }
}
