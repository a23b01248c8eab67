//! The battle map and its combat resolver.
//!
//! # Architecture
//!
//! The [`Map`] owns a row-major grid of [`Cell`]s (`grid[y][x]`) and two
//! indices that mirror the grid contents:
//!
//! - `ship_positions`: where each side's ship currently is
//! - `mine_positions`: where each placed mine sits, keyed by its [`MineId`]
//!
//! Every operation either fails before touching state (legality errors) or
//! updates the grid and the indices together. A map read back from a
//! snapshot is checked against the same rules, so an inconsistent snapshot
//! is rejected at the deserialization boundary.
//!
//! Blast damage uses a linear falloff: a cell at Chebyshev distance `d` from
//! the center takes `damage - d`, and cells that would take nothing are
//! skipped.
//!
//! # Example
//!
//! ```
//! use serenity_grid::{Direction, GridPosition, Map, Owner, Ship};
//!
//! let mut map = Map::new(10, 10).unwrap();
//! let ship = Ship::new("Serenity", 5, Owner::Players).unwrap();
//! map.spawn_ship(ship, GridPosition::new(2, 2)).unwrap();
//!
//! let moved_to = map.move_ship(Owner::Players, Direction::East).unwrap();
//! assert_eq!(moved_to, GridPosition::new(3, 2));
//! // cannot go back over our own trail
//! assert!(!map
//!     .available_moves_for_ship(Owner::Players)
//!     .unwrap()
//!     .allows(Direction::West));
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::actor::{Actor, ActorKind, Damage, Launchable, Mine, MineId, Owner, Ship, Torpedo};
use crate::cell::Cell;
use crate::error::GridError;
use crate::position::{Direction, Directions, GridPosition};

/// A `width x height` battle map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MapSnapshot")]
pub struct Map {
    width: u32,
    height: u32,
    grid: Vec<Vec<Cell>>,
    ship_positions: BTreeMap<Owner, GridPosition>,
    mine_positions: BTreeMap<MineId, GridPosition>,
}

/// Unvalidated wire form of a [`Map`].
#[derive(Deserialize)]
struct MapSnapshot {
    width: u32,
    height: u32,
    grid: Vec<Vec<Cell>>,
    #[serde(default)]
    ship_positions: BTreeMap<Owner, GridPosition>,
    #[serde(default)]
    mine_positions: BTreeMap<MineId, GridPosition>,
}

impl TryFrom<MapSnapshot> for Map {
    type Error = GridError;

    fn try_from(snapshot: MapSnapshot) -> Result<Self, Self::Error> {
        let map = Self {
            width: snapshot.width,
            height: snapshot.height,
            grid: snapshot.grid,
            ship_positions: snapshot.ship_positions,
            mine_positions: snapshot.mine_positions,
        };
        map.validate()?;
        Ok(map)
    }
}

// =============================================================================
// Construction and queries
// =============================================================================

impl Map {
    /// Creates an empty open-water map.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidDimensions`] if either side is zero or does
    /// not fit in an `i32` coordinate.
    pub fn new(width: u32, height: u32) -> Result<Self, GridError> {
        check_dimensions(width, height)?;
        Ok(Self {
            width,
            height,
            grid: vec![vec![Cell::new(); width as usize]; height as usize],
            ship_positions: BTreeMap::new(),
            mine_positions: BTreeMap::new(),
        })
    }

    /// Map width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Map height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Returns true if `position` lies on the map.
    #[must_use]
    pub fn in_bounds(&self, position: GridPosition) -> bool {
        self.index(position).is_some()
    }

    /// The cell at `position`, or `None` when out of bounds.
    #[must_use]
    pub fn cell(&self, position: GridPosition) -> Option<&Cell> {
        let (x, y) = self.index(position)?;
        Some(&self.grid[y][x])
    }

    /// Iterates every cell with its position, row by row.
    pub fn cells(&self) -> impl Iterator<Item = (GridPosition, &Cell)> {
        self.grid.iter().enumerate().flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .map(move |(x, cell)| (position_of(x, y), cell))
        })
    }

    /// Where `owner`'s ship currently is.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::MissingShip`] if the side has no ship on the map.
    pub fn ship_position(&self, owner: Owner) -> Result<GridPosition, GridError> {
        self.ship_positions
            .get(&owner)
            .copied()
            .ok_or(GridError::MissingShip { owner })
    }

    /// The ship belonging to `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::MissingShip`] if the side has no ship on the map.
    pub fn ship_for(&self, owner: Owner) -> Result<&Ship, GridError> {
        let position = self.ship_position(owner)?;
        self.cell(position)
            .and_then(|cell| cell.ship_for(owner))
            .ok_or(GridError::MissingShip { owner })
    }

    /// Owner to ship position index.
    #[must_use]
    pub const fn ship_positions(&self) -> &BTreeMap<Owner, GridPosition> {
        &self.ship_positions
    }

    /// Mine id to position index.
    #[must_use]
    pub const fn mine_positions(&self) -> &BTreeMap<MineId, GridPosition> {
        &self.mine_positions
    }

    /// Positions of every asteroid cell, row by row.
    #[must_use]
    pub fn asteroid_positions(&self) -> Vec<GridPosition> {
        self.cells()
            .filter(|(_, cell)| cell.has_asteroid())
            .map(|(position, _)| position)
            .collect()
    }

    fn index(&self, position: GridPosition) -> Option<(usize, usize)> {
        let x = usize::try_from(position.x).ok()?;
        let y = usize::try_from(position.y).ok()?;
        (y < self.grid.len() && x < self.grid[y].len()).then_some((x, y))
    }

    fn cell_mut(&mut self, position: GridPosition) -> Result<&mut Cell, GridError> {
        let (x, y) = self
            .index(position)
            .ok_or(GridError::OutOfBounds { position })?;
        Ok(&mut self.grid[y][x])
    }

    /// In-bounds positions within Chebyshev `radius` of `center`.
    #[allow(clippy::cast_possible_truncation)]
    fn positions_within(&self, center: GridPosition, radius: u32) -> Vec<GridPosition> {
        let r = i64::from(radius);
        let min_x = (i64::from(center.x) - r).max(0);
        let max_x = (i64::from(center.x) + r).min(i64::from(self.width) - 1);
        let min_y = (i64::from(center.y) - r).max(0);
        let max_y = (i64::from(center.y) + r).min(i64::from(self.height) - 1);

        // bounds are clamped to the map, which fits in i32
        (min_y..=max_y)
            .flat_map(|y| (min_x..=max_x).map(move |x| GridPosition::new(x as i32, y as i32)))
            .collect()
    }
}

// =============================================================================
// Setup
// =============================================================================

impl Map {
    /// Marks `position` as asteroid terrain. The cell must be empty.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::OutOfBounds`] or [`GridError::CannotBeAddedToCell`].
    pub fn place_asteroid(&mut self, position: GridPosition) -> Result<(), GridError> {
        let cell = self.cell_mut(position)?;
        if !cell.is_empty() {
            return Err(GridError::CannotBeAddedToCell {
                actor: ActorKind::Asteroid,
            });
        }
        cell.add(Actor::Asteroid)
    }

    /// Places a side's ship on the map.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::ShipAlreadyPresent`] if the side already has a ship,
    /// [`GridError::OutOfBounds`] or [`GridError::CannotBeAddedToCell`].
    pub fn spawn_ship(&mut self, ship: Ship, position: GridPosition) -> Result<(), GridError> {
        let owner = ship.owner();
        if self.ship_positions.contains_key(&owner) {
            return Err(GridError::ShipAlreadyPresent { owner });
        }
        self.cell_mut(position)?.add(Actor::Ship(ship))?;
        self.ship_positions.insert(owner, position);
        Ok(())
    }
}

// =============================================================================
// Movement
// =============================================================================

impl Map {
    /// Headings in which `owner`'s ship may move: in-bounds neighbours that
    /// accept the ship.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::MissingShip`] if the side has no ship on the map.
    pub fn available_moves_for_ship(&self, owner: Owner) -> Result<Directions, GridError> {
        let position = self.ship_position(owner)?;
        let ship = Actor::Ship(self.ship_for(owner)?.clone());
        Ok(Direction::ALL
            .into_iter()
            .filter(|direction| {
                self.cell(position.offset(*direction))
                    .is_some_and(|cell| cell.can_add(&ship))
            })
            .collect())
    }

    /// Moves `owner`'s ship one cell in `direction`, leaving a trail behind.
    ///
    /// Returns the new position.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidMove`] (with the map unchanged) if the
    /// heading is not in [`available_moves_for_ship`](Self::available_moves_for_ship).
    pub fn move_ship(
        &mut self,
        owner: Owner,
        direction: Direction,
    ) -> Result<GridPosition, GridError> {
        if !self.available_moves_for_ship(owner)?.allows(direction) {
            return Err(GridError::InvalidMove { owner, direction });
        }

        let from = self.ship_position(owner)?;
        let to = from.offset(direction);

        let source = self.cell_mut(from)?;
        let ship = source
            .take_ship(owner)
            .ok_or(GridError::MissingShip { owner })?;
        source.mark_trail(owner);
        self.cell_mut(to)?.add(Actor::Ship(ship))?;
        self.ship_positions.insert(owner, to);

        debug!(%owner, %direction, %from, %to, "ship moved");
        Ok(to)
    }

    /// Removes every trail left by `owner`, returning how many were cleared.
    pub fn clear_trails(&mut self, owner: Owner) -> usize {
        self.grid
            .iter_mut()
            .flatten()
            .map(|cell| cell.clear_trails(owner))
            .sum()
    }
}

// =============================================================================
// Weapons
// =============================================================================

impl Map {
    /// Positions a launchable can reach from its owner's ship: within
    /// Chebyshev `reach`, on the map, and accepting the object.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::MissingShip`] if the owner has no ship on the map.
    pub fn possible_object_launch<L: Launchable + ?Sized>(
        &self,
        launchable: &L,
    ) -> Result<BTreeSet<GridPosition>, GridError> {
        let origin = self.ship_position(launchable.owner())?;
        let actor = launchable.as_actor();
        Ok(self
            .positions_within(origin, launchable.reach())
            .into_iter()
            .filter(|position| self.cell(*position).is_some_and(|cell| cell.can_add(&actor)))
            .collect())
    }

    /// Fires a torpedo at `target` and applies its blast.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidTarget`] if the target is not a legal launch
    /// position, or [`GridError::ShipDestroyed`] if the blast sinks a ship.
    pub fn launch_torpedo(
        &mut self,
        torpedo: &Torpedo,
        target: GridPosition,
    ) -> Result<Vec<Damage>, GridError> {
        if !self.possible_object_launch(torpedo)?.contains(&target) {
            return Err(GridError::InvalidTarget { position: target });
        }
        debug!(owner = %torpedo.owner, %target, "torpedo launched");
        self.apply_falloff(target, torpedo.damage, torpedo.radius)
    }

    /// Places `mine` at `position` and indexes it. Returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidTarget`] if the position is not a legal
    /// launch position.
    pub fn place_mine(&mut self, mine: Mine, position: GridPosition) -> Result<MineId, GridError> {
        if !self.possible_object_launch(&mine)?.contains(&position) {
            return Err(GridError::InvalidTarget { position });
        }
        self.cell_mut(position)?.add(Actor::Mine(mine))?;
        self.mine_positions.insert(mine.uid, position);
        debug!(owner = %mine.owner, uid = %mine.uid, %position, "mine placed");
        Ok(mine.uid)
    }

    /// Detonates a placed mine and removes it once its blast is applied.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::MineNotFound`] for an unknown (or already detonated)
    /// id, or [`GridError::ShipDestroyed`] if the blast sinks a ship. The mine
    /// stays in place when the blast fails.
    pub fn detonate_mine(&mut self, uid: MineId) -> Result<Vec<Damage>, GridError> {
        let position = self
            .mine_positions
            .get(&uid)
            .copied()
            .ok_or(GridError::MineNotFound { uid })?;
        let mine = self
            .cell(position)
            .and_then(|cell| cell.find_mine(uid))
            .copied()
            .ok_or(GridError::MineNotFound { uid })?;

        let damages = self.apply_falloff(position, mine.damage, mine.radius)?;
        self.mine_positions.remove(&uid);
        self.cell_mut(position)?.take_mine(uid);
        debug!(%uid, %position, hits = damages.len(), "mine detonated");
        Ok(damages)
    }

    /// Deals `damage - distance` to every cell within `radius` of `center`.
    ///
    /// Hits are staged across the whole blast first. If any ship would be
    /// destroyed nothing is committed, and the error carries every hit.
    fn apply_falloff(
        &mut self,
        center: GridPosition,
        damage: u32,
        radius: u32,
    ) -> Result<Vec<Damage>, GridError> {
        let mut damages = Vec::new();
        let mut staged = Vec::new();
        let mut destroyed = None;
        for position in self.positions_within(center, radius) {
            let delivered = damage.saturating_sub(center.chebyshev_distance(position));
            let cell = self
                .cell(position)
                .ok_or(GridError::OutOfBounds { position })?;
            for (hit, outcome) in cell.stage_damage(delivered) {
                damages.push(hit);
                match outcome {
                    Ok(ship) => staged.push((position, ship)),
                    Err(err) => {
                        destroyed.get_or_insert(err);
                    }
                }
            }
        }

        if let Some(err) = destroyed {
            return Err(err.with_damages(damages));
        }
        for (position, ship) in staged {
            self.cell_mut(position)?.replace_ship(ship)?;
        }
        Ok(damages)
    }
}

// =============================================================================
// Direct hull changes
// =============================================================================

impl Map {
    /// Deals `amount` damage directly to `owner`'s ship, ignoring any other
    /// ship sharing the cell.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::MissingShip`] or [`GridError::ShipDestroyed`].
    pub fn remove_hp(&mut self, owner: Owner, amount: u32) -> Result<Vec<Damage>, GridError> {
        let position = self.ship_position(owner)?;
        if amount == 0 {
            return Ok(Vec::new());
        }
        let cell = self.cell_mut(position)?;
        let ship = cell
            .ship_for(owner)
            .ok_or(GridError::MissingShip { owner })?
            .apply_damage(amount)?;
        cell.replace_ship(ship)?;
        Ok(vec![Damage { amount, owner }])
    }

    /// Repairs `owner`'s ship by `hp`, capped at its `total_hp`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::MissingShip`] if the side has no ship on the map.
    pub fn repair_ship(&mut self, owner: Owner, hp: u32) -> Result<&Ship, GridError> {
        let position = self.ship_position(owner)?;
        let cell = self.cell_mut(position)?;
        let repaired = cell
            .ship_for(owner)
            .ok_or(GridError::MissingShip { owner })?
            .repaired(hp);
        cell.replace_ship(repaired)?;
        self.ship_for(owner)
    }
}

// =============================================================================
// Snapshot validation
// =============================================================================

impl Map {
    fn validate(&self) -> Result<(), GridError> {
        check_dimensions(self.width, self.height)?;
        let inconsistent = |reason: String| GridError::InconsistentSnapshot { reason };

        if self.grid.len() != self.height as usize {
            return Err(inconsistent(format!(
                "expected {} rows, found {}",
                self.height,
                self.grid.len()
            )));
        }
        if let Some((y, row)) = self
            .grid
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != self.width as usize)
        {
            return Err(inconsistent(format!(
                "row {y} has {} cells, expected {}",
                row.len(),
                self.width
            )));
        }

        let mut ships = BTreeMap::new();
        let mut mines = BTreeMap::new();
        for (position, cell) in self.cells() {
            let mut trails = BTreeSet::new();
            for actor in cell.content() {
                if cell.has_asteroid() {
                    return Err(inconsistent(format!(
                        "asteroid cell {position} holds a {}",
                        actor.kind()
                    )));
                }
                match actor {
                    Actor::Ship(ship) => {
                        if ships.insert(ship.owner(), position).is_some() {
                            return Err(inconsistent(format!(
                                "more than one ship for {}",
                                ship.owner()
                            )));
                        }
                    }
                    Actor::Trail(trail) => {
                        if !trails.insert(trail.owner) {
                            return Err(inconsistent(format!(
                                "duplicate {} trail at {position}",
                                trail.owner
                            )));
                        }
                    }
                    Actor::Mine(mine) => {
                        if mines.insert(mine.uid, position).is_some() {
                            return Err(inconsistent(format!("duplicate mine {}", mine.uid)));
                        }
                    }
                    Actor::Torpedo(_) | Actor::Asteroid => {
                        return Err(inconsistent(format!(
                            "{} stored as content at {position}",
                            actor.kind()
                        )));
                    }
                }
            }
        }

        if ships != self.ship_positions {
            return Err(inconsistent("ship index does not match grid".into()));
        }
        if mines != self.mine_positions {
            return Err(inconsistent("mine index does not match grid".into()));
        }
        Ok(())
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<(), GridError> {
    if width == 0 || height == 0 || i32::try_from(width).is_err() || i32::try_from(height).is_err()
    {
        return Err(GridError::InvalidDimensions { width, height });
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
const fn position_of(x: usize, y: usize) -> GridPosition {
    // dimensions are checked to fit in i32
    GridPosition::new(x as i32, y as i32)
}
