//! A single grid cell: a terrain flag plus an ordered list of actors.

use serde::{Deserialize, Serialize};

use crate::actor::{Actor, ActorKind, Damage, Mine, MineId, Owner, Ship, Trail};
use crate::error::GridError;

/// Content of one grid square.
///
/// Placement rules:
/// - Asteroid cells accept only torpedoes.
/// - A cell holds at most one ship per owner, and a ship is rejected where
///   its own owner has already left a trail.
/// - Adding a trail that already exists for the same owner is a no-op.
/// - Torpedoes are accepted but never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default)]
    content: Vec<Actor>,
    #[serde(default)]
    has_asteroid: bool,
}

impl Cell {
    /// An empty open-water cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the cell is asteroid terrain.
    #[must_use]
    pub const fn has_asteroid(&self) -> bool {
        self.has_asteroid
    }

    /// Actors currently in the cell, in insertion order.
    #[must_use]
    pub fn content(&self) -> &[Actor] {
        &self.content
    }

    /// Returns true if the cell has no terrain and no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_asteroid && self.content.is_empty()
    }

    /// Returns true if `actor` could be added without error. Never mutates.
    #[must_use]
    pub fn can_add(&self, actor: &Actor) -> bool {
        self.check_add(actor).is_ok()
    }

    /// Checks the placement rules for `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::CannotBeAddedToCell`] if the actor is not allowed here.
    pub fn check_add(&self, actor: &Actor) -> Result<(), GridError> {
        let rejected = || GridError::CannotBeAddedToCell { actor: actor.kind() };

        if self.has_asteroid && !matches!(actor, Actor::Torpedo(_)) {
            return Err(rejected());
        }
        if let Actor::Ship(ship) = actor {
            let owner = ship.owner();
            if self.has_trail_for(owner) || self.ship_for(owner).is_some() {
                return Err(rejected());
            }
        }
        Ok(())
    }

    /// Adds `actor` to the cell.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::CannotBeAddedToCell`] if the placement rules reject it.
    pub fn add(&mut self, actor: Actor) -> Result<(), GridError> {
        self.check_add(&actor)?;
        match actor {
            Actor::Asteroid => self.has_asteroid = true,
            Actor::Torpedo(_) => {}
            Actor::Trail(trail) if self.has_trail_for(trail.owner) => {}
            other => self.content.push(other),
        }
        Ok(())
    }

    /// Removes the first actor equal to `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::ActorNotFound`] if no such actor is in the cell.
    pub fn remove(&mut self, actor: &Actor) -> Result<Actor, GridError> {
        let index = self
            .content
            .iter()
            .position(|a| a == actor)
            .ok_or(GridError::ActorNotFound { actor: actor.kind() })?;
        Ok(self.content.remove(index))
    }

    /// The ship belonging to `owner`, if present.
    #[must_use]
    pub fn ship_for(&self, owner: Owner) -> Option<&Ship> {
        self.content
            .iter()
            .filter_map(Actor::as_ship)
            .find(|ship| ship.owner() == owner)
    }

    /// Returns true if `owner` has left a trail here.
    #[must_use]
    pub fn has_trail_for(&self, owner: Owner) -> bool {
        self.content
            .iter()
            .any(|a| matches!(a, Actor::Trail(t) if t.owner == owner))
    }

    /// The mine with `uid`, if present.
    #[must_use]
    pub fn find_mine(&self, uid: MineId) -> Option<&Mine> {
        self.content
            .iter()
            .filter_map(Actor::as_mine)
            .find(|mine| mine.uid == uid)
    }

    /// Removes and returns the ship belonging to `owner`.
    pub(crate) fn take_ship(&mut self, owner: Owner) -> Option<Ship> {
        let index = self
            .content
            .iter()
            .position(|a| matches!(a, Actor::Ship(s) if s.owner() == owner))?;
        match self.content.remove(index) {
            Actor::Ship(ship) => Some(ship),
            _ => None,
        }
    }

    /// Replaces the ship belonging to `ship.owner()` in place.
    pub(crate) fn replace_ship(&mut self, ship: Ship) -> Result<(), GridError> {
        let owner = ship.owner();
        let slot = self
            .content
            .iter_mut()
            .find(|a| matches!(a, Actor::Ship(s) if s.owner() == owner))
            .ok_or(GridError::ActorNotFound {
                actor: ActorKind::Ship,
            })?;
        *slot = Actor::Ship(ship);
        Ok(())
    }

    /// Removes and returns the mine with `uid`.
    pub(crate) fn take_mine(&mut self, uid: MineId) -> Option<Mine> {
        let index = self
            .content
            .iter()
            .position(|a| matches!(a, Actor::Mine(m) if m.uid == uid))?;
        match self.content.remove(index) {
            Actor::Mine(mine) => Some(mine),
            _ => None,
        }
    }

    /// Adds a trail for `owner` unless one is already present.
    pub(crate) fn mark_trail(&mut self, owner: Owner) {
        if !self.has_trail_for(owner) {
            self.content.push(Actor::Trail(Trail { owner }));
        }
    }

    /// Removes every trail left by `owner`, returning how many were removed.
    pub fn clear_trails(&mut self, owner: Owner) -> usize {
        let before = self.content.len();
        self.content
            .retain(|a| !matches!(a, Actor::Trail(t) if t.owner == owner));
        before - self.content.len()
    }

    /// Deals `amount` damage to every ship in the cell.
    ///
    /// Damage is computed for every ship first and committed only if no ship
    /// is destroyed, so a [`GridError::ShipDestroyed`] leaves the cell as it was.
    /// Zero damage is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::ShipDestroyed`] carrying every hit in the cell if
    /// any ship's hit points reach zero.
    pub fn apply_damage(&mut self, amount: u32) -> Result<Vec<Damage>, GridError> {
        let staged = self.stage_damage(amount);
        let damages: Vec<Damage> = staged.iter().map(|(damage, _)| *damage).collect();

        let mut ships = Vec::with_capacity(staged.len());
        for (_, outcome) in staged {
            ships.push(outcome.map_err(|err| err.with_damages(damages.clone()))?);
        }
        for ship in ships {
            self.replace_ship(ship)?;
        }
        Ok(damages)
    }

    /// Every hit `amount` would deal, paired with the damaged ship or its
    /// destruction. Never mutates.
    pub(crate) fn stage_damage(&self, amount: u32) -> Vec<(Damage, Result<Ship, GridError>)> {
        if amount == 0 {
            return Vec::new();
        }
        self.content
            .iter()
            .filter_map(Actor::as_ship)
            .map(|ship| {
                let damage = Damage {
                    amount,
                    owner: ship.owner(),
                };
                (damage, ship.apply_damage(amount))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Torpedo;

    fn ship(owner: Owner, hp: u32) -> Actor {
        Actor::Ship(Ship::new(format!("{owner}-ship"), hp, owner).unwrap())
    }

    fn trail(owner: Owner) -> Actor {
        Actor::Trail(Trail { owner })
    }

    fn torpedo() -> Actor {
        Actor::Torpedo(Torpedo {
            owner: Owner::Players,
            damage: 2,
            reach: 4,
            radius: 2,
        })
    }

    mod placement_tests {
        use super::*;

        #[test]
        fn asteroid_accepts_only_torpedoes() {
            let mut cell = Cell::new();
            cell.add(Actor::Asteroid).unwrap();
            assert!(cell.has_asteroid());
            assert!(cell.content().is_empty());

            assert!(!cell.can_add(&ship(Owner::Players, 3)));
            assert!(!cell.can_add(&trail(Owner::Players)));
            assert!(!cell.can_add(&Actor::Asteroid));
            assert!(cell.can_add(&torpedo()));
        }

        #[test]
        fn ship_rejected_on_own_trail_only() {
            let mut cell = Cell::new();
            cell.add(trail(Owner::Players)).unwrap();
            assert!(!cell.can_add(&ship(Owner::Players, 3)));
            assert!(cell.can_add(&ship(Owner::Npcs, 3)));
        }

        #[test]
        fn one_ship_per_owner() {
            let mut cell = Cell::new();
            cell.add(ship(Owner::Npcs, 3)).unwrap();
            let err = cell.add(ship(Owner::Npcs, 2)).unwrap_err();
            assert_eq!(
                err,
                GridError::CannotBeAddedToCell {
                    actor: ActorKind::Ship
                }
            );
            cell.add(ship(Owner::Players, 3)).unwrap();
            assert_eq!(cell.content().len(), 2);
        }

        #[test]
        fn trail_add_is_idempotent() {
            let mut cell = Cell::new();
            cell.add(trail(Owner::Npcs)).unwrap();
            cell.add(trail(Owner::Npcs)).unwrap();
            assert_eq!(cell.content().len(), 1);
        }

        #[test]
        fn torpedo_is_not_stored() {
            let mut cell = Cell::new();
            cell.add(torpedo()).unwrap();
            assert!(cell.is_empty());
        }

        #[test]
        fn can_add_does_not_mutate() {
            let cell = Cell::new();
            let before = cell.clone();
            assert!(cell.can_add(&trail(Owner::Players)));
            assert_eq!(cell, before);
        }
    }

    mod removal_tests {
        use super::*;

        #[test]
        fn remove_missing_actor_fails() {
            let mut cell = Cell::new();
            let err = cell.remove(&trail(Owner::Players)).unwrap_err();
            assert_eq!(
                err,
                GridError::ActorNotFound {
                    actor: ActorKind::Trail
                }
            );
        }

        #[test]
        fn clear_trails_only_touches_owner() {
            let mut cell = Cell::new();
            cell.add(trail(Owner::Players)).unwrap();
            cell.add(trail(Owner::Npcs)).unwrap();
            assert_eq!(cell.clear_trails(Owner::Players), 1);
            assert!(!cell.has_trail_for(Owner::Players));
            assert!(cell.has_trail_for(Owner::Npcs));
        }

        #[test]
        fn take_mine_by_uid() {
            let mut cell = Cell::new();
            let mine = Mine::new(Owner::Players, 3, 2, 1);
            cell.add(Actor::Mine(mine)).unwrap();
            assert_eq!(cell.find_mine(mine.uid), Some(&mine));
            assert_eq!(cell.take_mine(mine.uid), Some(mine));
            assert!(cell.find_mine(mine.uid).is_none());
        }
    }

    mod damage_tests {
        use super::*;

        #[test]
        fn damage_hits_every_ship() {
            let mut cell = Cell::new();
            cell.add(ship(Owner::Players, 5)).unwrap();
            cell.add(ship(Owner::Npcs, 4)).unwrap();
            let damages = cell.apply_damage(2).unwrap();
            assert_eq!(damages.len(), 2);
            assert_eq!(cell.ship_for(Owner::Players).unwrap().hp(), 3);
            assert_eq!(cell.ship_for(Owner::Npcs).unwrap().hp(), 2);
        }

        #[test]
        fn destroyed_ship_leaves_cell_unchanged() {
            let mut cell = Cell::new();
            cell.add(ship(Owner::Players, 5)).unwrap();
            cell.add(ship(Owner::Npcs, 1)).unwrap();
            let before = cell.clone();
            let err = cell.apply_damage(2).unwrap_err();
            assert!(err.is_ship_destroyed());
            assert_eq!(cell, before);
            // the surviving ship's hit is still reported
            let GridError::ShipDestroyed { owner, damages, .. } = err else {
                unreachable!();
            };
            assert_eq!(owner, Owner::Npcs);
            assert_eq!(damages.len(), 2);
        }

        #[test]
        fn zero_damage_is_noop() {
            let mut cell = Cell::new();
            cell.add(ship(Owner::Players, 1)).unwrap();
            assert!(cell.apply_damage(0).unwrap().is_empty());
            assert_eq!(cell.ship_for(Owner::Players).unwrap().hp(), 1);
        }
    }
}
