//! Actors that occupy grid cells.
//!
//! Every piece of cell content is an [`Actor`]. Ships carry hit points and
//! an owner, trails mark where a ship has been, mines sit in place until
//! detonated, and torpedoes exist only as launch parameters. Asteroids are
//! terrain and are recorded on the cell as a flag rather than as content.
//!
//! Actors are plain values. A ship that takes damage is replaced by a new
//! `Ship` with fewer hit points, which keeps damage application easy to
//! stage and commit.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GridError;

// =============================================================================
// Owner
// =============================================================================

/// The two sides of a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Owner {
    /// The crew on the bridge.
    Players,
    /// The computer-controlled opponent.
    Npcs,
}

impl Owner {
    /// Both sides, players first.
    pub const ALL: [Self; 2] = [Self::Players, Self::Npcs];

    /// The other side.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Players => Self::Npcs,
            Self::Npcs => Self::Players,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Players => write!(f, "players"),
            Self::Npcs => write!(f, "npcs"),
        }
    }
}

// =============================================================================
// Damage
// =============================================================================

/// A record of damage dealt to a ship, returned by every combat operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Damage {
    /// Hit points removed.
    pub amount: u32,
    /// Owner of the ship that was hit.
    pub owner: Owner,
}

// =============================================================================
// Ship
// =============================================================================

/// A ship with hit points.
///
/// Invariant: `0 < hp <= total_hp`. A ship that would drop to zero hit points
/// is never constructed; [`Ship::apply_damage`] reports
/// [`GridError::ShipDestroyed`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ShipRecord")]
pub struct Ship {
    name: String,
    hp: u32,
    total_hp: u32,
    owner: Owner,
}

#[derive(Deserialize)]
struct ShipRecord {
    name: String,
    #[serde(default)]
    hp: Option<u32>,
    total_hp: u32,
    owner: Owner,
}

impl TryFrom<ShipRecord> for Ship {
    type Error = GridError;

    fn try_from(record: ShipRecord) -> Result<Self, Self::Error> {
        let hp = record.hp.unwrap_or(record.total_hp);
        Self::with_hp(record.name, hp, record.total_hp, record.owner)
    }
}

impl Ship {
    /// Creates an undamaged ship.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::ShipDestroyed`] if `total_hp` is zero.
    pub fn new(name: impl Into<String>, total_hp: u32, owner: Owner) -> Result<Self, GridError> {
        Self::with_hp(name, total_hp, total_hp, owner)
    }

    /// Creates a ship with explicit current hit points, clamped to `total_hp`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::ShipDestroyed`] if the clamped hit points are zero.
    pub fn with_hp(
        name: impl Into<String>,
        hp: u32,
        total_hp: u32,
        owner: Owner,
    ) -> Result<Self, GridError> {
        let name = name.into();
        let hp = hp.min(total_hp);
        if hp == 0 {
            return Err(GridError::ShipDestroyed {
                name,
                owner,
                damages: Vec::new(),
            });
        }
        Ok(Self {
            name,
            hp,
            total_hp,
            owner,
        })
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current hit points.
    #[must_use]
    pub const fn hp(&self) -> u32 {
        self.hp
    }

    /// Maximum hit points.
    #[must_use]
    pub const fn total_hp(&self) -> u32 {
        self.total_hp
    }

    /// Which side the ship belongs to.
    #[must_use]
    pub const fn owner(&self) -> Owner {
        self.owner
    }

    /// Returns the ship after taking `amount` damage.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::ShipDestroyed`] if the damage leaves no hit points.
    pub fn apply_damage(&self, amount: u32) -> Result<Self, GridError> {
        if amount >= self.hp {
            return Err(GridError::ShipDestroyed {
                name: self.name.clone(),
                owner: self.owner,
                damages: vec![Damage {
                    amount,
                    owner: self.owner,
                }],
            });
        }
        Ok(Self {
            hp: self.hp - amount,
            ..self.clone()
        })
    }

    /// Returns the ship after repairing `amount` hit points, capped at `total_hp`.
    #[must_use]
    pub fn repaired(&self, amount: u32) -> Self {
        Self {
            hp: self.hp.saturating_add(amount).min(self.total_hp),
            ..self.clone()
        }
    }
}

// =============================================================================
// Trail
// =============================================================================

/// Marks a cell a ship has visited. At most one per owner per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Trail {
    /// Side that left the trail.
    pub owner: Owner,
}

// =============================================================================
// Launchables
// =============================================================================

/// Unique identifier of a placed mine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MineId(Uuid);

impl MineId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Shared launch parameters of torpedoes and mines.
///
/// `reach` bounds the launch distance from the owner's ship, `damage` is the
/// hit taken at the point of impact and `radius` bounds the blast.
pub trait Launchable {
    /// Side that launches the object.
    fn owner(&self) -> Owner;
    /// Damage at distance 0 from the blast center.
    fn damage(&self) -> u32;
    /// Maximum Chebyshev distance from the launching ship.
    fn reach(&self) -> u32;
    /// Maximum Chebyshev distance of the blast.
    fn radius(&self) -> u32;
    /// This object as cell content, used for placement checks.
    fn as_actor(&self) -> Actor;
}

/// A torpedo. Never stored in a cell; it detonates on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Torpedo {
    /// Launching side.
    pub owner: Owner,
    /// Damage at the target cell.
    pub damage: u32,
    /// Launch range.
    pub reach: u32,
    /// Blast radius.
    pub radius: u32,
}

impl Launchable for Torpedo {
    fn owner(&self) -> Owner {
        self.owner
    }
    fn damage(&self) -> u32 {
        self.damage
    }
    fn reach(&self) -> u32 {
        self.reach
    }
    fn radius(&self) -> u32 {
        self.radius
    }
    fn as_actor(&self) -> Actor {
        Actor::Torpedo(*self)
    }
}

/// A placed mine, identified by a unique id so it can be detonated later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mine {
    /// Unique identifier.
    pub uid: MineId,
    /// Placing side.
    pub owner: Owner,
    /// Damage at the mine's cell.
    pub damage: u32,
    /// Placement range.
    pub reach: u32,
    /// Blast radius.
    pub radius: u32,
}

impl Mine {
    /// Creates a mine with a freshly generated id.
    #[must_use]
    pub fn new(owner: Owner, damage: u32, reach: u32, radius: u32) -> Self {
        Self {
            uid: MineId::generate(),
            owner,
            damage,
            reach,
            radius,
        }
    }
}

impl Launchable for Mine {
    fn owner(&self) -> Owner {
        self.owner
    }
    fn damage(&self) -> u32 {
        self.damage
    }
    fn reach(&self) -> u32 {
        self.reach
    }
    fn radius(&self) -> u32 {
        self.radius
    }
    fn as_actor(&self) -> Actor {
        Actor::Mine(*self)
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Discriminant of an [`Actor`], used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    /// [`Actor::Ship`]
    Ship,
    /// [`Actor::Trail`]
    Trail,
    /// [`Actor::Mine`]
    Mine,
    /// [`Actor::Torpedo`]
    Torpedo,
    /// [`Actor::Asteroid`]
    Asteroid,
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ship => "ship",
            Self::Trail => "trail",
            Self::Mine => "mine",
            Self::Torpedo => "torpedo",
            Self::Asteroid => "asteroid",
        };
        f.write_str(name)
    }
}

/// Anything that can be placed in a [`Cell`](crate::Cell).
///
/// Serialized with a `type` tag, e.g. `{"type":"trail","owner":"npcs"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Actor {
    /// A ship.
    Ship(Ship),
    /// A trail marker.
    Trail(Trail),
    /// A placed mine.
    Mine(Mine),
    /// A torpedo in flight. Accepted by cells but never stored.
    Torpedo(Torpedo),
    /// Impassable terrain.
    Asteroid,
}

impl Actor {
    /// The discriminant of this actor.
    #[must_use]
    pub const fn kind(&self) -> ActorKind {
        match self {
            Self::Ship(_) => ActorKind::Ship,
            Self::Trail(_) => ActorKind::Trail,
            Self::Mine(_) => ActorKind::Mine,
            Self::Torpedo(_) => ActorKind::Torpedo,
            Self::Asteroid => ActorKind::Asteroid,
        }
    }

    /// The owning side, if the actor has one.
    #[must_use]
    pub fn owner(&self) -> Option<Owner> {
        match self {
            Self::Ship(ship) => Some(ship.owner()),
            Self::Trail(trail) => Some(trail.owner),
            Self::Mine(mine) => Some(mine.owner),
            Self::Torpedo(torpedo) => Some(torpedo.owner),
            Self::Asteroid => None,
        }
    }

    /// Returns the ship if this actor is one.
    #[must_use]
    pub const fn as_ship(&self) -> Option<&Ship> {
        match self {
            Self::Ship(ship) => Some(ship),
            _ => None,
        }
    }

    /// Returns the mine if this actor is one.
    #[must_use]
    pub const fn as_mine(&self) -> Option<&Mine> {
        match self {
            Self::Mine(mine) => Some(mine),
            _ => None,
        }
    }
}

impl From<Ship> for Actor {
    fn from(ship: Ship) -> Self {
        Self::Ship(ship)
    }
}

impl From<Trail> for Actor {
    fn from(trail: Trail) -> Self {
        Self::Trail(trail)
    }
}

impl From<Mine> for Actor {
    fn from(mine: Mine) -> Self {
        Self::Mine(mine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod ship_tests {
        use super::*;

        #[test]
        fn new_ship_is_at_full_health() {
            let ship = Ship::new("Serenity", 5, Owner::Players).unwrap();
            assert_eq!(ship.hp(), 5);
            assert_eq!(ship.total_hp(), 5);
            assert_eq!(ship.name(), "Serenity");
        }

        #[test]
        fn hp_is_clamped_to_total() {
            let ship = Ship::with_hp("Serenity", 9, 5, Owner::Players).unwrap();
            assert_eq!(ship.hp(), 5);
        }

        #[test]
        fn zero_hp_ship_cannot_exist() {
            let err = Ship::new("Husk", 0, Owner::Npcs).unwrap_err();
            assert!(err.is_ship_destroyed());
        }

        #[test]
        fn damage_reduces_hp() {
            let ship = Ship::new("Serenity", 5, Owner::Players).unwrap();
            let hit = ship.apply_damage(2).unwrap();
            assert_eq!(hit.hp(), 3);
            // original untouched
            assert_eq!(ship.hp(), 5);
        }

        #[test]
        fn lethal_damage_reports_destruction() {
            let ship = Ship::new("Serenity", 3, Owner::Players).unwrap();
            let err = ship.apply_damage(3).unwrap_err();
            assert_eq!(
                err,
                GridError::ShipDestroyed {
                    name: "Serenity".into(),
                    owner: Owner::Players,
                    damages: vec![Damage {
                        amount: 3,
                        owner: Owner::Players
                    }],
                }
            );
        }

        #[test]
        fn repair_caps_at_total() {
            let ship = Ship::with_hp("Serenity", 2, 5, Owner::Players).unwrap();
            assert_eq!(ship.repaired(2).hp(), 4);
            assert_eq!(ship.repaired(100).hp(), 5);
        }

        #[test]
        fn deserialization_rejects_dead_ship() {
            let json = r#"{"name":"Husk","hp":0,"total_hp":4,"owner":"npcs"}"#;
            assert!(serde_json::from_str::<Ship>(json).is_err());

            let json = r#"{"name":"Reaver","total_hp":4,"owner":"npcs"}"#;
            let ship: Ship = serde_json::from_str(json).unwrap();
            assert_eq!(ship.hp(), 4);
        }
    }

    mod actor_tests {
        use super::*;

        #[test]
        fn actors_are_type_tagged() {
            let trail = Actor::Trail(Trail {
                owner: Owner::Npcs,
            });
            let json = serde_json::to_string(&trail).unwrap();
            assert_eq!(json, r#"{"type":"trail","owner":"npcs"}"#);

            let asteroid: Actor = serde_json::from_str(r#"{"type":"asteroid"}"#).unwrap();
            assert_eq!(asteroid, Actor::Asteroid);
        }

        #[test]
        fn mine_ids_are_unique() {
            let a = Mine::new(Owner::Players, 3, 2, 1);
            let b = Mine::new(Owner::Players, 3, 2, 1);
            assert_ne!(a.uid, b.uid);
        }

        #[test]
        fn owner_of_actor() {
            let mine = Mine::new(Owner::Npcs, 3, 2, 1);
            assert_eq!(Actor::from(mine).owner(), Some(Owner::Npcs));
            assert_eq!(Actor::Asteroid.owner(), None);
            assert_eq!(Owner::Npcs.opponent(), Owner::Players);
        }
    }
}
