//! # Serenity Grid
//!
//! Grid model and combat resolver for the Serenity sonar battle.
//!
//! This crate is pure and synchronous: it owns the spatial state of a
//! battle and the rules for moving ships, launching torpedoes and placing
//! or detonating mines. Services wrap it to add persistence and messaging.
//!
//! ## Architecture
//!
//! - **Actors**: ships, trails, mines, torpedoes, asteroids ([`Actor`])
//! - **Cells**: placement rules through a single predicate ([`Cell::can_add`])
//! - **Map**: the grid plus ship and mine indices, and the combat resolver
//!
//! Damage is applied by replacing ships with damaged copies. A ship that
//! would reach zero hit points surfaces as [`GridError::ShipDestroyed`].
//!
//! ## Usage
//!
//! ```
//! use serenity_grid::{GridPosition, Map, Owner, Ship, Torpedo};
//!
//! let mut map = Map::new(10, 10).unwrap();
//! map.spawn_ship(Ship::new("Serenity", 5, Owner::Players).unwrap(), GridPosition::new(1, 1))
//!     .unwrap();
//! map.spawn_ship(Ship::new("Reaver", 3, Owner::Npcs).unwrap(), GridPosition::new(3, 1))
//!     .unwrap();
//!
//! let torpedo = Torpedo { owner: Owner::Players, damage: 2, reach: 4, radius: 2 };
//! let damages = map.launch_torpedo(&torpedo, GridPosition::new(3, 1)).unwrap();
//! assert_eq!(damages[0].owner, Owner::Npcs);
//! assert_eq!(map.ship_for(Owner::Npcs).unwrap().hp(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod actor;
pub mod cell;
pub mod error;
pub mod map;
pub mod position;

pub use actor::{Actor, ActorKind, Damage, Launchable, Mine, MineId, Owner, Ship, Torpedo, Trail};
pub use cell::Cell;
pub use error::GridError;
pub use map::Map;
pub use position::{Direction, Directions, GridPosition};
