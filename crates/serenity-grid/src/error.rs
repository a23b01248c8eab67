//! Error types raised by the grid model and the combat resolver.

use crate::actor::{ActorKind, Damage, MineId, Owner};
use crate::position::{Direction, GridPosition};

/// Errors that can occur while mutating or querying a [`Map`](crate::Map).
///
/// Legality errors ([`CannotBeAddedToCell`](GridError::CannotBeAddedToCell),
/// [`InvalidMove`](GridError::InvalidMove), [`InvalidTarget`](GridError::InvalidTarget))
/// are always raised before any state is touched. [`ShipDestroyed`](GridError::ShipDestroyed)
/// is a domain event rather than an input error and is expected to travel up to
/// the command boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    /// The cell's placement rules reject the actor.
    #[error("{actor} cannot be added to cell")]
    CannotBeAddedToCell {
        /// Kind of the rejected actor.
        actor: ActorKind,
    },

    /// No matching actor is in the cell.
    #[error("{actor} not found in cell")]
    ActorNotFound {
        /// Kind of the missing actor.
        actor: ActorKind,
    },

    /// The heading is not among the ship's available moves.
    #[error("invalid move {direction} for {owner}")]
    InvalidMove {
        /// Side whose ship was asked to move.
        owner: Owner,
        /// Requested heading.
        direction: Direction,
    },

    /// The position is not a legal launch target.
    #[error("invalid target position {position}")]
    InvalidTarget {
        /// Requested target.
        position: GridPosition,
    },

    /// The position lies off the map.
    #[error("position {position} is outside the map")]
    OutOfBounds {
        /// Offending position.
        position: GridPosition,
    },

    /// A ship's hit points would reach zero.
    #[error("ship {name} ({owner}) was destroyed")]
    ShipDestroyed {
        /// Name of the destroyed ship.
        name: String,
        /// Side the destroyed ship belonged to.
        owner: Owner,
        /// Every hit of the failed operation, lethal ones included. None of
        /// them was applied.
        damages: Vec<Damage>,
    },

    /// The side has no ship on the map.
    #[error("no ship on the map for {owner}")]
    MissingShip {
        /// Side without a ship.
        owner: Owner,
    },

    /// Only one ship per side.
    #[error("a ship for {owner} is already on the map")]
    ShipAlreadyPresent {
        /// Side that already has a ship.
        owner: Owner,
    },

    /// Unknown or already detonated mine.
    #[error("mine {uid} not found")]
    MineNotFound {
        /// Id that matched no placed mine.
        uid: MineId,
    },

    /// Zero-sized or oversized map.
    #[error("invalid map dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// A deserialized map breaks one of the map invariants.
    #[error("inconsistent map snapshot: {reason}")]
    InconsistentSnapshot {
        /// First violated invariant.
        reason: String,
    },
}

impl GridError {
    /// Returns true if this error reports a destroyed ship.
    #[must_use]
    pub const fn is_ship_destroyed(&self) -> bool {
        matches!(self, Self::ShipDestroyed { .. })
    }

    /// Replaces the hits carried by a [`GridError::ShipDestroyed`].
    pub(crate) fn with_damages(self, all: Vec<Damage>) -> Self {
        match self {
            Self::ShipDestroyed { name, owner, .. } => Self::ShipDestroyed {
                name,
                owner,
                damages: all,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = GridError::InvalidMove {
            owner: Owner::Players,
            direction: Direction::North,
        };
        assert_eq!(err.to_string(), "invalid move north for players");

        let err = GridError::ShipDestroyed {
            name: "Reaver".into(),
            owner: Owner::Npcs,
            damages: Vec::new(),
        };
        assert_eq!(err.to_string(), "ship Reaver (npcs) was destroyed");
        assert!(err.is_ship_destroyed());
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GridError>();
    }
}
