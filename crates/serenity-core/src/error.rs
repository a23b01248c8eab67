//! Error type shared by the framework and the game services.

use std::time::Duration;

use serenity_grid::GridError;

use crate::message::{MessageType, Topic};

/// Errors that can occur in the service framework and the game services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The combat resolver rejected the operation.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// A payload or envelope did not decode.
    #[error("malformed message: {reason}")]
    MalformedMessage {
        /// What failed to decode.
        reason: String,
        /// Underlying decoder error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The durable store failed.
    #[error("persistence error: {reason}")]
    Persistence {
        /// Operation that failed.
        reason: String,
        /// Underlying store error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// JSON encoding or decoding failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// File system access failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A named lock stayed held past its timeout.
    #[error("lock {name} not acquired within {timeout:?}")]
    LockTimeout {
        /// Lock name.
        name: String,
        /// How long the caller waited.
        timeout: Duration,
    },

    /// A battle command arrived outside a battle.
    #[error("not in battle, cannot resolve {kind}")]
    NotInBattle {
        /// Rejected command.
        kind: MessageType,
    },

    /// `START_BATTLE` arrived during a battle.
    #[error("a battle is already in progress")]
    AlreadyInBattle,

    /// `START_BATTLE` named a map the catalog does not hold.
    #[error("unknown asteroid map {name}")]
    UnknownMap {
        /// Requested map name.
        name: String,
    },

    /// No empty cell is left inside the spawn margin.
    #[error("no free spawn position left on the map")]
    NoSpawnPosition,

    /// A switch code failed to parse.
    #[error("invalid switch code {code:?}")]
    InvalidSwitchCode {
        /// Offending code.
        code: String,
    },

    /// A well-formed switch code is not part of the panel.
    #[error("switch {code} is not configured")]
    UnknownSwitch {
        /// Offending code.
        code: String,
    },

    /// Observers may only publish commands and proposals.
    #[error("{topic} messages are not accepted from observers")]
    RejectedTopic {
        /// Topic the observer tried to publish on.
        topic: Topic,
    },

    /// Settings or a service configuration failed validation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// First violated constraint.
        reason: String,
    },

    /// The bus no longer accepts messages.
    #[error("message bus is shutting down")]
    ShuttingDown,

    /// An observer's connection went away.
    #[error("observer connection closed")]
    ObserverClosed,

    /// A spawned task panicked or was cancelled.
    #[error(transparent)]
    Task(#[from] tokio::task::JoinError),
}

impl ServiceError {
    /// Builds a [`ServiceError::MalformedMessage`] from a decoding failure.
    pub(crate) fn malformed(
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }
}
