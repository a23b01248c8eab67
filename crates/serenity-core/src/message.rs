//! The message envelope carried on the bus.
//!
//! Every message is a JSON object:
//!
//! ```json
//! {"topic": "COMMAND", "type": "MOVE", "concerns": "sonar",
//!  "data": {"owner": "players", "direction": "north"}}
//! ```
//!
//! `concerns` names the service a message is about (or addressed to) and
//! may be absent. `data` is free-form and decoded by the receiving service.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceError;

// =============================================================================
// Topics, message types, service identities
// =============================================================================

/// A named bus channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Topic {
    /// Commands for services.
    Command,
    /// State and config broadcasts, damage notifications.
    BroadcastStatus,
    /// Proposals to replace or re-broadcast a service's state or config.
    ProposeStatus,
    /// Side effects for the sound bridge.
    Sound,
    /// Side effects for the light bridge.
    Light,
    /// Switch panel LED states.
    Led,
}

impl Topic {
    /// Every topic, in a fixed order.
    pub const ALL: [Self; 6] = [
        Self::Command,
        Self::BroadcastStatus,
        Self::ProposeStatus,
        Self::Sound,
        Self::Light,
        Self::Led,
    ];

    /// Wire name of the topic.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Command => "COMMAND",
            Self::BroadcastStatus => "BROADCAST_STATUS",
            Self::ProposeStatus => "PROPOSE_STATUS",
            Self::Sound => "SOUND",
            Self::Light => "LIGHT",
            Self::Led => "LED",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `type` field of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum MessageType {
    State,
    Config,
    Init,
    Damage,
    StartBattle,
    EndBattle,
    Move,
    LaunchTorpedo,
    LaunchMine,
    DetonateMine,
    Repair,
    DirectDamage,
    Surface,
    Switch,
    Light,
    Led,
    PlaySound,
    BackgroundSound,
}

impl MessageType {
    /// Wire name of the message type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::State => "STATE",
            Self::Config => "CONFIG",
            Self::Init => "INIT",
            Self::Damage => "DAMAGE",
            Self::StartBattle => "START_BATTLE",
            Self::EndBattle => "END_BATTLE",
            Self::Move => "MOVE",
            Self::LaunchTorpedo => "LAUNCH_TORPEDO",
            Self::LaunchMine => "LAUNCH_MINE",
            Self::DetonateMine => "DETONATE_MINE",
            Self::Repair => "REPAIR",
            Self::DirectDamage => "DIRECT_DAMAGE",
            Self::Surface => "SURFACE",
            Self::Switch => "SWITCH",
            Self::Light => "LIGHT",
            Self::Led => "LED",
            Self::PlaySound => "PLAY_SOUND",
            Self::BackgroundSound => "BACKGROUND_SOUND",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a service. Also keys its lock and its persisted snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum ServiceType {
    Sonar,
    Switch,
    Light,
    Sound,
    Travel,
}

impl ServiceType {
    /// Wire name of the service.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sonar => "sonar",
            Self::Switch => "switch",
            Self::Light => "light",
            Self::Sound => "sound",
            Self::Travel => "travel",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Message
// =============================================================================

/// A bus message. Published by reference and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Channel the message travels on.
    pub topic: Topic,
    /// What the message means.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Service the message is about, if any.
    #[serde(default)]
    pub concerns: Option<ServiceType>,
    /// Payload.
    #[serde(default)]
    pub data: Value,
}

impl Message {
    /// Creates a message with no `concerns` and a null payload.
    #[must_use]
    pub const fn new(topic: Topic, kind: MessageType) -> Self {
        Self {
            topic,
            kind,
            concerns: None,
            data: Value::Null,
        }
    }

    /// Sets the service this message concerns.
    #[must_use]
    pub fn concerning(mut self, service: ServiceType) -> Self {
        self.concerns = Some(service);
        self
    }

    /// Sets the payload from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Json`] if `data` cannot be represented as JSON.
    pub fn with_data<T: Serialize + ?Sized>(mut self, data: &T) -> Result<Self, ServiceError> {
        self.data = serde_json::to_value(data)?;
        Ok(self)
    }

    /// Decodes the payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::MalformedMessage`] if the payload does not match.
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T, ServiceError> {
        T::deserialize(&self.data).map_err(|err| {
            ServiceError::malformed(format!("invalid {} payload", self.kind), err)
        })
    }

    /// Serializes the envelope to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Json`] on serialization failure.
    pub fn to_json(&self) -> Result<String, ServiceError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses an envelope from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::MalformedMessage`] if the text is not a valid envelope.
    pub fn from_json(text: &str) -> Result<Self, ServiceError> {
        serde_json::from_str(text).map_err(|err| ServiceError::malformed("invalid envelope", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_wire_format() {
        let message = Message::new(Topic::Command, MessageType::Move)
            .concerning(ServiceType::Sonar)
            .with_data(&json!({"owner": "players", "direction": "north"}))
            .unwrap();
        let value: Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "topic": "COMMAND",
                "type": "MOVE",
                "concerns": "sonar",
                "data": {"owner": "players", "direction": "north"}
            })
        );
    }

    #[test]
    fn missing_optional_fields_default() {
        let message = Message::from_json(r#"{"topic":"COMMAND","type":"END_BATTLE"}"#).unwrap();
        assert_eq!(message.concerns, None);
        assert_eq!(message.data, Value::Null);
    }

    #[test]
    fn unknown_topic_is_malformed() {
        let err = Message::from_json(r#"{"topic":"NOPE","type":"STATE"}"#).unwrap_err();
        assert!(matches!(err, ServiceError::MalformedMessage { .. }));
    }

    #[test]
    fn display_matches_wire_names() {
        for topic in Topic::ALL {
            assert_eq!(
                serde_json::to_value(topic).unwrap(),
                Value::String(topic.to_string())
            );
        }
        for kind in [MessageType::LaunchTorpedo, MessageType::BackgroundSound] {
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                Value::String(kind.to_string())
            );
        }
        assert_eq!(ServiceType::Switch.to_string(), "switch");
    }
}
