//! Ambient bridge lighting.
//!
//! The light service never receives commands. It watches the sonar's state
//! broadcasts and damage notifications, derives a colour and mode, and emits
//! a `LIGHT` message in the device format `"<color>;<mode>;<secondary>"`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serenity_grid::{Damage, Owner};
use tracing::debug;

use crate::error::ServiceError;
use crate::message::{Message, MessageType, ServiceType, Topic};
use crate::service::{Handled, Service};

/// Lamp colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum Color {
    Red,
    Green,
    Blue,
    Black,
    White,
    Purple,
    Yellow,
    Cyan,
}

impl Color {
    /// Device name of the colour.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Black => "black",
            Self::White => "white",
            Self::Purple => "purple",
            Self::Yellow => "yellow",
            Self::Cyan => "cyan",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the lamp shows its colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Steady colour.
    Set,
    /// Blink `color`, then settle on `secondary`.
    Blink,
}

impl Mode {
    /// Device name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Blink => "blink",
        }
    }
}

/// One lamp setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Light {
    /// Primary colour.
    pub color: Color,
    /// Display mode.
    pub mode: Mode,
    /// Colour to settle on after blinking.
    #[serde(default)]
    pub secondary: Option<Color>,
}

impl Light {
    /// A steady colour.
    #[must_use]
    pub const fn set(color: Color) -> Self {
        Self {
            color,
            mode: Mode::Set,
            secondary: None,
        }
    }

    /// Blink `color`, then hold `then`.
    #[must_use]
    pub const fn blink(color: Color, then: Color) -> Self {
        Self {
            color,
            mode: Mode::Blink,
            secondary: Some(then),
        }
    }

    /// Device bridge payload, `"<color>;<mode>;<secondary>"` with an empty
    /// last field when there is no secondary colour.
    #[must_use]
    pub fn to_device_message(&self) -> String {
        let secondary = self.secondary.map_or("", Color::as_str);
        format!("{};{};{secondary}", self.color, self.mode.as_str())
    }
}

/// Broadcast and persisted light state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightState {
    /// Current lamp setting.
    pub light: Light,
}

/// The light service has no tunables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightConfig {}

/// The only part of a sonar state broadcast the lights care about.
#[derive(Deserialize)]
struct SonarStatus {
    in_battle: bool,
}

/// Derives bridge lighting from the battle status.
#[derive(Debug, Clone)]
pub struct LightService {
    light: Light,
}

impl Default for LightService {
    fn default() -> Self {
        Self::default_service()
    }
}

impl LightService {
    /// Steady blue.
    #[must_use]
    pub const fn default_service() -> Self {
        Self {
            light: Light::set(Color::Blue),
        }
    }

    /// Current lamp setting.
    #[must_use]
    pub const fn light(&self) -> Light {
        self.light
    }

    fn on_battle_status(&self, in_battle: bool) -> Light {
        let current = self.light.color;
        match (in_battle, current == Color::Red) {
            (true, false) => Light::blink(Color::Red, Color::Red),
            (true, true) => Light::set(Color::Red),
            (false, true) => Light::blink(Color::Green, Color::Blue),
            (false, false) => Light::set(Color::Blue),
        }
    }

    fn change(&mut self, light: Light) -> Result<Handled, ServiceError> {
        debug!(device = %light.to_device_message(), "light change");
        self.light = light;
        let message = Message::new(Topic::Light, MessageType::Light)
            .concerning(ServiceType::Light)
            .with_data(&light.to_device_message())?;
        Ok(Handled::with_notifications(vec![message]))
    }
}

impl Service for LightService {
    const IDENTITY: ServiceType = ServiceType::Light;
    const REACTS_TO_STATUS: bool = true;
    type State = LightState;
    type Config = LightConfig;

    fn state(&self) -> LightState {
        LightState { light: self.light }
    }

    fn config(&self) -> LightConfig {
        LightConfig {}
    }

    fn apply_state(&mut self, state: LightState) {
        self.light = state.light;
    }

    fn apply_config(&mut self, _config: LightConfig) {}

    fn handle_status(&mut self, message: &Message) -> Result<Handled, ServiceError> {
        match (message.kind, message.concerns) {
            (MessageType::State, Some(ServiceType::Sonar)) => {
                let status: SonarStatus = message.decode_data()?;
                let light = self.on_battle_status(status.in_battle);
                self.change(light)
            }
            (MessageType::Damage, _) => {
                let damage: Damage = message.decode_data()?;
                if damage.owner != Owner::Players {
                    return Ok(Handled::Ignored);
                }
                let light = Light::blink(Color::Yellow, self.light.color);
                self.change(light)
            }
            _ => Ok(Handled::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sonar_state(in_battle: bool) -> Message {
        // the map is irrelevant to the lights
        Message::new(Topic::BroadcastStatus, MessageType::State)
            .concerning(ServiceType::Sonar)
            .with_data(&json!({"in_battle": in_battle, "map": null}))
            .unwrap()
    }

    fn damage(owner: &str) -> Message {
        Message::new(Topic::BroadcastStatus, MessageType::Damage)
            .concerning(ServiceType::Sonar)
            .with_data(&json!({"amount": 1, "owner": owner}))
            .unwrap()
    }

    fn emitted(handled: Handled) -> String {
        let Handled::Applied { notifications } = handled else {
            panic!("light should change");
        };
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].topic, Topic::Light);
        notifications[0].data.as_str().unwrap().to_string()
    }

    #[test]
    fn device_message_format() {
        assert_eq!(Light::set(Color::Blue).to_device_message(), "blue;set;");
        assert_eq!(
            Light::blink(Color::Green, Color::Blue).to_device_message(),
            "green;blink;blue"
        );
    }

    #[test]
    fn battle_turns_lights_red() {
        let mut service = LightService::default_service();
        let first = emitted(service.handle_status(&sonar_state(true)).unwrap());
        assert_eq!(first, "red;blink;red");
        let again = emitted(service.handle_status(&sonar_state(true)).unwrap());
        assert_eq!(again, "red;set;");
    }

    #[test]
    fn leaving_battle_returns_to_blue() {
        let mut service = LightService::default_service();
        service.apply_state(LightState {
            light: Light::set(Color::Red),
        });
        let message = emitted(service.handle_status(&sonar_state(false)).unwrap());
        assert_eq!(message, "green;blink;blue");
        assert_eq!(service.light().color, Color::Green);

        let idle = emitted(service.handle_status(&sonar_state(false)).unwrap());
        assert_eq!(idle, "blue;set;");
    }

    #[test]
    fn player_damage_blinks_yellow() {
        let mut service = LightService::default_service();
        let message = emitted(service.handle_status(&damage("players")).unwrap());
        assert_eq!(message, "yellow;blink;blue");

        let ignored = service.handle_status(&damage("npcs")).unwrap();
        assert!(!ignored.is_applied());
    }

    #[test]
    fn other_services_are_ignored() {
        let mut service = LightService::default_service();
        let switch_state = Message::new(Topic::BroadcastStatus, MessageType::State)
            .concerning(ServiceType::Switch)
            .with_data(&json!({"switches": {}}))
            .unwrap();
        assert!(!service.handle_status(&switch_state).unwrap().is_applied());
    }

    #[test]
    fn state_serializes_secondary() {
        let state = LightState {
            light: Light::blink(Color::Yellow, Color::Red),
        };
        assert_eq!(
            serde_json::to_value(state).unwrap(),
            json!({"light": {"color": "yellow", "mode": "blink", "secondary": "red"}})
        );
    }
}
