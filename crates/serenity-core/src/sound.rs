//! Bridge sound effects.
//!
//! Like the lights, the sound service only listens. Any `DAMAGE`
//! notification plays an explosion, and the sonar's battle status picks the
//! background loop. Both go out on the `SOUND` topic for the speaker bridge:
//!
//! - `PLAY_SOUND` with the effect name as data
//! - `BACKGROUND_SOUND` with the loop name, or `null` to stop the loop

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ServiceError;
use crate::message::{Message, MessageType, ServiceType, Topic};
use crate::service::{Handled, Service};

/// Effect played for every hit.
pub const DAMAGE_SOUND: &str = "explosion_1";

/// Loop played while a battle is in progress.
pub const BATTLE_BACKGROUND: &str = "battle";

/// Broadcast and persisted sound state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundState {
    /// Loop currently playing, if any.
    #[serde(default)]
    pub background_sound: Option<String>,
}

/// The sound service has no tunables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundConfig {}

#[derive(Deserialize)]
struct SonarStatus {
    in_battle: bool,
}

/// Turns battle events into speaker bridge messages.
#[derive(Debug, Clone, Default)]
pub struct SoundService {
    background: Option<String>,
}

impl SoundService {
    /// Silence.
    #[must_use]
    pub const fn default_service() -> Self {
        Self { background: None }
    }

    /// Loop currently playing, if any.
    #[must_use]
    pub fn background(&self) -> Option<&str> {
        self.background.as_deref()
    }

    fn on_battle_status(&mut self, in_battle: bool) -> Result<Handled, ServiceError> {
        let wanted = in_battle.then(|| BATTLE_BACKGROUND.to_string());
        if wanted == self.background {
            return Ok(Handled::Ignored);
        }
        debug!(background = ?wanted, "background sound change");
        let message = Message::new(Topic::Sound, MessageType::BackgroundSound)
            .concerning(ServiceType::Sound)
            .with_data(&wanted)?;
        self.background = wanted;
        Ok(Handled::with_notifications(vec![message]))
    }
}

impl Service for SoundService {
    const IDENTITY: ServiceType = ServiceType::Sound;
    const REACTS_TO_STATUS: bool = true;
    type State = SoundState;
    type Config = SoundConfig;

    fn state(&self) -> SoundState {
        SoundState {
            background_sound: self.background.clone(),
        }
    }

    fn config(&self) -> SoundConfig {
        SoundConfig {}
    }

    fn apply_state(&mut self, state: SoundState) {
        self.background = state.background_sound;
    }

    fn apply_config(&mut self, _config: SoundConfig) {}

    fn handle_status(&mut self, message: &Message) -> Result<Handled, ServiceError> {
        match (message.kind, message.concerns) {
            (MessageType::State, Some(ServiceType::Sonar)) => {
                let status: SonarStatus = message.decode_data()?;
                self.on_battle_status(status.in_battle)
            }
            (MessageType::Damage, _) => {
                let play = Message::new(Topic::Sound, MessageType::PlaySound)
                    .concerning(ServiceType::Sound)
                    .with_data(DAMAGE_SOUND)?;
                Ok(Handled::with_notifications(vec![play]))
            }
            _ => Ok(Handled::Ignored),
        }
    }
}
