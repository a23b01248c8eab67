//! Control panel switches.
//!
//! Each physical switch is identified by a five-character code
//! `[heading][fixable][function][number][group]`:
//!
//! | position | alphabet | meaning |
//! |----------|----------|---------|
//! | heading  | `W E S N` | direction the ship moves when flipped |
//! | fixable  | `N F` | not fixable / fixable |
//! | function | `W R S N` | weapon, radar, silence, nuclear |
//! | number   | `0 1` | index within the function |
//! | group    | `R G B N` | red, green, blue, neutral |
//!
//! The LED bridge receives the code followed by `1` (on) or `0` (off), one
//! `LED` message per switch after every flip or reset.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serenity_grid::{Damage, Direction, Owner};
use tracing::debug;

use crate::config::Settings;
use crate::error::ServiceError;
use crate::message::{Message, MessageType, ServiceType, Topic};
use crate::service::{Handled, Service};

// =============================================================================
// Codec
// =============================================================================

/// What a switch does on the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
pub enum Function {
    Weapon,
    Radar,
    Silence,
    Nuclear,
}

/// Colour group of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
pub enum Group {
    Red,
    Green,
    Blue,
    Neutral,
}

/// A decoded panel switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Switch {
    /// Heading the players' ship moves in when the switch is flipped.
    pub heading: Direction,
    /// Whether the switch can be repaired.
    pub fixable: bool,
    /// Panel function.
    pub function: Function,
    /// Index within the function, 0 or 1.
    pub number: u8,
    /// Colour group.
    pub group: Group,
}

impl Switch {
    /// Decodes a five-character switch code.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidSwitchCode`] if the code has the wrong
    /// length or a character outside its position's alphabet.
    pub fn parse(code: &str) -> Result<Self, ServiceError> {
        let invalid = || ServiceError::InvalidSwitchCode {
            code: code.to_string(),
        };
        let chars: Vec<char> = code.chars().collect();
        let &[heading, fixable, function, number, group] = chars.as_slice() else {
            return Err(invalid());
        };

        let heading = match heading {
            'W' => Direction::West,
            'E' => Direction::East,
            'S' => Direction::South,
            'N' => Direction::North,
            _ => return Err(invalid()),
        };
        let fixable = match fixable {
            'F' => true,
            'N' => false,
            _ => return Err(invalid()),
        };
        let function = match function {
            'W' => Function::Weapon,
            'R' => Function::Radar,
            'S' => Function::Silence,
            'N' => Function::Nuclear,
            _ => return Err(invalid()),
        };
        let number = match number {
            '0' => 0,
            '1' => 1,
            _ => return Err(invalid()),
        };
        let group = match group {
            'R' => Group::Red,
            'G' => Group::Green,
            'B' => Group::Blue,
            'N' => Group::Neutral,
            _ => return Err(invalid()),
        };

        Ok(Self {
            heading,
            fixable,
            function,
            number,
            group,
        })
    }

    /// The five-character code of this switch.
    #[must_use]
    pub fn code(&self) -> String {
        self.to_string()
    }

    /// LED bridge message: the code followed by `1` or `0`.
    #[must_use]
    pub fn to_message(&self, on: bool) -> String {
        format!("{self}{}", u8::from(on))
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heading = match self.heading {
            Direction::West => 'W',
            Direction::East => 'E',
            Direction::South => 'S',
            Direction::North => 'N',
        };
        let fixable = if self.fixable { 'F' } else { 'N' };
        let function = match self.function {
            Function::Weapon => 'W',
            Function::Radar => 'R',
            Function::Silence => 'S',
            Function::Nuclear => 'N',
        };
        let group = match self.group {
            Group::Red => 'R',
            Group::Green => 'G',
            Group::Blue => 'B',
            Group::Neutral => 'N',
        };
        write!(f, "{heading}{fixable}{function}{}{group}", self.number)
    }
}

impl FromStr for Switch {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Switch {
    type Error = ServiceError;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        Self::parse(&code)
    }
}

impl From<Switch> for String {
    fn from(switch: Switch) -> Self {
        switch.code()
    }
}

// =============================================================================
// SwitchService
// =============================================================================

/// On/off flag of every configured switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchState {
    /// Switch to on flag.
    pub switches: BTreeMap<Switch, bool>,
}

/// The switch service has no tunables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchConfig {}

#[derive(Deserialize)]
struct SwitchData {
    code: String,
}

/// Turns panel switch events into sonar commands.
#[derive(Debug, Clone)]
pub struct SwitchService {
    switches: BTreeMap<Switch, bool>,
}

impl SwitchService {
    /// Every configured switch, initially off.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidSwitchCode`] for a malformed configured code.
    pub fn default_service(settings: &Settings) -> Result<Self, ServiceError> {
        let switches = settings
            .switch_codes
            .iter()
            .map(|code| Switch::parse(code).map(|switch| (switch, false)))
            .collect::<Result<_, _>>()?;
        Ok(Self { switches })
    }

    /// Whether `switch` is on, or `None` if it is not configured.
    #[must_use]
    pub fn is_on(&self, switch: &Switch) -> Option<bool> {
        self.switches.get(switch).copied()
    }

    /// Handles one physical flip and returns the commands it triggers.
    ///
    /// A switch that was on turns off and moves the players' ship in its
    /// heading. Once every switch of its group is off, the neutral group
    /// costs the players one hit point and resets the whole panel; any other
    /// group simply turns back on.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownSwitch`] for an unconfigured switch.
    pub fn flip(&mut self, switch: Switch) -> Result<Vec<Message>, ServiceError> {
        let on = self
            .switches
            .get_mut(&switch)
            .ok_or_else(|| ServiceError::UnknownSwitch {
                code: switch.code(),
            })?;

        let mut commands = Vec::new();
        if *on {
            *on = false;
            commands.push(move_command(switch.heading)?);
        }

        let group_off = self
            .switches
            .iter()
            .filter(|(other, _)| other.group == switch.group)
            .all(|(_, on)| !on);
        if group_off {
            if switch.group == Group::Neutral {
                commands.push(direct_damage_command()?);
                self.reset();
            } else {
                for (_, on) in self
                    .switches
                    .iter_mut()
                    .filter(|(other, _)| other.group == switch.group)
                {
                    *on = true;
                }
            }
            debug!(group = ?switch.group, "switch group re-armed");
        }
        Ok(commands)
    }

    /// Turns every switch on.
    pub fn reset(&mut self) {
        self.switches.values_mut().for_each(|on| *on = true);
    }

    /// One `LED` message per switch carrying its bridge payload.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Json`] on serialization failure.
    pub fn led_messages(&self) -> Result<Vec<Message>, ServiceError> {
        self.switches
            .iter()
            .map(|(switch, on)| {
                Message::new(Topic::Led, MessageType::Led)
                    .concerning(ServiceType::Switch)
                    .with_data(&switch.to_message(*on))
            })
            .collect()
    }
}

fn move_command(heading: Direction) -> Result<Message, ServiceError> {
    Message::new(Topic::Command, MessageType::Move)
        .concerning(ServiceType::Sonar)
        .with_data(&serde_json::json!({"owner": Owner::Players, "direction": heading}))
}

fn direct_damage_command() -> Result<Message, ServiceError> {
    Message::new(Topic::Command, MessageType::DirectDamage)
        .concerning(ServiceType::Sonar)
        .with_data(&Damage {
            amount: 1,
            owner: Owner::Players,
        })
}

impl Service for SwitchService {
    const IDENTITY: ServiceType = ServiceType::Switch;
    type State = SwitchState;
    type Config = SwitchConfig;

    fn state(&self) -> SwitchState {
        SwitchState {
            switches: self.switches.clone(),
        }
    }

    fn config(&self) -> SwitchConfig {
        SwitchConfig {}
    }

    fn apply_state(&mut self, state: SwitchState) {
        self.switches = state.switches;
    }

    fn apply_config(&mut self, _config: SwitchConfig) {}

    fn handle_command(&mut self, message: &Message) -> Result<Handled, ServiceError> {
        match message.kind {
            MessageType::Switch => {
                let data: SwitchData = message.decode_data()?;
                let mut notifications = self.flip(Switch::parse(&data.code)?)?;
                notifications.extend(self.led_messages()?);
                Ok(Handled::with_notifications(notifications))
            }
            MessageType::StartBattle | MessageType::Surface => {
                self.reset();
                Ok(Handled::with_notifications(self.led_messages()?))
            }
            _ => Ok(Handled::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn service(codes: &[&str]) -> SwitchService {
        let settings = Settings {
            switch_codes: codes.iter().map(|c| (*c).to_string()).collect(),
            ..Settings::default()
        };
        let mut service = SwitchService::default_service(&settings).unwrap();
        service.reset();
        service
    }

    fn sw(code: &str) -> Switch {
        Switch::parse(code).unwrap()
    }

    mod codec_tests {
        use super::*;

        #[test]
        fn parses_all_fields() {
            let switch = sw("NFW0R");
            assert_eq!(switch.heading, Direction::North);
            assert!(switch.fixable);
            assert_eq!(switch.function, Function::Weapon);
            assert_eq!(switch.number, 0);
            assert_eq!(switch.group, Group::Red);
        }

        #[test]
        fn led_message_appends_state() {
            assert_eq!(sw("NFW0R").to_message(true), "NFW0R1");
            assert_eq!(sw("WNS1N").to_message(false), "WNS1N0");
        }

        #[test]
        fn rejects_bad_codes() {
            for code in ["", "NFW0", "NFW0RR", "XFW0R", "NXW0R", "NFX0R", "NF2WR", "NFW0X"] {
                assert!(
                    matches!(Switch::parse(code), Err(ServiceError::InvalidSwitchCode { .. })),
                    "{code} should be rejected"
                );
            }
        }

        #[test]
        fn state_keys_are_codes() {
            let state = SwitchState {
                switches: BTreeMap::from([(sw("SNR1G"), true)]),
            };
            let json = serde_json::to_value(&state).unwrap();
            assert_eq!(json, serde_json::json!({"switches": {"SNR1G": true}}));
            let back: SwitchState = serde_json::from_value(json).unwrap();
            assert_eq!(back, state);
        }

        proptest! {
            #[test]
            fn code_round_trips(
                heading in prop::sample::select(vec!['W', 'E', 'S', 'N']),
                fixable in prop::sample::select(vec!['N', 'F']),
                function in prop::sample::select(vec!['W', 'R', 'S', 'N']),
                number in prop::sample::select(vec!['0', '1']),
                group in prop::sample::select(vec!['R', 'G', 'B', 'N']),
            ) {
                let code: String = [heading, fixable, function, number, group].iter().collect();
                prop_assert_eq!(Switch::parse(&code).unwrap().code(), code);
            }
        }
    }

    mod service_tests {
        use super::*;

        #[test]
        fn flipping_an_on_switch_moves_the_ship() {
            let mut service = service(&["NFW0R", "SFR0R"]);
            let commands = service.flip(sw("NFW0R")).unwrap();
            assert_eq!(commands.len(), 1);
            assert_eq!(commands[0].kind, MessageType::Move);
            assert_eq!(
                commands[0].data,
                serde_json::json!({"owner": "players", "direction": "north"})
            );
            assert_eq!(service.is_on(&sw("NFW0R")), Some(false));
        }

        #[test]
        fn emptied_group_turns_back_on() {
            let mut service = service(&["NFW0R", "SFR0R", "EFS0B"]);
            service.flip(sw("NFW0R")).unwrap();
            service.flip(sw("SFR0R")).unwrap();
            assert_eq!(service.is_on(&sw("NFW0R")), Some(true));
            assert_eq!(service.is_on(&sw("SFR0R")), Some(true));
        }

        #[test]
        fn emptied_neutral_group_costs_a_hit_point() {
            let mut service = service(&["ENS0N", "WNN1N", "NFW0R"]);
            service.flip(sw("NFW0R")).unwrap();
            service.flip(sw("ENS0N")).unwrap();
            let commands = service.flip(sw("WNN1N")).unwrap();
            let kinds: Vec<_> = commands.iter().map(|m| m.kind).collect();
            assert_eq!(kinds, vec![MessageType::Move, MessageType::DirectDamage]);
            assert_eq!(
                commands[1].data,
                serde_json::json!({"amount": 1, "owner": "players"})
            );
            // whole panel reset
            assert_eq!(service.is_on(&sw("NFW0R")), Some(true));
        }

        #[test]
        fn unknown_switch_is_rejected() {
            let mut service = service(&["NFW0R"]);
            assert!(matches!(
                service.flip(sw("SFR0R")),
                Err(ServiceError::UnknownSwitch { .. })
            ));
        }

        #[test]
        fn battle_start_resets_panel() {
            let settings = Settings {
                switch_codes: vec!["NFW0R".into()],
                ..Settings::default()
            };
            let mut service = SwitchService::default_service(&settings).unwrap();
            assert_eq!(service.is_on(&sw("NFW0R")), Some(false));
            let handled = service
                .handle_command(&Message::new(Topic::Command, MessageType::StartBattle))
                .unwrap();
            let Handled::Applied { notifications } = handled else {
                panic!("reset should change state");
            };
            assert_eq!(notifications.len(), 1);
            assert_eq!(notifications[0].topic, Topic::Led);
            assert_eq!(notifications[0].data, serde_json::json!("NFW0R1"));
        }

        #[test]
        fn switch_command_is_decoded() {
            let mut service = service(&["NFW0R", "SFR0R"]);
            let message = Message::new(Topic::Command, MessageType::Switch)
                .with_data(&serde_json::json!({"code": "SFR0R"}))
                .unwrap();
            let Handled::Applied { notifications } = service.handle_command(&message).unwrap()
            else {
                panic!("switch flip should change state");
            };
            assert_eq!(notifications[0].data["direction"], "south");
            // followed by the whole panel, in code order
            let leds: Vec<_> = notifications[1..]
                .iter()
                .map(|m| (m.topic, m.data.clone()))
                .collect();
            assert_eq!(
                leds,
                vec![
                    (Topic::Led, serde_json::json!("NFW0R1")),
                    (Topic::Led, serde_json::json!("SFR0R0")),
                ]
            );
        }
    }
}
