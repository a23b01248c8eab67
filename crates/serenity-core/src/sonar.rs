//! The sonar battle service.
//!
//! Wraps a [`Map`] in the service framework. Commands on the `COMMAND` topic
//! are decoded into [`SonarCommand`]s and resolved against the map; every
//! [`Damage`] they inflict is published as a `DAMAGE` notification after the
//! new state. A destroyed ship ends the battle.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serenity_grid::{
    Damage, Direction, GridError, GridPosition, Map, Mine, MineId, Owner, Ship, Torpedo,
};
use tracing::{debug, info};

use crate::config::{MapCatalog, Settings};
use crate::error::ServiceError;
use crate::message::{Message, MessageType, ServiceType, Topic};
use crate::service::{Handled, Service};

// =============================================================================
// State and config
// =============================================================================

/// Broadcast state of the sonar service. `in_battle` holds exactly when a
/// map is present, and a battle map carries one ship per side;
/// deserialization rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SonarStateRecord")]
pub struct SonarState {
    in_battle: bool,
    map: Option<Map>,
}

#[derive(Deserialize)]
struct SonarStateRecord {
    in_battle: bool,
    #[serde(default)]
    map: Option<Map>,
}

impl TryFrom<SonarStateRecord> for SonarState {
    type Error = String;

    fn try_from(record: SonarStateRecord) -> Result<Self, Self::Error> {
        if record.in_battle != record.map.is_some() {
            return Err(format!(
                "in_battle is {} but a map is {}",
                record.in_battle,
                if record.map.is_some() { "present" } else { "absent" }
            ));
        }
        if let Some(map) = &record.map {
            if let Some(owner) = Owner::ALL
                .into_iter()
                .find(|owner| map.ship_position(*owner).is_err())
            {
                return Err(format!("battle map has no ship for {owner}"));
            }
        }
        Ok(Self {
            in_battle: record.in_battle,
            map: record.map,
        })
    }
}

impl SonarState {
    /// No battle in progress.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            in_battle: false,
            map: None,
        }
    }

    /// A battle on `map`.
    #[must_use]
    pub const fn battle(map: Map) -> Self {
        Self {
            in_battle: true,
            map: Some(map),
        }
    }

    /// Whether a battle is in progress.
    #[must_use]
    pub const fn in_battle(&self) -> bool {
        self.in_battle
    }

    /// The battle map, if any.
    #[must_use]
    pub const fn map(&self) -> Option<&Map> {
        self.map.as_ref()
    }
}

/// Weapon and ship parameters of the sonar service. Hit points, damages and
/// reaches must be positive; deserialization rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SonarConfigRecord")]
pub struct SonarConfig {
    /// Torpedo damage at the impact cell.
    pub torpedo_damage: u32,
    /// Torpedo launch range.
    pub torpedo_reach: u32,
    /// Torpedo blast radius.
    pub torpedo_radius: u32,
    /// Mine damage at the mine cell.
    pub mine_damage: u32,
    /// Mine placement range.
    pub mine_reach: u32,
    /// Mine blast radius.
    pub mine_radius: u32,
    /// Hit points of the players' ship at battle start.
    pub player_default_hp: u32,
    /// Whether the physical control panel drives the players' ship. Read by
    /// dashboards; the resolver accepts commands either way.
    pub use_control_panel: bool,
    /// Seed for spawn positions. `None` draws from system entropy.
    pub seed: Option<u64>,
}

impl Default for SonarConfig {
    fn default() -> Self {
        Self {
            torpedo_damage: 2,
            torpedo_reach: 4,
            torpedo_radius: 2,
            mine_damage: 3,
            mine_reach: 2,
            mine_radius: 1,
            player_default_hp: 5,
            use_control_panel: false,
            seed: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct SonarConfigRecord {
    torpedo_damage: u32,
    torpedo_reach: u32,
    torpedo_radius: u32,
    mine_damage: u32,
    mine_reach: u32,
    mine_radius: u32,
    player_default_hp: u32,
    use_control_panel: bool,
    seed: Option<u64>,
}

impl Default for SonarConfigRecord {
    fn default() -> Self {
        let defaults = SonarConfig::default();
        Self {
            torpedo_damage: defaults.torpedo_damage,
            torpedo_reach: defaults.torpedo_reach,
            torpedo_radius: defaults.torpedo_radius,
            mine_damage: defaults.mine_damage,
            mine_reach: defaults.mine_reach,
            mine_radius: defaults.mine_radius,
            player_default_hp: defaults.player_default_hp,
            use_control_panel: defaults.use_control_panel,
            seed: defaults.seed,
        }
    }
}

impl TryFrom<SonarConfigRecord> for SonarConfig {
    type Error = ServiceError;

    fn try_from(record: SonarConfigRecord) -> Result<Self, Self::Error> {
        let config = Self {
            torpedo_damage: record.torpedo_damage,
            torpedo_reach: record.torpedo_reach,
            torpedo_radius: record.torpedo_radius,
            mine_damage: record.mine_damage,
            mine_reach: record.mine_reach,
            mine_radius: record.mine_radius,
            player_default_hp: record.player_default_hp,
            use_control_panel: record.use_control_panel,
            seed: record.seed,
        };
        config.validate()?;
        Ok(config)
    }
}

impl SonarConfig {
    /// Checks that every parameter can produce a playable battle.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidConfig`] naming the first zero parameter.
    pub fn validate(&self) -> Result<(), ServiceError> {
        let positive = [
            ("player_default_hp", self.player_default_hp),
            ("torpedo_damage", self.torpedo_damage),
            ("torpedo_reach", self.torpedo_reach),
            ("mine_damage", self.mine_damage),
            ("mine_reach", self.mine_reach),
        ];
        match positive.into_iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err(ServiceError::InvalidConfig {
                reason: format!("sonar {field} must be positive"),
            }),
            None => Ok(()),
        }
    }

    /// A torpedo for `owner` with the configured parameters.
    #[must_use]
    pub const fn torpedo(&self, owner: Owner) -> Torpedo {
        Torpedo {
            owner,
            damage: self.torpedo_damage,
            reach: self.torpedo_reach,
            radius: self.torpedo_radius,
        }
    }

    /// A fresh mine for `owner` with the configured parameters.
    #[must_use]
    pub fn mine(&self, owner: Owner) -> Mine {
        Mine::new(owner, self.mine_damage, self.mine_reach, self.mine_radius)
    }
}

// =============================================================================
// Commands
// =============================================================================

/// The opponent's ship as sent with `START_BATTLE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipSpec {
    /// Display name.
    pub name: String,
    /// Maximum hit points.
    pub total_hp: u32,
    /// Starting hit points, defaulting to `total_hp`.
    #[serde(default)]
    pub hp: Option<u32>,
}

/// A decoded sonar command.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SonarCommand {
    StartBattle { map: String, ship: ShipSpec },
    EndBattle,
    Move { owner: Owner, direction: Direction },
    LaunchTorpedo { owner: Owner, target: GridPosition },
    LaunchMine { owner: Owner, target: GridPosition },
    DetonateMine { uid: MineId },
    Repair { owner: Owner, hp: u32 },
    DirectDamage { owner: Owner, amount: u32 },
    Surface,
}

#[derive(Deserialize)]
struct StartBattleData {
    map: String,
    ship: ShipSpec,
}

#[derive(Deserialize)]
struct MoveData {
    owner: Owner,
    direction: Direction,
}

#[derive(Deserialize)]
struct TargetData {
    owner: Owner,
    target: GridPosition,
}

#[derive(Deserialize)]
struct DetonateData {
    uid: MineId,
}

#[derive(Deserialize)]
struct RepairData {
    owner: Owner,
    hp: u32,
}

impl SonarCommand {
    /// Decodes a `COMMAND` message. Returns `None` for message types the
    /// sonar does not handle.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::MalformedMessage`] if the payload does not match
    /// the message type.
    pub fn decode(message: &Message) -> Result<Option<Self>, ServiceError> {
        let command = match message.kind {
            MessageType::StartBattle => {
                let data: StartBattleData = message.decode_data()?;
                Self::StartBattle {
                    map: data.map,
                    ship: data.ship,
                }
            }
            MessageType::EndBattle => Self::EndBattle,
            MessageType::Move => {
                let data: MoveData = message.decode_data()?;
                Self::Move {
                    owner: data.owner,
                    direction: data.direction,
                }
            }
            MessageType::LaunchTorpedo => {
                let data: TargetData = message.decode_data()?;
                Self::LaunchTorpedo {
                    owner: data.owner,
                    target: data.target,
                }
            }
            MessageType::LaunchMine => {
                let data: TargetData = message.decode_data()?;
                Self::LaunchMine {
                    owner: data.owner,
                    target: data.target,
                }
            }
            MessageType::DetonateMine => {
                let data: DetonateData = message.decode_data()?;
                Self::DetonateMine { uid: data.uid }
            }
            MessageType::Repair => {
                let data: RepairData = message.decode_data()?;
                Self::Repair {
                    owner: data.owner,
                    hp: data.hp,
                }
            }
            MessageType::DirectDamage => {
                let data: Damage = message.decode_data()?;
                Self::DirectDamage {
                    owner: data.owner,
                    amount: data.amount,
                }
            }
            MessageType::Surface => Self::Surface,
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    /// The message type this command was decoded from.
    #[must_use]
    pub const fn kind(&self) -> MessageType {
        match self {
            Self::StartBattle { .. } => MessageType::StartBattle,
            Self::EndBattle => MessageType::EndBattle,
            Self::Move { .. } => MessageType::Move,
            Self::LaunchTorpedo { .. } => MessageType::LaunchTorpedo,
            Self::LaunchMine { .. } => MessageType::LaunchMine,
            Self::DetonateMine { .. } => MessageType::DetonateMine,
            Self::Repair { .. } => MessageType::Repair,
            Self::DirectDamage { .. } => MessageType::DirectDamage,
            Self::Surface => MessageType::Surface,
        }
    }
}

// =============================================================================
// SonarService
// =============================================================================

/// Map dimensions and naming used when a battle starts.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BattleLayout {
    width: u32,
    height: u32,
    spawn_margin: u32,
    player_name: String,
}

/// The sonar battle model.
pub struct SonarService {
    map: Option<Map>,
    config: SonarConfig,
    layout: BattleLayout,
    catalog: Arc<MapCatalog>,
    rng: ChaCha8Rng,
}

impl SonarService {
    /// Out-of-battle service with the configured weapon defaults.
    #[must_use]
    pub fn default_service(settings: &Settings, catalog: Arc<MapCatalog>) -> Self {
        let config = settings.sonar.clone();
        let rng = seeded_rng(config.seed);
        Self {
            map: None,
            config,
            layout: BattleLayout {
                width: settings.map_width,
                height: settings.map_height,
                spawn_margin: settings.spawn_margin,
                player_name: settings.serenity_name.clone(),
            },
            catalog,
            rng,
        }
    }

    /// The battle map, if a battle is in progress.
    #[must_use]
    pub const fn map(&self) -> Option<&Map> {
        self.map.as_ref()
    }

    /// Resolves one command and returns the damage it inflicted.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotInBattle`], [`ServiceError::AlreadyInBattle`], battle
    /// setup errors, and any [`GridError`] from the resolver. Only in-battle
    /// commands report [`GridError::ShipDestroyed`]; a ship that would start
    /// destroyed fails `START_BATTLE` with [`ServiceError::InvalidConfig`].
    pub fn apply(&mut self, command: SonarCommand) -> Result<Vec<Damage>, ServiceError> {
        let kind = command.kind();
        match command {
            SonarCommand::StartBattle { map, ship } => {
                if self.map.is_some() {
                    return Err(ServiceError::AlreadyInBattle);
                }
                let prepared = self.prepare_battle(&map, ship).map_err(|err| match err {
                    ServiceError::Grid(GridError::ShipDestroyed { name, .. }) => {
                        ServiceError::InvalidConfig {
                            reason: format!("ship {name} would start without hit points"),
                        }
                    }
                    other => other,
                })?;
                self.map = Some(prepared);
                info!(map = %map, "battle started");
                Ok(Vec::new())
            }
            SonarCommand::EndBattle => {
                if self.map.is_none() {
                    return Err(ServiceError::NotInBattle { kind });
                }
                self.end_battle();
                Ok(Vec::new())
            }
            command => {
                let map = self
                    .map
                    .as_mut()
                    .ok_or(ServiceError::NotInBattle { kind })?;
                let damages = match command {
                    SonarCommand::Move { owner, direction } => {
                        map.move_ship(owner, direction)?;
                        Vec::new()
                    }
                    SonarCommand::LaunchTorpedo { owner, target } => {
                        map.launch_torpedo(&self.config.torpedo(owner), target)?
                    }
                    SonarCommand::LaunchMine { owner, target } => {
                        map.place_mine(self.config.mine(owner), target)?;
                        Vec::new()
                    }
                    SonarCommand::DetonateMine { uid } => map.detonate_mine(uid)?,
                    SonarCommand::Repair { owner, hp } => {
                        map.repair_ship(owner, hp)?;
                        Vec::new()
                    }
                    SonarCommand::DirectDamage { owner, amount } => map.remove_hp(owner, amount)?,
                    SonarCommand::Surface => {
                        let cleared = map.clear_trails(Owner::Players);
                        debug!(cleared, "players surfaced");
                        Vec::new()
                    }
                    SonarCommand::StartBattle { .. } | SonarCommand::EndBattle => Vec::new(),
                };
                Ok(damages)
            }
        }
    }

    /// Drops the map and leaves battle mode.
    pub fn end_battle(&mut self) {
        self.map = None;
        info!("battle ended");
    }

    fn prepare_battle(&mut self, map_name: &str, spec: ShipSpec) -> Result<Map, ServiceError> {
        let asteroids = self
            .catalog
            .get(map_name)
            .ok_or_else(|| ServiceError::UnknownMap {
                name: map_name.to_string(),
            })?;

        let mut map = Map::new(self.layout.width, self.layout.height)?;
        for &position in asteroids {
            map.place_asteroid(position)?;
        }

        let player = Ship::new(
            self.layout.player_name.clone(),
            self.config.player_default_hp,
            Owner::Players,
        )?;
        let npc = Ship::with_hp(
            spec.name,
            spec.hp.unwrap_or(spec.total_hp),
            spec.total_hp,
            Owner::Npcs,
        )?;

        let position = self.spawn_position(&map)?;
        map.spawn_ship(player, position)?;
        let position = self.spawn_position(&map)?;
        map.spawn_ship(npc, position)?;
        Ok(map)
    }

    /// A random empty cell with both coordinates in `margin..=side - margin`.
    fn spawn_position(&mut self, map: &Map) -> Result<GridPosition, ServiceError> {
        let margin = i64::from(self.layout.spawn_margin);
        let width = i64::from(map.width());
        let height = i64::from(map.height());
        let candidates: Vec<GridPosition> = map
            .cells()
            .filter(|(position, cell)| {
                let (x, y) = (i64::from(position.x), i64::from(position.y));
                cell.is_empty()
                    && x >= margin
                    && y >= margin
                    && x <= width - margin
                    && y <= height - margin
            })
            .map(|(position, _)| position)
            .collect();
        candidates
            .choose(&mut self.rng)
            .copied()
            .ok_or(ServiceError::NoSpawnPosition)
    }
}

fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64)
}

fn damage_notification(damage: &Damage) -> Result<Message, ServiceError> {
    Message::new(Topic::BroadcastStatus, MessageType::Damage)
        .concerning(ServiceType::Sonar)
        .with_data(damage)
}

impl Service for SonarService {
    const IDENTITY: ServiceType = ServiceType::Sonar;
    type State = SonarState;
    type Config = SonarConfig;

    fn state(&self) -> SonarState {
        match &self.map {
            Some(map) => SonarState::battle(map.clone()),
            None => SonarState::idle(),
        }
    }

    fn config(&self) -> SonarConfig {
        self.config.clone()
    }

    fn apply_state(&mut self, state: SonarState) {
        self.map = state.map;
    }

    fn apply_config(&mut self, config: SonarConfig) {
        if config.seed.is_some() && config.seed != self.config.seed {
            self.rng = seeded_rng(config.seed);
        }
        self.config = config;
    }

    fn handle_command(&mut self, message: &Message) -> Result<Handled, ServiceError> {
        let Some(command) = SonarCommand::decode(message)? else {
            return Ok(Handled::Ignored);
        };
        match self.apply(command) {
            Ok(damages) => {
                let notifications = damages
                    .iter()
                    .map(damage_notification)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Handled::with_notifications(notifications))
            }
            Err(ServiceError::Grid(GridError::ShipDestroyed {
                name,
                owner,
                damages,
            })) => {
                info!(ship = %name, %owner, "ship destroyed, ending battle");
                self.end_battle();
                let notifications = damages
                    .iter()
                    .map(damage_notification)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Handled::with_notifications(notifications))
            }
            Err(err) => Err(err),
        }
    }
}
