//! Shared fixtures for the service integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serenity_core::{
    MapCatalog, MemoryBus, Message, MessageType, ServiceType, Settings, SonarConfig, SonarState,
    Subscription, Topic,
};
use serenity_grid::{GridPosition, Map, Owner, Ship};

/// How long a test waits for an expected broadcast.
pub const WAIT: Duration = Duration::from_secs(2);

/// Small deterministic settings: a 10x10 map and a fixed spawn seed.
pub fn settings() -> Settings {
    Settings {
        map_width: 10,
        map_height: 10,
        sonar: SonarConfig {
            seed: Some(11),
            ..SonarConfig::default()
        },
        ..Settings::default()
    }
}

pub fn bus() -> Arc<MemoryBus> {
    Arc::new(MemoryBus::new(Duration::from_millis(500)))
}

pub fn catalog() -> Arc<MapCatalog> {
    Arc::new(MapCatalog::new())
}

/// A sonar command.
pub fn command(kind: MessageType, data: serde_json::Value) -> Message {
    Message::new(Topic::Command, kind)
        .concerning(ServiceType::Sonar)
        .with_data(&data)
        .expect("command payload")
}

/// A battle with both ships at known positions.
pub fn staged_battle(players: GridPosition, npcs: GridPosition) -> SonarState {
    let mut map = Map::new(10, 10).expect("map");
    map.spawn_ship(Ship::new("Serenity", 5, Owner::Players).expect("ship"), players)
        .expect("spawn players");
    map.spawn_ship(Ship::new("Reaver", 3, Owner::Npcs).expect("ship"), npcs)
        .expect("spawn npcs");
    SonarState::battle(map)
}

/// Waits for the first message satisfying `accept`, skipping the rest.
pub async fn next_matching(
    subscription: &mut Subscription,
    mut accept: impl FnMut(&Message) -> bool,
) -> Message {
    tokio::time::timeout(WAIT, async {
        loop {
            let message = subscription.next().await.expect("bus closed");
            if accept(&message) {
                return message;
            }
        }
    })
    .await
    .expect("timed out waiting for message")
}

/// Waits for the next `STATE` broadcast of `service`.
pub async fn next_state(subscription: &mut Subscription, service: ServiceType) -> Message {
    next_matching(subscription, |m| {
        m.kind == MessageType::State && m.concerns == Some(service)
    })
    .await
}

/// Decodes a sonar `STATE` broadcast.
pub fn sonar_state(message: &Message) -> SonarState {
    message.decode_data().expect("sonar state")
}
