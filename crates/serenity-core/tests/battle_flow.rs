mod common;

use std::sync::Arc;

use serde_json::json;
use serenity_core::{
    LightService, MemoryStore, Message, MessageBus, MessageType, Service, ServiceError,
    ServiceRuntime, ServiceType, SonarService, SoundService, SwitchService, Topic,
};
use serenity_grid::{Damage, GridError, GridPosition, Owner};

use common::{bus, catalog, command, next_matching, next_state, settings, sonar_state, staged_battle};

#[tokio::test]
async fn destroying_a_ship_ends_the_battle() {
    let bus = bus();
    let sonar = ServiceRuntime::new(
        SonarService::default_service(&settings(), catalog()),
        bus.clone(),
        Arc::new(MemoryStore::new()),
    );
    sonar
        .update_state(staged_battle(GridPosition::new(2, 2), GridPosition::new(6, 6)))
        .await
        .unwrap();
    let mut status = bus.subscribe(Topic::BroadcastStatus);
    let running = tokio::spawn(sonar.clone().run());
    tokio::task::yield_now().await;

    bus.publish(&command(
        MessageType::DirectDamage,
        json!({"owner": "npcs", "amount": 10}),
    ))
    .await
    .unwrap();

    let state = sonar_state(&next_state(&mut status, ServiceType::Sonar).await);
    assert!(!state.in_battle());
    assert!(state.map().is_none());
    // the lethal hit follows the final state
    let damage = next_matching(&mut status, |m| m.kind == MessageType::Damage).await;
    let damage: Damage = damage.decode_data().unwrap();
    assert_eq!(
        damage,
        Damage {
            amount: 10,
            owner: Owner::Npcs
        }
    );

    bus.terminate_all_channels();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn mine_lifecycle_over_the_bus() {
    let bus = bus();
    let sonar = ServiceRuntime::new(
        SonarService::default_service(&settings(), catalog()),
        bus.clone(),
        Arc::new(MemoryStore::new()),
    );
    sonar
        .update_state(staged_battle(GridPosition::new(2, 2), GridPosition::new(3, 3)))
        .await
        .unwrap();
    let mut status = bus.subscribe(Topic::BroadcastStatus);
    let running = tokio::spawn(sonar.clone().run());
    tokio::task::yield_now().await;

    bus.publish(&command(
        MessageType::LaunchMine,
        json!({"owner": "players", "target": {"x": 4, "y": 4}}),
    ))
    .await
    .unwrap();
    let placed = sonar_state(&next_state(&mut status, ServiceType::Sonar).await);
    let map = placed.map().unwrap();
    let (&uid, &position) = map.mine_positions().iter().next().unwrap();
    assert_eq!(position, GridPosition::new(4, 4));

    bus.publish(&command(MessageType::DetonateMine, json!({"uid": uid})))
        .await
        .unwrap();
    let damage = next_matching(&mut status, |m| m.kind == MessageType::Damage).await;
    let damage: Damage = damage.decode_data().unwrap();
    // one cell from the blast: 3 - 1
    assert_eq!(damage, Damage { amount: 2, owner: Owner::Npcs });

    bus.terminate_all_channels();
    running.await.unwrap().unwrap();

    let map = sonar.state().map().cloned().unwrap();
    assert!(map.mine_positions().is_empty());
    assert_eq!(map.ship_for(Owner::Npcs).unwrap().hp(), 1);
    assert_eq!(map.ship_for(Owner::Players).unwrap().hp(), 5);

    let again = sonar
        .execute(|service| {
            service.handle_command(&command(MessageType::DetonateMine, json!({"uid": uid})))
        })
        .await;
    assert!(matches!(
        again,
        Err(ServiceError::Grid(GridError::MineNotFound { .. }))
    ));
}

#[tokio::test]
async fn switch_flip_moves_the_players_ship() {
    let bus = bus();
    let store = Arc::new(MemoryStore::new());
    let sonar = ServiceRuntime::new(
        SonarService::default_service(&settings(), catalog()),
        bus.clone(),
        store.clone(),
    );
    let switch = ServiceRuntime::new(
        SwitchService::default_service(&settings()).unwrap(),
        bus.clone(),
        store,
    );
    let mut status = bus.subscribe(Topic::BroadcastStatus);
    let sonar_task = tokio::spawn(sonar.clone().run());
    let switch_task = tokio::spawn(switch.clone().run());
    tokio::task::yield_now().await;

    bus.publish(&command(
        MessageType::StartBattle,
        json!({"map": "open", "ship": {"name": "Reaver", "total_hp": 3}}),
    ))
    .await
    .unwrap();

    let mut sonar_started = None;
    let mut switches_armed = false;
    while sonar_started.is_none() || !switches_armed {
        let message = next_matching(&mut status, |m| m.kind == MessageType::State).await;
        match message.concerns {
            Some(ServiceType::Sonar) => sonar_started = Some(sonar_state(&message)),
            Some(ServiceType::Switch) => switches_armed = true,
            _ => {}
        }
    }
    let start = sonar_started
        .unwrap()
        .map()
        .unwrap()
        .ship_position(Owner::Players)
        .unwrap();

    let flip = Message::new(Topic::Command, MessageType::Switch)
        .concerning(ServiceType::Switch)
        .with_data(&json!({"code": "NFW0R"}))
        .unwrap();
    bus.publish(&flip).await.unwrap();

    let moved = sonar_state(&next_state(&mut status, ServiceType::Sonar).await);
    let position = moved.map().unwrap().ship_position(Owner::Players).unwrap();
    assert_eq!(position, GridPosition::new(start.x, start.y - 1));

    bus.terminate_all_channels();
    sonar_task.await.unwrap().unwrap();
    switch_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn lights_follow_the_battle() {
    let bus = bus();
    let store = Arc::new(MemoryStore::new());
    let sonar = ServiceRuntime::new(
        SonarService::default_service(&settings(), catalog()),
        bus.clone(),
        store.clone(),
    );
    let light = ServiceRuntime::new(LightService::default_service(), bus.clone(), store);
    let mut lights = bus.subscribe(Topic::Light);
    let sonar_task = tokio::spawn(sonar.clone().run());
    let light_task = tokio::spawn(light.clone().run());
    tokio::task::yield_now().await;

    bus.publish(&command(
        MessageType::StartBattle,
        json!({"map": "open", "ship": {"name": "Reaver", "total_hp": 3}}),
    ))
    .await
    .unwrap();
    let message = next_matching(&mut lights, |_| true).await;
    assert_eq!(message.data, json!("red;blink;red"));

    bus.publish(&command(MessageType::EndBattle, json!(null)))
        .await
        .unwrap();
    let message = next_matching(&mut lights, |_| true).await;
    assert_eq!(message.data, json!("green;blink;blue"));

    bus.terminate_all_channels();
    sonar_task.await.unwrap().unwrap();
    light_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn sounds_follow_the_battle() {
    let bus = bus();
    let store = Arc::new(MemoryStore::new());
    let sonar = ServiceRuntime::new(
        SonarService::default_service(&settings(), catalog()),
        bus.clone(),
        store.clone(),
    );
    let sound = ServiceRuntime::new(SoundService::default_service(), bus.clone(), store);
    let mut sounds = bus.subscribe(Topic::Sound);
    let sonar_task = tokio::spawn(sonar.clone().run());
    let sound_task = tokio::spawn(sound.clone().run());
    tokio::task::yield_now().await;

    bus.publish(&command(
        MessageType::StartBattle,
        json!({"map": "open", "ship": {"name": "Reaver", "total_hp": 3}}),
    ))
    .await
    .unwrap();
    let message = next_matching(&mut sounds, |_| true).await;
    assert_eq!(message.kind, MessageType::BackgroundSound);
    assert_eq!(message.data, json!("battle"));

    bus.publish(&command(
        MessageType::DirectDamage,
        json!({"owner": "npcs", "amount": 1}),
    ))
    .await
    .unwrap();
    let message = next_matching(&mut sounds, |_| true).await;
    assert_eq!(message.kind, MessageType::PlaySound);
    assert_eq!(message.data, json!("explosion_1"));

    bus.publish(&command(MessageType::EndBattle, json!(null)))
        .await
        .unwrap();
    let message = next_matching(&mut sounds, |_| true).await;
    assert_eq!(message.kind, MessageType::BackgroundSound);
    assert_eq!(message.data, json!(null));

    bus.terminate_all_channels();
    sonar_task.await.unwrap().unwrap();
    sound_task.await.unwrap().unwrap();
}
