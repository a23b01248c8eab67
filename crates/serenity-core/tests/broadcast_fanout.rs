mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use serenity_core::{
    BroadcastHub, ChannelObserver, MemoryStore, MessageBus, Observer, ServiceError,
    ServiceRuntime, SonarGridAdapter, SonarService, Topic,
};
use tokio::sync::mpsc::UnboundedReceiver;

use common::{bus, catalog, settings, WAIT};

struct BrokenPipe;

#[async_trait]
impl Observer for BrokenPipe {
    async fn send(&self, _payload: &str) -> Result<(), ServiceError> {
        Err(ServiceError::ObserverClosed)
    }
}

/// Next payload whose envelope is a sonar `STATE`, parsed as JSON.
async fn next_sonar_state(rx: &mut UnboundedReceiver<String>) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            let payload = rx.recv().await.expect("observer channel closed");
            let value: Value = serde_json::from_str(&payload).expect("json payload");
            if value["type"] == "STATE" && value["concerns"] == "sonar" {
                return value;
            }
        }
    })
    .await
    .expect("timed out waiting for payload")
}

#[tokio::test]
async fn observers_get_their_own_projection() {
    let bus = bus();
    let sonar = ServiceRuntime::new(
        SonarService::default_service(&settings(), catalog()),
        bus.clone(),
        Arc::new(MemoryStore::new()),
    );
    let hub = Arc::new(BroadcastHub::new(bus.clone()));

    let (dashboard, mut dashboard_rx) = ChannelObserver::new();
    let (raw, mut raw_rx) = ChannelObserver::new();
    hub.connect(
        Topic::BroadcastStatus,
        Arc::new(dashboard),
        Some(Arc::new(SonarGridAdapter::new())),
    );
    hub.connect(Topic::BroadcastStatus, Arc::new(raw), None);
    hub.connect(Topic::BroadcastStatus, Arc::new(BrokenPipe), None);

    let sonar_task = tokio::spawn(sonar.clone().run());
    let hub_task = tokio::spawn(Arc::clone(&hub).run(vec![Topic::BroadcastStatus]));
    tokio::task::yield_now().await;

    sonar.broadcast_status().await.unwrap();

    let adapted = next_sonar_state(&mut dashboard_rx).await;
    assert_eq!(
        adapted["data"],
        json!({"in_battle": false, "width": 0, "height": 0, "cells": []})
    );
    let untouched = next_sonar_state(&mut raw_rx).await;
    assert_eq!(untouched["data"], json!({"in_battle": false, "map": null}));

    // commands from a dashboard reach the sonar
    hub.receive(
        &json!({
            "topic": "COMMAND",
            "type": "START_BATTLE",
            "concerns": "sonar",
            "data": {"map": "open", "ship": {"name": "Reaver", "total_hp": 3}}
        })
        .to_string(),
    )
    .await
    .unwrap();

    let adapted = next_sonar_state(&mut dashboard_rx).await;
    assert_eq!(adapted["data"]["in_battle"], true);
    assert_eq!(adapted["data"]["width"], 10);
    assert_eq!(adapted["data"]["cells"].as_array().unwrap().len(), 2);
    assert_eq!(hub.observer_count(Topic::BroadcastStatus), 2);

    bus.terminate_all_channels();
    sonar_task.await.unwrap().unwrap();
    hub_task.await.unwrap().unwrap();

    hub.disconnect_all().await;
    assert_eq!(hub.observer_count(Topic::BroadcastStatus), 0);
}

#[tokio::test]
async fn observers_cannot_publish_status() {
    let bus = bus();
    let hub = BroadcastHub::new(bus.clone());
    let mut status = bus.subscribe(Topic::BroadcastStatus);

    let err = hub
        .receive(r#"{"topic":"BROADCAST_STATUS","type":"STATE","concerns":"sonar","data":{}}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::RejectedTopic { .. }));

    let nothing = tokio::time::timeout(Duration::from_millis(50), status.next()).await;
    assert!(nothing.is_err(), "rejected message must not reach the bus");
}
