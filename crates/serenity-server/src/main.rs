//! Serenity service host.
//!
//! Runs the sonar, switch, light and sound services on one in-process bus,
//! restores their persisted snapshots, announces their status and shuts
//! everything down cooperatively on Ctrl-C.
//!
//! Settings come from the JSON file named by `SERENITY_CONFIG`; log levels
//! from `RUST_LOG` (default `info`).

use std::sync::Arc;

use anyhow::{Context, Result};
use serenity_core::{
    BroadcastHub, ChannelObserver, DurableStore, FileStore, LightService, MapCatalog, MemoryBus,
    MemoryStore, MessageBus, ServiceRuntime, Settings, SonarService, SoundService, SwitchService,
    Topic,
};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Topics forwarded to the external device bridges.
const DEVICE_TOPICS: [Topic; 3] = [Topic::Light, Topic::Sound, Topic::Led];

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let settings = Settings::from_env()
        .await
        .context("failed to load settings")?;
    let catalog = match &settings.asteroid_map_dir {
        Some(dir) => MapCatalog::load_dir(dir)
            .await
            .with_context(|| format!("failed to load asteroid maps from {}", dir.display()))?,
        None => MapCatalog::new(),
    };
    let catalog = Arc::new(catalog);

    let bus: Arc<dyn MessageBus> = Arc::new(MemoryBus::new(settings.lock_timeout()));
    let store: Arc<dyn DurableStore> = match &settings.store_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "persisting snapshots to disk");
            Arc::new(FileStore::new(dir))
        }
        None => {
            warn!("no store_dir configured, snapshots are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let sonar = ServiceRuntime::restore(
        SonarService::default_service(&settings, Arc::clone(&catalog)),
        Arc::clone(&bus),
        Arc::clone(&store),
    )
    .await;
    let switch = ServiceRuntime::restore(
        SwitchService::default_service(&settings).context("invalid switch configuration")?,
        Arc::clone(&bus),
        Arc::clone(&store),
    )
    .await;
    let light = ServiceRuntime::restore(
        LightService::default_service(),
        Arc::clone(&bus),
        Arc::clone(&store),
    )
    .await;
    let sound = ServiceRuntime::restore(
        SoundService::default_service(),
        Arc::clone(&bus),
        Arc::clone(&store),
    )
    .await;

    // the light, LED and sound bridges live outside this process
    let hub = Arc::new(BroadcastHub::new(Arc::clone(&bus)));
    let (device, mut device_rx) = ChannelObserver::new();
    for topic in DEVICE_TOPICS {
        hub.connect(topic, Arc::new(device.clone()), None);
    }
    drop(device);

    let mut tasks = JoinSet::new();
    tasks.spawn(sonar.clone().run());
    tasks.spawn(switch.clone().run());
    tasks.spawn(light.clone().run());
    tasks.spawn(sound.clone().run());
    tasks.spawn(Arc::clone(&hub).run(DEVICE_TOPICS.to_vec()));
    tasks.spawn(async move {
        while let Some(payload) = device_rx.recv().await {
            debug!(%payload, "device bridge");
        }
        Ok(())
    });
    // let every loop open its subscriptions before the first broadcast
    tokio::task::yield_now().await;

    sonar.broadcast_status().await?;
    switch.broadcast_status().await?;
    light.broadcast_status().await?;
    sound.broadcast_status().await?;
    info!(maps = ?catalog.names().collect::<Vec<_>>(), "serenity services running");

    let early_exit = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("shutdown requested");
            None
        }
        Some(joined) = tasks.join_next() => Some(joined),
    };

    bus.terminate_all_channels();
    hub.disconnect_all().await;

    if let Some(joined) = early_exit {
        warn!("a service stopped before shutdown was requested");
        joined.context("service task panicked")??;
    }
    while let Some(joined) = tasks.join_next().await {
        joined.context("service task panicked")??;
    }
    info!("all services stopped");
    Ok(())
}
