//! # Serenity Core
//!
//! Service synchronization framework and game services for Serenity.
//!
//! Every game service keeps an in-memory model, mirrors it to a durable
//! store and exchanges changes with the other services over a shared
//! message bus. Mutations of one service never interleave: each runs under
//! the service's named lock, followed by a persist and a state broadcast.
//!
//! ## Architecture
//!
//! - **Bus**: topics, subscriptions, named locks, shutdown ([`MessageBus`])
//! - **Store**: snapshot persistence ([`DurableStore`])
//! - **Framework**: the lock, persist, broadcast lifecycle ([`ServiceRuntime`])
//! - **Services**: sonar battle, panel switches, bridge lights and sounds
//! - **Broadcast**: fan-out to dashboards with per-observer adapters ([`BroadcastHub`])
//!
//! ## Usage
//!
//! ```rust,ignore
//! let settings = Settings::from_env().await?;
//! let bus: Arc<dyn MessageBus> = Arc::new(MemoryBus::new(settings.lock_timeout()));
//! let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
//! let sonar = SonarService::default_service(&settings, Arc::new(MapCatalog::new()));
//! let runtime = ServiceRuntime::restore(sonar, bus, store).await;
//! tokio::spawn(runtime.clone().run());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod broadcast;
pub mod bus;
pub mod config;
pub mod error;
pub mod light;
pub mod lock;
pub mod message;
pub mod service;
pub mod sonar;
pub mod sound;
pub mod store;
pub mod switch;

pub use broadcast::{
    Adapter, BroadcastHub, CellView, ChannelObserver, GridView, Observer, ObserverId,
    SonarGridAdapter,
};
pub use bus::{MemoryBus, MessageBus, Subscription};
pub use config::{MapCatalog, Settings};
pub use error::ServiceError;
pub use light::{Color, Light, LightConfig, LightService, LightState, Mode};
pub use lock::{LockRegistry, NamedLock, NamedLockGuard};
pub use message::{Message, MessageType, ServiceType, Topic};
pub use service::{Handled, Service, ServiceRuntime, Snapshot};
pub use sonar::{ShipSpec, SonarCommand, SonarConfig, SonarService, SonarState};
pub use sound::{SoundConfig, SoundService, SoundState};
pub use store::{DurableStore, FileStore, MemoryStore};
pub use switch::{Function, Group, Switch, SwitchConfig, SwitchService, SwitchState};
