//! Generic service lifecycle: lock, mutate, persist, broadcast.
//!
//! # Architecture
//!
//! A domain model implements [`Service`]: it exposes its state and config as
//! serializable values and reacts to bus messages through synchronous
//! handlers. [`ServiceRuntime`] wraps the model and supplies everything else:
//!
//! - every mutation runs under the service's named lock and is followed by
//!   a persist and a `STATE` broadcast before the lock is released
//! - the snapshot `{state, config}` is stored under `persisted/<identity>`
//! - [`ServiceRuntime::run`] drives the command, status, proposal and tick
//!   loops until the bus shuts down
//!
//! The model itself sits behind a synchronous mutex that is only ever held
//! for the duration of a handler call, never across an `.await`.
//!
//! # Example
//!
//! ```ignore
//! let runtime = ServiceRuntime::restore(SonarService::default_service(&settings, catalog), bus, store).await;
//! tokio::spawn(runtime.clone().run());
//! runtime.broadcast_status().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::bus::{MessageBus, Subscription};
use crate::error::ServiceError;
use crate::lock::NamedLock;
use crate::message::{Message, MessageType, ServiceType, Topic};
use crate::store::{persistence_key, DurableStore};

// =============================================================================
// Service trait
// =============================================================================

/// Outcome of a handler.
#[derive(Debug, Default)]
pub enum Handled {
    /// The message was not for this service. Nothing is persisted or broadcast.
    #[default]
    Ignored,
    /// The model changed. The runtime persists, broadcasts the new state, then
    /// publishes `notifications` in order.
    Applied {
        /// Extra messages to publish after the state broadcast.
        notifications: Vec<Message>,
    },
}

impl Handled {
    /// A change with no notifications.
    #[must_use]
    pub const fn applied() -> Self {
        Self::Applied {
            notifications: Vec::new(),
        }
    }

    /// A change followed by `notifications`.
    #[must_use]
    pub const fn with_notifications(notifications: Vec<Message>) -> Self {
        Self::Applied { notifications }
    }

    /// Returns true if the model changed.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// A domain model that can be driven by a [`ServiceRuntime`].
///
/// Handlers are synchronous and must leave the model untouched when they
/// return an error. State and config types validate themselves during
/// deserialization, so applying a decoded value cannot fail.
pub trait Service: Send + 'static {
    /// Identity used for `concerns`, the lock name and the storage key.
    const IDENTITY: ServiceType;

    /// Whether the runtime should feed other services' broadcasts to
    /// [`handle_status`](Self::handle_status).
    const REACTS_TO_STATUS: bool = false;

    /// Broadcast and persisted state.
    type State: Serialize + DeserializeOwned + Send + 'static;

    /// Broadcast and persisted configuration.
    type Config: Serialize + DeserializeOwned + Send + 'static;

    /// Current state.
    fn state(&self) -> Self::State;

    /// Current configuration.
    fn config(&self) -> Self::Config;

    /// Replaces the state.
    fn apply_state(&mut self, state: Self::State);

    /// Replaces the configuration.
    fn apply_config(&mut self, config: Self::Config);

    /// Reacts to a message on the `COMMAND` topic.
    ///
    /// # Errors
    ///
    /// Any error rejects the command; the runtime logs it.
    fn handle_command(&mut self, message: &Message) -> Result<Handled, ServiceError> {
        let _ = message;
        Ok(Handled::Ignored)
    }

    /// Reacts to another service's message on the `BROADCAST_STATUS` topic.
    ///
    /// # Errors
    ///
    /// Any error is logged by the runtime.
    fn handle_status(&mut self, message: &Message) -> Result<Handled, ServiceError> {
        let _ = message;
        Ok(Handled::Ignored)
    }

    /// Periodic work, called every [`tick_interval`](Self::tick_interval).
    ///
    /// # Errors
    ///
    /// Any error is logged by the runtime.
    fn tick(&mut self) -> Result<Handled, ServiceError> {
        Ok(Handled::Ignored)
    }

    /// Period of [`tick`](Self::tick), or `None` for no tick loop.
    fn tick_interval(&self) -> Option<Duration> {
        None
    }
}

/// Persisted form of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot<S, C> {
    /// Service state.
    pub state: S,
    /// Service configuration.
    pub config: C,
}

// =============================================================================
// ServiceRuntime
// =============================================================================

/// Drives a [`Service`] over a bus and a store.
pub struct ServiceRuntime<S: Service> {
    service: Arc<Mutex<S>>,
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn DurableStore>,
    lock: NamedLock,
}

impl<S: Service> Clone for ServiceRuntime<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            bus: Arc::clone(&self.bus),
            store: Arc::clone(&self.store),
            lock: self.lock.clone(),
        }
    }
}

impl<S: Service> ServiceRuntime<S> {
    /// Wraps `service` without touching the store.
    #[must_use]
    pub fn new(service: S, bus: Arc<dyn MessageBus>, store: Arc<dyn DurableStore>) -> Self {
        let lock = bus.lock(S::IDENTITY);
        Self {
            service: Arc::new(Mutex::new(service)),
            bus,
            store,
            lock,
        }
    }

    /// Wraps `default`, then overlays the persisted snapshot if one can be
    /// read and decoded. Never fails: a missing or corrupt snapshot leaves
    /// the defaults in place.
    pub async fn restore(
        default: S,
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn DurableStore>,
    ) -> Self {
        let runtime = Self::new(default, bus, store);
        match runtime.load_snapshot().await {
            Ok(Some(snapshot)) => {
                let mut service = runtime.service.lock();
                service.apply_config(snapshot.config);
                service.apply_state(snapshot.state);
                info!(service = %S::IDENTITY, "restored persisted snapshot");
            }
            Ok(None) => info!(service = %S::IDENTITY, "no persisted snapshot, using defaults"),
            Err(err) => {
                warn!(service = %S::IDENTITY, error = %err, "failed to restore snapshot, using defaults");
            }
        }
        runtime
    }

    async fn load_snapshot(&self) -> Result<Option<Snapshot<S::State, S::Config>>, ServiceError> {
        let Some(bytes) = self.store.load(&persistence_key(S::IDENTITY)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Identity of the wrapped service.
    #[must_use]
    pub const fn identity(&self) -> ServiceType {
        S::IDENTITY
    }

    /// Current state of the wrapped service.
    #[must_use]
    pub fn state(&self) -> S::State {
        self.service.lock().state()
    }

    /// Current configuration of the wrapped service.
    #[must_use]
    pub fn config(&self) -> S::Config {
        self.service.lock().config()
    }

    /// Replaces the state, then persists and broadcasts it.
    ///
    /// # Errors
    ///
    /// Lock timeout, store or bus failures.
    pub async fn update_state(&self, state: S::State) -> Result<(), ServiceError> {
        let _guard = self.lock.acquire().await?;
        self.service.lock().apply_state(state);
        self.persist().await?;
        self.publish_state().await
    }

    /// Replaces the configuration, then persists and broadcasts it.
    ///
    /// # Errors
    ///
    /// Lock timeout, store or bus failures.
    pub async fn update_config(&self, config: S::Config) -> Result<(), ServiceError> {
        let _guard = self.lock.acquire().await?;
        self.service.lock().apply_config(config);
        self.persist().await?;
        self.publish_config().await
    }

    /// Persists, then broadcasts both state and configuration.
    ///
    /// # Errors
    ///
    /// Lock timeout, store or bus failures.
    pub async fn broadcast_status(&self) -> Result<(), ServiceError> {
        let _guard = self.lock.acquire().await?;
        self.persist().await?;
        self.publish_state().await?;
        self.publish_config().await
    }

    /// Runs a synchronous mutation under the service lock. When it reports a
    /// change, persists, broadcasts the state and publishes its notifications
    /// before releasing the lock.
    ///
    /// # Errors
    ///
    /// The action's own error (model unchanged), lock timeout, store or bus
    /// failures.
    pub async fn execute<F>(&self, action: F) -> Result<(), ServiceError>
    where
        F: FnOnce(&mut S) -> Result<Handled, ServiceError> + Send,
    {
        let _guard = self.lock.acquire().await?;
        let handled = {
            let mut service = self.service.lock();
            action(&mut *service)?
        };
        let Handled::Applied { notifications } = handled else {
            return Ok(());
        };
        self.persist().await?;
        self.publish_state().await?;
        for notification in &notifications {
            self.bus.publish(notification).await?;
        }
        Ok(())
    }

    async fn persist(&self) -> Result<(), ServiceError> {
        let bytes = {
            let service = self.service.lock();
            serde_json::to_vec(&Snapshot {
                state: service.state(),
                config: service.config(),
            })?
        };
        self.store.save(&persistence_key(S::IDENTITY), bytes).await
    }

    async fn publish_state(&self) -> Result<(), ServiceError> {
        let message = Message::new(Topic::BroadcastStatus, MessageType::State)
            .concerning(S::IDENTITY)
            .with_data(&self.state())?;
        self.bus.publish(&message).await
    }

    async fn publish_config(&self) -> Result<(), ServiceError> {
        let message = Message::new(Topic::BroadcastStatus, MessageType::Config)
            .concerning(S::IDENTITY)
            .with_data(&self.config())?;
        self.bus.publish(&message).await
    }
}

// =============================================================================
// Loops
// =============================================================================

impl<S: Service> ServiceRuntime<S> {
    /// Runs every loop of the service until the bus shuts down.
    ///
    /// Subscriptions are opened before any loop starts, so nothing published
    /// after this call returns its first poll is missed. If one loop fails
    /// the others are aborted and the error is returned.
    ///
    /// # Errors
    ///
    /// A loop that panicked or failed.
    pub async fn run(self) -> Result<(), ServiceError> {
        let commands = self.bus.subscribe(Topic::Command);
        let proposals = self.bus.subscribe(Topic::ProposeStatus);
        let statuses = S::REACTS_TO_STATUS.then(|| self.bus.subscribe(Topic::BroadcastStatus));
        let tick = self.service.lock().tick_interval();

        let mut tasks = JoinSet::new();
        tasks.spawn(self.clone().command_loop(commands));
        tasks.spawn(self.clone().proposal_loop(proposals));
        if let Some(statuses) = statuses {
            tasks.spawn(self.clone().status_loop(statuses));
        }
        if let Some(period) = tick {
            tasks.spawn(self.clone().tick_loop(period));
        }
        info!(service = %S::IDENTITY, "service started");

        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(err) if err.is_cancelled() => continue,
                Err(err) => err.into(),
            };
            error!(service = %S::IDENTITY, error = %failure, "service task failed, stopping");
            tasks.abort_all();
            return Err(failure);
        }
        info!(service = %S::IDENTITY, "service stopped");
        Ok(())
    }

    async fn command_loop(self, mut subscription: Subscription) -> Result<(), ServiceError> {
        while let Some(message) = subscription.next().await {
            if let Err(err) = self.execute(|service| service.handle_command(&message)).await {
                error!(
                    service = %S::IDENTITY,
                    kind = %message.kind,
                    error = %err,
                    "error while processing command"
                );
            }
        }
        debug!(service = %S::IDENTITY, "command loop ended");
        Ok(())
    }

    async fn status_loop(self, mut subscription: Subscription) -> Result<(), ServiceError> {
        while let Some(message) = subscription.next().await {
            // own broadcasts would feed back into the handler
            if message.concerns == Some(S::IDENTITY) {
                continue;
            }
            if let Err(err) = self.execute(|service| service.handle_status(&message)).await {
                error!(
                    service = %S::IDENTITY,
                    kind = %message.kind,
                    error = %err,
                    "error while processing status"
                );
            }
        }
        debug!(service = %S::IDENTITY, "status loop ended");
        Ok(())
    }

    async fn proposal_loop(self, mut subscription: Subscription) -> Result<(), ServiceError> {
        while let Some(message) = subscription.next().await {
            if message.concerns != Some(S::IDENTITY) {
                continue;
            }
            if let Err(err) = self.apply_proposal(&message).await {
                error!(
                    service = %S::IDENTITY,
                    kind = %message.kind,
                    error = %err,
                    "error while processing proposal"
                );
            }
        }
        debug!(service = %S::IDENTITY, "proposal loop ended");
        Ok(())
    }

    async fn apply_proposal(&self, message: &Message) -> Result<(), ServiceError> {
        match message.kind {
            MessageType::State => self.update_state(message.decode_data()?).await,
            MessageType::Config => self.update_config(message.decode_data()?).await,
            MessageType::Init => self.broadcast_status().await,
            other => {
                debug!(service = %S::IDENTITY, kind = %other, "ignoring proposal");
                Ok(())
            }
        }
    }

    async fn tick_loop(self, period: Duration) -> Result<(), ServiceError> {
        let shutdown = self.bus.shutdown_token();
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(err) = self.execute(S::tick).await {
                        error!(service = %S::IDENTITY, error = %err, "error during tick");
                    }
                }
            }
        }
        debug!(service = %S::IDENTITY, "tick loop ended");
        Ok(())
    }
}
