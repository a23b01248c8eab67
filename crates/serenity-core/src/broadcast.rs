//! Fan-out of bus traffic to external observers.
//!
//! # Architecture
//!
//! A [`BroadcastHub`] keeps, per topic, the observers that asked for it.
//! [`BroadcastHub::run`] subscribes to those topics and forwards every
//! message to every observer, optionally passing it through a per-observer
//! [`Adapter`] first. An observer whose delivery fails is dropped; the rest
//! keep receiving.
//!
//! Observers may also talk back: [`BroadcastHub::receive`] re-publishes
//! their `COMMAND` and `PROPOSE_STATUS` messages and rejects everything else.
//!
//! # Example
//!
//! ```ignore
//! let hub = Arc::new(BroadcastHub::new(bus.clone()));
//! let (observer, mut rx) = ChannelObserver::new();
//! hub.connect(Topic::BroadcastStatus, Arc::new(observer), Some(Arc::new(SonarGridAdapter::default())));
//! tokio::spawn(hub.clone().run(vec![Topic::BroadcastStatus]));
//! ```

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serenity_grid::{ActorKind, Owner};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::bus::MessageBus;
use crate::error::ServiceError;
use crate::message::{Message, MessageType, ServiceType, Topic};
use crate::sonar::SonarState;

// =============================================================================
// Observers and adapters
// =============================================================================

/// Handle returned by [`BroadcastHub::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// A sink for serialized messages, such as a dashboard connection.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Delivers one JSON payload.
    ///
    /// # Errors
    ///
    /// Any error disconnects the observer.
    async fn send(&self, payload: &str) -> Result<(), ServiceError>;

    /// Called once when the observer is disconnected.
    async fn close(&self) {}
}

/// Per-observer projection of a message.
pub trait Adapter: Send + Sync {
    /// Returns the message as this observer should see it.
    ///
    /// # Errors
    ///
    /// A failed projection skips this observer for this message only.
    fn adapt(&self, message: &Message) -> Result<Message, ServiceError>;
}

/// Observer backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelObserver {
    /// Creates the observer and the receiving half of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Observer for ChannelObserver {
    async fn send(&self, payload: &str) -> Result<(), ServiceError> {
        self.sender
            .send(payload.to_string())
            .map_err(|_| ServiceError::ObserverClosed)
    }
}

#[derive(Clone)]
struct Registration {
    id: ObserverId,
    observer: Arc<dyn Observer>,
    adapter: Option<Arc<dyn Adapter>>,
}

// =============================================================================
// BroadcastHub
// =============================================================================

/// Routes bus messages to observers and observer messages back to the bus.
pub struct BroadcastHub {
    bus: Arc<dyn MessageBus>,
    observers: DashMap<Topic, Vec<Registration>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    /// Creates a hub with no observers.
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            bus,
            observers: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers `observer` for `topic`, optionally behind `adapter`.
    pub fn connect(
        &self,
        topic: Topic,
        observer: Arc<dyn Observer>,
        adapter: Option<Arc<dyn Adapter>>,
    ) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.entry(topic).or_default().push(Registration {
            id,
            observer,
            adapter,
        });
        debug!(%topic, observer = id.0, "observer connected");
        id
    }

    /// Removes an observer from every topic and closes it. Returns false if
    /// it was not connected.
    pub async fn disconnect(&self, id: ObserverId) -> bool {
        let mut removed = None;
        for mut entry in self.observers.iter_mut() {
            if let Some(index) = entry.iter().position(|r| r.id == id) {
                removed = Some(entry.remove(index));
            }
        }
        match removed {
            Some(registration) => {
                registration.observer.close().await;
                debug!(observer = id.0, "observer disconnected");
                true
            }
            None => false,
        }
    }

    /// Closes and removes every observer.
    pub async fn disconnect_all(&self) {
        let mut registrations = Vec::new();
        for mut entry in self.observers.iter_mut() {
            registrations.append(entry.value_mut());
        }
        let count = registrations.len();
        for registration in registrations {
            registration.observer.close().await;
        }
        info!(count, "disconnected all observers");
    }

    /// Number of observers registered for `topic`.
    #[must_use]
    pub fn observer_count(&self, topic: Topic) -> usize {
        self.observers.get(&topic).map_or(0, |entry| entry.len())
    }

    /// Delivers `message` to every observer of its topic.
    pub async fn fan_out(&self, message: &Message) {
        let registrations = self
            .observers
            .get(&message.topic)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        let mut failed = Vec::new();
        for registration in &registrations {
            let payload = match &registration.adapter {
                Some(adapter) => adapter.adapt(message).and_then(|m| m.to_json()),
                None => message.to_json(),
            };
            let payload = match payload {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(observer = registration.id.0, kind = %message.kind, error = %err, "adapter failed, skipping");
                    continue;
                }
            };
            if let Err(err) = registration.observer.send(&payload).await {
                warn!(observer = registration.id.0, error = %err, "delivery failed, dropping observer");
                failed.push(registration.id);
            }
        }
        for id in failed {
            self.disconnect(id).await;
        }
    }

    /// Handles text sent by an observer. Only `COMMAND` and `PROPOSE_STATUS`
    /// messages are re-published.
    ///
    /// # Errors
    ///
    /// [`ServiceError::MalformedMessage`] for undecodable text,
    /// [`ServiceError::RejectedTopic`] for any other topic, or a bus failure.
    pub async fn receive(&self, text: &str) -> Result<(), ServiceError> {
        let message = Message::from_json(text).inspect_err(|err| {
            warn!(error = %err, "dropping malformed observer message");
        })?;
        match message.topic {
            Topic::Command | Topic::ProposeStatus => self.bus.publish(&message).await,
            topic => {
                warn!(%topic, kind = %message.kind, "dropping observer message on read-only topic");
                Err(ServiceError::RejectedTopic { topic })
            }
        }
    }

    /// Forwards `topics` to observers until the bus shuts down.
    ///
    /// # Errors
    ///
    /// A forwarding task that panicked.
    pub async fn run(self: Arc<Self>, topics: Vec<Topic>) -> Result<(), ServiceError> {
        let mut tasks = JoinSet::new();
        for topic in topics {
            let mut subscription = self.bus.subscribe(topic);
            let hub = Arc::clone(&self);
            tasks.spawn(async move {
                while let Some(message) = subscription.next().await {
                    hub.fan_out(&message).await;
                }
                debug!(%topic, "broadcast loop ended");
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tasks.abort_all();
                return Err(err.into());
            }
        }
        Ok(())
    }
}

// =============================================================================
// SonarGridAdapter
// =============================================================================

/// Flat projection of a sonar state for grid renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridView {
    /// Whether a battle is running.
    pub in_battle: bool,
    /// Map width, 0 outside a battle.
    pub width: u32,
    /// Map height, 0 outside a battle.
    pub height: u32,
    /// Every non-empty cell.
    pub cells: Vec<CellView>,
}

/// One occupied cell of a [`GridView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellView {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// Kinds of the visible actors, asteroid first.
    pub kinds: Vec<ActorKind>,
    /// Distinct owners of the visible actors.
    pub owners: BTreeSet<Owner>,
}

/// Projects sonar `STATE` broadcasts into a [`GridView`]. Every other
/// message passes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct SonarGridAdapter {
    visible_to: Option<Owner>,
}

impl SonarGridAdapter {
    /// Shows every actor.
    #[must_use]
    pub const fn new() -> Self {
        Self { visible_to: None }
    }

    /// Hides the opponent's actors from `owner`.
    #[must_use]
    pub const fn visible_to(owner: Owner) -> Self {
        Self {
            visible_to: Some(owner),
        }
    }

    /// Builds the view of `state`.
    #[must_use]
    pub fn project(&self, state: &SonarState) -> GridView {
        let Some(map) = state.map() else {
            return GridView {
                in_battle: false,
                width: 0,
                height: 0,
                cells: Vec::new(),
            };
        };
        let hidden = self.visible_to.map(Owner::opponent);
        let cells = map
            .cells()
            .filter_map(|(position, cell)| {
                let visible: Vec<_> = cell
                    .content()
                    .iter()
                    .filter(|actor| hidden.is_none() || actor.owner() != hidden)
                    .collect();
                let mut kinds = Vec::with_capacity(visible.len() + 1);
                if cell.has_asteroid() {
                    kinds.push(ActorKind::Asteroid);
                }
                kinds.extend(visible.iter().map(|actor| actor.kind()));
                if kinds.is_empty() {
                    return None;
                }
                Some(CellView {
                    x: position.x,
                    y: position.y,
                    kinds,
                    owners: visible.iter().filter_map(|actor| actor.owner()).collect(),
                })
            })
            .collect();
        GridView {
            in_battle: true,
            width: map.width(),
            height: map.height(),
            cells,
        }
    }
}

impl Adapter for SonarGridAdapter {
    fn adapt(&self, message: &Message) -> Result<Message, ServiceError> {
        if message.kind != MessageType::State || message.concerns != Some(ServiceType::Sonar) {
            return Ok(message.clone());
        }
        let state: SonarState = message.decode_data()?;
        let mut adapted = message.clone();
        adapted.data = serde_json::to_value(self.project(&state))?;
        Ok(adapted)
    }
}
