//! Publish/subscribe message bus.
//!
//! # Architecture
//!
//! [`MessageBus`] is the seam between services and the transport. Messages
//! travel as JSON text, so every subscriber sees exactly what was published
//! and a malformed payload is only ever a decoding problem on the receiving
//! side.
//!
//! Shutdown is a control-plane signal: [`MessageBus::terminate_all_channels`]
//! cancels a [`CancellationToken`] that every [`Subscription`] watches, so no
//! sentinel value ever travels as data.
//!
//! [`MemoryBus`] is the in-process implementation. Every subscription owns
//! an unbounded tokio channel and `publish` pushes into each of them, so a
//! slow subscriber falls behind but never loses a message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::error::ServiceError;
use crate::lock::{lock_key, LockRegistry, NamedLock};
use crate::message::{Message, ServiceType, Topic};

/// Transport shared by every service of a process.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes `message` on `message.topic`. Fire-and-forget: succeeds even
    /// when nobody is subscribed.
    async fn publish(&self, message: &Message) -> Result<(), ServiceError>;

    /// Opens a fresh subscription to `topic`. Only messages published after
    /// this call are delivered.
    fn subscribe(&self, topic: Topic) -> Subscription;

    /// The named lock for a service identity. Always the same lock for the
    /// same identity.
    fn lock(&self, identity: ServiceType) -> NamedLock;

    /// Ends every active and future subscription.
    fn terminate_all_channels(&self);

    /// Token cancelled by [`terminate_all_channels`](Self::terminate_all_channels).
    fn shutdown_token(&self) -> CancellationToken;
}

// =============================================================================
// Subscription
// =============================================================================

/// A stream of decoded messages from one topic.
pub struct Subscription {
    topic: Topic,
    receiver: mpsc::UnboundedReceiver<Arc<str>>,
    shutdown: CancellationToken,
}

impl Subscription {
    /// Wraps the receiving end of a subscriber queue of JSON payloads.
    #[must_use]
    pub const fn new(
        topic: Topic,
        receiver: mpsc::UnboundedReceiver<Arc<str>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            topic,
            receiver,
            shutdown,
        }
    }

    /// Topic this subscription listens on.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        self.topic
    }

    /// Waits for the next message.
    ///
    /// Returns `None` once the bus shuts down or is dropped. Malformed
    /// payloads are logged and skipped.
    pub async fn next(&mut self) -> Option<Message> {
        loop {
            let payload = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return None,
                payload = self.receiver.recv() => payload?,
            };
            match Message::from_json(&payload) {
                Ok(message) => return Some(message),
                Err(err) => {
                    warn!(topic = %self.topic, error = %err, "dropping malformed message");
                }
            }
        }
    }
}

// =============================================================================
// MemoryBus
// =============================================================================

/// In-process bus: one queue per subscription plus a lock registry.
pub struct MemoryBus {
    subscribers: DashMap<Topic, Vec<mpsc::UnboundedSender<Arc<str>>>>,
    locks: LockRegistry,
    shutdown: CancellationToken,
}

impl MemoryBus {
    /// Creates a bus whose locks time out after `lock_timeout`.
    #[must_use]
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            subscribers: DashMap::new(),
            locks: LockRegistry::new(lock_timeout),
            shutdown: CancellationToken::new(),
        }
    }

    /// Queues `payload` for every live subscriber of `topic` and forgets the
    /// ones whose subscription was dropped. Returns how many received it.
    fn deliver(&self, topic: Topic, payload: &Arc<str>) -> usize {
        let Some(mut queues) = self.subscribers.get_mut(&topic) else {
            return 0;
        };
        queues.retain(|queue| queue.send(Arc::clone(payload)).is_ok());
        queues.len()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, message: &Message) -> Result<(), ServiceError> {
        if self.shutdown.is_cancelled() {
            return Err(ServiceError::ShuttingDown);
        }
        let payload: Arc<str> = Arc::from(message.to_json()?);
        let delivered = self.deliver(message.topic, &payload);
        trace!(topic = %message.topic, kind = %message.kind, delivered, "published");
        Ok(())
    }

    fn subscribe(&self, topic: Topic) -> Subscription {
        let (queue, receiver) = mpsc::unbounded_channel();
        self.subscribers.entry(topic).or_default().push(queue);
        Subscription::new(topic, receiver, self.shutdown.clone())
    }

    fn lock(&self, identity: ServiceType) -> NamedLock {
        self.locks.get(&lock_key(identity))
    }

    fn terminate_all_channels(&self) {
        self.shutdown.cancel();
    }

    fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
