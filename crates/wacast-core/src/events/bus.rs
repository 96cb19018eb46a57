//! Bus transports
//!
//! Redis pub/sub is the canonical transport between processes; the in-memory
//! bus serves tests and single-process deployments. Both are lossy:
//! `publish` is fire-and-forget and subscribers that fall behind miss
//! messages rather than exerting backpressure on producers.

use crate::errors::{CoreError, CoreResult};
use async_trait::async_trait;
use futures::stream::StreamExt;
use futures::Stream;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::pin::Pin;
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, warn};

/// Cancelable stream of raw event payloads; dropping it releases the
/// subscription
pub type EventStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Publish/subscribe seam between producers and the live stream
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Fire-and-forget publish; transport errors are logged, never returned
    /// into the producer's request path
    async fn publish(&self, channel: &str, payload: Vec<u8>);

    /// Subscribe to a channel; per-publisher ordering is preserved
    async fn subscribe(&self, channel: &str) -> CoreResult<EventStream>;
}

/// Redis pub/sub transport
pub struct RedisEventBus {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl RedisEventBus {
    pub async fn connect(redis_url: &str) -> CoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CoreError::external("redis", e.to_string()))?;

        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| CoreError::external("redis", e.to_string()))?;

        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, channel: &str, payload: Vec<u8>) {
        let mut conn = self.publisher.clone();
        let result: redis::RedisResult<()> = conn.publish(channel, payload).await;
        if let Err(e) = result {
            error!(channel, "event publish failed: {}", e);
        }
    }

    async fn subscribe(&self, channel: &str) -> CoreResult<EventStream> {
        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| CoreError::external("redis", e.to_string()))?;

        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| CoreError::external("redis", e.to_string()))?;

        debug!(channel, "subscribed to redis channel");

        let stream = pubsub
            .into_on_message()
            .filter_map(|message| async move { message.get_payload::<Vec<u8>>().ok() });

        Ok(Box::pin(stream))
    }
}

/// In-process transport over `tokio::sync::broadcast` channels
pub struct InMemoryEventBus {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Mutex::new(HashMap::new()),
        }
    }

    async fn sender(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        let mut channels = self.channels.lock().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, channel: &str, payload: Vec<u8>) {
        let sender = self.sender(channel).await;
        // An error only means no subscriber is listening right now.
        let _ = sender.send(payload);
    }

    async fn subscribe(&self, channel: &str) -> CoreResult<EventStream> {
        let receiver = self.sender(channel).await.subscribe();

        let channel = channel.to_string();
        let stream = BroadcastStream::new(receiver).filter_map(move |item| {
            let channel = channel.clone();
            async move {
                match item {
                    Ok(payload) => Some(payload),
                    Err(lagged) => {
                        warn!(channel, "subscriber lagged: {}", lagged);
                        None
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let bus = InMemoryEventBus::new();
        let mut first = bus.subscribe("events").await.unwrap();
        let mut second = bus.subscribe("events").await.unwrap();

        bus.publish("events", b"payload".to_vec()).await;

        assert_eq!(first.next().await.unwrap(), b"payload");
        assert_eq!(second.next().await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let bus = InMemoryEventBus::new();
        let mut control = bus.subscribe("campaign-manager").await.unwrap();

        bus.publish("apiserver-events", b"app".to_vec()).await;
        bus.publish("campaign-manager", b"stop".to_vec()).await;

        assert_eq!(control.next().await.unwrap(), b"stop");
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_fail() {
        let bus = InMemoryEventBus::new();
        bus.publish("nobody-listens", b"lost".to_vec()).await;
    }

    #[tokio::test]
    async fn dropped_subscription_is_released() {
        let bus = InMemoryEventBus::new();
        let stream = bus.subscribe("events").await.unwrap();
        drop(stream);

        bus.publish("events", b"after-drop".to_vec()).await;

        // A fresh subscriber only sees messages published after it joined.
        let mut fresh = bus.subscribe("events").await.unwrap();
        bus.publish("events", b"new".to_vec()).await;
        let received = tokio::time::timeout(Duration::from_secs(1), fresh.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, b"new");
    }
}
