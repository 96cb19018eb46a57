//! Event vocabulary, bus transports and the distributed lock
//!
//! Producers (campaign engine, webhook pipeline) publish tagged events on
//! the bus; the live stream subscribes, filters by audience and frames them
//! for operators. The bus is lossy by design: a slow subscriber never stalls
//! a producer.

pub mod bus;
pub mod lock;
pub mod types;

pub use bus::{EventBus, EventStream, InMemoryEventBus, RedisEventBus};
pub use lock::{LockGuard, LockManager};
pub use types::{ApiServerEvent, CampaignProgressData, EventKind, NotificationData};

/// Application → client events (new message, conversation, progress, ...)
pub const API_SERVER_EVENTS_CHANNEL: &str = "apiserver-events";

/// Control commands addressed to the campaign engine
pub const CAMPAIGN_MANAGER_CHANNEL: &str = "campaign-manager";
