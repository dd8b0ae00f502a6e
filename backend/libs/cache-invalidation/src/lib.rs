//! Cache invalidation for the Snapgram client
//!
//! Keeps cached reads coherent with the writes the client issues.
//!
//! # Architecture
//!
//! ```text
//! Mutation succeeds (e.g. like_post on P1):
//!   1. InvalidationGraph::patterns_for(LikePost { post: P1 })
//!        -> [getPostById:P1, getRecentPosts:*, getCurrentUser:*, ...]
//!   2. Query cache marks matching entries stale (synchronous)
//!   3. InvalidationPublisher::publish(message)  (fire-and-forget)
//!      ↓
//! tokio broadcast channel
//!      ↓
//! Subscribers (views, other caches):
//!   4. Receive message, refetch on next read
//! ```
//!
//! # Example
//!
//! ```
//! use cache_invalidation::{InvalidationGraph, InvalidationPublisher, MutationKind};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let publisher = InvalidationPublisher::new("post-stats");
//! let mut subscriber = publisher.subscribe();
//!
//! let kind = MutationKind::LikePost { post: "p1".into() };
//! let patterns = InvalidationGraph::new().patterns_for(&kind);
//! publisher.invalidate(kind, patterns);
//!
//! let msg = subscriber.recv().await.unwrap();
//! assert_eq!(msg.mutation.name(), "like_post");
//! # }
//! ```

pub mod error;
pub mod graph;
pub mod helpers;
pub mod stats;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub use error::InvalidationError;
pub use graph::{InvalidationGraph, MutationKind};
pub use helpers::{KeyPattern, QueryKey, QueryScope};
pub use stats::{InvalidationStats, StatsCollector};

type Result<T> = std::result::Result<T, InvalidationError>;

/// Cache invalidation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationMessage {
    pub message_id: String,
    pub mutation: MutationKind,
    pub patterns: Vec<KeyPattern>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source: String,
}

impl InvalidationMessage {
    pub fn new(mutation: MutationKind, patterns: Vec<KeyPattern>, source: String) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            mutation,
            patterns,
            timestamp: chrono::Utc::now(),
            source,
        }
    }

    /// Whether this message marks `key` stale
    pub fn covers(&self, key: &QueryKey) -> bool {
        self.patterns.iter().any(|p| key.matches(p))
    }
}

/// Publisher for cache invalidation events
#[derive(Clone)]
pub struct InvalidationPublisher {
    sender: broadcast::Sender<InvalidationMessage>,
    source: String,
    stats: StatsCollector,
}

impl InvalidationPublisher {
    /// Messages buffered per subscriber before it starts lagging
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(source: impl Into<String>) -> Self {
        Self::with_capacity(source, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(source: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            source: source.into(),
            stats: StatsCollector::new(),
        }
    }

    /// Open a new subscription; it only sees messages published afterwards
    pub fn subscribe(&self) -> InvalidationSubscriber {
        InvalidationSubscriber {
            receiver: self.sender.subscribe(),
            stats: self.stats.clone(),
        }
    }

    /// Broadcast a message without waiting on any subscriber
    ///
    /// Returns number of subscribers that were handed the message
    pub fn publish(&self, msg: InvalidationMessage) -> usize {
        debug!(
            message_id = %msg.message_id,
            mutation = %msg.mutation,
            patterns = msg.patterns.len(),
            source = %msg.source,
            "Publishing invalidation message"
        );

        self.stats.record_publish();
        match self.sender.send(msg) {
            Ok(count) => count,
            // No receivers is a normal state for a headless client
            Err(_) => 0,
        }
    }

    /// Build and publish the message for a completed mutation
    pub fn invalidate(&self, mutation: MutationKind, patterns: Vec<KeyPattern>) -> usize {
        let msg = InvalidationMessage::new(mutation, patterns, self.source.clone());
        self.publish(msg)
    }

    pub fn stats(&self) -> InvalidationStats {
        self.stats.snapshot()
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Subscriber for cache invalidation events
pub struct InvalidationSubscriber {
    receiver: broadcast::Receiver<InvalidationMessage>,
    stats: StatsCollector,
}

impl InvalidationSubscriber {
    /// Wait for the next message
    pub async fn recv(&mut self) -> Result<InvalidationMessage> {
        match self.receiver.recv().await {
            Ok(msg) => {
                self.stats.record_receive();
                let latency = chrono::Utc::now() - msg.timestamp;
                self.stats
                    .record_latency(latency.num_microseconds().unwrap_or(0) as f64 / 1000.0);
                Ok(msg)
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                self.stats.record_error();
                Err(InvalidationError::Lagged(skipped))
            }
            Err(broadcast::error::RecvError::Closed) => Err(InvalidationError::Closed),
        }
    }

    /// Run `callback` for every message on a background task
    ///
    /// Lagging is logged and skipped; the task ends when the channel closes.
    pub fn subscribe<F, Fut>(mut self, callback: F) -> JoinHandle<()>
    where
        F: Fn(InvalidationMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let callback = Arc::new(callback);

        tokio::spawn(async move {
            loop {
                let msg = match self.recv().await {
                    Ok(msg) => msg,
                    Err(InvalidationError::Lagged(skipped)) => {
                        warn!(skipped, "Invalidation subscriber lagged");
                        continue;
                    }
                    Err(_) => break,
                };

                debug!(
                    message_id = %msg.message_id,
                    mutation = %msg.mutation,
                    "Received invalidation message"
                );

                let message_id = msg.message_id.clone();
                if let Err(e) = callback(msg).await {
                    self.stats.record_error();
                    error!(error = ?e, message_id = %message_id, "Callback execution failed");
                }
            }

            debug!("Invalidation subscription ended");
        })
    }
}
