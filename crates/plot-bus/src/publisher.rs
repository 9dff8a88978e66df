//! # Signal Publisher
//!
//! The publishing side of the correlation bus.

use crate::signals::{Signal, SignalFilter};
use crate::subscriber::{SignalStream, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

/// Trait for publishing signals to the bus.
///
/// Publishing never blocks: the router calls it from the event loop.
pub trait SignalPublisher: Send + Sync {
    /// Publish a signal.
    ///
    /// # Returns
    ///
    /// The number of active subscribers that received the signal.
    fn publish(&self, signal: Signal) -> usize;

    /// Get the total number of signals published.
    fn signals_published(&self) -> u64;
}

/// In-process correlation bus.
///
/// Uses `tokio::sync::broadcast` for multi-consumer fan-out. Each subscriber
/// applies its own [`SignalFilter`].
pub struct CorrelationBus {
    /// Broadcast sender for signals.
    sender: broadcast::Sender<Signal>,

    /// Active subscription count by topic.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    /// Total signals published.
    signals_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl CorrelationBus {
    /// Create a new bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            signals_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to signals matching a filter.
    ///
    /// Only signals published after this call are delivered. Subscribe
    /// before sending the request you want to correlate.
    #[must_use]
    pub fn subscribe(&self, filter: SignalFilter) -> Subscription {
        let receiver = self.sender.subscribe();
        let topic_key = filter.topic_key();

        if let Ok(mut subs) = self.subscriptions.write() {
            *subs.entry(topic_key.clone()).or_insert(0) += 1;
        }

        debug!(kinds = ?filter.kinds, key = ?filter.key, "New subscription created");

        Subscription::new(receiver, filter, self.subscriptions.clone(), topic_key)
    }

    /// Subscribe and wrap the handle as a `Stream`.
    #[must_use]
    pub fn signal_stream(&self, filter: SignalFilter) -> SignalStream {
        self.subscribe(filter).into_stream()
    }

    /// Get the number of live subscription handles.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the number of tracked subscriptions across all topics.
    #[must_use]
    pub fn tracked_subscriptions(&self) -> usize {
        self.subscriptions
            .read()
            .map(|subs| subs.values().sum())
            .unwrap_or(0)
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for CorrelationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalPublisher for CorrelationBus {
    fn publish(&self, signal: Signal) -> usize {
        let kind = signal.kind();
        self.signals_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(signal) {
            Ok(receivers) => {
                debug!(kind = ?kind, receivers, "Signal published");
                receivers
            }
            Err(_) => {
                // Nobody is waiting; not an error for best-effort delivery.
                debug!(kind = ?kind, "Signal dropped (no subscribers)");
                0
            }
        }
    }

    fn signals_published(&self) -> u64 {
        self.signals_published.load(Ordering::Relaxed)
    }
}
