//! # Signal Subscriber
//!
//! The subscription side of the correlation bus.

use crate::signals::{Signal, SignalFilter};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{ready, Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::{debug, warn};

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The bus was dropped.
    #[error("Correlation bus closed")]
    Closed,

    /// No matching signal arrived in time.
    #[error("No matching signal within {0:?}")]
    Timeout(Duration),
}

/// Decrements the topic count when the owning handle goes away.
struct SubscriptionTracker {
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,
    topic_key: String,
}

impl Drop for SubscriptionTracker {
    fn drop(&mut self) {
        let Ok(mut subs) = self.subscriptions.write() else {
            return;
        };
        let Some(count) = subs.get_mut(&self.topic_key) else {
            debug!(topic = %self.topic_key, "Subscription dropped");
            return;
        };

        *count = count.saturating_sub(1);
        if *count == 0 {
            subs.remove(&self.topic_key);
        }
        debug!(topic = %self.topic_key, "Subscription dropped");
    }
}

/// A subscription handle for receiving signals.
///
/// Dropping the handle unsubscribes. It holds no reference to the bus
/// itself, so a forgotten handle never keeps the bus alive; once the bus is
/// dropped, receiving reports [`SubscriptionError::Closed`].
pub struct Subscription {
    receiver: broadcast::Receiver<Signal>,
    filter: SignalFilter,
    _tracker: SubscriptionTracker,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<Signal>,
        filter: SignalFilter,
        subscriptions: Arc<RwLock<HashMap<String, usize>>>,
        topic_key: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            _tracker: SubscriptionTracker {
                subscriptions,
                topic_key,
            },
        }
    }

    /// Receive the next signal that matches the filter.
    ///
    /// # Returns
    ///
    /// - `Some(signal)` - The next matching signal
    /// - `None` - The bus was dropped
    pub async fn recv(&mut self) -> Option<Signal> {
        loop {
            let signal = match self.receiver.recv().await {
                Ok(s) => s,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(lagged = count, "Subscriber lagged, some signals dropped");
                    continue;
                }
            };

            if self.filter.matches(&signal) {
                return Some(signal);
            }
        }
    }

    /// Receive the next matching signal, giving up after `limit`.
    ///
    /// # Errors
    ///
    /// [`SubscriptionError::Timeout`] when nothing matched in time and
    /// [`SubscriptionError::Closed`] when the bus is gone.
    pub async fn recv_timeout(&mut self, limit: Duration) -> Result<Signal, SubscriptionError> {
        match tokio::time::timeout(limit, self.recv()).await {
            Ok(Some(signal)) => Ok(signal),
            Ok(None) => Err(SubscriptionError::Closed),
            Err(_) => Err(SubscriptionError::Timeout(limit)),
        }
    }

    /// Try to receive the next signal without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(signal))` - A signal was available and matched
    /// - `Ok(None)` - No matching signal available
    /// - `Err(SubscriptionError::Closed)` - The bus was dropped
    pub fn try_recv(&mut self) -> Result<Option<Signal>, SubscriptionError> {
        loop {
            let signal = match self.receiver.try_recv() {
                Ok(s) => s,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(lagged = count, "Subscriber lagged, some signals dropped");
                    continue;
                }
            };

            if self.filter.matches(&signal) {
                return Ok(Some(signal));
            }
        }
    }

    /// Get the filter for this subscription.
    #[must_use]
    pub fn filter(&self) -> &SignalFilter {
        &self.filter
    }

    /// Convert the handle into a `Stream` of matching signals.
    #[must_use]
    pub fn into_stream(self) -> SignalStream {
        SignalStream {
            inner: BroadcastStream::new(self.receiver),
            filter: self.filter,
            _tracker: self._tracker,
        }
    }
}

/// A stream of matching signals.
///
/// Implements `tokio_stream::Stream` for use with stream combinators.
pub struct SignalStream {
    inner: BroadcastStream<Signal>,
    filter: SignalFilter,
    _tracker: SubscriptionTracker,
}

impl SignalStream {
    /// Get the filter for this stream.
    #[must_use]
    pub fn filter(&self) -> &SignalFilter {
        &self.filter
    }
}

impl Stream for SignalStream {
    type Item = Signal;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(signal)) if this.filter.matches(&signal) => {
                    return Poll::Ready(Some(signal))
                }
                Some(Ok(_)) => continue,
                Some(Err(BroadcastStreamRecvError::Lagged(count))) => {
                    warn!(lagged = count, "Signal stream lagged");
                    continue;
                }
                None => return Poll::Ready(None),
            }
        }
    }
}
