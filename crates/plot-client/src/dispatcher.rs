//! # Request Dispatcher
//!
//! Builds outbound envelopes and hands them to the [`Transport`].
//!
//! Sends never queue: when the transport is not ready the request is
//! dropped and reported as [`DispatchOutcome::NotReady`]. Callers re-issue
//! requests once readiness returns.
//!
//! ## Filter Registration
//!
//! The pending queue is scoped by a node-side key filter that only grows.
//! [`RequestDispatcher::ensure_filter_registered`] returns a
//! [`FilterRegistration`] token, and [`RequestDispatcher::fetch_pending_queue`]
//! only accepts such a token, so the two-step order cannot be skipped. A
//! token from an earlier connection re-registers its keys first.

use plot_telemetry::{metric_inc, ENVELOPES_DROPPED, ENVELOPES_SENT};
use plot_types::{Exchange, PlotId, PublicKey, Request};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::domain::TransportError;
use crate::ports::Transport;

/// What happened to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to the transport.
    Sent,
    /// Dropped because no socket was open.
    NotReady,
    /// Nothing to send (e.g. an empty key list).
    Skipped,
}

impl DispatchOutcome {
    #[must_use]
    pub fn is_sent(self) -> bool {
        self == Self::Sent
    }
}

/// Proof that `filter_add` was sent for a set of keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRegistration {
    keys: Vec<PublicKey>,
    generation: u64,
}

impl FilterRegistration {
    #[must_use]
    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    /// Connection generation the keys were registered on.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Sends typed requests through the shared transport.
#[derive(Clone)]
pub struct RequestDispatcher {
    transport: Arc<dyn Transport>,
}

impl RequestDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.transport.is_ready()
    }

    pub fn fetch_block_by_id(&self, plot_id: impl Into<PlotId>) -> DispatchOutcome {
        self.dispatch(Request::BlockById {
            plot_id: plot_id.into(),
        })
    }

    pub fn fetch_block_by_height(&self, height: u64) -> DispatchOutcome {
        self.dispatch(Request::BlockByHeight { height })
    }

    pub fn fetch_tip_header(&self) -> DispatchOutcome {
        self.dispatch(Request::TipHeader)
    }

    pub fn fetch_balance(&self, key: &PublicKey) -> DispatchOutcome {
        self.dispatch(Request::Balance {
            public_key: key.clone(),
        })
    }

    pub fn fetch_ranking(&self, key: &PublicKey) -> DispatchOutcome {
        self.dispatch(Request::Ranking {
            public_key: key.clone(),
        })
    }

    /// Request scores for several keys in one batch.
    pub fn fetch_ranking_table(&self, keys: &[PublicKey]) -> DispatchOutcome {
        if keys.is_empty() {
            return DispatchOutcome::Skipped;
        }
        self.dispatch(Request::RankingTable {
            public_keys: keys.to_vec(),
        })
    }

    pub fn fetch_graph(&self, key: &PublicKey) -> DispatchOutcome {
        self.dispatch(Request::Graph {
            public_key: key.clone(),
        })
    }

    /// Request exchanges involving `key`. Heights are node-defined; `0`
    /// means unbounded.
    pub fn fetch_exchange_history(
        &self,
        key: &PublicKey,
        start_height: u64,
        end_height: u64,
        limit: u32,
    ) -> DispatchOutcome {
        self.dispatch(Request::ExchangeHistory {
            public_key: key.clone(),
            start_height,
            end_height,
            limit,
        })
    }

    pub fn submit_exchange(&self, exchange: Exchange) -> DispatchOutcome {
        self.dispatch(Request::SubmitExchange { exchange })
    }

    /// Add `keys` to the node-side pending-queue filter.
    ///
    /// # Returns
    ///
    /// A token for [`Self::fetch_pending_queue`], or `None` when `keys` is
    /// empty or the request could not be sent.
    pub fn ensure_filter_registered(&self, keys: &[PublicKey]) -> Option<FilterRegistration> {
        if keys.is_empty() {
            return None;
        }

        let generation = self.transport.generation();
        let outcome = self.dispatch(Request::FilterAdd {
            public_keys: keys.to_vec(),
        });

        outcome.is_sent().then(|| FilterRegistration {
            keys: keys.to_vec(),
            generation,
        })
    }

    /// Request the pending exchanges matching the registered filter.
    pub fn fetch_pending_queue(&self, registration: &FilterRegistration) -> DispatchOutcome {
        if !self.transport.is_ready() {
            return self.not_ready(Request::PendingQueue.kind());
        }

        if registration.generation != self.transport.generation() {
            debug!(
                registered_on = registration.generation,
                current = self.transport.generation(),
                keys = registration.keys.len(),
                "Filter registered on an earlier connection, re-registering"
            );
            let outcome = self.dispatch(Request::FilterAdd {
                public_keys: registration.keys.clone(),
            });
            if !outcome.is_sent() {
                return outcome;
            }
        }

        self.dispatch(Request::PendingQueue)
    }

    fn dispatch(&self, request: Request) -> DispatchOutcome {
        let kind = request.kind();

        if !self.transport.is_ready() {
            return self.not_ready(kind);
        }

        let envelope = match request.into_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(kind, error = %e, "Failed to encode request");
                return DispatchOutcome::Skipped;
            }
        };

        match self.transport.send(&envelope) {
            Ok(()) => {
                metric_inc!(ENVELOPES_SENT, &[kind]);
                trace!(kind, "Request sent");
                DispatchOutcome::Sent
            }
            Err(TransportError::NotReady | TransportError::Closed) => self.not_ready(kind),
            Err(e) => {
                warn!(kind, error = %e, "Transport rejected request");
                DispatchOutcome::NotReady
            }
        }
    }

    fn not_ready(&self, kind: &'static str) -> DispatchOutcome {
        metric_inc!(ENVELOPES_DROPPED, &[kind]);
        debug!(kind, "Connection not ready, request dropped");
        DispatchOutcome::NotReady
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MockTransport;
    use plot_types::kinds;

    fn key(tag: &str) -> PublicKey {
        PublicKey::from_query(tag).unwrap()
    }

    #[test]
    fn test_not_ready_sends_nothing() {
        let transport = MockTransport::disconnected();
        let dispatcher = RequestDispatcher::new(transport.clone());

        assert_eq!(dispatcher.fetch_tip_header(), DispatchOutcome::NotReady);
        assert_eq!(dispatcher.fetch_balance(&key("a")), DispatchOutcome::NotReady);
        assert!(dispatcher.ensure_filter_registered(&[key("a")]).is_none());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_requests_use_wire_types() {
        let transport = MockTransport::connected();
        let dispatcher = RequestDispatcher::new(transport.clone());

        dispatcher.fetch_block_by_id("p1");
        dispatcher.fetch_block_by_height(0);
        dispatcher.fetch_tip_header();
        dispatcher.fetch_balance(&key("a"));
        dispatcher.fetch_ranking(&key("a"));
        dispatcher.fetch_graph(&key("a"));
        dispatcher.fetch_exchange_history(&key("a"), 11, 0, 10);

        assert_eq!(
            transport.sent_kinds(),
            vec![
                kinds::GET_PLOT,
                kinds::GET_PLOT_BY_HEIGHT,
                kinds::GET_TIP_HEADER,
                kinds::GET_IMBALANCE,
                kinds::GET_RANK,
                kinds::GET_GRAPH,
                kinds::GET_PUBLIC_KEY_INTERACTIONS,
            ]
        );
    }

    #[test]
    fn test_empty_key_lists_are_skipped() {
        let transport = MockTransport::connected();
        let dispatcher = RequestDispatcher::new(transport.clone());

        assert_eq!(dispatcher.fetch_ranking_table(&[]), DispatchOutcome::Skipped);
        assert!(dispatcher.ensure_filter_registered(&[]).is_none());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_ranking_table_batches_keys() {
        let transport = MockTransport::connected();
        let dispatcher = RequestDispatcher::new(transport.clone());

        let outcome = dispatcher.fetch_ranking_table(&[key("a"), key("b")]);
        assert_eq!(outcome, DispatchOutcome::Sent);

        let body = transport.sent()[0].body.clone().unwrap();
        assert_eq!(body["public_keys"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_pending_queue_after_registration() {
        let transport = MockTransport::connected();
        let dispatcher = RequestDispatcher::new(transport.clone());

        let registration = dispatcher.ensure_filter_registered(&[key("a")]).unwrap();
        assert_eq!(registration.generation(), 1);
        assert_eq!(registration.keys(), &[key("a")]);
        assert_eq!(dispatcher.fetch_pending_queue(&registration), DispatchOutcome::Sent);

        assert_eq!(
            transport.sent_kinds(),
            vec![kinds::FILTER_ADD, kinds::GET_FILTER_INTERACTION_QUEUE]
        );
        let body = transport.sent()[0].body.clone().unwrap();
        assert_eq!(body["public_keys"][0], key("a").as_str());
    }

    #[test]
    fn test_stale_registration_reregisters() {
        let transport = MockTransport::connected();
        let dispatcher = RequestDispatcher::new(transport.clone());

        let registration = dispatcher.ensure_filter_registered(&[key("a")]).unwrap();
        transport.reconnect();

        assert_eq!(dispatcher.fetch_pending_queue(&registration), DispatchOutcome::Sent);
        assert_eq!(
            transport.sent_kinds(),
            vec![
                kinds::FILTER_ADD,
                kinds::FILTER_ADD,
                kinds::GET_FILTER_INTERACTION_QUEUE
            ]
        );
    }

    #[test]
    fn test_pending_queue_not_ready() {
        let transport = MockTransport::connected();
        let dispatcher = RequestDispatcher::new(transport.clone());
        let registration = dispatcher.ensure_filter_registered(&[key("a")]).unwrap();

        transport.set_ready(false);
        assert_eq!(
            dispatcher.fetch_pending_queue(&registration),
            DispatchOutcome::NotReady
        );
        assert_eq!(transport.sent_kinds(), vec![kinds::FILTER_ADD]);
    }
}
