//! # Inbound Router
//!
//! Demultiplexes decoded inbound envelopes into cache writes, correlation
//! signals and follow-up requests.
//!
//! | type | effect |
//! |------|--------|
//! | `tip_header` | replace tip header |
//! | `imbalance` | upsert balance by embedded key, `BalanceLoaded` |
//! | `rank` | upsert ranking by embedded key, `RankingLoaded` |
//! | `ranking_table` | replace ranking table |
//! | `graph` | upsert graph by embedded key, `GraphLoaded`, focus `Loaded` |
//! | `plot` | genesis once for height 0, always replace current block |
//! | `push_interaction_result` | `ExchangeSubmitted`, no cache write |
//! | `public_key_interactions` | flatten, upsert history, `HistoryLoaded` |
//! | `filter_interaction_queue` | replace pending queue |
//! | `inv_plot` | `BlocksInvalidated`, focus stale, re-fetch tip and focal key |
//!
//! Unknown types are ignored. A known type whose body fails to decode is
//! logged and dropped without touching the cache.

use parking_lot::Mutex;
use plot_bus::{Signal, SignalPublisher};
use plot_telemetry::{metric_inc, ENVELOPES_RECEIVED, MALFORMED_ENVELOPES, SIGNALS_PUBLISHED};
use plot_types::{Envelope, EnvelopeError, Inbound, RankingTable};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dispatcher::RequestDispatcher;
use crate::domain::{EntityCache, GraphFocus};

/// Label used for inbound types the client does not know.
const UNRECOGNIZED_LABEL: &str = "unrecognized";

/// The only writer of the entity cache.
pub struct InboundRouter {
    cache: EntityCache,
    publisher: Arc<dyn SignalPublisher>,
    dispatcher: RequestDispatcher,
    focus: Arc<Mutex<GraphFocus>>,
}

impl InboundRouter {
    pub fn new(
        cache: EntityCache,
        publisher: Arc<dyn SignalPublisher>,
        dispatcher: RequestDispatcher,
        focus: Arc<Mutex<GraphFocus>>,
    ) -> Self {
        Self {
            cache,
            publisher,
            dispatcher,
            focus,
        }
    }

    /// Route one text frame.
    pub fn route_text(&self, text: &str) {
        match Envelope::from_json(text) {
            Ok(envelope) => self.route(envelope),
            Err(e) => warn!(error = %e, "Dropping frame that is not an envelope"),
        }
    }

    /// Route one envelope.
    pub fn route(&self, envelope: Envelope) {
        let kind = envelope.kind.clone();

        match Inbound::decode(envelope) {
            Ok(Inbound::Unrecognized(kind)) => {
                metric_inc!(ENVELOPES_RECEIVED, &[UNRECOGNIZED_LABEL]);
                debug!(kind = %kind, "Ignoring unrecognized envelope type");
            }
            Ok(inbound) => {
                metric_inc!(ENVELOPES_RECEIVED, &[inbound.kind()]);
                self.apply(inbound);
            }
            Err(EnvelopeError::MalformedBody { kind, reason }) => {
                metric_inc!(MALFORMED_ENVELOPES, &[kind.as_str()]);
                warn!(kind = %kind, reason = %reason, "Dropping malformed envelope body");
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Dropping undecodable envelope");
            }
        }
    }

    fn apply(&self, inbound: Inbound) {
        match inbound {
            Inbound::TipHeader(tip) => {
                debug!(height = tip.height(), plot_id = %tip.plot_id, "Tip header updated");
                self.cache.set_tip_header(tip);
            }

            Inbound::Balance(balance) => {
                let public_key = balance.public_key.clone();
                let error = balance.error.clone();
                self.cache.upsert_balance(balance);
                self.publish(Signal::BalanceLoaded { public_key, error });
            }

            Inbound::Ranking(ranking) => {
                let public_key = ranking.public_key.clone();
                let error = ranking.error.clone();
                self.cache.upsert_ranking(ranking);
                self.publish(Signal::RankingLoaded { public_key, error });
            }

            Inbound::RankingTable(payload) => {
                let table = RankingTable::from_payload(payload);
                debug!(rows = table.rows.len(), height = ?table.height, "Ranking table replaced");
                self.cache.replace_ranking_table(table);
            }

            Inbound::Graph(graph) => {
                let public_key = graph.public_key.clone();
                self.cache.upsert_graph(graph);
                if self.focus.lock().graph_loaded(&public_key) {
                    debug!(key = %public_key.short_form(), "Focal graph loaded");
                }
                self.publish(Signal::GraphLoaded { public_key });
            }

            Inbound::Block(payload) => {
                let height = payload.plot.header.height;
                if self.cache.store_block(payload.plot) {
                    info!("Genesis block cached");
                }
                debug!(height, plot_id = ?payload.plot_id, "Current block replaced");
            }

            Inbound::SubmitResult(result) => {
                match &result.error {
                    Some(error) => {
                        warn!(exchange_id = %result.exchange_id, %error, "Exchange rejected")
                    }
                    None => info!(exchange_id = %result.exchange_id, "Exchange accepted"),
                }
                self.publish(Signal::ExchangeSubmitted {
                    exchange_id: result.exchange_id,
                    error: result.error,
                });
            }

            Inbound::ExchangeHistory(payload) => {
                let public_key = payload.public_key.clone();
                let exchanges = payload.into_exchanges();
                let count = exchanges.len();
                self.cache.upsert_history(public_key.clone(), exchanges);
                self.publish(Signal::HistoryLoaded { public_key, count });
            }

            Inbound::PendingQueue(payload) => {
                debug!(count = payload.exchanges.len(), "Pending queue replaced");
                self.cache.replace_pending_queue(payload.exchanges);
            }

            Inbound::BlocksInvalidated(payload) => {
                info!(blocks = payload.block_ids.len(), "Blocks invalidated");
                self.publish(Signal::BlocksInvalidated {
                    block_ids: payload.block_ids,
                });
                self.refresh_after_invalidation();
            }

            Inbound::Unrecognized(_) => {}
        }
    }

    fn refresh_after_invalidation(&self) {
        let focal = {
            let mut focus = self.focus.lock();
            focus.invalidate();
            focus.begin_refresh()
        };

        self.dispatcher.fetch_tip_header();

        if let Some(key) = focal {
            self.dispatcher.fetch_balance(&key);
            self.dispatcher.fetch_ranking(&key);
            self.dispatcher.fetch_graph(&key);
        }
    }

    fn publish(&self, signal: Signal) {
        metric_inc!(SIGNALS_PUBLISHED);
        self.publisher.publish(signal);
    }
}
