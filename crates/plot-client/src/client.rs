//! # Plot Client Facade
//!
//! [`PlotClient`] wires the dispatcher, router, cache, bus, key ring and
//! graph focus together and owns the single connection-event loop.
//!
//! ```text
//! ConnectionManager ──ConnectionEvent──→ PlotClient::run
//!                                          ├─ Connected    → stale marks, readiness, tip + focus re-fetch
//!                                          ├─ Disconnected → readiness
//!                                          └─ Message      → InboundRouter
//! ```

use parking_lot::{Mutex, RwLock};
use plot_bus::{CorrelationBus, Signal, SignalFilter, SignalPublisher, Subscription};
use plot_telemetry::{metric_inc, SIGNALS_PUBLISHED};
use plot_types::PublicKey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::adapters::{DotParser, MemoryStorage};
use crate::config::ClientConfig;
use crate::dispatcher::{DispatchOutcome, RequestDispatcher};
use crate::domain::{
    CacheReader, ClientError, EntityCache, FocusState, GraphFocus, GraphOptions,
    InteractiveGraphView, KeyRing,
};
use crate::ports::{CacheStorage, ConnectionEvent, ExchangeSigner, GraphParser, Transport};
use crate::router::InboundRouter;

/// Longest memo accepted for submission, in characters.
pub const MAX_MEMO_CHARS: usize = 200;

/// Why a submission was refused before reaching the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitRejection {
    EmptyTarget,
    EmptyMemo,
    MemoTooLong { len: usize },
    /// The tip header has not arrived or reports height 0.
    UnknownHeight,
    NoKeys,
    UnknownKeyIndex { index: usize },
    NoSigner,
    /// The signer declined, e.g. a wrong passphrase.
    NotSigned,
}

/// Result of [`PlotClient::submit_exchange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Sent; the node answers with `ExchangeSubmitted`.
    Sent,
    NotReady,
    Rejected(SubmitRejection),
}

/// The focal graph together with the focus state it was built under.
///
/// `view` is whatever is cached; check `state` before presenting it as
/// current.
#[derive(Debug, Clone)]
pub struct FocusedGraph {
    pub key: Option<PublicKey>,
    pub state: FocusState,
    pub view: Option<InteractiveGraphView>,
}

impl FocusedGraph {
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.state == FocusState::Loaded && self.view.is_some()
    }
}

/// Builder for [`PlotClient`].
pub struct PlotClientBuilder {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    signer: Option<Arc<dyn ExchangeSigner>>,
    parser: Arc<dyn GraphParser>,
    storage: Arc<dyn CacheStorage>,
}

impl PlotClientBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: ClientConfig::default(),
            signer: None,
            parser: Arc::new(DotParser::new()),
            storage: Arc::new(MemoryStorage::new()),
        }
    }

    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn signer(mut self, signer: Arc<dyn ExchangeSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    #[must_use]
    pub fn parser(mut self, parser: Arc<dyn GraphParser>) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = storage;
        self
    }

    /// Validate the config and restore the cache from storage.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for an invalid config and
    /// [`ClientError::Storage`] if a saved snapshot cannot be read.
    pub fn build(self) -> Result<PlotClient, ClientError> {
        self.config.validate()?;

        let cache = match self.storage.load()? {
            Some(snapshot) => {
                info!(
                    balances = snapshot.balances.len(),
                    graphs = snapshot.graphs.len(),
                    "Restored cache snapshot"
                );
                EntityCache::from_snapshot(snapshot)
            }
            None => EntityCache::new(),
        };

        let bus = Arc::new(CorrelationBus::with_capacity(self.config.bus_capacity));
        let dispatcher = RequestDispatcher::new(self.transport);
        let focus = Arc::new(Mutex::new(GraphFocus::new()));
        let router = InboundRouter::new(
            cache.clone(),
            bus.clone(),
            dispatcher.clone(),
            focus.clone(),
        );

        Ok(PlotClient {
            config: self.config,
            cache,
            bus,
            dispatcher,
            router,
            keyring: RwLock::new(KeyRing::default()),
            focus,
            signer: self.signer,
            parser: self.parser,
            storage: self.storage,
            connections: AtomicU64::new(0),
        })
    }
}

/// Client for one plotthread node.
pub struct PlotClient {
    config: ClientConfig,
    cache: EntityCache,
    bus: Arc<CorrelationBus>,
    dispatcher: RequestDispatcher,
    router: InboundRouter,
    keyring: RwLock<KeyRing>,
    focus: Arc<Mutex<GraphFocus>>,
    signer: Option<Arc<dyn ExchangeSigner>>,
    parser: Arc<dyn GraphParser>,
    storage: Arc<dyn CacheStorage>,
    connections: AtomicU64,
}

impl PlotClient {
    pub fn builder(transport: Arc<dyn Transport>) -> PlotClientBuilder {
        PlotClientBuilder::new(transport)
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> CacheReader {
        self.cache.reader()
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<CorrelationBus> {
        &self.bus
    }

    #[must_use]
    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    /// Subscribe before issuing the request the signal answers.
    pub fn subscribe(&self, filter: SignalFilter) -> Subscription {
        self.bus.subscribe(filter)
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    /// Apply one connection event.
    pub fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected { generation } => self.on_connected(generation),
            ConnectionEvent::Disconnected => {
                info!("Node connection lost");
                self.publish(Signal::ReadinessChanged { ready: false });
            }
            ConnectionEvent::Message(text) => self.router.route_text(&text),
        }
    }

    /// Drain connection events until the sender side closes.
    pub async fn run(&self, mut events: mpsc::Receiver<ConnectionEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        debug!("Connection event channel closed");
    }

    fn on_connected(&self, generation: u64) {
        let previous = self.connections.fetch_add(1, Ordering::SeqCst);
        info!(generation, reconnect = previous > 0, "Node connection ready");

        if previous > 0 {
            self.cache.mark_all_stale();
            self.focus.lock().invalidate();
        }

        self.publish(Signal::ReadinessChanged { ready: true });
        self.dispatcher.fetch_tip_header();

        if self.cache.reader().genesis_block().is_none() {
            self.dispatcher.fetch_block_by_height(0);
        }

        let selected = self.keyring.read().selected().cloned();
        if let Some(key) = selected {
            self.dispatcher.fetch_balance(&key);
            self.dispatcher.fetch_ranking(&key);
        }

        let focal = self.focus.lock().begin_refresh();
        if let Some(key) = focal {
            self.dispatcher.fetch_graph(&key);
        }
    }

    fn publish(&self, signal: Signal) {
        metric_inc!(SIGNALS_PUBLISHED);
        self.bus.publish(signal);
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Sign and submit an exchange from the key at `key_index`.
    pub async fn submit_exchange(
        &self,
        target: &PublicKey,
        memo: &str,
        key_index: usize,
        passphrase: &str,
    ) -> SubmitOutcome {
        match self.check_submission(target, memo, key_index) {
            Err(rejection) => {
                debug!(?rejection, "Exchange not submitted");
                SubmitOutcome::Rejected(rejection)
            }
            Ok((signer, height)) => {
                let Some(exchange) = signer
                    .sign(target, memo, height, key_index, passphrase)
                    .await
                else {
                    warn!(key_index, "Signer declined the exchange");
                    return SubmitOutcome::Rejected(SubmitRejection::NotSigned);
                };

                match self.dispatcher.submit_exchange(exchange) {
                    DispatchOutcome::Sent => SubmitOutcome::Sent,
                    DispatchOutcome::NotReady | DispatchOutcome::Skipped => {
                        SubmitOutcome::NotReady
                    }
                }
            }
        }
    }

    fn check_submission(
        &self,
        target: &PublicKey,
        memo: &str,
        key_index: usize,
    ) -> Result<(Arc<dyn ExchangeSigner>, u64), SubmitRejection> {
        if target.as_str().is_empty() {
            return Err(SubmitRejection::EmptyTarget);
        }
        if memo.is_empty() {
            return Err(SubmitRejection::EmptyMemo);
        }
        let len = memo.chars().count();
        if len > MAX_MEMO_CHARS {
            return Err(SubmitRejection::MemoTooLong { len });
        }

        let height = self
            .cache
            .reader()
            .tip_height()
            .filter(|h| *h > 0)
            .ok_or(SubmitRejection::UnknownHeight)?;

        {
            let keyring = self.keyring.read();
            if keyring.is_empty() {
                return Err(SubmitRejection::NoKeys);
            }
            if key_index >= keyring.public_keys().len() {
                return Err(SubmitRejection::UnknownKeyIndex { index: key_index });
            }
        }

        let signer = self.signer.clone().ok_or(SubmitRejection::NoSigner)?;
        Ok((signer, height))
    }

    /// Most recent exchanges for `key`, newest first.
    pub fn fetch_recent_history(&self, key: &PublicKey) -> DispatchOutcome {
        let Some(tip) = self.cache.reader().tip_height() else {
            debug!(key = %key.short_form(), "Tip unknown, history request skipped");
            return DispatchOutcome::Skipped;
        };
        self.dispatcher
            .fetch_exchange_history(key, tip.saturating_add(1), 0, self.config.history_limit)
    }

    /// Register `key` in the pending filter and fetch the queue.
    pub fn request_pending_for(&self, key: &PublicKey) -> DispatchOutcome {
        match self
            .dispatcher
            .ensure_filter_registered(std::slice::from_ref(key))
        {
            Some(registration) => self.dispatcher.fetch_pending_queue(&registration),
            None => DispatchOutcome::NotReady,
        }
    }

    /// Re-request balance, ranking and graph for `key`.
    pub fn refresh_key(&self, key: &PublicKey) -> DispatchOutcome {
        let outcomes = [
            self.dispatcher.fetch_balance(key),
            self.dispatcher.fetch_ranking(key),
            self.dispatcher.fetch_graph(key),
        ];
        if outcomes.iter().all(|o| o.is_sent()) {
            DispatchOutcome::Sent
        } else {
            DispatchOutcome::NotReady
        }
    }

    /// Save the cache through the configured storage.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] if the snapshot cannot be written.
    pub fn persist(&self) -> Result<(), ClientError> {
        let snapshot = self.cache.snapshot();
        self.storage.save(&snapshot)?;
        debug!(
            balances = snapshot.balances.len(),
            histories = snapshot.histories.len(),
            "Cache snapshot saved"
        );
        Ok(())
    }

    // =========================================================================
    // Keys and graph focus
    // =========================================================================

    pub fn set_public_keys(&self, keys: Vec<PublicKey>) {
        self.keyring.write().set_public_keys(keys);
    }

    pub fn select_key(&self, key: &PublicKey) -> bool {
        self.keyring.write().select(key)
    }

    #[must_use]
    pub fn keyring(&self) -> KeyRing {
        self.keyring.read().clone()
    }

    /// Make `key` the focal key, requesting its graph when needed.
    pub fn focus_graph(&self, key: PublicKey) -> DispatchOutcome {
        let needs_fetch = self.focus.lock().focus(key.clone());
        if !needs_fetch {
            return DispatchOutcome::Skipped;
        }
        self.dispatcher.fetch_graph(&key)
    }

    /// Override the guaranteed label without moving the focus.
    pub fn peek_graph(&self, key: Option<PublicKey>) {
        self.focus.lock().peek(key);
    }

    #[must_use]
    pub fn focus_state(&self) -> FocusState {
        self.focus.lock().state()
    }

    /// Build the focal graph filtered at `threshold`.
    ///
    /// A stale focus re-requests the graph; the cached view is still
    /// returned, tagged with the state.
    pub fn graph_view(&self, threshold: f64) -> FocusedGraph {
        let (key, label, state) = {
            let mut focus = self.focus.lock();
            if focus.state() == FocusState::Stale {
                if let Some(key) = focus.begin_refresh() {
                    self.dispatcher.fetch_graph(&key);
                }
            }
            (
                focus.active_key().cloned(),
                focus.guaranteed_label().map(str::to_owned),
                focus.state(),
            )
        };

        let reader = self.cache.reader();
        let text = key
            .as_ref()
            .and_then(|k| reader.graph(k))
            .and_then(|cached| cached.value.graph);

        let view = text.and_then(|text| match self.parser.parse(&text) {
            Ok(raw) => {
                let mut options = GraphOptions::new(threshold).with_reference(reader.tip_height());
                if let Some(label) = &label {
                    options = options.including(label.clone());
                }
                Some(InteractiveGraphView::build(raw, &options))
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse relationship graph");
                None
            }
        });

        FocusedGraph { key, state, view }
    }
}
