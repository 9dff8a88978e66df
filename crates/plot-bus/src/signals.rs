//! # Correlation Signals
//!
//! Signals published by the inbound router, and the filters callers use to
//! pick out the ones that answer their own requests.

use plot_types::{PlotId, PublicKey};

/// Everything the router can announce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// A balance for `public_key` was stored.
    BalanceLoaded {
        public_key: PublicKey,
        /// Node-reported error carried by the response, if any.
        error: Option<String>,
    },

    /// A ranking for `public_key` was stored.
    RankingLoaded {
        public_key: PublicKey,
        error: Option<String>,
    },

    /// A relationship graph for `public_key` was stored.
    GraphLoaded { public_key: PublicKey },

    /// The exchange history for `public_key` was stored.
    HistoryLoaded {
        public_key: PublicKey,
        /// Number of exchanges after flattening.
        count: usize,
    },

    /// The node answered an exchange submission.
    ExchangeSubmitted {
        exchange_id: String,
        error: Option<String>,
    },

    /// The node reported a chain reorganisation.
    BlocksInvalidated { block_ids: Vec<PlotId> },

    /// The connection became ready or stopped being ready.
    ReadinessChanged { ready: bool },
}

impl Signal {
    /// The kind of this signal (for filtering).
    #[must_use]
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::BalanceLoaded { .. } => SignalKind::BalanceLoaded,
            Self::RankingLoaded { .. } => SignalKind::RankingLoaded,
            Self::GraphLoaded { .. } => SignalKind::GraphLoaded,
            Self::HistoryLoaded { .. } => SignalKind::HistoryLoaded,
            Self::ExchangeSubmitted { .. } => SignalKind::ExchangeSubmitted,
            Self::BlocksInvalidated { .. } => SignalKind::BlocksInvalidated,
            Self::ReadinessChanged { .. } => SignalKind::ReadinessChanged,
        }
    }

    /// The key a listener can use to recognise its own request.
    #[must_use]
    pub fn correlation_key(&self) -> Option<CorrelationKey> {
        match self {
            Self::BalanceLoaded { public_key, .. }
            | Self::RankingLoaded { public_key, .. }
            | Self::GraphLoaded { public_key }
            | Self::HistoryLoaded { public_key, .. } => {
                Some(CorrelationKey::PublicKey(public_key.clone()))
            }
            Self::ExchangeSubmitted { exchange_id, .. } => {
                Some(CorrelationKey::ExchangeId(exchange_id.clone()))
            }
            Self::BlocksInvalidated { .. } | Self::ReadinessChanged { .. } => None,
        }
    }
}

/// Signal kinds for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    BalanceLoaded,
    RankingLoaded,
    GraphLoaded,
    HistoryLoaded,
    ExchangeSubmitted,
    BlocksInvalidated,
    ReadinessChanged,
}

/// What a signal is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    PublicKey(PublicKey),
    ExchangeId(String),
}

impl From<PublicKey> for CorrelationKey {
    fn from(key: PublicKey) -> Self {
        Self::PublicKey(key)
    }
}

/// Filter for subscribing to specific signals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalFilter {
    /// Kinds to include. Empty means all kinds.
    pub kinds: Vec<SignalKind>,
    /// When set, only signals about this key pass.
    pub key: Option<CorrelationKey>,
}

impl SignalFilter {
    /// Accept every signal.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Accept the given kinds.
    #[must_use]
    pub fn kinds(kinds: Vec<SignalKind>) -> Self {
        Self { kinds, key: None }
    }

    /// Accept one kind about one key.
    #[must_use]
    pub fn for_key(kind: SignalKind, key: impl Into<CorrelationKey>) -> Self {
        Self {
            kinds: vec![kind],
            key: Some(key.into()),
        }
    }

    /// Restrict an existing filter to one key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<CorrelationKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Check if a signal matches this filter.
    #[must_use]
    pub fn matches(&self, signal: &Signal) -> bool {
        let kind_match = self.kinds.is_empty() || self.kinds.contains(&signal.kind());

        let key_match = match &self.key {
            None => true,
            Some(wanted) => signal.correlation_key().as_ref() == Some(wanted),
        };

        kind_match && key_match
    }

    /// Stable label used for subscription bookkeeping.
    pub(crate) fn topic_key(&self) -> String {
        format!("{:?}", self.kinds)
    }
}
