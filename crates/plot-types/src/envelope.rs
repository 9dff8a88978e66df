//! # Wire Envelope
//!
//! Every frame on the connection is a JSON object `{"type": ..., "body": ...}`.
//! The protocol carries no request identifiers: responses are matched to
//! requests by `type` and by the keys embedded in the body.
//!
//! Outbound frames are built from [`Request`]; inbound frames are decoded in
//! two stages, the tag first and then the body for recognised tags, into
//! [`Inbound`]. Unknown tags are not an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::{
    Balance, BlockPayload, Exchange, ExchangeHistoryPayload, InvalidationPayload,
    PendingQueuePayload, PlotId, Ranking, RankingTablePayload, RelationshipGraph, SubmitResult,
    TipHeader,
};
use crate::errors::EnvelopeError;
use crate::keys::PublicKey;

/// Application sub-protocol token requested on connect.
pub const SUBPROTOCOL: &str = "plotthread.1";

/// Wire `type` values.
pub mod kinds {
    // Outbound
    pub const GET_PLOT: &str = "get_plot";
    pub const GET_PLOT_BY_HEIGHT: &str = "get_plot_by_height";
    pub const GET_TIP_HEADER: &str = "get_tip_header";
    pub const GET_IMBALANCE: &str = "get_imbalance";
    pub const GET_RANK: &str = "get_rank";
    pub const GET_RANKING_TABLE: &str = "get_ranking_table";
    pub const GET_GRAPH: &str = "get_graph";
    pub const GET_PUBLIC_KEY_INTERACTIONS: &str = "get_public_key_interactions";
    pub const PUSH_INTERACTION: &str = "push_interaction";
    pub const FILTER_ADD: &str = "filter_add";
    pub const GET_FILTER_INTERACTION_QUEUE: &str = "get_filter_interaction_queue";

    // Inbound
    pub const TIP_HEADER: &str = "tip_header";
    pub const IMBALANCE: &str = "imbalance";
    pub const RANK: &str = "rank";
    pub const RANKING_TABLE: &str = "ranking_table";
    pub const GRAPH: &str = "graph";
    pub const PLOT: &str = "plot";
    pub const PUSH_INTERACTION_RESULT: &str = "push_interaction_result";
    pub const PUBLIC_KEY_INTERACTIONS: &str = "public_key_interactions";
    pub const FILTER_INTERACTION_QUEUE: &str = "filter_interaction_queue";
    pub const INV_PLOT: &str = "inv_plot";
}

/// A raw wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Envelope {
    /// Build an envelope from a tag and optional body.
    #[must_use]
    pub fn new(kind: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            body,
        }
    }

    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Json`] if the frame is not an envelope.
    pub fn from_json(text: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(text).map_err(|e| EnvelopeError::Json(e.to_string()))
    }

    /// Serialise to a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Json`] if the body cannot be serialised.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(|e| EnvelopeError::Json(e.to_string()))
    }

    fn body_as<T: for<'de> Deserialize<'de>>(self) -> Result<T, EnvelopeError> {
        let body = self.body.unwrap_or(Value::Null);
        serde_json::from_value(body).map_err(|e| EnvelopeError::MalformedBody {
            kind: self.kind,
            reason: e.to_string(),
        })
    }
}

/// Typed outbound request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "body")]
pub enum Request {
    #[serde(rename = "get_plot")]
    BlockById { plot_id: PlotId },

    #[serde(rename = "get_plot_by_height")]
    BlockByHeight { height: u64 },

    #[serde(rename = "get_tip_header")]
    TipHeader,

    #[serde(rename = "get_imbalance")]
    Balance { public_key: PublicKey },

    #[serde(rename = "get_rank")]
    Ranking { public_key: PublicKey },

    #[serde(rename = "get_ranking_table")]
    RankingTable { public_keys: Vec<PublicKey> },

    #[serde(rename = "get_graph")]
    Graph { public_key: PublicKey },

    /// Heights use `0` as "unbounded"; the node defines the exact bounds.
    #[serde(rename = "get_public_key_interactions")]
    ExchangeHistory {
        public_key: PublicKey,
        start_height: u64,
        end_height: u64,
        limit: u32,
    },

    #[serde(rename = "push_interaction")]
    SubmitExchange {
        #[serde(rename = "interaction")]
        exchange: Exchange,
    },

    #[serde(rename = "filter_add")]
    FilterAdd { public_keys: Vec<PublicKey> },

    #[serde(rename = "get_filter_interaction_queue")]
    PendingQueue,
}

impl Request {
    /// The wire `type` of this request.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BlockById { .. } => kinds::GET_PLOT,
            Self::BlockByHeight { .. } => kinds::GET_PLOT_BY_HEIGHT,
            Self::TipHeader => kinds::GET_TIP_HEADER,
            Self::Balance { .. } => kinds::GET_IMBALANCE,
            Self::Ranking { .. } => kinds::GET_RANK,
            Self::RankingTable { .. } => kinds::GET_RANKING_TABLE,
            Self::Graph { .. } => kinds::GET_GRAPH,
            Self::ExchangeHistory { .. } => kinds::GET_PUBLIC_KEY_INTERACTIONS,
            Self::SubmitExchange { .. } => kinds::PUSH_INTERACTION,
            Self::FilterAdd { .. } => kinds::FILTER_ADD,
            Self::PendingQueue => kinds::GET_FILTER_INTERACTION_QUEUE,
        }
    }

    /// Convert into a wire envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Encode`] if serialisation fails.
    pub fn into_envelope(self) -> Result<Envelope, EnvelopeError> {
        let kind = self.kind();
        let encode_err = |e: serde_json::Error| EnvelopeError::Encode {
            kind,
            reason: e.to_string(),
        };
        let value = serde_json::to_value(&self).map_err(encode_err)?;
        serde_json::from_value(value).map_err(encode_err)
    }
}

/// Decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    TipHeader(TipHeader),
    Balance(Balance),
    Ranking(Ranking),
    RankingTable(RankingTablePayload),
    Graph(RelationshipGraph),
    Block(BlockPayload),
    SubmitResult(SubmitResult),
    ExchangeHistory(ExchangeHistoryPayload),
    PendingQueue(PendingQueuePayload),
    BlocksInvalidated(InvalidationPayload),
    /// A `type` this client does not know. Ignored by the router.
    Unrecognized(String),
}

impl Inbound {
    /// Decode an envelope by its tag.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::MalformedBody`] when a recognised tag carries
    /// a body that does not match its schema.
    pub fn decode(envelope: Envelope) -> Result<Self, EnvelopeError> {
        let inbound = match envelope.kind.as_str() {
            kinds::TIP_HEADER => Self::TipHeader(envelope.body_as()?),
            kinds::IMBALANCE => Self::Balance(envelope.body_as()?),
            kinds::RANK => Self::Ranking(envelope.body_as()?),
            kinds::RANKING_TABLE => Self::RankingTable(envelope.body_as()?),
            kinds::GRAPH => Self::Graph(envelope.body_as()?),
            kinds::PLOT => Self::Block(envelope.body_as()?),
            kinds::PUSH_INTERACTION_RESULT => Self::SubmitResult(envelope.body_as()?),
            kinds::PUBLIC_KEY_INTERACTIONS => Self::ExchangeHistory(envelope.body_as()?),
            kinds::FILTER_INTERACTION_QUEUE => Self::PendingQueue(envelope.body_as()?),
            kinds::INV_PLOT => Self::BlocksInvalidated(envelope.body_as()?),
            _ => Self::Unrecognized(envelope.kind),
        };
        Ok(inbound)
    }

    /// The wire `type` this message arrived with.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::TipHeader(_) => kinds::TIP_HEADER,
            Self::Balance(_) => kinds::IMBALANCE,
            Self::Ranking(_) => kinds::RANK,
            Self::RankingTable(_) => kinds::RANKING_TABLE,
            Self::Graph(_) => kinds::GRAPH,
            Self::Block(_) => kinds::PLOT,
            Self::SubmitResult(_) => kinds::PUSH_INTERACTION_RESULT,
            Self::ExchangeHistory(_) => kinds::PUBLIC_KEY_INTERACTIONS,
            Self::PendingQueue(_) => kinds::FILTER_INTERACTION_QUEUE,
            Self::BlocksInvalidated(_) => kinds::INV_PLOT,
            Self::Unrecognized(kind) => kind,
        }
    }
}
