//! # Ledger Entities
//!
//! Payloads carried inside wire envelopes, in canonical client naming.
//!
//! ## Clusters
//!
//! - **Chain**: `LedgerHeader`, `TipHeader`, `LedgerBlock`, `Exchange`
//! - **Standing**: `Balance`, `Ranking`, `RankingTable`
//! - **Relationships**: `RelationshipGraph`
//! - **Inbound-only bodies**: history, pending queue, submit result and
//!   invalidation payloads

use serde::{Deserialize, Serialize};

use crate::keys::PublicKey;

/// Identifier of a block, as reported by the node.
pub type PlotId = String;

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// Header of a ledger block. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LedgerHeader {
    /// Id of the parent block.
    pub previous: PlotId,
    /// Root of the exchange hash list.
    pub hash_list_root: String,
    /// Unix timestamp in seconds.
    pub time: u64,
    /// Difficulty target.
    pub target: String,
    /// Cumulative work of the thread up to this block.
    pub thread_work: String,
    /// Proof-of-work nonce.
    pub nonce: u64,
    /// Height in the chain; genesis is 0.
    pub height: u64,
    /// Number of exchanges in the block.
    #[serde(alias = "interaction_count", alias = "representation_count")]
    pub exchange_count: u64,
}

/// Tip header paired with the id of the block it heads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipHeader {
    pub plot_id: PlotId,
    pub header: LedgerHeader,
}

impl TipHeader {
    /// Height of the tip.
    #[must_use]
    pub fn height(&self) -> u64 {
        self.header.height
    }
}

/// A signed, directed memo-bearing transfer between two keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub from: PublicKey,
    pub to: PublicKey,
    pub memo: String,
    /// Unix timestamp in seconds.
    pub time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// A block with its exchanges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LedgerBlock {
    pub header: LedgerHeader,
    #[serde(default, alias = "interactions", alias = "representations")]
    pub exchanges: Vec<Exchange>,
}

impl LedgerBlock {
    /// True for the block at height 0.
    #[must_use]
    pub fn is_genesis(&self) -> bool {
        self.header.height == 0
    }
}

// =============================================================================
// CLUSTER B: STANDING
// =============================================================================

/// Net standing of a key. One entry per key, last write wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub public_key: PublicKey,
    #[serde(default, alias = "imbalance")]
    pub value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_id: Option<PlotId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    /// Node-reported error, e.g. for an unknown key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Relative influence of a key, a score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub public_key: PublicKey,
    #[serde(default, alias = "ranking", alias = "rank")]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_id: Option<PlotId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One row of a ranking table as sent by the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRow {
    pub public_key: PublicKey,
    #[serde(default, alias = "ranking", alias = "rank")]
    pub score: f64,
}

/// Leaderboard snapshot. Replaced wholesale on every fetch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RankingTable {
    pub plot_id: Option<PlotId>,
    pub height: Option<u64>,
    /// Rows tagged with the batch `plot_id` and `height`. Order is not
    /// meaningful.
    pub rows: Vec<Ranking>,
}

impl RankingTable {
    /// Build a table from a wire batch, tagging each row with the batch
    /// block id and height.
    #[must_use]
    pub fn from_payload(payload: RankingTablePayload) -> Self {
        let rows = payload
            .rankings
            .into_iter()
            .map(|row| Ranking {
                public_key: row.public_key,
                score: row.score,
                plot_id: payload.plot_id.clone(),
                height: payload.height,
                error: None,
            })
            .collect();

        Self {
            plot_id: payload.plot_id,
            height: payload.height,
            rows,
        }
    }

    /// Rows ordered by descending score.
    #[must_use]
    pub fn sorted_desc(&self) -> Vec<&Ranking> {
        let mut rows: Vec<&Ranking> = self.rows.iter().collect();
        rows.sort_by(|a, b| b.score.total_cmp(&a.score));
        rows
    }

    /// Score of a key in this snapshot.
    #[must_use]
    pub fn score_for(&self, key: &PublicKey) -> Option<f64> {
        self.rows
            .iter()
            .find(|row| &row.public_key == key)
            .map(|row| row.score)
    }
}

// =============================================================================
// CLUSTER C: RELATIONSHIPS
// =============================================================================

/// Raw relationship graph text for a focal key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipGraph {
    pub public_key: PublicKey,
    /// DOT text. Absent when the node has nothing for the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_id: Option<PlotId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
}

// =============================================================================
// CLUSTER D: INBOUND-ONLY BODIES
// =============================================================================

/// Body of a `plot` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPayload {
    #[serde(default)]
    pub plot_id: Option<PlotId>,
    #[serde(alias = "block")]
    pub plot: LedgerBlock,
}

/// Body of a `ranking_table` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingTablePayload {
    #[serde(default)]
    pub plot_id: Option<PlotId>,
    #[serde(default)]
    pub height: Option<u64>,
    #[serde(default, alias = "rows")]
    pub rankings: Vec<RankingRow>,
}

/// Exchanges of one block that matched a history query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredBlock {
    #[serde(default)]
    pub plot_id: Option<PlotId>,
    #[serde(default, alias = "interactions", alias = "representations")]
    pub exchanges: Vec<Exchange>,
}

/// Body of a `public_key_interactions` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeHistoryPayload {
    pub public_key: PublicKey,
    #[serde(default, alias = "filter_plots")]
    pub filtered_blocks: Vec<FilteredBlock>,
}

impl ExchangeHistoryPayload {
    /// Flatten the per-block grouping into one sequence, keeping block
    /// order and the order inside each block.
    #[must_use]
    pub fn into_exchanges(self) -> Vec<Exchange> {
        self.filtered_blocks
            .into_iter()
            .flat_map(|block| block.exchanges)
            .collect()
    }
}

/// Body of a `filter_interaction_queue` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PendingQueuePayload {
    #[serde(default, alias = "interactions", alias = "representations")]
    pub exchanges: Vec<Exchange>,
}

/// Body of a `push_interaction_result` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResult {
    #[serde(default, alias = "interaction_id", alias = "representation_id")]
    pub exchange_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of an `inv_plot` (chain reorganisation) message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InvalidationPayload {
    #[serde(default, alias = "plot_ids")]
    pub block_ids: Vec<PlotId>,
}
