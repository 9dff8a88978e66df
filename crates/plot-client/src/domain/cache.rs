//! # Entity Cache
//!
//! Single source of truth for everything the node has told us.
//!
//! ## Shape
//!
//! | Entry | Keyed by | Write rule |
//! |-------|----------|------------|
//! | balances, rankings, graphs, histories | embedded wire `PublicKey` | upsert, last write wins |
//! | tip header, current block | - | replace |
//! | genesis block | - | set once per cache lifetime |
//! | ranking table, pending queue | - | replace, no merge |
//!
//! An entry is absent until its first response arrives. Every entry carries
//! a `stale` flag: [`EntityCache::mark_all_stale`] sets it on reconnect and
//! the next upsert of that entry clears it.
//!
//! Writes are `pub(crate)` so only the inbound router mutates the cache.
//! Everyone else reads through a [`CacheReader`].

use parking_lot::RwLock;
use plot_types::{
    Balance, Exchange, LedgerBlock, PublicKey, Ranking, RankingTable, RelationshipGraph, TipHeader,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// A cached value and whether it predates the current connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub stale: bool,
}

impl<T> Cached<T> {
    fn fresh(value: T) -> Self {
        Self {
            value,
            stale: false,
        }
    }

    fn restored(value: T) -> Self {
        Self { value, stale: true }
    }

    /// True when the value was received on the current connection.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        !self.stale
    }
}

#[derive(Debug, Default)]
struct CacheState {
    tip_header: Option<Cached<TipHeader>>,
    current_block: Option<Cached<LedgerBlock>>,
    genesis_block: Option<Cached<LedgerBlock>>,
    ranking_table: Option<Cached<RankingTable>>,
    pending_queue: Option<Cached<Vec<Exchange>>>,
    balances: HashMap<PublicKey, Cached<Balance>>,
    rankings: HashMap<PublicKey, Cached<Ranking>>,
    graphs: HashMap<PublicKey, Cached<RelationshipGraph>>,
    histories: HashMap<PublicKey, Cached<Vec<Exchange>>>,
}

/// Entry counts, for logs and the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub balances: usize,
    pub rankings: usize,
    pub graphs: usize,
    pub histories: usize,
    pub has_genesis: bool,
}

/// Persistable part of the cache.
///
/// Tip header, ranking table and pending queue are not persisted: they are
/// re-requested on every connection anyway.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CacheSnapshot {
    #[serde(default)]
    pub genesis_block: Option<LedgerBlock>,
    #[serde(default)]
    pub current_block: Option<LedgerBlock>,
    #[serde(default)]
    pub balances: Vec<Balance>,
    #[serde(default)]
    pub rankings: Vec<Ranking>,
    #[serde(default)]
    pub graphs: Vec<RelationshipGraph>,
    #[serde(default)]
    pub histories: BTreeMap<PublicKey, Vec<Exchange>>,
}

/// The client's entity cache.
#[derive(Debug, Clone, Default)]
pub struct EntityCache {
    state: Arc<RwLock<CacheState>>,
}

impl EntityCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache pre-filled from a snapshot. Every restored entry
    /// starts stale; genesis is immutable and restored as fresh.
    #[must_use]
    pub fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        let state = CacheState {
            genesis_block: snapshot.genesis_block.map(Cached::fresh),
            current_block: snapshot.current_block.map(Cached::restored),
            balances: snapshot
                .balances
                .into_iter()
                .map(|b| (b.public_key.clone(), Cached::restored(b)))
                .collect(),
            rankings: snapshot
                .rankings
                .into_iter()
                .map(|r| (r.public_key.clone(), Cached::restored(r)))
                .collect(),
            graphs: snapshot
                .graphs
                .into_iter()
                .map(|g| (g.public_key.clone(), Cached::restored(g)))
                .collect(),
            histories: snapshot
                .histories
                .into_iter()
                .map(|(key, exchanges)| (key, Cached::restored(exchanges)))
                .collect(),
            ..CacheState::default()
        };

        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Read-only handle sharing this cache.
    #[must_use]
    pub fn reader(&self) -> CacheReader {
        CacheReader {
            state: Arc::clone(&self.state),
        }
    }

    /// Copy out the persistable entries, ordered by key.
    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        let state = self.state.read();

        let mut balances: Vec<Balance> =
            state.balances.values().map(|c| c.value.clone()).collect();
        balances.sort_by(|a, b| a.public_key.cmp(&b.public_key));

        let mut rankings: Vec<Ranking> =
            state.rankings.values().map(|c| c.value.clone()).collect();
        rankings.sort_by(|a, b| a.public_key.cmp(&b.public_key));

        let mut graphs: Vec<RelationshipGraph> =
            state.graphs.values().map(|c| c.value.clone()).collect();
        graphs.sort_by(|a, b| a.public_key.cmp(&b.public_key));

        CacheSnapshot {
            genesis_block: state.genesis_block.as_ref().map(|c| c.value.clone()),
            current_block: state.current_block.as_ref().map(|c| c.value.clone()),
            balances,
            rankings,
            graphs,
            histories: state
                .histories
                .iter()
                .map(|(key, c)| (key.clone(), c.value.clone()))
                .collect(),
        }
    }

    pub(crate) fn set_tip_header(&self, tip: TipHeader) {
        self.state.write().tip_header = Some(Cached::fresh(tip));
    }

    /// Store a fetched block as the current block and, for height 0, as
    /// genesis if none is set yet.
    ///
    /// # Returns
    ///
    /// True when this call set the genesis block.
    pub(crate) fn store_block(&self, block: LedgerBlock) -> bool {
        let mut state = self.state.write();
        let mut genesis_set = false;

        if block.is_genesis() && state.genesis_block.is_none() {
            state.genesis_block = Some(Cached::fresh(block.clone()));
            genesis_set = true;
        }
        state.current_block = Some(Cached::fresh(block));
        genesis_set
    }

    pub(crate) fn upsert_balance(&self, balance: Balance) {
        let key = balance.public_key.clone();
        self.state.write().balances.insert(key, Cached::fresh(balance));
    }

    pub(crate) fn upsert_ranking(&self, ranking: Ranking) {
        let key = ranking.public_key.clone();
        self.state.write().rankings.insert(key, Cached::fresh(ranking));
    }

    pub(crate) fn upsert_graph(&self, graph: RelationshipGraph) {
        let key = graph.public_key.clone();
        self.state.write().graphs.insert(key, Cached::fresh(graph));
    }

    pub(crate) fn upsert_history(&self, key: PublicKey, exchanges: Vec<Exchange>) {
        self.state
            .write()
            .histories
            .insert(key, Cached::fresh(exchanges));
    }

    pub(crate) fn replace_ranking_table(&self, table: RankingTable) {
        self.state.write().ranking_table = Some(Cached::fresh(table));
    }

    pub(crate) fn replace_pending_queue(&self, exchanges: Vec<Exchange>) {
        self.state.write().pending_queue = Some(Cached::fresh(exchanges));
    }

    /// Flag every entry as stale. Genesis never changes and is left alone.
    pub(crate) fn mark_all_stale(&self) {
        let mut state = self.state.write();
        let CacheState {
            tip_header,
            current_block,
            genesis_block: _,
            ranking_table,
            pending_queue,
            balances,
            rankings,
            graphs,
            histories,
        } = &mut *state;

        mark(tip_header);
        mark(current_block);
        mark(ranking_table);
        mark(pending_queue);
        balances.values_mut().for_each(|c| c.stale = true);
        rankings.values_mut().for_each(|c| c.stale = true);
        graphs.values_mut().for_each(|c| c.stale = true);
        histories.values_mut().for_each(|c| c.stale = true);

        debug!(
            balances = balances.len(),
            rankings = rankings.len(),
            graphs = graphs.len(),
            histories = histories.len(),
            "Cache marked stale"
        );
    }
}

fn mark<T>(entry: &mut Option<Cached<T>>) {
    if let Some(cached) = entry {
        cached.stale = true;
    }
}

/// Read-only, cloneable view of the cache.
///
/// Every accessor takes the read lock once and returns an owned copy, so a
/// value never changes under the caller.
#[derive(Debug, Clone)]
pub struct CacheReader {
    state: Arc<RwLock<CacheState>>,
}

impl CacheReader {
    #[must_use]
    pub fn tip_header(&self) -> Option<Cached<TipHeader>> {
        self.state.read().tip_header.clone()
    }

    /// Height of the cached tip, stale or not.
    #[must_use]
    pub fn tip_height(&self) -> Option<u64> {
        self.state
            .read()
            .tip_header
            .as_ref()
            .map(|c| c.value.height())
    }

    #[must_use]
    pub fn current_block(&self) -> Option<Cached<LedgerBlock>> {
        self.state.read().current_block.clone()
    }

    #[must_use]
    pub fn genesis_block(&self) -> Option<Cached<LedgerBlock>> {
        self.state.read().genesis_block.clone()
    }

    #[must_use]
    pub fn ranking_table(&self) -> Option<Cached<RankingTable>> {
        self.state.read().ranking_table.clone()
    }

    #[must_use]
    pub fn pending_queue(&self) -> Option<Cached<Vec<Exchange>>> {
        self.state.read().pending_queue.clone()
    }

    #[must_use]
    pub fn balance(&self, key: &PublicKey) -> Option<Cached<Balance>> {
        self.state.read().balances.get(key).cloned()
    }

    #[must_use]
    pub fn ranking(&self, key: &PublicKey) -> Option<Cached<Ranking>> {
        self.state.read().rankings.get(key).cloned()
    }

    #[must_use]
    pub fn graph(&self, key: &PublicKey) -> Option<Cached<RelationshipGraph>> {
        self.state.read().graphs.get(key).cloned()
    }

    #[must_use]
    pub fn history(&self, key: &PublicKey) -> Option<Cached<Vec<Exchange>>> {
        self.state.read().histories.get(key).cloned()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.state.read();
        CacheStats {
            balances: state.balances.len(),
            rankings: state.rankings.len(),
            graphs: state.graphs.len(),
            histories: state.histories.len(),
            has_genesis: state.genesis_block.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plot_types::LedgerHeader;

    fn key(tag: &str) -> PublicKey {
        PublicKey::from_query(tag).unwrap()
    }

    fn block(height: u64) -> LedgerBlock {
        LedgerBlock {
            header: LedgerHeader {
                height,
                ..LedgerHeader::default()
            },
            exchanges: Vec::new(),
        }
    }

    fn balance(tag: &str, value: i64) -> Balance {
        Balance {
            public_key: key(tag),
            value,
            plot_id: None,
            height: None,
            error: None,
        }
    }

    #[test]
    fn test_absent_until_first_upsert() {
        let cache = EntityCache::new();
        let reader = cache.reader();
        assert!(reader.balance(&key("a")).is_none());

        cache.upsert_balance(balance("a", 5));
        assert_eq!(reader.balance(&key("a")).unwrap().value.value, 5);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let cache = EntityCache::new();
        cache.upsert_balance(balance("a", 5));
        let once = cache.snapshot();
        cache.upsert_balance(balance("a", 5));
        assert_eq!(cache.snapshot(), once);
        assert_eq!(cache.reader().stats().balances, 1);
    }

    #[test]
    fn test_keys_do_not_collide() {
        let cache = EntityCache::new();
        cache.upsert_balance(balance("a", 1));
        cache.upsert_balance(balance("b", 2));

        let reader = cache.reader();
        assert_eq!(reader.balance(&key("a")).unwrap().value.value, 1);
        assert_eq!(reader.balance(&key("b")).unwrap().value.value, 2);
    }

    #[test]
    fn test_genesis_set_once() {
        let cache = EntityCache::new();
        let mut first = block(0);
        first.header.nonce = 1;
        let mut second = block(0);
        second.header.nonce = 2;

        assert!(cache.store_block(first.clone()));
        assert!(!cache.store_block(second.clone()));

        let reader = cache.reader();
        assert_eq!(reader.genesis_block().unwrap().value, first);
        assert_eq!(reader.current_block().unwrap().value, second);
    }

    #[test]
    fn test_non_genesis_block_only_replaces_current() {
        let cache = EntityCache::new();
        assert!(!cache.store_block(block(7)));
        assert!(cache.reader().genesis_block().is_none());
        assert_eq!(cache.reader().current_block().unwrap().value.header.height, 7);
    }

    #[test]
    fn test_mark_all_stale_then_upsert_clears() {
        let cache = EntityCache::new();
        cache.upsert_balance(balance("a", 1));
        cache.upsert_balance(balance("b", 2));
        cache.store_block(block(0));

        cache.mark_all_stale();
        let reader = cache.reader();
        assert!(reader.balance(&key("a")).unwrap().stale);
        assert!(reader.current_block().unwrap().stale);
        assert!(reader.genesis_block().unwrap().is_fresh());

        cache.upsert_balance(balance("a", 3));
        assert!(reader.balance(&key("a")).unwrap().is_fresh());
        assert!(reader.balance(&key("b")).unwrap().stale);
    }

    #[test]
    fn test_pending_queue_replaced_wholesale() {
        let cache = EntityCache::new();
        let exchange = Exchange {
            from: key("a"),
            to: key("b"),
            memo: "one".to_string(),
            time: 1,
            nonce: None,
            series: None,
            signature: None,
        };

        cache.replace_pending_queue(vec![exchange.clone(), exchange]);
        cache.replace_pending_queue(Vec::new());
        assert!(cache.reader().pending_queue().unwrap().value.is_empty());
    }

    #[test]
    fn test_snapshot_restore_starts_stale() {
        let cache = EntityCache::new();
        cache.upsert_balance(balance("a", 9));
        cache.store_block(block(0));
        cache.upsert_history(key("a"), Vec::new());

        let restored = EntityCache::from_snapshot(cache.snapshot());
        let reader = restored.reader();

        assert!(reader.balance(&key("a")).unwrap().stale);
        assert!(reader.history(&key("a")).unwrap().stale);
        assert!(reader.genesis_block().is_some());
        assert!(reader.tip_header().is_none());

        // Restored genesis still blocks a second one
        assert!(!restored.store_block(block(0)));
    }

    #[test]
    fn test_reader_sees_later_writes() {
        let cache = EntityCache::new();
        let reader = cache.reader();
        cache.replace_ranking_table(RankingTable::default());
        assert!(reader.ranking_table().is_some());
    }
}
