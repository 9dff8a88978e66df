//! # Graph Focus
//!
//! Tracks which key's relationship graph is on screen and whether the
//! cached graph for it is current.
//!
//! ```text
//! [Unloaded] ──focus──→ [Loading] ──graph arrives──→ [Loaded]
//!                           ↑                           │
//!                           └── refresh ── [Stale] ←── invalidate
//! ```
//!
//! A peeked key (e.g. a hovered node) overrides the guaranteed label without
//! changing the focal key.

use plot_types::PublicKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
    /// No focal key yet.
    Unloaded,
    /// A graph request for the focal key is outstanding.
    Loading,
    /// The cached graph for the focal key is current.
    Loaded,
    /// The chain moved on; the cached graph must not be shown as current.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphFocus {
    key: Option<PublicKey>,
    peek: Option<PublicKey>,
    state: FocusState,
}

impl Default for GraphFocus {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphFocus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            key: None,
            peek: None,
            state: FocusState::Unloaded,
        }
    }

    #[must_use]
    pub fn state(&self) -> FocusState {
        self.state
    }

    #[must_use]
    pub fn active_key(&self) -> Option<&PublicKey> {
        self.key.as_ref()
    }

    #[must_use]
    pub fn peeked_key(&self) -> Option<&PublicKey> {
        self.peek.as_ref()
    }

    /// Label the view must always keep: the peeked key, else the focal key.
    #[must_use]
    pub fn guaranteed_label(&self) -> Option<&str> {
        self.peek
            .as_ref()
            .or(self.key.as_ref())
            .map(PublicKey::as_str)
    }

    /// Focus on `key`.
    ///
    /// # Returns
    ///
    /// True when the caller must request the graph: the key changed, or
    /// nothing current is loaded for it.
    pub fn focus(&mut self, key: PublicKey) -> bool {
        let same_key = self.key.as_ref() == Some(&key);
        self.peek = None;

        if same_key && matches!(self.state, FocusState::Loading | FocusState::Loaded) {
            return false;
        }

        self.key = Some(key);
        self.state = FocusState::Loading;
        true
    }

    /// Set or clear the peeked key.
    pub fn peek(&mut self, key: Option<PublicKey>) {
        self.peek = key;
    }

    /// A graph for `key` was stored.
    ///
    /// # Returns
    ///
    /// True when it was the focal key's graph.
    pub fn graph_loaded(&mut self, key: &PublicKey) -> bool {
        if self.key.as_ref() != Some(key) {
            return false;
        }
        self.state = FocusState::Loaded;
        true
    }

    /// The chain advanced or the connection was re-established.
    pub fn invalidate(&mut self) {
        if matches!(self.state, FocusState::Loading | FocusState::Loaded) {
            self.state = FocusState::Stale;
        }
    }

    /// Move to `Loading` for a re-request of the focal key.
    ///
    /// # Returns
    ///
    /// The key to request, or `None` when nothing is focused.
    pub fn begin_refresh(&mut self) -> Option<PublicKey> {
        let key = self.key.clone()?;
        self.state = FocusState::Loading;
        Some(key)
    }

    /// Drop the focal and peeked keys.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(tag: &str) -> PublicKey {
        PublicKey::from_query(tag).unwrap()
    }

    #[test]
    fn test_full_cycle() {
        let mut focus = GraphFocus::new();
        assert_eq!(focus.state(), FocusState::Unloaded);

        assert!(focus.focus(key("a")));
        assert_eq!(focus.state(), FocusState::Loading);

        assert!(focus.graph_loaded(&key("a")));
        assert_eq!(focus.state(), FocusState::Loaded);

        focus.invalidate();
        assert_eq!(focus.state(), FocusState::Stale);

        assert_eq!(focus.begin_refresh(), Some(key("a")));
        assert_eq!(focus.state(), FocusState::Loading);
    }

    #[test]
    fn test_other_key_graph_does_not_load() {
        let mut focus = GraphFocus::new();
        focus.focus(key("a"));
        assert!(!focus.graph_loaded(&key("b")));
        assert_eq!(focus.state(), FocusState::Loading);
    }

    #[test]
    fn test_refocus_same_key_is_noop_while_current() {
        let mut focus = GraphFocus::new();
        focus.focus(key("a"));
        focus.graph_loaded(&key("a"));
        assert!(!focus.focus(key("a")));
        assert_eq!(focus.state(), FocusState::Loaded);

        focus.invalidate();
        assert!(focus.focus(key("a")));
    }

    #[test]
    fn test_switching_key_reloads() {
        let mut focus = GraphFocus::new();
        focus.focus(key("a"));
        focus.graph_loaded(&key("a"));
        assert!(focus.focus(key("b")));
        assert_eq!(focus.active_key(), Some(&key("b")));
        assert_eq!(focus.state(), FocusState::Loading);
    }

    #[test]
    fn test_peek_overrides_label() {
        let mut focus = GraphFocus::new();
        focus.focus(key("a"));
        assert_eq!(focus.guaranteed_label(), Some(key("a").as_str()));

        focus.peek(Some(key("b")));
        assert_eq!(focus.guaranteed_label(), Some(key("b").as_str()));
        assert_eq!(focus.active_key(), Some(&key("a")));

        focus.peek(None);
        assert_eq!(focus.guaranteed_label(), Some(key("a").as_str()));
    }

    #[test]
    fn test_invalidate_unloaded_stays_unloaded() {
        let mut focus = GraphFocus::new();
        focus.invalidate();
        assert_eq!(focus.state(), FocusState::Unloaded);
        assert_eq!(focus.begin_refresh(), None);
    }
}
