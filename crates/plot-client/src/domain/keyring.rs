//! The user's own public keys and which one is selected.

use plot_types::PublicKey;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRing {
    public_keys: Vec<PublicKey>,
    selected_index: usize,
}

impl KeyRing {
    #[must_use]
    pub fn new(public_keys: Vec<PublicKey>) -> Self {
        Self {
            public_keys,
            selected_index: 0,
        }
    }

    /// Replace the keys and select the first one.
    pub fn set_public_keys(&mut self, public_keys: Vec<PublicKey>) {
        self.public_keys = public_keys;
        self.selected_index = 0;
    }

    /// Select `key` if it is in the ring.
    pub fn select(&mut self, key: &PublicKey) -> bool {
        match self.public_keys.iter().position(|k| k == key) {
            Some(index) => {
                self.selected_index = index;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn selected(&self) -> Option<&PublicKey> {
        self.public_keys.get(self.selected_index)
    }

    #[must_use]
    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    #[must_use]
    pub fn public_keys(&self) -> &[PublicKey] {
        &self.public_keys
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.public_keys.is_empty()
    }
}
