//! # Public Keys
//!
//! A public key travels as 43 base64 characters followed by a single `=`.
//! Keys ending in the `000=` sentinel are placeholders: padded search terms
//! or label-style keys that do not belong to a real key pair.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::KeyError;

/// Length of a wire-form public key, padding included.
pub const PUBLIC_KEY_LEN: usize = 44;

/// Number of base64 data characters before the padding.
const DATA_LEN: usize = 43;

/// Offset of the placeholder sentinel.
const SENTINEL_OFFSET: usize = 40;

/// Trailing characters that mark a placeholder key.
const PLACEHOLDER_SENTINEL: &str = "000=";

/// Maximum characters of a placeholder shown as a graph label.
const GRAPH_LABEL_MAX: usize = 20;

/// Wire-form public key.
///
/// Deserialization keeps the string exactly as received. Use
/// [`PublicKey::parse`] to validate user input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(String);

impl PublicKey {
    /// Wrap a wire string without validation.
    #[must_use]
    pub fn from_wire(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Parse and validate a wire-form key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if the input is not 43 base64 characters
    /// followed by `=`.
    pub fn parse(input: &str) -> Result<Self, KeyError> {
        if input.is_empty() {
            return Err(KeyError::Empty);
        }
        if input.len() != PUBLIC_KEY_LEN {
            return Err(KeyError::InvalidLength { len: input.len() });
        }
        if let Some(position) = input
            .chars()
            .take(DATA_LEN)
            .position(|c| !is_base64_char(c))
        {
            return Err(KeyError::InvalidCharacter { position });
        }
        if !input.ends_with('=') {
            return Err(KeyError::MissingPadding);
        }
        Ok(Self(input.to_string()))
    }

    /// Turn a free-form search string into a key.
    ///
    /// Valid keys pass through. Otherwise non-base64 characters are removed
    /// and the remainder is right-padded with `0` and terminated with `=`,
    /// which yields a placeholder key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Empty`] when nothing usable remains and
    /// [`KeyError::QueryTooLong`] when the cleaned query exceeds 43 characters.
    pub fn from_query(input: &str) -> Result<Self, KeyError> {
        if let Ok(key) = Self::parse(input) {
            return Ok(key);
        }

        let cleaned: String = input.chars().filter(|c| is_base64_char(*c)).collect();
        if cleaned.is_empty() {
            return Err(KeyError::Empty);
        }
        if cleaned.len() > DATA_LEN {
            return Err(KeyError::QueryTooLong { len: cleaned.len() });
        }

        let mut padded = format!("{:0<width$}", cleaned, width = DATA_LEN);
        padded.push('=');
        Ok(Self(padded))
    }

    /// The exact wire string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the key ends in the `000=` sentinel.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.0.get(SENTINEL_OFFSET..) == Some(PLACEHOLDER_SENTINEL)
    }

    /// Placeholder text with its zero padding removed.
    fn unpadded(&self) -> &str {
        let without_pad = self.0.strip_suffix('=').unwrap_or(&self.0);
        without_pad.trim_end_matches('0')
    }

    /// Abbreviated form for lists: `abcde...wxy=`, or the de-padded text
    /// for placeholders.
    #[must_use]
    pub fn short_form(&self) -> String {
        if self.is_placeholder() {
            return self.unpadded().to_string();
        }
        match (self.0.get(..5), self.0.get(SENTINEL_OFFSET..)) {
            (Some(head), Some(tail)) => format!("{head}...{tail}"),
            _ => self.0.clone(),
        }
    }

    /// Compact label for graph nodes.
    #[must_use]
    pub fn graph_label(&self) -> String {
        if self.is_placeholder() {
            return self.unpadded().chars().take(GRAPH_LABEL_MAX).collect();
        }
        self.0.chars().take(5).collect()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PublicKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_base64_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '+' || c == '/'
}
