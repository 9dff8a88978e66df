//! # Error Types
//!
//! Errors raised while building or decoding wire payloads.

use thiserror::Error;

/// Errors related to envelope encoding and decoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The frame was not a JSON envelope at all.
    #[error("Invalid envelope JSON: {0}")]
    Json(String),

    /// The `type` was recognised but the body did not match its schema.
    #[error("Malformed body for '{kind}': {reason}")]
    MalformedBody { kind: String, reason: String },

    /// An outbound request could not be serialised.
    #[error("Failed to encode request '{kind}': {reason}")]
    Encode { kind: &'static str, reason: String },
}

/// Errors from parsing a public key out of user input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Nothing usable was supplied.
    #[error("Public key is empty")]
    Empty,

    /// Wire keys are exactly 44 characters.
    #[error("Invalid public key length: {len}, expected 44")]
    InvalidLength { len: usize },

    /// Only base64 characters are allowed before the padding.
    #[error("Invalid base64 character at position {position}")]
    InvalidCharacter { position: usize },

    /// The last character must be `=`.
    #[error("Public key is missing its '=' padding")]
    MissingPadding,

    /// A search query longer than a key cannot be padded into one.
    #[error("Query too long to form a public key: {len} characters")]
    QueryTooLong { len: usize },
}
