//! Outbound (Driven) ports for the plotthread client.
//!
//! These traits define the collaborators the client needs but does not own.

use async_trait::async_trait;
use plot_types::{Envelope, Exchange, PublicKey};

use crate::domain::{CacheSnapshot, GraphParseError, RawGraph, StorageError, TransportError};

/// The shared node connection.
pub trait Transport: Send + Sync {
    /// True while a socket is open and accepting writes.
    fn is_ready(&self) -> bool;

    /// Number of connections opened so far; changes on every reconnect.
    fn generation(&self) -> u64;

    /// Hand an envelope to the writer without waiting for it to be written.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotReady`] when no socket is open. Nothing is
    /// queued for a later connection.
    fn send(&self, envelope: &Envelope) -> Result<(), TransportError>;
}

/// Key holder that produces signed exchanges.
///
/// Key generation and signature internals live behind this trait.
#[async_trait]
pub trait ExchangeSigner: Send + Sync {
    /// Sign an exchange to `to` with the key at `key_index`.
    ///
    /// # Returns
    ///
    /// `None` when the key is missing or the passphrase does not unlock it.
    async fn sign(
        &self,
        to: &PublicKey,
        memo: &str,
        height: u64,
        key_index: usize,
        passphrase: &str,
    ) -> Option<Exchange>;
}

/// DOT grammar parser.
pub trait GraphParser: Send + Sync {
    /// Parse DOT text into nodes and edges.
    fn parse(&self, text: &str) -> Result<RawGraph, GraphParseError>;
}

/// Persistence for cache snapshots.
pub trait CacheStorage: Send + Sync {
    /// Load the last saved snapshot, if any.
    fn load(&self) -> Result<Option<CacheSnapshot>, StorageError>;

    /// Replace the saved snapshot.
    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), StorageError>;
}

/// Transport double recording every envelope it accepts.
#[cfg(test)]
#[derive(Default)]
pub struct MockTransport {
    ready: std::sync::atomic::AtomicBool,
    generation: std::sync::atomic::AtomicU64,
    sent: parking_lot::Mutex<Vec<Envelope>>,
}

#[cfg(test)]
impl MockTransport {
    /// A transport with no open socket.
    pub fn disconnected() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }

    /// A transport on its first connection.
    pub fn connected() -> std::sync::Arc<Self> {
        let transport = Self::default();
        transport.reconnect();
        std::sync::Arc::new(transport)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, std::sync::atomic::Ordering::SeqCst);
    }

    /// Open a new connection generation.
    pub fn reconnect(&self) -> u64 {
        self.set_ready(true);
        self.generation
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().clone()
    }

    pub fn sent_kinds(&self) -> Vec<String> {
        self.sent.lock().iter().map(|e| e.kind.clone()).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[cfg(test)]
impl Transport for MockTransport {
    fn is_ready(&self) -> bool {
        self.ready.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn generation(&self) -> u64 {
        self.generation.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if !self.is_ready() {
            return Err(TransportError::NotReady);
        }
        self.sent.lock().push(envelope.clone());
        Ok(())
    }
}

/// Signer double returning a fixed signature, or nothing when locked.
#[cfg(test)]
pub struct MockSigner {
    pub from: PublicKey,
    pub locked: bool,
}

#[cfg(test)]
#[async_trait]
impl ExchangeSigner for MockSigner {
    async fn sign(
        &self,
        to: &PublicKey,
        memo: &str,
        height: u64,
        _key_index: usize,
        passphrase: &str,
    ) -> Option<Exchange> {
        if self.locked || passphrase.is_empty() {
            return None;
        }
        Some(Exchange {
            from: self.from.clone(),
            to: to.clone(),
            memo: memo.to_string(),
            time: 1_700_000_000,
            nonce: Some(7),
            series: Some(height / 1008 + 1),
            signature: Some("c2lnbmF0dXJl".to_string()),
        })
    }
}
