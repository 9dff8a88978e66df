//! Shared fixtures: a recording transport, a fixed signer and wire frames.

use async_trait::async_trait;
use parking_lot::Mutex;
use plot_client::{ConnectionEvent, ExchangeSigner, PlotClient, Transport, TransportError};
use plot_types::{Envelope, Exchange, PublicKey};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Transport that records envelopes instead of writing them to a socket.
#[derive(Default)]
pub struct FakeTransport {
    ready: AtomicBool,
    generation: AtomicU64,
    sent: Mutex<Vec<Envelope>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a connection and return its generation.
    pub fn connect(&self) -> u64 {
        self.ready.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn disconnect(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn sent_kinds(&self) -> Vec<String> {
        self.sent.lock().iter().map(|e| e.kind.clone()).collect()
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl Transport for FakeTransport {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if !self.is_ready() {
            return Err(TransportError::NotReady);
        }
        self.sent.lock().push(envelope.clone());
        Ok(())
    }
}

/// Signer that accepts one passphrase.
pub struct FakeSigner {
    pub from: PublicKey,
    pub passphrase: String,
}

#[async_trait]
impl ExchangeSigner for FakeSigner {
    async fn sign(
        &self,
        to: &PublicKey,
        memo: &str,
        height: u64,
        _key_index: usize,
        passphrase: &str,
    ) -> Option<Exchange> {
        (passphrase == self.passphrase).then(|| Exchange {
            from: self.from.clone(),
            to: to.clone(),
            memo: memo.to_string(),
            time: 1_700_000_000 + height,
            nonce: Some(1),
            series: Some(1),
            signature: Some("ZmFrZQ==".to_string()),
        })
    }
}

pub fn key(tag: &str) -> PublicKey {
    PublicKey::from_query(tag).expect("fixture key")
}

pub fn frame(kind: &str, body: Value) -> String {
    json!({ "type": kind, "body": body }).to_string()
}

/// Deliver a text frame through the client's event path.
pub fn deliver(client: &PlotClient, kind: &str, body: Value) {
    client.handle_event(ConnectionEvent::Message(frame(kind, body)));
}

pub fn header(height: u64, nonce: u64) -> Value {
    json!({
        "previous": "prev",
        "hash_list_root": "root",
        "time": 1_700_000_000,
        "target": "ff",
        "thread_work": "01",
        "nonce": nonce,
        "height": height,
        "interaction_count": 0
    })
}

pub fn tip_body(height: u64) -> Value {
    json!({ "plot_id": format!("p{height}"), "header": header(height, 0) })
}

pub fn block_body(height: u64, nonce: u64) -> Value {
    json!({
        "plot_id": format!("p{height}"),
        "plot": { "header": header(height, nonce), "interactions": [] }
    })
}

pub fn balance_body(key: &PublicKey, value: i64) -> Value {
    json!({ "public_key": key.as_str(), "imbalance": value })
}

pub fn exchange(from: &PublicKey, to: &PublicKey, memo: &str) -> Value {
    json!({ "from": from.as_str(), "to": to.as_str(), "memo": memo, "time": 1 })
}

/// DOT text with one node per `(id, label, score)` and the given edges.
pub fn dot(nodes: &[(&str, &str, f64)], edges: &[(&str, &str, f64)]) -> String {
    let mut text = String::from("digraph G {\n");
    for (id, label, score) in nodes {
        text.push_str(&format!("  \"{id}\" [label=\"{label}\", ranking=\"{score}\"];\n"));
    }
    for (source, target, weight) in edges {
        text.push_str(&format!("  \"{source}\" -> \"{target}\" [weight=\"{weight}\"];\n"));
    }
    text.push('}');
    text
}
