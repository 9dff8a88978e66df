//! # Live Connection Flows
//!
//! [`ConnectionManager`] and [`PlotClient`] against a local WebSocket server
//! that answers like a node: the sub-protocol is negotiated, requests are
//! answered by type, and the server can drop the socket to force a
//! reconnect.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use plot_bus::{Signal, SignalFilter, SignalKind};
use plot_client::{ClientConfig, ConnectionManager, ConnectionState, PlotClient, Transport};
use plot_types::{kinds, Envelope, SUBPROTOCOL};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use super::fixtures::*;

const LIMIT: Duration = Duration::from_secs(5);

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    let callback = |_: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        response
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
        Ok(response)
    };
    accept_hdr_async(stream, callback).await.unwrap()
}

/// Answer requests until the client goes away or `max` replies were sent.
async fn serve(ws: &mut WebSocketStream<TcpStream>, max: usize) {
    let mut replies = 0;
    while replies < max {
        let Some(Ok(message)) = ws.next().await else {
            return;
        };
        let Message::Text(text) = message else {
            continue;
        };
        let request = Envelope::from_json(text.as_str()).unwrap();
        let body = request.body.clone().unwrap_or_default();

        let reply = match request.kind.as_str() {
            kinds::GET_TIP_HEADER => Some(frame(kinds::TIP_HEADER, tip_body(77))),
            kinds::GET_PLOT_BY_HEIGHT => Some(frame(kinds::PLOT, block_body(0, 1))),
            kinds::GET_IMBALANCE => Some(frame(
                kinds::IMBALANCE,
                json!({ "public_key": body["public_key"], "imbalance": 42 }),
            )),
            _ => None,
        };

        if let Some(reply) = reply {
            ws.send(Message::Text(reply.into())).await.unwrap();
            replies += 1;
        }
    }
}

fn config_for(listener: &TcpListener) -> ClientConfig {
    let addr = listener.local_addr().unwrap();
    let mut config = ClientConfig::default().with_node(format!("ws://{addr}"));
    config.backoff_base = Duration::from_millis(20);
    config.backoff_cap = Duration::from_millis(100);
    config
}

#[tokio::test]
async fn test_connect_fetch_balance_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = config_for(&listener);

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        serve(&mut ws, usize::MAX).await;
    });

    let (manager, events) = ConnectionManager::start(&config).unwrap();
    let client = Arc::new(
        PlotClient::builder(Arc::new(manager.clone()))
            .config(config)
            .build()
            .unwrap(),
    );
    let mut ready = client.subscribe(SignalFilter::kinds(vec![SignalKind::ReadinessChanged]));
    let runner = {
        let client = client.clone();
        tokio::spawn(async move { client.run(events).await })
    };

    assert_eq!(
        ready.recv_timeout(LIMIT).await.unwrap(),
        Signal::ReadinessChanged { ready: true }
    );
    assert_eq!(manager.state(), ConnectionState::Connected);

    let target = key("remote");
    let mut balance =
        client.subscribe(SignalFilter::for_key(SignalKind::BalanceLoaded, target.clone()));
    assert!(client.dispatcher().fetch_balance(&target).is_sent());
    balance.recv_timeout(LIMIT).await.unwrap();

    let cache = client.cache();
    assert_eq!(cache.balance(&target).unwrap().value.value, 42);

    // The connect sequence asked for the tip and genesis.
    tokio::time::timeout(LIMIT, async {
        while client.cache().tip_height().is_none() || client.cache().genesis_block().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(client.cache().tip_height(), Some(77));

    manager.shutdown();
    tokio::time::timeout(LIMIT, runner).await.unwrap().unwrap();
    server.abort();
}

#[tokio::test]
async fn test_server_drop_reconnects_and_marks_stale() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = config_for(&listener);

    let server = tokio::spawn(async move {
        // First session: answer the tip request and genesis, then hang up.
        let mut first = accept(&listener).await;
        serve(&mut first, 2).await;
        first.close(None).await.ok();
        drop(first);

        let mut second = accept(&listener).await;
        serve(&mut second, usize::MAX).await;
    });

    let (manager, events) = ConnectionManager::start(&config).unwrap();
    let client = Arc::new(
        PlotClient::builder(Arc::new(manager.clone()))
            .config(config)
            .build()
            .unwrap(),
    );
    let mut ready = client.subscribe(SignalFilter::kinds(vec![SignalKind::ReadinessChanged]));
    let runner = {
        let client = client.clone();
        tokio::spawn(async move { client.run(events).await })
    };

    let expected = [true, false, true];
    for ready_state in expected {
        assert_eq!(
            ready.recv_timeout(LIMIT).await.unwrap(),
            Signal::ReadinessChanged { ready: ready_state }
        );
    }
    assert_eq!(manager.generation(), 2);
    assert!(manager.is_ready());

    // The tip from the first session survives the reconnect until the
    // second session's answer replaces it.
    tokio::time::timeout(LIMIT, async {
        loop {
            if let Some(tip) = client.cache().tip_header() {
                if tip.is_fresh() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    manager.shutdown();
    tokio::time::timeout(LIMIT, runner).await.unwrap().unwrap();
    server.abort();
}
