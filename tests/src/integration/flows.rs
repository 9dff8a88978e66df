//! # Client Flows
//!
//! End-to-end behaviour of [`PlotClient`] against a [`FakeTransport`]:
//!
//! 1. **Readiness**: nothing is written or queued while disconnected
//! 2. **Cache**: upserts are idempotent, genesis is set once, reconnect keeps
//!    entries but marks them stale
//! 3. **Correlation**: concurrent requests for different keys each receive
//!    their own signal
//! 4. **Graph**: threshold filtering through the DOT parser, focus transitions
//! 5. **Persistence**: snapshots survive a restart through `JsonFileStorage`

use std::sync::Arc;
use std::time::Duration;

use plot_bus::{Signal, SignalFilter, SignalKind};
use plot_client::{
    CacheStorage, ConnectionEvent, DispatchOutcome, FocusState, GraphOptions, GraphView,
    JsonFileStorage, PlotClient, SubmitOutcome, SubmitRejection,
};
use plot_client::{DotParser, GraphParser};
use plot_types::{kinds, PublicKey};
use serde_json::json;

use super::fixtures::*;

fn connected_client() -> (Arc<FakeTransport>, PlotClient) {
    let transport = FakeTransport::new();
    let client = PlotClient::builder(transport.clone()).build().unwrap();
    let generation = transport.connect();
    client.handle_event(ConnectionEvent::Connected { generation });
    transport.clear();
    (transport, client)
}

// =============================================================================
// READINESS
// =============================================================================

#[tokio::test]
async fn test_disconnected_requests_are_dropped_not_queued() {
    let transport = FakeTransport::new();
    let client = PlotClient::builder(transport.clone()).build().unwrap();
    client.set_public_keys(vec![key("me")]);

    assert_eq!(client.refresh_key(&key("a")), DispatchOutcome::NotReady);
    assert_eq!(client.request_pending_for(&key("a")), DispatchOutcome::NotReady);
    assert_eq!(client.focus_graph(key("a")), DispatchOutcome::NotReady);
    assert!(transport.sent().is_empty());

    // Connecting later sends only the connect sequence and the focus re-fetch.
    let generation = transport.connect();
    client.handle_event(ConnectionEvent::Connected { generation });
    assert_eq!(
        transport.sent_kinds(),
        vec![
            kinds::GET_TIP_HEADER,
            kinds::GET_PLOT_BY_HEIGHT,
            kinds::GET_IMBALANCE,
            kinds::GET_RANK,
            kinds::GET_GRAPH,
        ]
    );
}

// =============================================================================
// CACHE
// =============================================================================

#[test]
fn test_repeated_balance_is_one_entry_last_write_wins() {
    let (_, client) = connected_client();

    deliver(&client, kinds::IMBALANCE, balance_body(&key("a"), 1));
    deliver(&client, kinds::IMBALANCE, balance_body(&key("a"), 1));
    deliver(&client, kinds::IMBALANCE, balance_body(&key("a"), 7));

    let cache = client.cache();
    assert_eq!(cache.stats().balances, 1);
    assert_eq!(cache.balance(&key("a")).unwrap().value.value, 7);
}

#[test]
fn test_genesis_is_set_once() {
    let (_, client) = connected_client();

    deliver(&client, kinds::PLOT, block_body(0, 11));
    deliver(&client, kinds::PLOT, block_body(3, 12));
    deliver(&client, kinds::PLOT, block_body(0, 13));

    let cache = client.cache();
    assert_eq!(cache.genesis_block().unwrap().value.header.nonce, 11);
    assert_eq!(cache.current_block().unwrap().value.header.nonce, 13);
}

#[test]
fn test_reconnect_keeps_entries_but_marks_them_stale() {
    let (transport, client) = connected_client();
    deliver(&client, kinds::PLOT, block_body(0, 1));
    deliver(&client, kinds::IMBALANCE, balance_body(&key("a"), 5));
    deliver(&client, kinds::TIP_HEADER, tip_body(9));

    client.handle_event(ConnectionEvent::Disconnected);
    transport.disconnect();
    let generation = transport.connect();
    client.handle_event(ConnectionEvent::Connected { generation });

    let cache = client.cache();
    let balance = cache.balance(&key("a")).unwrap();
    assert!(balance.stale);
    assert_eq!(balance.value.value, 5);
    assert!(cache.tip_header().unwrap().stale);
    assert!(cache.genesis_block().unwrap().is_fresh());

    // Genesis is cached, so only the tip is re-requested.
    assert_eq!(transport.sent_kinds(), vec![kinds::GET_TIP_HEADER]);

    deliver(&client, kinds::IMBALANCE, balance_body(&key("a"), 6));
    assert!(client.cache().balance(&key("a")).unwrap().is_fresh());
}

#[test]
fn test_unknown_and_malformed_frames_leave_cache_untouched() {
    let (transport, client) = connected_client();
    deliver(&client, kinds::IMBALANCE, balance_body(&key("a"), 2));
    let before = client.cache().stats();

    deliver(&client, "peer_list", json!({ "peers": ["x"] }));
    deliver(&client, kinds::GRAPH, json!({ "graph": 12 }));
    deliver(&client, kinds::PLOT, json!({ "plot": "nope" }));
    client.handle_event(ConnectionEvent::Message("{\"body\": {}}".to_string()));

    assert_eq!(client.cache().stats(), before);
    assert_eq!(client.cache().balance(&key("a")).unwrap().value.value, 2);
    assert!(transport.sent().is_empty());
}

// =============================================================================
// CORRELATION
// =============================================================================

#[tokio::test]
async fn test_interleaved_histories_reach_their_own_callers() {
    let (transport, client) = connected_client();
    deliver(&client, kinds::TIP_HEADER, tip_body(30));
    let (a, b) = (key("alice"), key("bob"));

    let mut sub_a = client.subscribe(SignalFilter::for_key(SignalKind::HistoryLoaded, a.clone()));
    let mut sub_b = client.subscribe(SignalFilter::for_key(SignalKind::HistoryLoaded, b.clone()));

    assert!(client.fetch_recent_history(&a).is_sent());
    assert!(client.fetch_recent_history(&b).is_sent());
    assert_eq!(
        transport.sent_kinds(),
        vec![kinds::GET_PUBLIC_KEY_INTERACTIONS, kinds::GET_PUBLIC_KEY_INTERACTIONS]
    );

    // Responses arrive in the opposite order.
    deliver(
        &client,
        kinds::PUBLIC_KEY_INTERACTIONS,
        json!({
            "public_key": b.as_str(),
            "filter_plots": [{ "plot_id": "p2", "interactions": [exchange(&a, &b, "to bob")] }]
        }),
    );
    assert_eq!(sub_a.try_recv().unwrap(), None);
    deliver(
        &client,
        kinds::PUBLIC_KEY_INTERACTIONS,
        json!({
            "public_key": a.as_str(),
            "filter_plots": [
                {
                    "plot_id": "p3",
                    "interactions": [exchange(&b, &a, "one"), exchange(&b, &a, "two")]
                },
                { "plot_id": "p1", "interactions": [] }
            ]
        }),
    );

    let limit = Duration::from_secs(1);
    assert_eq!(
        sub_a.recv_timeout(limit).await.unwrap(),
        Signal::HistoryLoaded {
            public_key: a.clone(),
            count: 2
        }
    );
    assert_eq!(
        sub_b.recv_timeout(limit).await.unwrap(),
        Signal::HistoryLoaded {
            public_key: b.clone(),
            count: 1
        }
    );
    assert_eq!(client.cache().history(&b).unwrap().value[0].memo, "to bob");
}

#[tokio::test]
async fn test_submit_round_trip() {
    let transport = FakeTransport::new();
    let client = PlotClient::builder(transport.clone())
        .signer(Arc::new(FakeSigner {
            from: key("me"),
            passphrase: "open".to_string(),
        }))
        .build()
        .unwrap();
    let to = key("you");

    assert_eq!(
        client.submit_exchange(&to, "hello", 0, "open").await,
        SubmitOutcome::Rejected(SubmitRejection::UnknownHeight)
    );

    let generation = transport.connect();
    client.handle_event(ConnectionEvent::Connected { generation });
    deliver(&client, kinds::TIP_HEADER, tip_body(12));
    assert_eq!(
        client.submit_exchange(&to, "hello", 0, "open").await,
        SubmitOutcome::Rejected(SubmitRejection::NoKeys)
    );

    client.set_public_keys(vec![key("me")]);
    assert_eq!(
        client.submit_exchange(&to, "hello", 0, "wrong").await,
        SubmitOutcome::Rejected(SubmitRejection::NotSigned)
    );

    let mut submitted = client.subscribe(SignalFilter::kinds(vec![SignalKind::ExchangeSubmitted]));
    transport.clear();
    assert_eq!(
        client.submit_exchange(&to, "hello", 0, "open").await,
        SubmitOutcome::Sent
    );
    assert_eq!(transport.sent_kinds(), vec![kinds::PUSH_INTERACTION]);

    deliver(
        &client,
        kinds::PUSH_INTERACTION_RESULT,
        json!({ "interaction_id": "ex1" }),
    );
    assert_eq!(
        submitted.recv_timeout(Duration::from_secs(1)).await.unwrap(),
        Signal::ExchangeSubmitted {
            exchange_id: "ex1".to_string(),
            error: None
        }
    );
}

#[tokio::test]
async fn test_submit_rejects_empty_target() {
    let transport = FakeTransport::new();
    let client = PlotClient::builder(transport.clone())
        .signer(Arc::new(FakeSigner {
            from: key("me"),
            passphrase: "open".to_string(),
        }))
        .build()
        .unwrap();
    let generation = transport.connect();
    client.handle_event(ConnectionEvent::Connected { generation });
    deliver(&client, kinds::TIP_HEADER, tip_body(12));
    client.set_public_keys(vec![key("me")]);
    transport.clear();

    assert_eq!(
        client
            .submit_exchange(&PublicKey::from_wire(""), "hello", 0, "open")
            .await,
        SubmitOutcome::Rejected(SubmitRejection::EmptyTarget)
    );
    assert!(transport.sent().is_empty());
}

// =============================================================================
// GRAPH
// =============================================================================

#[test]
fn test_threshold_keeps_high_scores_and_the_focal_label() {
    let text = dot(
        &[("a", "low", 0.10), ("b", "mid", 0.40), ("c", "high", 0.90)],
        &[("a", "c", 4.0), ("b", "c", 8.0)],
    );
    let raw = DotParser::new().parse(&text).unwrap();

    let plain = GraphView::build(raw.clone(), &GraphOptions::new(50.0));
    let ids: Vec<&str> = plain.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["c"]);
    assert!(plain.edges.is_empty());

    let focal = GraphView::build(raw, &GraphOptions::new(50.0).including("low"));
    let ids: Vec<&str> = focal.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(focal.edges.len(), 1);
}

#[test]
fn test_included_label_below_threshold_keeps_its_edge() {
    let text = dot(
        &[("a", "low", 0.10), ("b", "mid", 0.40), ("c", "high", 0.90)],
        &[("a", "c", 4.0), ("b", "c", 8.0)],
    );
    let raw = DotParser::new().parse(&text).unwrap();

    let view = GraphView::build(raw, &GraphOptions::new(50.0).including("mid"));
    let ids: Vec<&str> = view.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);
    assert_eq!(view.edges.len(), 1);
    assert_eq!(view.edges[0].source, "b");
    assert_eq!(view.edges[0].target, "c");
}

#[test]
fn test_focus_goes_stale_on_invalidation_and_reloads() {
    let (transport, client) = connected_client();
    let focal = key("focal");
    deliver(&client, kinds::TIP_HEADER, tip_body(10));

    assert_eq!(client.focus_state(), FocusState::Unloaded);
    client.focus_graph(focal.clone());
    assert_eq!(client.focus_state(), FocusState::Loading);

    let graph = dot(&[("f", focal.as_str(), 0.2), ("n", "n", 0.8)], &[("f", "n", 2.0)]);
    deliver(
        &client,
        kinds::GRAPH,
        json!({ "public_key": focal.as_str(), "graph": graph }),
    );
    assert_eq!(client.focus_state(), FocusState::Loaded);

    let focused = client.graph_view(50.0);
    assert!(focused.is_current());
    let view = focused.view.unwrap();
    assert_eq!(view.neighbors("f"), ["n".to_string()]);
    assert_eq!(view.view().edges[0].visual_weight, 10.0);

    transport.clear();
    deliver(&client, kinds::INV_PLOT, json!({ "plot_ids": ["p10"] }));
    assert_eq!(client.focus_state(), FocusState::Loading);
    assert!(!client.graph_view(50.0).is_current());
    assert_eq!(
        transport.sent_kinds(),
        vec![
            kinds::GET_TIP_HEADER,
            kinds::GET_IMBALANCE,
            kinds::GET_RANK,
            kinds::GET_GRAPH
        ]
    );

    deliver(
        &client,
        kinds::GRAPH,
        json!({ "public_key": focal.as_str(), "graph": "digraph { f }" }),
    );
    assert!(client.graph_view(0.0).is_current());
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[test]
fn test_snapshot_survives_restart_as_stale() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");

    {
        let client = PlotClient::builder(FakeTransport::new())
            .storage(Arc::new(JsonFileStorage::new(&path)))
            .build()
            .unwrap();
        deliver(&client, kinds::PLOT, block_body(0, 4));
        deliver(&client, kinds::IMBALANCE, balance_body(&key("a"), 3));
        deliver(
            &client,
            kinds::PUBLIC_KEY_INTERACTIONS,
            json!({
                "public_key": key("a").as_str(),
                "filter_plots": [{
                    "plot_id": "p1",
                    "interactions": [exchange(&key("b"), &key("a"), "hi")]
                }]
            }),
        );
        client.persist().unwrap();
    }

    assert!(JsonFileStorage::new(&path).load().unwrap().is_some());

    let restored = PlotClient::builder(FakeTransport::new())
        .storage(Arc::new(JsonFileStorage::new(&path)))
        .build()
        .unwrap();
    let cache = restored.cache();

    let balance = cache.balance(&key("a")).unwrap();
    assert!(balance.stale);
    assert_eq!(balance.value.value, 3);
    assert!(cache.history(&key("a")).unwrap().stale);
    assert!(cache.current_block().unwrap().stale);
    assert!(cache.genesis_block().unwrap().is_fresh());
    assert!(cache.tip_header().is_none());
}
