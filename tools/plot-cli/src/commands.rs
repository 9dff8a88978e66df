//! Subcommand execution.

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use plot_bus::{Signal, SignalFilter, SignalKind, Subscription};
use plot_client::PlotClient;
use plot_types::PublicKey;
use serde::Serialize;
use serde_json::json;

use crate::Command;

/// Cache polling period while waiting for entries without a signal.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub async fn execute(client: &PlotClient, command: Command, limit: Duration) -> Result<()> {
    wait_ready(client, limit).await?;

    match command {
        Command::Tip => {
            let tip = poll(limit, || client.cache().tip_header())
                .await
                .context("No tip header received")?;
            print_json(&tip.value)
        }

        Command::Block { height, id } => block(client, height, id, limit).await,

        Command::Balance { key } => {
            let key = parse_key(&key)?;
            let mut sub =
                client.subscribe(SignalFilter::for_key(SignalKind::BalanceLoaded, key.clone()));
            client.dispatcher().fetch_balance(&key);
            await_signal(&mut sub, limit).await?;
            let balance = client
                .cache()
                .balance(&key)
                .ok_or_else(|| anyhow!("Balance missing from cache"))?;
            print_json(&balance.value)
        }

        Command::Ranking { key } => {
            let key = parse_key(&key)?;
            let mut sub =
                client.subscribe(SignalFilter::for_key(SignalKind::RankingLoaded, key.clone()));
            client.dispatcher().fetch_ranking(&key);
            await_signal(&mut sub, limit).await?;
            let ranking = client
                .cache()
                .ranking(&key)
                .ok_or_else(|| anyhow!("Ranking missing from cache"))?;
            print_json(&ranking.value)
        }

        Command::Rankings { keys } => {
            let keys = keys
                .iter()
                .map(|k| parse_key(k))
                .collect::<Result<Vec<_>>>()?;
            client.dispatcher().fetch_ranking_table(&keys);
            let table = poll(limit, || client.cache().ranking_table())
                .await
                .context("No ranking table received")?;
            let rows: Vec<_> = table
                .value
                .sorted_desc()
                .into_iter()
                .map(|r| json!({ "public_key": r.public_key, "score": r.score }))
                .collect();
            print_json(&rows)
        }

        Command::Graph { key, threshold } => {
            let key = parse_key(&key)?;
            let mut sub =
                client.subscribe(SignalFilter::for_key(SignalKind::GraphLoaded, key.clone()));
            client.focus_graph(key);
            await_signal(&mut sub, limit).await?;
            // The graph's edge weights are scaled by the tip height.
            poll(limit, || client.cache().tip_height()).await.ok();

            let focused = client.graph_view(threshold);
            let Some(view) = focused.view else {
                bail!("Node returned no graph for this key");
            };
            let nodes: Vec<_> = view
                .view()
                .nodes
                .iter()
                .map(|n| json!({ "id": n.id, "label": n.display_label(), "score": n.score }))
                .collect();
            let edges: Vec<_> = view
                .view()
                .edges
                .iter()
                .map(|e| {
                    json!({
                        "source": e.source,
                        "target": e.target,
                        "weight": e.weight,
                        "visual_weight": e.visual_weight,
                    })
                })
                .collect();
            print_json(&json!({
                "focal": view.focal_node().map(|n| n.id.clone()),
                "state": format!("{:?}", focused.state),
                "nodes": nodes,
                "edges": edges,
            }))
        }

        Command::History { key } => {
            let key = parse_key(&key)?;
            poll(limit, || client.cache().tip_height())
                .await
                .context("Tip height unknown")?;
            let mut sub =
                client.subscribe(SignalFilter::for_key(SignalKind::HistoryLoaded, key.clone()));
            client.fetch_recent_history(&key);
            await_signal(&mut sub, limit).await?;
            let history = client
                .cache()
                .history(&key)
                .map(|cached| cached.value)
                .unwrap_or_default();
            print_json(&history)
        }

        Command::Pending { key } => {
            let key = parse_key(&key)?;
            client.request_pending_for(&key);
            let pending = poll(limit, || client.cache().pending_queue())
                .await
                .context("No pending queue received")?;
            print_json(&pending.value)
        }

        Command::Watch => watch(client).await,
    }
}

async fn block(
    client: &PlotClient,
    height: Option<u64>,
    id: Option<String>,
    limit: Duration,
) -> Result<()> {
    // The connect sequence fetches genesis; wait for it so it cannot be
    // mistaken for the answer.
    poll(limit, || client.cache().genesis_block()).await.ok();
    let before = client.cache().current_block().map(|b| b.value);

    match (height, id) {
        (Some(height), _) => {
            client.dispatcher().fetch_block_by_height(height);
            let block = poll(limit, || {
                client
                    .cache()
                    .current_block()
                    .filter(|b| b.value.header.height == height)
            })
            .await
            .with_context(|| format!("No block at height {height}"))?;
            print_json(&block.value)
        }
        (None, Some(id)) => {
            client.dispatcher().fetch_block_by_id(id.clone());
            let block = poll(limit, || {
                client
                    .cache()
                    .current_block()
                    .filter(|b| Some(&b.value) != before.as_ref())
            })
            .await
            .with_context(|| format!("No block with id {id}"))?;
            print_json(&block.value)
        }
        (None, None) => bail!("Either a height or --id is required"),
    }
}

async fn watch(client: &PlotClient) -> Result<()> {
    let mut sub = client.subscribe(SignalFilter::all());
    loop {
        tokio::select! {
            signal = sub.recv() => match signal {
                Some(signal) => println!("{}", describe(&signal)),
                None => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

fn describe(signal: &Signal) -> String {
    match signal {
        Signal::BalanceLoaded { public_key, error }
        | Signal::RankingLoaded { public_key, error } => {
            let suffix = error.as_deref().map(|e| format!(" error={e}")).unwrap_or_default();
            format!("{:?} {}{suffix}", signal.kind(), public_key.short_form())
        }
        Signal::GraphLoaded { public_key } => format!("GraphLoaded {}", public_key.short_form()),
        Signal::HistoryLoaded { public_key, count } => {
            format!("HistoryLoaded {} count={count}", public_key.short_form())
        }
        Signal::ExchangeSubmitted { exchange_id, error } => match error {
            Some(e) => format!("ExchangeSubmitted {exchange_id} error={e}"),
            None => format!("ExchangeSubmitted {exchange_id}"),
        },
        Signal::BlocksInvalidated { block_ids } => {
            format!("BlocksInvalidated {}", block_ids.join(","))
        }
        Signal::ReadinessChanged { ready } => format!("ReadinessChanged ready={ready}"),
    }
}

async fn wait_ready(client: &PlotClient, limit: Duration) -> Result<()> {
    if client.dispatcher().is_ready() {
        return Ok(());
    }
    let mut sub = client.subscribe(SignalFilter::kinds(vec![SignalKind::ReadinessChanged]));
    // Readiness may have flipped between the check and the subscription.
    if client.dispatcher().is_ready() {
        return Ok(());
    }

    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match sub.recv_timeout(remaining).await {
            Ok(Signal::ReadinessChanged { ready: true }) => return Ok(()),
            Ok(_) => continue,
            Err(e) => {
                return Err(e).context(format!(
                    "Node at {} not reachable",
                    client.config().endpoint_url()
                ))
            }
        }
    }
}

async fn await_signal(sub: &mut Subscription, limit: Duration) -> Result<Signal> {
    let signal = sub.recv_timeout(limit).await.context("No answer from node")?;
    match &signal {
        Signal::BalanceLoaded { error: Some(e), .. }
        | Signal::RankingLoaded { error: Some(e), .. } => {
            tracing::warn!(error = %e, "Node reported an error");
        }
        _ => {}
    }
    Ok(signal)
}

/// Re-evaluate `probe` until it yields a value or `limit` passes.
async fn poll<T, F>(limit: Duration, mut probe: F) -> Result<T>
where
    F: FnMut() -> Option<T>,
{
    within(limit, async move {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        loop {
            ticker.tick().await;
            if let Some(value) = probe() {
                return value;
            }
        }
    })
    .await
}

async fn within<T>(limit: Duration, fut: impl Future<Output = T>) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| anyhow!("Timed out after {limit:?}"))
}

fn parse_key(input: &str) -> Result<PublicKey> {
    PublicKey::from_query(input).with_context(|| format!("Invalid public key '{input}'"))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_signals() {
        let key = PublicKey::from_query("abc").unwrap();
        assert_eq!(
            describe(&Signal::HistoryLoaded {
                public_key: key.clone(),
                count: 3
            }),
            format!("HistoryLoaded {} count=3", key.short_form())
        );
        assert_eq!(
            describe(&Signal::ReadinessChanged { ready: false }),
            "ReadinessChanged ready=false"
        );
        assert!(describe(&Signal::BalanceLoaded {
            public_key: key,
            error: Some("unknown".into())
        })
        .ends_with("error=unknown"));
    }

    #[test]
    fn test_parse_key_pads_queries() {
        let key = parse_key("abc").unwrap();
        assert!(key.is_placeholder());
        assert!(parse_key("!!!").is_err());
    }

    #[test]
    fn test_poll_times_out() {
        tokio_test::block_on(async {
            let result: Result<u8> = poll(Duration::from_millis(120), || None).await;
            assert!(result.is_err());
        });
    }
}
