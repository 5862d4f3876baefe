use std::sync::Arc;

use futures::StreamExt;
use kv_reactor::register_custom_metrics;
use kv_reactor::metrics_body;
use kv_reactor::Bin;
use kv_reactor::Client;
use kv_reactor::ClientConfig;
use kv_reactor::Key;
use kv_reactor::MemoryCluster;
use kv_reactor::MemoryClusterConfig;
use kv_reactor::Operation;
use kv_reactor::Result;
use prometheus::Registry;
use tracing::error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const NAMESPACE: &str = "test";
const SET: &str = "demo";

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    init_observability();

    let config = ClientConfig::new()?.validate()?;
    let cluster = MemoryCluster::new(MemoryClusterConfig {
        max_reply_delay_ms: 5,
        ..MemoryClusterConfig::default()
    })?;

    let registry = Registry::new_custom(Some("kvr".to_string()), None).map_err(|e| {
        error!("Failed to create metrics registry: {}", e);
        e
    });
    if let Ok(registry) = &registry {
        if let Err(e) = register_custom_metrics(registry) {
            error!("Failed to register metrics: {}", e);
        }
    }

    let client = Client::builder(Arc::new(cluster)).set_config(config).build()?;
    run(&client).await?;
    client.close();

    if let Ok(registry) = &registry {
        println!("{}", metrics_body(registry));
    }
    Ok(())
}

async fn run(client: &Client) -> Result<()> {
    let keys: Vec<Key> = (0..8).map(|i| Key::new(NAMESPACE, SET, i)).collect();

    for key in keys.iter().step_by(2) {
        client.put(None, key.clone(), vec![Bin::new("visits", 1)]).await?;
    }
    info!("seeded {} records", keys.len() / 2);

    let found = client.get_batch(None, keys.clone()).await?.unwrap_or_default();
    for (key, record) in found.keys.iter().zip(&found.records) {
        info!(?key, present = record.is_some(), "positional read");
    }

    let results = client
        .operate_batch(None, None, keys.clone(), vec![Operation::Add(Bin::new("visits", 1))])
        .await?;
    if let Some(results) = results {
        info!(status = results.status, "operate batch finished");
    }

    let mut stream = client.get_multi(None, keys);
    while let Some(item) = stream.next().await {
        match item {
            Ok(record) => info!(key = ?record.key, bins = ?record.record.map(|r| r.bins), "streamed"),
            Err(e) => error!("stream failed: {}", e),
        }
    }
    Ok(())
}

fn init_observability() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(env_filter)
        .init();
}
