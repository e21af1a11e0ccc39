//! Coin ledger node binary

use anyhow::Context;
use coin_ledger::{
    actor::spawn_ledger_actor, address::ROOT_ADDRESS, genesis, metrics::Metrics, reconfig,
    registered_currencies, Config, Ledger, Signer, StaticRoles,
};
use std::sync::Arc;

fn load_config() -> anyhow::Result<Config> {
    match std::env::args().nth(1).or_else(|| std::env::var("LEDGER_CONFIG").ok()) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading config from {}", path)),
        None => Config::from_env().context("loading config from environment"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    if config.json_logs() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting coin ledger node"
    );

    let metrics = Metrics::new().context("creating metrics")?;
    let ledger = Ledger::open(&config, Arc::new(StaticRoles::new()))
        .context("opening ledger")?
        .with_metrics(metrics.clone());
    let fresh = ledger.version() == 0;
    let handle = spawn_ledger_actor(ledger, &config);

    if fresh {
        let root = Signer::new(ROOT_ADDRESS);
        handle
            .execute(move |txn| {
                genesis::initialize(txn, &root)?;
                genesis::finish(txn, &root)
            })
            .await
            .context("running genesis")?;
    }

    let (epoch, currencies) = handle
        .view(|txn| {
            let epoch = reconfig::current_epoch(txn)?;
            let codes = registered_currencies::registered(txn)?
                .currency_codes()
                .iter()
                .map(|code| String::from_utf8_lossy(code).into_owned())
                .collect::<Vec<_>>();
            Ok((epoch, codes))
        })
        .await?;
    let version = handle.inspect(|ledger| ledger.version()).await?;

    let summary = serde_json::json!({
        "service": config.service_name,
        "data_dir": config.data_dir,
        "persistent": config.storage.enabled,
        "version": version,
        "epoch": epoch,
        "currencies": currencies,
    });
    tracing::info!(summary = %summary, "Ledger ready");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down coin ledger node");
    handle.shutdown().await?;

    let exposition = prometheus::TextEncoder::new()
        .encode_to_string(&metrics.registry().gather())
        .context("encoding metrics")?;
    tracing::debug!(metrics = %exposition, "Final metrics");
    Ok(())
}
