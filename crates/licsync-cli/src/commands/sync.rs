//! `licsync sync once`: one reconciliation pass against Postgres.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use licsync_reconcile::{LicenseStore, Reconciler, RunReport};

use super::{config_paths_or_env, connect, load_config};

pub async fn run_once(config_paths: Vec<String>) -> Result<()> {
    let paths = config_paths_or_env(config_paths);
    let (loaded, cfg) = load_config(&paths)?;
    tracing::info!(config_hash = %loaded.config_hash, "config loaded");

    let pool = connect(&cfg).await?;
    let store: Arc<dyn LicenseStore> = Arc::new(licsync_db::PgLicenseStore::new(pool.clone()));
    let sources = licsync_db::sources_from_settings(&pool, &cfg.sync);
    if sources.is_empty() {
        tracing::warn!("no telemetry sources configured; nothing to reconcile");
    }

    let report = Reconciler::new(store, sources).run().await;
    print_report(&report)?;

    if let Some(reason) = &report.aborted {
        bail!("SYNC_ABORTED: {reason}");
    }
    Ok(())
}

fn print_report(report: &RunReport) -> Result<()> {
    println!("processed={}", report.processed);
    println!("updated={}", report.updated);
    println!("unchanged={}", report.unchanged);
    println!("skipped={}", report.skipped);
    println!("not_found={}", report.not_found);
    println!("store_errors={}", report.store_errors);
    for source in &report.sources {
        println!("source.{}.updated={}", source.source, source.updated);
    }
    println!("aborted={}", report.is_aborted());
    println!(
        "{}",
        serde_json::to_string_pretty(report).context("serialize run report failed")?
    );
    Ok(())
}
