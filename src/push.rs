//! Command orchestration.
//!
//! Glue between the CLI and the library: scan the site, build records,
//! reconcile, then print a short summary ending in `ok`.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::hooks::Hooks;
use crate::indexer::{Indexer, IndexerOptions, RunReport, SettingsOutcome};
use crate::pipeline::build_records;
use crate::remote::AlgoliaClient;
use crate::site::scan_site;
use searchsync_core::models::Record;
use searchsync_core::store::RemoteStore;

/// Scan the site and build its final record set.
pub async fn load_records(config: &Config, hooks: Arc<dyn Hooks>) -> Result<Vec<Record>> {
    let documents = scan_site(&config.site)?;
    let records = build_records(
        documents,
        &config.site.nodes_to_index,
        config.indexing.max_record_size,
        hooks,
    )
    .await?;
    Ok(records)
}

/// Full run against the configured remote index.
pub async fn run_push(config: &Config, hooks: Arc<dyn Hooks>) -> Result<RunReport> {
    let store: Arc<dyn RemoteStore> = Arc::new(AlgoliaClient::from_config(&config.index)?);
    push_to_store(config, store, hooks).await
}

/// Full run against any store.
pub async fn push_to_store(
    config: &Config,
    store: Arc<dyn RemoteStore>,
    hooks: Arc<dyn Hooks>,
) -> Result<RunReport> {
    let mut indexer = Indexer::init(store, IndexerOptions::from_config(config)).await?;
    let records = load_records(config, hooks).await?;
    let report = indexer.run(&records).await?;
    print_report(&report);
    Ok(report)
}

/// Build records without touching the remote index.
///
/// Writes pretty JSON to `output`, or to stdout when `output` is `None`.
pub async fn run_records(
    config: &Config,
    hooks: Arc<dyn Hooks>,
    output: Option<&Path>,
) -> Result<usize> {
    let records = load_records(config, hooks).await?;
    let json = serde_json::to_string_pretty(&records)?;

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("records");
            println!("  records built: {}", records.len());
            println!("  written to: {}", path.display());
            println!("ok");
        }
        None => println!("{}", json),
    }
    Ok(records.len())
}

/// Settings synchronization only.
pub async fn run_settings(config: &Config) -> Result<SettingsOutcome> {
    let store: Arc<dyn RemoteStore> = Arc::new(AlgoliaClient::from_config(&config.index)?);
    let options = IndexerOptions::from_config(config);
    let index = options.index_name.clone();
    let mut indexer = Indexer::init(store, options).await?;
    let outcome = indexer.update_settings(&index).await?;

    println!("settings {}", index);
    print_settings(&outcome);
    println!("ok");
    Ok(outcome)
}

fn print_report(report: &RunReport) {
    if report.dry_run {
        println!("push {} ({}, dry-run)", report.index, report.strategy.as_str());
    } else {
        println!("push {} ({})", report.index, report.strategy.as_str());
    }
    println!("  records: {}", report.records);
    println!("  deleted: {}", report.deleted);
    println!("  uploaded: {} in {} batches", report.uploaded, report.batches);
    print_settings(&report.settings);
    println!("ok");
}

fn print_settings(outcome: &SettingsOutcome) {
    match outcome {
        SettingsOutcome::Pushed { setting_id } => println!("  settings: pushed ({})", setting_id),
        SettingsOutcome::WouldPush { setting_id } => {
            println!("  settings: would push ({})", setting_id)
        }
        SettingsOutcome::UpToDate { drifted_keys } if drifted_keys.is_empty() => {
            println!("  settings: up to date")
        }
        SettingsOutcome::UpToDate { drifted_keys } => println!(
            "  settings: up to date (edited remotely: {})",
            drifted_keys.join(", ")
        ),
    }
}
