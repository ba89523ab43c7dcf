use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};

use crate::accumulator::ChangeAccumulator;
use crate::checkpoint::{CheckpointStore, horizon_from};
use crate::config::WatchConfig;
use crate::diff::WikitextSectionComparer;
use crate::mediawiki::{PageSource, Publisher, RevisionFetcher};
use crate::narrative::PriorityPolicy;
use crate::pool::EnginePool;
use crate::report::{self, ReportHeader};
use crate::runtime::{ResolvedPaths, write_text_file};
use crate::scanner::{ScanContext, ScanOptions, ScanSummary, Scanner};

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub scan: ScanOptions,
    pub oldest_days: i64,
    pub high_interest_markers: Vec<String>,
    pub pool_capacity: usize,
    pub report_page: Option<String>,
    pub report_summary: String,
    pub wiki_url: Option<String>,
    pub dry_run: bool,
}

impl WatchOptions {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            scan: ScanOptions::from_config(config),
            oldest_days: config.watch.oldest_days,
            high_interest_markers: config.watch.high_interest_markers.clone(),
            pool_capacity: config.watch.pool_capacity,
            report_page: config.report_page().map(ToString::to_string),
            report_summary: config.watch.report_summary.clone(),
            wiki_url: config.wiki_url(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Published { page: String },
    LocalOnly,
    DryRun,
}

#[derive(Debug, Clone)]
pub struct WatchOutcome {
    pub summary: ScanSummary,
    pub restored_records: usize,
    pub reported_records: usize,
    pub report_path: PathBuf,
    pub delivery: Delivery,
}

/// One full monitoring pass: scan, persist, report, deliver.
///
/// Records restored from an earlier dump are merged into this run's report.
/// The dump is removed only once the report was delivered; on a publish
/// failure or a dry run it stays for the next pass.
pub fn run_watch(
    paths: &ResolvedPaths,
    options: &WatchOptions,
    source: &dyn PageSource,
    fetcher: &dyn RevisionFetcher,
    publisher: Option<&dyn Publisher>,
) -> Result<WatchOutcome> {
    let horizon = horizon_from(Utc::now(), options.oldest_days);
    let checkpoints = CheckpointStore::load(&paths.checkpoint_path, horizon);
    let accumulator = ChangeAccumulator::new(&paths.dump_path);
    let restored_records = accumulator.restore();

    let engines = EnginePool::new(options.pool_capacity, WikitextSectionComparer::new);
    let policy = PriorityPolicy::new(options.high_interest_markers.iter().cloned());
    let scanner = Scanner::new(
        source,
        fetcher,
        &engines,
        &checkpoints,
        &accumulator,
        &policy,
        options.scan.clone(),
    );
    let summary = scanner.run(&ScanContext::new())?;

    accumulator
        .persist()
        .context("failed to persist change records")?;
    checkpoints.save().context("failed to save checkpoints")?;

    // The dump on disk keeps every record until delivery succeeds.
    let records = accumulator.drain_all();
    let text = report::build(
        &records,
        &ReportHeader::from_scan(&summary, &records),
        options.wiki_url.as_deref(),
    );
    write_text_file(&paths.report_path, &text, true)?;
    log::info!(
        "wrote report with {} records to {}",
        records.len(),
        paths.report_path.display()
    );

    let delivery = deliver(options, &text, publisher, records.len())?;
    if delivery != Delivery::DryRun {
        accumulator.clear_dump()?;
    }

    Ok(WatchOutcome {
        summary,
        restored_records,
        reported_records: records.len(),
        report_path: paths.report_path.clone(),
        delivery,
    })
}

fn deliver(
    options: &WatchOptions,
    text: &str,
    publisher: Option<&dyn Publisher>,
    record_count: usize,
) -> Result<Delivery> {
    if options.dry_run {
        return Ok(Delivery::DryRun);
    }
    let Some(page) = options.report_page.as_deref() else {
        log::info!("no report page configured, keeping the local copy only");
        return Ok(Delivery::LocalOnly);
    };
    let Some(publisher) = publisher else {
        bail!("report page {page} is configured but no publisher is available");
    };
    publisher
        .update_content(page, text, &options.report_summary, false, true)
        .with_context(|| {
            format!("failed to publish report to {page}; {record_count} records remain in the dump")
        })?;
    log::info!("published report to {page}");
    Ok(Delivery::Published {
        page: page.to_string(),
    })
}

/// Rebuild the report from the pending dump without scanning.
pub fn rebuild_report(
    paths: &ResolvedPaths,
    config: &WatchConfig,
    generated_at: DateTime<Utc>,
) -> Result<(String, usize)> {
    let accumulator = ChangeAccumulator::new(&paths.dump_path);
    let count = accumulator.restore();
    let records = accumulator.drain_all();
    let text = report::build(
        &records,
        &ReportHeader::from_dump(&records, generated_at),
        config.wiki_url().as_deref(),
    );
    write_text_file(&paths.report_path, &text, true)?;
    Ok((text, count))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchState {
    pub checkpoints: usize,
    pub pending_records: usize,
}

pub fn inspect_state(paths: &ResolvedPaths, config: &WatchConfig) -> WatchState {
    let horizon = horizon_from(Utc::now(), config.watch.oldest_days);
    let checkpoints = CheckpointStore::load(&paths.checkpoint_path, horizon);
    let accumulator = ChangeAccumulator::new(&paths.dump_path);
    WatchState {
        checkpoints: checkpoints.len(),
        pending_records: accumulator.restore(),
    }
}

/// Drop every checkpoint so the next scan starts from the horizon again.
pub fn reset_checkpoints(paths: &ResolvedPaths, config: &WatchConfig) -> Result<usize> {
    let horizon = horizon_from(Utc::now(), config.watch.oldest_days);
    CheckpointStore::load(&paths.checkpoint_path, horizon).reset()
}
