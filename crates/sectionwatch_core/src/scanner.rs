//! Pipeline driver: streams category members through a bounded set of workers,
//! diffs the revisions bracketing each page's checkpoint and records what changed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::accumulator::{ChangeAccumulator, ChangeRecord};
use crate::checkpoint::CheckpointStore;
use crate::config::{
    DEFAULT_CATEGORY, DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_FLUSH_THRESHOLD,
    DEFAULT_MAX_PARALLELISM, WatchConfig,
};
use crate::diff::SectionDiffEngine;
use crate::mediawiki::{PageMetadata, PageSource, RevisionFetcher, RevisionSnapshot};
use crate::narrative::PriorityPolicy;
use crate::pool::EnginePool;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub category: String,
    pub max_parallelism: usize,
    pub flush_interval: Duration,
    pub flush_threshold: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

impl ScanOptions {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            category: config.watch.category.clone(),
            max_parallelism: config.watch.max_parallelism,
            flush_interval: Duration::from_secs(config.watch.flush_interval_secs),
            flush_threshold: config.watch.flush_threshold,
        }
    }
}

/// Counters for a single scan run.
#[derive(Debug)]
pub struct ScanContext {
    started_at: DateTime<Utc>,
    examined: AtomicUsize,
    changed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl ScanContext {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            examined: AtomicUsize::new(0),
            changed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            started_at: self.started_at,
            finished_at: Utc::now(),
            examined: self.examined.load(Ordering::Relaxed),
            changed: self.changed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &PageOutcome) {
        self.examined.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            PageOutcome::Changed => &self.changed,
            PageOutcome::Redirect | PageOutcome::UpToDate => &self.skipped,
            PageOutcome::NothingTracked => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.examined.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for ScanContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub examined: usize,
    pub changed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageOutcome {
    Redirect,
    UpToDate,
    NothingTracked,
    Changed,
}

pub struct Scanner<'a, E> {
    source: &'a dyn PageSource,
    fetcher: &'a dyn RevisionFetcher,
    engines: &'a EnginePool<E>,
    checkpoints: &'a CheckpointStore,
    accumulator: &'a ChangeAccumulator,
    policy: &'a PriorityPolicy,
    options: ScanOptions,
}

impl<'a, E> Scanner<'a, E>
where
    E: SectionDiffEngine + Send,
{
    pub fn new(
        source: &'a dyn PageSource,
        fetcher: &'a dyn RevisionFetcher,
        engines: &'a EnginePool<E>,
        checkpoints: &'a CheckpointStore,
        accumulator: &'a ChangeAccumulator,
        policy: &'a PriorityPolicy,
        options: ScanOptions,
    ) -> Self {
        Self {
            source,
            fetcher,
            engines,
            checkpoints,
            accumulator,
            policy,
            options,
        }
    }

    /// Scan every member of the configured category.
    ///
    /// Per-page failures are logged and counted; enumeration failure aborts the
    /// run and is returned. A background flusher persists progress meanwhile.
    pub fn run(&self, context: &ScanContext) -> Result<ScanSummary> {
        let workers = self.options.max_parallelism.max(1);
        log::info!(
            "scanning {} with {workers} workers",
            self.options.category
        );

        let (page_tx, page_rx) = bounded::<PageMetadata>(workers * 2);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let abort = AtomicBool::new(false);

        let enumeration = thread::scope(|scope| {
            let flusher = scope.spawn(|| self.run_flusher(shutdown_rx));
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let worker_rx = page_rx.clone();
                    let abort = &abort;
                    scope.spawn(move || self.run_worker(worker_rx, abort, context))
                })
                .collect();
            drop(page_rx);

            let enumeration = self.feed(page_tx, &abort);

            for handle in handles {
                if handle.join().is_err() {
                    log::error!("scan worker panicked");
                }
            }
            let _ = shutdown_tx.send(());
            if flusher.join().is_err() {
                log::error!("checkpoint flusher panicked");
            }
            enumeration
        });

        let summary = context.summary();
        enumeration?;
        log::info!(
            "scan finished: examined={} changed={} skipped={} failed={}",
            summary.examined,
            summary.changed,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    fn feed(&self, page_tx: Sender<PageMetadata>, abort: &AtomicBool) -> Result<()> {
        for item in self.source.category_pages(&self.options.category) {
            match item {
                Ok(page) => {
                    if page_tx.send(page).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    abort.store(true, Ordering::SeqCst);
                    log::error!("page enumeration failed: {error:#}");
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    fn run_worker(
        &self,
        page_rx: Receiver<PageMetadata>,
        abort: &AtomicBool,
        context: &ScanContext,
    ) {
        for page in page_rx.iter() {
            if abort.load(Ordering::SeqCst) {
                continue;
            }
            match self.process_page(&page) {
                Ok(outcome) => {
                    log::debug!("{}: {:?}", page.title, outcome);
                    context.record(&outcome);
                }
                Err(error) => {
                    log::warn!("{}: skipped after error: {error:#}", page.title);
                    context.record_failure();
                }
            }
        }
    }

    fn process_page(&self, page: &PageMetadata) -> Result<PageOutcome> {
        if page.is_redirect {
            return Ok(PageOutcome::Redirect);
        }

        let checkpoint = self.checkpoints.get_or_init(&page.title);
        if page.latest_revision_at <= checkpoint {
            return Ok(PageOutcome::UpToDate);
        }

        let checked_at = Utc::now();
        let (older, newer) = self.fetch_pair(&page.title, checkpoint)?;
        if newer.revision_id < page.latest_revision_id {
            bail!(
                "{} lists revision {} but the newest fetched is {}",
                page.title,
                page.latest_revision_id,
                newer.revision_id
            );
        }

        let diffs = {
            let mut engine = self.engines.acquire();
            engine.compare(&older.content, &newer.content)?
        };

        let outcome = match self.policy.summarize(&diffs) {
            Some(narrative) => {
                self.accumulator.add(ChangeRecord {
                    title: page.title.clone(),
                    narrative: narrative.text,
                    priority: narrative.priority,
                    revision_id1: older.revision_id,
                    revision_time1: older.timestamp,
                    revision_id2: newer.revision_id,
                    revision_time2: newer.timestamp,
                    detected_at: checked_at,
                });
                PageOutcome::Changed
            }
            None => PageOutcome::NothingTracked,
        };

        self.checkpoints.advance(&page.title, checked_at);
        Ok(outcome)
    }

    /// Fetch the newest revision and the newest one at or before `checkpoint` together.
    fn fetch_pair(
        &self,
        title: &str,
        checkpoint: DateTime<Utc>,
    ) -> Result<(RevisionSnapshot, RevisionSnapshot)> {
        let (older, newer) = thread::scope(|scope| {
            let older = scope.spawn(|| self.fetcher.fetch_revision(title, Some(checkpoint)));
            let newer = self.fetcher.fetch_revision(title, None);
            let older = older
                .join()
                .map_err(|_| anyhow!("revision fetch for {title} panicked"))?;
            Ok::<_, anyhow::Error>((older, newer))
        })?;

        let Some(newer) = newer? else {
            bail!("{title} has no revisions");
        };
        let older = older?.unwrap_or_else(|| RevisionSnapshot::empty_baseline(checkpoint));
        Ok((older, newer))
    }

    fn run_flusher(&self, shutdown: Receiver<()>) {
        loop {
            match shutdown.recv_timeout(self.options.flush_interval) {
                Err(RecvTimeoutError::Timeout) => {
                    self.flush_if_due();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// Persist records and checkpoints when enough new records arrived since the last flush.
    ///
    /// Workers add a page's record before advancing its checkpoint. Checkpoints
    /// are snapshotted before the records are written, so a saved checkpoint
    /// never gets ahead of the dump.
    pub fn flush_if_due(&self) -> bool {
        let pending = self.accumulator.pending_since_flush();
        if pending <= self.options.flush_threshold {
            return false;
        }
        let flushed = self.checkpoints.save_after(|| {
            let count = self.accumulator.persist()?;
            log::info!("flushed {count} change records");
            Ok(())
        });
        if let Err(error) = flushed {
            log::warn!("flush failed: {error:#}");
            return false;
        }
        true
    }
}
