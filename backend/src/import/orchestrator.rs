//! Import orchestrator: feed URL in, stored link sets and an [`ImportRun`] out.
//!
//! ```text
//! feed URL ──▶ fetch ──▶ parse ──▶ refresh resolver ──▶ for each row: build ──▶ store.set
//!    │           │         │                        │
//!    ▼           ▼         ▼                        ▼
//! invalid     fetch     empty /               row error:
//! (abort)     failed    truncated             count + continue
//!             (abort)   (no-op)
//! ```
//!
//! Every path ends with the feed pointer cleared (when it still holds the
//! consumed URL) and the run recorded in the history. Nothing in here returns
//! an error: feed and row failures become the run's outcome and counts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::Instrument;

use super::builder::{build, parse_absolute_url};
use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::error::{FeedError, RowError};
use crate::fetch::FeedFetcher;
use crate::models::{ImportRun, RunOutcome};
use crate::parser::parse;
use crate::resolver::UrlResolver;
use crate::store::{FeedPointer, MetadataStore, OptionStore};

/// Default number of runs kept in the history
pub const DEFAULT_HISTORY: usize = 20;

/// Drives one import at a time against explicit capabilities.
pub struct ImportOrchestrator {
    fetcher: Arc<dyn FeedFetcher>,
    resolver: Arc<dyn UrlResolver>,
    store: Arc<dyn MetadataStore>,
    pointer: FeedPointer,
    running: AtomicBool,
    history: RunHistory,
}

impl ImportOrchestrator {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        resolver: Arc<dyn UrlResolver>,
        store: Arc<dyn MetadataStore>,
        options: Arc<dyn OptionStore>,
    ) -> Self {
        Self {
            fetcher,
            resolver,
            store,
            pointer: FeedPointer::new(options),
            running: AtomicBool::new(false),
            history: RunHistory::new(DEFAULT_HISTORY),
        }
    }

    /// Keep the last `capacity` runs.
    pub fn with_history(mut self, capacity: usize) -> Self {
        self.history = RunHistory::new(capacity);
        self
    }

    pub fn pointer(&self) -> &FeedPointer {
        &self.pointer
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    /// Whether a run currently holds the run guard.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Scheduler entry point: import the configured feed, if any.
    ///
    /// With no feed URL configured this is a no-op and nothing is recorded.
    pub async fn run_scheduled(&self) -> ImportRun {
        let feed_url = match self.pointer.get().await {
            Ok(url) => url,
            Err(e) => {
                log_error(format!("Cannot read configured feed URL: {}", e));
                return ImportRun::start("").finish(RunOutcome::NothingScheduled, Some(e.to_string()));
            }
        };

        if feed_url.is_empty() {
            tracing::debug!("no feed URL configured, nothing to import");
            return ImportRun::start("").finish(RunOutcome::NothingScheduled, None);
        }

        self.run(&feed_url).await
    }

    /// Import `feed_url`.
    ///
    /// Returns immediately with [`RunOutcome::AlreadyRunning`] if another run
    /// is in progress; that run owns the pointer, so it is left untouched.
    pub async fn run(&self, feed_url: &str) -> ImportRun {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            log_warning("An import is already running, trigger ignored");
            return ImportRun::start(feed_url).finish(RunOutcome::AlreadyRunning, None);
        };

        let run = ImportRun::start(feed_url);
        let span = tracing::info_span!("import", run = %run.id, feed = %feed_url);
        let run = self.execute(run).instrument(span).await;

        match self.pointer.clear_if(feed_url).await {
            Ok(true) => log_info("Feed URL cleared"),
            Ok(false) => {}
            Err(e) => log_error(format!("Failed to clear feed URL: {}", e)),
        }

        log_info(run.summary());
        self.history.record(run.clone());
        run
    }

    async fn execute(&self, mut run: ImportRun) -> ImportRun {
        log_info(format!("📥 Importing feed: {}", run.feed_url));

        let Some(url) = parse_absolute_url(&run.feed_url) else {
            let err = FeedError::InvalidFeedUrl(run.feed_url.clone());
            log_error(err.to_string());
            return run.finish(RunOutcome::InvalidFeedUrl, Some(err.to_string()));
        };

        let bytes = match self.fetcher.fetch(&url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = FeedError::from(e);
                log_error(err.to_string());
                return run.finish(err.outcome(), Some(err.to_string()));
            }
        };
        log_success(format!("Downloaded {} bytes", bytes.len()));

        let feed = match parse(&bytes) {
            Ok(feed) => feed,
            Err(err) => {
                let outcome = err.outcome();
                if outcome.is_failure() {
                    log_error(err.to_string());
                } else {
                    log_warning(format!("{}, nothing to import", err));
                }
                return run.finish(outcome, Some(err.to_string()));
            }
        };

        let codes: Vec<&str> = feed.languages.iter().map(|c| c.as_str()).collect();
        log_info(format!("Languages: {} (encoding {})", codes.join(", "), feed.encoding));
        run.languages = feed.languages.clone();

        if let Err(e) = self.resolver.refresh().await {
            log_warning(format!("Permalink table not reloaded, using the previous one: {}", e));
        }

        for row in feed.rows {
            run.counts.processed += 1;

            let built = match build(&feed.languages, &row, self.resolver.as_ref()) {
                Ok(built) => built,
                Err(err) => {
                    match &err {
                        RowError::UnresolvedItem { .. } => run.counts.skipped_unresolved += 1,
                        _ => run.counts.invalid += 1,
                    }
                    log_warning(err.to_string());
                    run.record_failure(err.line(), err.to_string());
                    continue;
                }
            };

            match self.store.set(built.item, &built.links).await {
                Ok(()) => {
                    run.counts.persisted += 1;
                    run.counts.dropped_links += built.dropped;
                    tracing::debug!(line = row.line, item = %built.item, languages = built.links.len(), "row stored");
                }
                Err(source) => {
                    let err = RowError::Store {
                        line: row.line,
                        item: built.item,
                        source,
                    };
                    run.counts.failed += 1;
                    log_error(err.to_string());
                    run.record_failure(err.line(), err.to_string());
                }
            }
        }

        if run.counts.persisted == run.counts.processed {
            log_success(format!("All {} rows stored", run.counts.persisted));
        } else {
            log_warning(format!(
                "{} of {} rows stored",
                run.counts.persisted, run.counts.processed
            ));
        }

        run.finish(RunOutcome::Completed, None)
    }
}

/// Holds the run-in-progress flag for the lifetime of a run.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Run History
// =============================================================================

/// Bounded history of finished runs.
pub struct RunHistory {
    capacity: usize,
    runs: Mutex<VecDeque<ImportRun>>,
}

impl RunHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            runs: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(&self, run: ImportRun) {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        if runs.len() == self.capacity {
            runs.pop_front();
        }
        runs.push_back(run);
    }

    pub fn latest(&self) -> Option<ImportRun> {
        self.runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .back()
            .cloned()
    }

    /// All retained runs, newest first.
    pub fn list(&self) -> Vec<ImportRun> {
        self.runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .cloned()
            .collect()
    }
}
