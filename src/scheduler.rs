//! The scan loop: fetch, detect and parse every active source in turn, then
//! hand each parsed source to a background import.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

use crate::cache::{Cache, MemoryCache};
use crate::config::Config;
use crate::feed::{detect_format, parse_source, FeedError, FeedFetcher};
use crate::ingest::{ImageResolver, ImportError, ImportReport, ImportWorker};
use crate::storage::{CategoryServer, CategoryStore, ContentStore, Source, StoreError};

// ============================================================================
// Error Types
// ============================================================================

/// Failures that end a scan run.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A source's feed was of a known kind but could not be interpreted.
    /// One such source aborts the whole run.
    #[error("Scan aborted by source '{source_name}': {error}")]
    SourceScan {
        source_name: String,
        #[source]
        error: FeedError,
    },

    #[error("Failed to list sources: {0}")]
    Store(#[from] StoreError),
}

// ============================================================================
// Context
// ============================================================================

/// Everything a scan run needs, built once and shared by reference.
pub struct ScanContext {
    pub config: Config,
    pub client: reqwest::Client,
    pub store: Arc<dyn ContentStore>,
    pub categories: CategoryServer,
}

impl ScanContext {
    /// Build a context with a fresh HTTP client and an in-memory cache.
    pub fn new(
        config: Config,
        store: Arc<dyn ContentStore>,
        category_store: Arc<dyn CategoryStore>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("reaper/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::with_ttl(config.category_cache_ttl()));
        Ok(Self::with_parts(config, client, store, category_store, cache))
    }

    /// Build a context from existing parts. `cache` backs the category
    /// snapshot served to every import.
    pub fn with_parts(
        config: Config,
        client: reqwest::Client,
        store: Arc<dyn ContentStore>,
        category_store: Arc<dyn CategoryStore>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        Self {
            config,
            client,
            store,
            categories: CategoryServer::new(category_store, cache),
        }
    }

    fn fetcher(&self) -> FeedFetcher {
        FeedFetcher::new(self.client.clone(), self.config.request_timeout())
    }

    fn worker(&self) -> ImportWorker {
        let images = ImageResolver::from_config(self.client.clone(), &self.config);
        ImportWorker::new(Arc::clone(&self.store), self.categories.clone(), images)
            .propagate_persistence_errors(self.config.propagate_persistence_errors)
    }
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub cycles: u64,
    pub sources_fetched: u64,
    pub sources_skipped: u64,
    pub imports_launched: u64,
    pub imports_completed: u64,
    pub imports_failed: u64,
    pub items_persisted: u64,
}

/// What to do after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Wait this long before the next cycle.
    Sleep(Duration),
    /// The cycle ran over the interval by this much; start again at once.
    Overrun(Duration),
}

pub fn pacing(elapsed: Duration, interval: Duration) -> Pacing {
    if elapsed > interval {
        Pacing::Overrun(elapsed - interval)
    } else {
        Pacing::Sleep(interval - elapsed)
    }
}

type ImportResult = Result<ImportReport, ImportError>;

pub struct ScanScheduler {
    context: Arc<ScanContext>,
    state: Mutex<SchedulerState>,
    stop_requested: AtomicBool,
    wake: Notify,
}

impl ScanScheduler {
    pub fn new(context: Arc<ScanContext>) -> Self {
        Self {
            context,
            state: Mutex::new(SchedulerState::Idle),
            stop_requested: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Ask the loop to finish after the current cycle.
    ///
    /// An in-flight cycle and any running imports are not interrupted; a
    /// pacing sleep is cut short.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Run cycles until [`stop`](Self::stop) is called or a source
    /// escalates an error.
    ///
    /// Imports launched by earlier cycles are not awaited before the next
    /// cycle begins; they are reaped as they finish and drained before this
    /// returns, including after a fatal error.
    pub async fn start(&self) -> Result<ScanSummary, ScanError> {
        self.set_state(SchedulerState::Running);
        let interval = self.context.config.scan_interval();
        let mut imports = JoinSet::new();
        let mut summary = ScanSummary::default();

        let outcome = loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                break Ok(());
            }

            let started = Instant::now();
            if let Err(e) = self.scan_cycle(&mut imports, &mut summary).await {
                break Err(e);
            }
            summary.cycles += 1;
            reap_finished(&mut imports, &mut summary);

            match pacing(started.elapsed(), interval) {
                Pacing::Sleep(remaining) => {
                    if self.context.config.debug {
                        tracing::debug!(
                            cycle = summary.cycles,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            sleep_ms = remaining.as_millis() as u64,
                            "Waiting for next scan cycle"
                        );
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(remaining) => {}
                        _ = self.wake.notified() => {}
                    }
                }
                Pacing::Overrun(over) => {
                    tracing::warn!(
                        cycle = summary.cycles,
                        interval_secs = interval.as_secs(),
                        overrun_ms = over.as_millis() as u64,
                        "Scan cycle took longer than the interval"
                    );
                }
            }
        };

        drain_imports(&mut imports, &mut summary).await;
        self.set_state(SchedulerState::Stopped);

        match outcome {
            Ok(()) => {
                tracing::info!(
                    cycles = summary.cycles,
                    items = summary.items_persisted,
                    "Scanner stopped"
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!(error = %e, "Scan run aborted");
                Err(e)
            }
        }
    }

    /// A single cycle, waiting for its imports to finish.
    pub async fn run_once(&self) -> Result<ScanSummary, ScanError> {
        let mut imports = JoinSet::new();
        let mut summary = ScanSummary::default();

        let outcome = self.scan_cycle(&mut imports, &mut summary).await;
        drain_imports(&mut imports, &mut summary).await;
        outcome?;

        summary.cycles = 1;
        Ok(summary)
    }

    async fn scan_cycle(
        &self,
        imports: &mut JoinSet<ImportResult>,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        let started = Instant::now();
        let sources = self.context.store.list_active_sources().await?;
        let fetcher = self.context.fetcher();
        let (mut fetched, mut skipped) = (0u64, 0u64);

        for mut source in sources {
            match self.scan_source(&fetcher, &mut source).await {
                Ok(true) => {
                    fetched += 1;
                    let worker = self.context.worker();
                    imports.spawn(async move { worker.import(source).await });
                    summary.imports_launched += 1;
                }
                Ok(false) => skipped += 1,
                Err(error) => {
                    tracing::error!(source = %source.name, url = %source.feed_url, error = %error, "Unrecoverable feed error");
                    summary.sources_fetched += fetched;
                    summary.sources_skipped += skipped;
                    return Err(ScanError::SourceScan {
                        source_name: source.name,
                        error,
                    });
                }
            }
        }

        summary.sources_fetched += fetched;
        summary.sources_skipped += skipped;

        if self.context.config.debug {
            tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Scan cycle timing");
        }
        tracing::info!(fetched = fetched, skipped = skipped, "Scan cycle complete");
        Ok(())
    }

    /// Fetch, detect and parse one source. `Ok(false)` means the source is
    /// skipped this cycle.
    async fn scan_source(&self, fetcher: &FeedFetcher, source: &mut Source) -> Result<bool, FeedError> {
        if !fetcher.retrieve(source, self.context.store.as_ref()).await {
            return Ok(false);
        }
        let Some(document) = source.latest_document.as_ref() else {
            return Ok(false);
        };

        let Some(format) = detect_format(document.root(), &source.feed_url)? else {
            return Ok(false);
        };
        source.feed_format = Some(format);

        let count = parse_source(source)?;
        source.latest_document = None;
        tracing::debug!(source = %source.name, format = %format, candidates = count, "Parsed feed");
        Ok(true)
    }
}

fn record_import(summary: &mut ScanSummary, joined: Result<ImportResult, JoinError>) {
    match joined {
        Ok(Ok(report)) => {
            summary.imports_completed += 1;
            summary.items_persisted += report.persisted as u64;
        }
        Ok(Err(e)) => {
            summary.imports_failed += 1;
            tracing::error!(error = %e, "Import stopped early");
        }
        Err(e) => {
            summary.imports_failed += 1;
            tracing::error!(error = %e, "Import task failed");
        }
    }
}

fn reap_finished(imports: &mut JoinSet<ImportResult>, summary: &mut ScanSummary) {
    while let Some(joined) = imports.try_join_next() {
        record_import(summary, joined);
    }
}

async fn drain_imports(imports: &mut JoinSet<ImportResult>, summary: &mut ScanSummary) {
    while let Some(joined) = imports.join_next().await {
        record_import(summary, joined);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::{FakeCategoryStore, RecordingStore};
    use crate::storage::{Category, SourceStatus};
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Example</title>
  <item><title>Rust 2024</title><link>https://example.com/rust</link>
    <description>All about rust</description><pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate></item>
  <item><title>Weather</title><link>https://example.com/weather</link>
    <description>Rain again</description></item>
</channel></rss>"#;

    fn scheduler(store: Arc<RecordingStore>, config: Config) -> ScanScheduler {
        let categories = Arc::new(FakeCategoryStore::new(vec![
            Category::new(1, "General"),
            Category::new(2, "Tech").with_tags(["rust"]),
        ]));
        let context = ScanContext::new(config, store, categories).unwrap();
        ScanScheduler::new(Arc::new(context))
    }

    fn source(id: i64, server: &MockServer, route: &str) -> Source {
        Source {
            id,
            ..Source::new(
                &format!("source-{}", id),
                &server.uri(),
                &format!("{}{}", server.uri(), route),
            )
        }
    }

    async fn serve(server: &MockServer, route: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_pacing_sleeps_for_remainder() {
        assert_eq!(
            pacing(Duration::from_secs(40), Duration::from_secs(60)),
            Pacing::Sleep(Duration::from_secs(20))
        );
    }

    #[test]
    fn test_pacing_overrun_starts_immediately() {
        assert_eq!(
            pacing(Duration::from_secs(75), Duration::from_secs(60)),
            Pacing::Overrun(Duration::from_secs(15))
        );
        assert_eq!(
            pacing(Duration::from_secs(60), Duration::from_secs(60)),
            Pacing::Sleep(Duration::ZERO)
        );
    }

    #[tokio::test]
    async fn test_run_once_imports_parsed_sources() {
        let server = MockServer::start().await;
        serve(&server, "/feed", 200, RSS).await;
        let store = Arc::new(RecordingStore::with_sources(vec![source(1, &server, "/feed")]));

        let summary = scheduler(Arc::clone(&store), Config::default())
            .run_once()
            .await
            .unwrap();

        assert_eq!(
            summary,
            ScanSummary {
                cycles: 1,
                sources_fetched: 1,
                sources_skipped: 0,
                imports_launched: 1,
                imports_completed: 1,
                imports_failed: 0,
                items_persisted: 2,
            }
        );
        let saved = store.saved();
        let categories: Vec<_> = saved.iter().map(|i| i.category_name()).collect();
        assert_eq!(categories, vec![Some("Tech"), Some("General")]);
    }

    #[tokio::test]
    async fn test_unusable_sources_are_skipped() {
        let server = MockServer::start().await;
        serve(&server, "/down", 500, "").await;
        serve(&server, "/html", 200, "<html><body>not a feed</body></html>").await;
        serve(&server, "/feed", 200, RSS).await;
        let store = Arc::new(RecordingStore::with_sources(vec![
            source(1, &server, "/down"),
            source(2, &server, "/html"),
            source(3, &server, "/feed"),
        ]));

        let summary = scheduler(Arc::clone(&store), Config::default())
            .run_once()
            .await
            .unwrap();

        assert_eq!(summary.sources_skipped, 2);
        assert_eq!(summary.sources_fetched, 1);
        assert_eq!(store.health_updates(), vec![(1, SourceStatus::New, 1)]);
        assert_eq!(store.saved().len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_version_aborts_the_run() {
        let server = MockServer::start().await;
        serve(&server, "/feed", 200, RSS).await;
        serve(&server, "/future", 200, r#"<rss version="3.0"><channel/></rss>"#).await;
        Mock::given(method("GET"))
            .and(path("/never"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .expect(0)
            .mount(&server)
            .await;
        let store = Arc::new(RecordingStore::with_sources(vec![
            source(1, &server, "/feed"),
            source(2, &server, "/future"),
            source(3, &server, "/never"),
        ]));
        let scheduler = scheduler(Arc::clone(&store), Config::default());

        let result = scheduler.start().await;

        match result {
            Err(ScanError::SourceScan { source_name, error }) => {
                assert_eq!(source_name, "source-2");
                assert!(matches!(error, FeedError::Format { .. }));
            }
            other => panic!("expected escalation, got {:?}", other),
        }
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        // The import launched before the failure still ran to completion
        assert_eq!(store.saved().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_channel_aborts_the_run() {
        let server = MockServer::start().await;
        serve(&server, "/feed", 200, r#"<rss version="2.0"><item/></rss>"#).await;
        let store = Arc::new(RecordingStore::with_sources(vec![source(1, &server, "/feed")]));

        let result = scheduler(store, Config::default()).run_once().await;
        assert!(matches!(
            result,
            Err(ScanError::SourceScan {
                error: FeedError::Contents { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_source_listing_failure_ends_run() {
        let store = Arc::new(RecordingStore::failing_source_listing());
        let result = scheduler(store, Config::default()).start().await;
        assert!(matches!(result, Err(ScanError::Store(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_follow_interval_until_stopped() {
        let store = Arc::new(RecordingStore::default());
        let config = Config {
            scan_interval_seconds: 60,
            ..Config::default()
        };
        let scheduler = Arc::new(scheduler(store, config));
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        let running = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.start().await })
        };

        // Cycles at t=0, 60 and 120; the stop at t=150 cuts the next wait short
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(scheduler.state(), SchedulerState::Running);
        scheduler.stop();

        let summary = running.await.unwrap().unwrap();
        assert_eq!(summary.cycles, 3);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_before_start_runs_no_cycle() {
        let store = Arc::new(RecordingStore::default());
        let scheduler = scheduler(Arc::clone(&store), Config::default());
        scheduler.stop();

        let summary = scheduler.start().await.unwrap();
        assert_eq!(summary.cycles, 0);
    }

    #[tokio::test]
    async fn test_supplied_cache_backs_category_snapshot() {
        let categories = Arc::new(FakeCategoryStore::new(vec![Category::new(1, "General")]));
        let cache = Arc::new(MemoryCache::with_ttl(Duration::from_secs(60)));
        let context = ScanContext::with_parts(
            Config::default(),
            reqwest::Client::new(),
            Arc::new(RecordingStore::default()),
            Arc::clone(&categories) as Arc<dyn CategoryStore>,
            Arc::clone(&cache) as Arc<dyn Cache>,
        );

        assert!(cache.categories().is_none());
        assert_eq!(context.categories.snapshot().await.len(), 1);
        assert_eq!(cache.categories().map(|s| s.len()), Some(1));

        context.categories.snapshot().await;
        assert_eq!(categories.list_calls(), 1);
    }
}
