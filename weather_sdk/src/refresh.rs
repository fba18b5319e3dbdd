//! Background refresh loop for polling-mode clients.
//!
//! Periodically re-fetches every city currently in the cache and replaces
//! its entry. A failure for one city is logged and skipped; it never stops
//! the loop or affects the other cities.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::WeatherCache;
use crate::clock::Clock;
use crate::fetcher::Fetcher;

/// Default pause between refresh passes (10 minutes).
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(600_000);

/// How long [`RefreshHandle::stop`] waits for the task before aborting it.
pub const STOP_GRACE: Duration = Duration::from_secs(1);

/// Atomic counters describing refresh activity.
#[derive(Debug, Default)]
pub struct RefreshStats {
    cycles: AtomicU64,
    refreshed: AtomicU64,
    failed: AtomicU64,
}

impl RefreshStats {
    fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    fn record_refreshed(&self) {
        self.refreshed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the current counters.
    pub fn summary(&self) -> RefreshSummary {
        RefreshSummary {
            cycles: self.cycles.load(Ordering::Relaxed),
            refreshed: self.refreshed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of [`RefreshStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Completed passes over the cached cities.
    pub cycles: u64,
    /// Entries successfully replaced.
    pub refreshed: u64,
    /// Per-city fetch failures.
    pub failed: u64,
}

/// Refresh loop configuration, consumed by [`Refresher::spawn`].
pub struct Refresher {
    cache: Arc<WeatherCache>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    stats: Arc<RefreshStats>,
}

impl Refresher {
    pub fn new(
        cache: Arc<WeatherCache>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            cache,
            fetcher,
            clock,
            interval,
            stats: Arc::new(RefreshStats::default()),
        }
    }

    /// Spawns the loop on the current Tokio runtime. The first pass runs
    /// immediately, then one pass per `interval`.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(self) -> RefreshHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::clone(&self.stats);
        let task = tokio::spawn(self.run(shutdown_rx));
        RefreshHandle {
            shutdown_tx,
            task: Some(task),
            stats,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!("Refresh loop started, interval {:?}", self.interval);
        loop {
            if is_stopped(&shutdown) {
                break;
            }
            if !self.refresh_all(&mut shutdown).await {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => break,
            }
        }
        tracing::debug!("Refresh loop stopped");
    }

    /// One pass over the cached cities. Returns `false` if stopped mid-pass.
    async fn refresh_all(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let cities = self.cache.keys();
        for city in cities {
            let result = tokio::select! {
                result = self.fetcher.fetch(&city) => result,
                _ = shutdown.changed() => return false,
            };
            if is_stopped(shutdown) {
                return false;
            }

            match result {
                Ok(snapshot) => {
                    if self.cache.replace(&city, snapshot, self.clock.now()) {
                        self.stats.record_refreshed();
                    } else {
                        tracing::debug!("{} left the cache during refresh, skipping", city);
                    }
                }
                Err(e) => {
                    self.stats.record_failed();
                    tracing::warn!("Failed to refresh weather for {}: {}", city, e);
                }
            }
        }
        self.stats.record_cycle();
        true
    }
}

fn is_stopped(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Handle for a running refresh loop.
///
/// Dropping the handle without calling [`stop`](RefreshHandle::stop)
/// signals the loop and aborts the task.
pub struct RefreshHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    stats: Arc<RefreshStats>,
}

impl RefreshHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn stats(&self) -> Arc<RefreshStats> {
        Arc::clone(&self.stats)
    }

    /// Signals the loop to stop and waits up to `grace` for it to exit,
    /// aborting the task if it does not.
    pub async fn stop(mut self, grace: Duration) {
        let _ = self.shutdown_tx.send(true);
        let Some(mut task) = self.task.take() else {
            return;
        };

        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Refresh task ended abnormally: {}", e),
            Err(_) => {
                tracing::warn!("Refresh task did not stop within {:?}, aborting", grace);
                task.abort();
            }
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use openweather_api::WeatherSnapshot;
    use std::sync::atomic::AtomicUsize;

    const START: i64 = 1_700_000_000;

    fn snapshot(name: &str) -> WeatherSnapshot {
        WeatherSnapshot {
            name: name.to_string(),
            weather: None,
            temperature: None,
            visibility: 10_000,
            wind: None,
            datetime: START,
            sys: None,
            timezone: 0,
        }
    }

    /// Answers with a snapshot named after the call number; cities listed in
    /// `failing` get a 404.
    struct ScriptedFetcher {
        calls: AtomicUsize,
        failing: Vec<String>,
    }

    impl ScriptedFetcher {
        fn new(failing: &[&str]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failing: failing.iter().map(|c| c.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, city: &str) -> Result<WeatherSnapshot, openweather_api::Error> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.iter().any(|c| c == city) {
                return Err(openweather_api::Error::HttpStatus {
                    status: 404,
                    message: "city not found".to_string(),
                });
            }
            Ok(snapshot(&format!("{}#{}", city, n)))
        }
    }

    /// Never answers.
    struct HangingFetcher;

    #[async_trait]
    impl Fetcher for HangingFetcher {
        async fn fetch(&self, _city: &str) -> Result<WeatherSnapshot, openweather_api::Error> {
            std::future::pending().await
        }
    }

    fn setup(fetcher: Arc<dyn Fetcher>) -> (Arc<WeatherCache>, Arc<ManualClock>, Refresher) {
        let clock = Arc::new(ManualClock::new(START));
        let cache = Arc::new(WeatherCache::new(clock.clone()));
        let refresher = Refresher::new(
            Arc::clone(&cache),
            fetcher,
            clock.clone(),
            Duration::from_secs(60),
        );
        (cache, clock, refresher)
    }

    #[tokio::test]
    async fn pass_replaces_entries_with_fresh_timestamps() {
        let fetcher = Arc::new(ScriptedFetcher::new(&[]));
        let (cache, clock, refresher) = setup(fetcher.clone());
        cache.put("London", snapshot("London"), START);
        clock.advance(500);

        let (_tx, mut rx) = watch::channel(false);
        assert!(refresher.refresh_all(&mut rx).await);

        let entry = cache.get("London").unwrap();
        assert_eq!(entry.captured_at(), START + 500);
        assert_eq!(entry.snapshot().name, "London#0");
        assert_eq!(refresher.stats.summary().refreshed, 1);
        assert_eq!(refresher.stats.summary().cycles, 1);
    }

    #[tokio::test]
    async fn one_failing_city_does_not_block_others() {
        let fetcher = Arc::new(ScriptedFetcher::new(&["Atlantis"]));
        let (cache, clock, refresher) = setup(fetcher.clone());
        cache.put("Atlantis", snapshot("Atlantis"), START);
        cache.put("Paris", snapshot("Paris"), START);
        cache.put("Rome", snapshot("Rome"), START);
        clock.advance(100);

        let (_tx, mut rx) = watch::channel(false);
        assert!(refresher.refresh_all(&mut rx).await);

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.get("Paris").unwrap().captured_at(), START + 100);
        assert_eq!(cache.get("Rome").unwrap().captured_at(), START + 100);
        // failed city keeps its previous entry
        let atlantis = cache.get("Atlantis").unwrap();
        assert_eq!(atlantis.captured_at(), START);
        assert_eq!(atlantis.snapshot().name, "Atlantis");

        let summary = refresher.stats.summary();
        assert_eq!(summary.refreshed, 2);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn refresh_never_adds_or_evicts_keys() {
        let fetcher = Arc::new(ScriptedFetcher::new(&[]));
        let (cache, _clock, refresher) = setup(fetcher);
        for i in 0..12 {
            cache.put(&format!("City{}", i), snapshot("x"), START);
        }

        let (_tx, mut rx) = watch::channel(false);
        refresher.refresh_all(&mut rx).await;

        assert_eq!(cache.len(), 12);
    }

    #[tokio::test]
    async fn empty_cache_makes_no_calls() {
        let fetcher = Arc::new(ScriptedFetcher::new(&[]));
        let (_cache, _clock, refresher) = setup(fetcher.clone());

        let handle = refresher.spawn();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.is_running());
        handle.stop(STOP_GRACE).await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_refreshes_every_interval() {
        let fetcher = Arc::new(ScriptedFetcher::new(&[]));
        let (cache, _clock, refresher) = setup(fetcher.clone());
        cache.put("London", snapshot("London"), START);

        let handle = refresher.spawn();
        // first pass runs immediately
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);

        let stats = handle.stats();
        handle.stop(STOP_GRACE).await;
        assert_eq!(stats.summary().cycles, 2);
    }

    #[tokio::test]
    async fn stop_interrupts_sleep_promptly() {
        let fetcher = Arc::new(ScriptedFetcher::new(&[]));
        let (cache, _clock, refresher) = setup(fetcher.clone());
        cache.put("London", snapshot("London"), START);

        let handle = refresher.spawn();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        handle.stop(STOP_GRACE).await;
        assert!(started.elapsed() < STOP_GRACE);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_abandons_in_flight_fetch() {
        let (cache, _clock, refresher) = setup(Arc::new(HangingFetcher));
        cache.put("London", snapshot("London"), START);

        let handle = refresher.spawn();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.is_running());

        let started = std::time::Instant::now();
        handle.stop(STOP_GRACE).await;
        assert!(started.elapsed() < STOP_GRACE);
        assert_eq!(cache.get("London").unwrap().captured_at(), START);
    }

    #[tokio::test]
    async fn stopped_signal_skips_cache_write() {
        let fetcher = Arc::new(ScriptedFetcher::new(&[]));
        let (cache, clock, refresher) = setup(fetcher.clone());
        cache.put("London", snapshot("London"), START);
        clock.advance(100);

        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        // the pending change is observed before the fetch result is written
        assert!(!refresher.refresh_all(&mut rx).await);
        assert_eq!(cache.get("London").unwrap().captured_at(), START);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_aborts_task() {
        let fetcher = Arc::new(ScriptedFetcher::new(&[]));
        let (cache, _clock, refresher) = setup(fetcher.clone());
        cache.put("London", snapshot("London"), START);

        let handle = refresher.spawn();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        drop(handle);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }
}
