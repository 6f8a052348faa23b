//! Locally persisted market-index series.
//!
//! The whole history lives in one CSV file (`date,value`). A request whose window is not covered
//! (file starts more than 10 days after the window start, or ends more than 5 days before the
//! window end) triggers a full re-download. A failed download falls back to whatever is on disk;
//! with nothing on disk the result is empty, which callers treat as "no comparison available".
//! The in-memory copy is re-read whenever the file's modification time changes, so a refresh made
//! by another process (the worker) is picked up without a restart.

pub mod fetch;
pub mod file;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::domain::market::PricePoint;
use crate::time::Clock;

pub use fetch::{BenchmarkFetcher, YahooChartFetcher};

const START_TOLERANCE_DAYS: i64 = 10;
const END_TOLERANCE_DAYS: i64 = 5;
const DEFAULT_RETRY_COOLDOWN_MINS: i64 = 60;

pub struct BenchmarkCache {
    path: PathBuf,
    fetcher: Arc<dyn BenchmarkFetcher>,
    clock: Arc<dyn Clock>,
    retry_cooldown: Duration,
    state: tokio::sync::Mutex<State>,
}

#[derive(Default)]
struct State {
    series: Option<Vec<PricePoint>>,
    loaded_mtime: Option<SystemTime>,
    last_download_attempt: Option<DateTime<Utc>>,
}

impl BenchmarkCache {
    pub fn new(path: PathBuf, fetcher: Arc<dyn BenchmarkFetcher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path,
            fetcher,
            clock,
            retry_cooldown: Duration::minutes(DEFAULT_RETRY_COOLDOWN_MINS),
            state: tokio::sync::Mutex::new(State::default()),
        }
    }

    /// Yahoo chart fetcher for the configured symbol, persisted under the data dir.
    pub fn from_settings(settings: &crate::config::Settings, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let fetcher = YahooChartFetcher::from_settings(settings)?;
        Ok(Self::new(settings.benchmark_path(), Arc::new(fetcher), clock))
    }

    /// Minimum spacing between download attempts, so a window the provider can never cover does
    /// not re-download on every request.
    pub fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.retry_cooldown = cooldown;
        self
    }

    pub fn symbol(&self) -> &str {
        self.fetcher.symbol()
    }

    /// Benchmark points within `[start, end]`, ascending. Empty when no series is available.
    pub async fn get_benchmark(&self, start: NaiveDate, end: NaiveDate) -> Vec<PricePoint> {
        let mut state = self.state.lock().await;

        self.sync_with_disk(&mut state);

        let needs_download = match state.series.as_deref() {
            None | Some([]) => true,
            Some(series) => !covers(series, start, end),
        };

        if needs_download && self.may_attempt(&state) {
            state.last_download_attempt = Some(self.clock.now());
            match self.download().await {
                Ok(series) => self.adopt(&mut state, series),
                Err(err) => {
                    tracing::warn!(
                        symbol = self.symbol(),
                        error = %err,
                        has_local_copy = state.series.as_ref().is_some_and(|s| !s.is_empty()),
                        "benchmark download failed; using local copy if any"
                    );
                }
            }
        }

        state
            .series
            .as_deref()
            .map(|series| filter_window(series, start, end))
            .unwrap_or_default()
    }

    /// Unconditional re-download. Errors are returned to the caller.
    pub async fn refresh(&self) -> anyhow::Result<usize> {
        let mut state = self.state.lock().await;
        state.last_download_attempt = Some(self.clock.now());
        let series = self.download().await?;
        let n = series.len();
        self.adopt(&mut state, series);
        Ok(n)
    }

    /// Reloads the persisted series when nothing is held yet or the file changed on disk.
    /// An unreadable or vanished file keeps the in-memory copy.
    fn sync_with_disk(&self, state: &mut State) {
        let on_disk = modified_at(&self.path);
        if state.series.is_some() && on_disk == state.loaded_mtime {
            return;
        }
        if let Some(series) = self.load_persisted() {
            if state.series.is_some() {
                tracing::debug!(path = %self.path.display(), "benchmark file changed on disk; reloading");
            }
            state.series = Some(series);
            state.loaded_mtime = on_disk;
        }
    }

    fn adopt(&self, state: &mut State, series: Vec<PricePoint>) {
        state.series = Some(series);
        state.loaded_mtime = modified_at(&self.path);
    }

    fn may_attempt(&self, state: &State) -> bool {
        match state.last_download_attempt {
            None => true,
            Some(at) => self.clock.now() - at >= self.retry_cooldown,
        }
    }

    fn load_persisted(&self) -> Option<Vec<PricePoint>> {
        if !self.path.exists() {
            return None;
        }
        match file::read_series(&self.path) {
            Ok(series) => Some(series),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "unreadable benchmark file");
                None
            }
        }
    }

    async fn download(&self) -> anyhow::Result<Vec<PricePoint>> {
        let today = self.clock.today();
        tracing::info!(symbol = self.symbol(), %today, "downloading benchmark history");

        let series = self.fetcher.fetch_history(today).await?;
        anyhow::ensure!(!series.is_empty(), "benchmark provider returned no data");

        let series = file::sorted_unique(series);
        file::write_series(&self.path, &series)?;
        tracing::info!(
            symbol = self.symbol(),
            points = series.len(),
            path = %self.path.display(),
            "benchmark history saved"
        );
        Ok(series)
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn covers(series: &[PricePoint], start: NaiveDate, end: NaiveDate) -> bool {
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return false;
    };
    let starts_too_late = first.date > start + Duration::days(START_TOLERANCE_DAYS);
    let ends_too_early = last.date < end - Duration::days(END_TOLERANCE_DAYS);
    !(starts_too_late || ends_too_early)
}

fn filter_window(series: &[PricePoint], start: NaiveDate, end: NaiveDate) -> Vec<PricePoint> {
    series
        .iter()
        .filter(|p| p.date >= start && p.date <= end)
        .copied()
        .collect()
}
