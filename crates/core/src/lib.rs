pub mod benchmark;
pub mod cache;
pub mod catalog;
pub mod domain;
pub mod generate;
pub mod metrics;
pub mod render;
pub mod resolve;
pub mod storage;
pub mod time;
pub mod watchdog;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::resolve::MatchPolicy;

    const DEFAULT_PORT: u16 = 8000;
    const DEFAULT_INACTIVITY_TIMEOUT_SECS: u64 = 1800;
    const DEFAULT_WATCHDOG_POLL_SECS: u64 = 60;
    const DEFAULT_STALENESS_HOURS: i64 = 24;
    const DEFAULT_GENERATOR_TIMEOUT_SECS: u64 = 120;
    const DEFAULT_BENCHMARK_SYMBOL: &str = "SPY";
    const DEFAULT_BENCHMARK_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub html_dir: PathBuf,
        pub data_dir: PathBuf,
        pub port: u16,
        pub inactivity_timeout: Duration,
        pub watchdog_poll: Duration,
        pub staleness: chrono::Duration,
        pub benchmark_symbol: String,
        pub benchmark_base_url: String,
        pub name_match: MatchPolicy,
        pub filename_match: MatchPolicy,
        pub generator_timeout: Duration,
        pub generator_command: Option<String>,
        pub breakdown_top_n: usize,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let mut name_match = MatchPolicy::LOOSE_DISPLAY_NAME;
            if let Some(t) = env_parse::<f64>("MATCH_NAME_THRESHOLD") {
                name_match = name_match.with_threshold(t)?;
            }
            let mut filename_match = MatchPolicy::STRICT_FILENAME;
            if let Some(t) = env_parse::<f64>("MATCH_FILENAME_THRESHOLD") {
                filename_match = filename_match.with_threshold(t)?;
            }

            let staleness_hours =
                env_parse::<i64>("CACHE_STALENESS_HOURS").unwrap_or(DEFAULT_STALENESS_HOURS);
            anyhow::ensure!(
                staleness_hours > 0,
                "CACHE_STALENESS_HOURS must be > 0 (got {staleness_hours})"
            );

            let breakdown_top_n = env_parse::<usize>("BREAKDOWN_TOP_N")
                .unwrap_or(crate::metrics::breakdown::DEFAULT_TOP_N);
            anyhow::ensure!(breakdown_top_n > 0, "BREAKDOWN_TOP_N must be > 0");

            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                html_dir: env_path("REFLEX_HTML_DIR").unwrap_or_else(|| PathBuf::from("html")),
                data_dir: env_path("REFLEX_DATA_DIR").unwrap_or_else(|| PathBuf::from("data")),
                port: env_parse("PORT").unwrap_or(DEFAULT_PORT),
                inactivity_timeout: Duration::from_secs(
                    env_parse("INACTIVITY_TIMEOUT_SECS").unwrap_or(DEFAULT_INACTIVITY_TIMEOUT_SECS),
                ),
                watchdog_poll: Duration::from_secs(
                    env_parse("WATCHDOG_POLL_SECS").unwrap_or(DEFAULT_WATCHDOG_POLL_SECS),
                ),
                staleness: chrono::Duration::hours(staleness_hours),
                benchmark_symbol: std::env::var("BENCHMARK_SYMBOL")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_BENCHMARK_SYMBOL.to_string()),
                benchmark_base_url: std::env::var("BENCHMARK_BASE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_BENCHMARK_BASE_URL.to_string()),
                name_match,
                filename_match,
                generator_timeout: Duration::from_secs(
                    env_parse("GENERATOR_TIMEOUT_SECS").unwrap_or(DEFAULT_GENERATOR_TIMEOUT_SECS),
                ),
                generator_command: std::env::var("GENERATOR_COMMAND")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                breakdown_top_n,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn themes_dir(&self) -> PathBuf {
            self.data_dir.join("themes")
        }

        pub fn industry_summary_path(&self) -> PathBuf {
            self.data_dir.join("industry_summary.csv")
        }

        pub fn benchmark_path(&self) -> PathBuf {
            self.data_dir
                .join(format!("{}_benchmark.csv", self.benchmark_symbol.to_ascii_lowercase()))
        }
    }

    fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }

    fn env_path(key: &str) -> Option<PathBuf> {
        std::env::var(key)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
    }
}
