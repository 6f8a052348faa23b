use anyhow::Context;
use chrono::{Duration, NaiveDate};
use std::sync::Arc;

use super::{write_atomic, GenerateRequest, Generator};
use crate::benchmark::BenchmarkCache;
use crate::catalog::{read_members, ThemeCatalog, ThemeResolution};
use crate::domain::artifact::{Artifact, ArtifactKind};
use crate::domain::market::{PricePoint, PriceSeries, ThemeMember};
use crate::metrics::{self, breakdown, curve};
use crate::render::{self, ComparisonChart, EquityView, MemberRow, ProfileView, RankLink, ThemeView};
use crate::storage::DataStore;
use crate::time::Clock;

const MAX_THEME_EVIDENCE: usize = 20;

/// Builds every artifact kind in-process from the data store.
pub struct PageGenerator {
    store: Arc<dyn DataStore>,
    catalog: Arc<ThemeCatalog>,
    benchmark: Option<Arc<BenchmarkCache>>,
    clock: Arc<dyn Clock>,
    top_n: usize,
    lookback_days: i64,
}

impl PageGenerator {
    pub fn new(store: Arc<dyn DataStore>, catalog: Arc<ThemeCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            catalog,
            benchmark: None,
            clock,
            top_n: breakdown::DEFAULT_TOP_N,
            lookback_days: breakdown::DEFAULT_LOOKBACK_DAYS,
        }
    }

    pub fn with_benchmark(mut self, benchmark: Arc<BenchmarkCache>) -> Self {
        self.benchmark = Some(benchmark);
        self
    }

    /// Members drawn individually on the breakdown chart; the rest are averaged into "Others".
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    async fn render_profile(&self, symbol: &str) -> anyhow::Result<String> {
        let company = self.store.company(symbol).await?;
        let prices = self.store.price_history(symbol).await?;
        let performance = metrics::compute_performance(&prices);

        let chart = if prices.is_empty() {
            tracing::info!(symbol, "no price history; rendering placeholder chart");
            None
        } else {
            let corrected = curve::correct_series(&prices);
            let window = self.trailing_window(&corrected);
            self.comparison_chart(symbol, window).await
        };

        let mut ranks = Vec::new();
        for entry in self.store.ranks(symbol).await? {
            let resolution = self.catalog.resolve_theme(&entry.theme);
            let href = resolution.name.is_resolved().then(|| {
                format!("/theme/{}", render::url_segment(&resolution.display_name()))
            });
            ranks.push(RankLink {
                theme: entry.theme,
                rank: entry.rank,
                href,
            });
        }

        let evidence = self.store.evidence(&[symbol.to_string()]).await?;

        render::profile_page(&ProfileView {
            symbol: symbol.to_string(),
            company,
            performance,
            chart,
            ranks,
            evidence,
            generated_at: self.clock.now(),
        })
    }

    async fn render_theme(&self, name: &str) -> anyhow::Result<String> {
        let resolution = self.catalog.resolve_theme(name);
        let members = self.members(&resolution)?;

        let mut rows = Vec::with_capacity(members.len());
        for member in &members {
            let prices = self.store.price_history(&member.symbol).await?;
            rows.push(MemberRow {
                symbol: member.symbol.clone(),
                name: member.name.clone(),
                rank: member.rank,
                performance: metrics::compute_performance(&prices),
            });
        }

        let symbols: Vec<String> = members.iter().map(|m| m.symbol.clone()).collect();
        let mut evidence = if symbols.is_empty() {
            Vec::new()
        } else {
            self.store.evidence(&symbols).await?
        };
        evidence.truncate(MAX_THEME_EVIDENCE);

        render::theme_page(&ThemeView {
            name: name.to_string(),
            industry: resolution.industry_label().to_string(),
            members: rows,
            evidence,
            generated_at: self.clock.now(),
        })
    }

    async fn render_equity(&self, name: &str) -> anyhow::Result<String> {
        let resolution = self.catalog.resolve_theme(name);
        let members = self.members(&resolution)?;
        let series = self.member_series(&members).await?;

        let basket = metrics::compute_portfolio_curve(&series);
        let chart = match (basket.start(), basket.end()) {
            (Some(start), Some(end)) => {
                let dates = basket.dates();
                let mut chart = ComparisonChart::new(dates.clone());
                if let Some(roi) = metrics::cumulative_roi(&basket.values()) {
                    chart = chart.with_line(name, roi.into_iter().map(Some).collect());
                }
                if let Some((label, values)) = self.benchmark_line(&dates, start, end).await {
                    chart = chart.with_line(label, values);
                }
                Some(chart)
            }
            _ => None,
        };

        render::equity_page(&EquityView {
            name: name.to_string(),
            chart,
            members_with_data: series.len(),
            members_total: members.len(),
            generated_at: self.clock.now(),
        })
    }

    async fn render_breakdown(&self, name: &str) -> anyhow::Result<String> {
        let resolution = self.catalog.resolve_theme(name);
        let members = self.members(&resolution)?;
        let series = self.member_series(&members).await?;

        let bench = match series.iter().filter_map(|s| s.last()).map(|p| p.date).max() {
            Some(end) => {
                self.benchmark_points(end - Duration::days(self.lookback_days), end)
                    .await
            }
            None => Vec::new(),
        };
        let bench = (!bench.is_empty()).then_some(bench.as_slice());

        let mut result =
            metrics::rank_contributions(&series, self.top_n, Some(self.lookback_days), bench);
        if let (Some(line), Some(cache)) = (result.benchmark.as_mut(), &self.benchmark) {
            line.label = cache.symbol().to_string();
        }

        render::breakdown_page(name, &result, self.clock.now())
    }

    fn members(&self, resolution: &ThemeResolution) -> anyhow::Result<Vec<ThemeMember>> {
        match &resolution.file {
            Some(path) => read_members(path),
            None => {
                tracing::info!(query = %resolution.name.query, "theme has no member file");
                Ok(Vec::new())
            }
        }
    }

    /// Members without price history are left out.
    async fn member_series(&self, members: &[ThemeMember]) -> anyhow::Result<Vec<PriceSeries>> {
        let mut out = Vec::with_capacity(members.len());
        for member in members {
            let series = self
                .store
                .price_history(&member.symbol)
                .await
                .with_context(|| format!("failed to load prices for {}", member.symbol))?;
            if series.is_empty() {
                tracing::debug!(symbol = %member.symbol, "member has no price history; excluded");
                continue;
            }
            out.push(series);
        }
        Ok(out)
    }

    fn trailing_window<'a>(&self, series: &'a PriceSeries) -> &'a [PricePoint] {
        match series.last() {
            Some(last) => series.since(last.date - Duration::days(self.lookback_days)),
            None => &[],
        }
    }

    async fn comparison_chart(&self, label: &str, window: &[PricePoint]) -> Option<ComparisonChart> {
        let (first, last) = (window.first()?, window.last()?);
        let dates: Vec<NaiveDate> = window.iter().map(|p| p.date).collect();
        let closes: Vec<f64> = window.iter().map(|p| p.close).collect();

        let mut chart = ComparisonChart::new(dates.clone());
        if let Some(roi) = metrics::cumulative_roi(&closes) {
            chart = chart.with_line(label, roi.into_iter().map(Some).collect());
        }
        if let Some((bench_label, values)) = self.benchmark_line(&dates, first.date, last.date).await {
            chart = chart.with_line(bench_label, values);
        }
        Some(chart)
    }

    async fn benchmark_points(&self, start: NaiveDate, end: NaiveDate) -> Vec<PricePoint> {
        match &self.benchmark {
            Some(cache) => cache.get_benchmark(start, end).await,
            None => Vec::new(),
        }
    }

    /// Benchmark ROI aligned to `dates`, or `None` when no benchmark is available.
    async fn benchmark_line(
        &self,
        dates: &[NaiveDate],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<(String, Vec<Option<f64>>)> {
        let cache = self.benchmark.as_ref()?;
        let points = cache.get_benchmark(start, end).await;
        if points.is_empty() {
            tracing::info!(symbol = cache.symbol(), %start, %end, "benchmark unavailable; chart has no comparison");
            return None;
        }
        let aligned = breakdown::align_asof(dates, &points)?;
        let roi = metrics::cumulative_roi(&aligned)?;
        Some((cache.symbol().to_string(), roi.into_iter().map(Some).collect()))
    }
}

#[async_trait::async_trait]
impl Generator for PageGenerator {
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<Artifact> {
        let identity = request.key.identity.as_str();
        let html = match request.key.kind {
            ArtifactKind::Profile => self.render_profile(identity).await,
            ArtifactKind::ThemeDetail => self.render_theme(identity).await,
            ArtifactKind::EquityChart => self.render_equity(identity).await,
            ArtifactKind::BreakdownChart => self.render_breakdown(identity).await,
        }
        .with_context(|| format!("failed to build {} page for {identity}", request.key.kind))?;

        write_atomic(&request.path, html.as_bytes())?;

        Ok(Artifact {
            identity: identity.to_string(),
            kind: request.key.kind,
            path: request.path.clone(),
            generated_at: self.clock.now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::BenchmarkFetcher;
    use crate::domain::artifact::ArtifactKey;
    use crate::domain::market::{Company, Evidence, RankEntry};
    use crate::storage::MemoryStore;
    use crate::time::FixedClock;
    use chrono::{TimeZone, Utc};

    struct FlatFetcher;

    #[async_trait::async_trait]
    impl BenchmarkFetcher for FlatFetcher {
        fn symbol(&self) -> &str {
            "SPY"
        }

        async fn fetch_history(&self, until: NaiveDate) -> anyhow::Result<Vec<PricePoint>> {
            let start = until - Duration::days(4000);
            Ok((0..=4000)
                .map(|i| PricePoint::new(start + Duration::days(i), 100.0 + i as f64 * 0.01))
                .collect())
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn prices(closes: &[f64]) -> Vec<PricePoint> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| PricePoint::new(d(2024, 5, 1) + Duration::days(i as i64), *c))
            .collect()
    }

    struct Fixture {
        dir: tempfile::TempDir,
        html: std::path::PathBuf,
        generator: PageGenerator,
    }

    fn fixture(with_benchmark: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let themes = data.join("themes");
        std::fs::create_dir_all(&themes).unwrap();
        std::fs::write(
            data.join("industry_summary.csv"),
            "Theme,Industry\nAccelerated Computing,Semiconductors\n",
        )
        .unwrap();
        std::fs::write(
            themes.join("accelerated_computing.csv"),
            "symbol,name,rank\nNVDA,NVIDIA,1\nAMD,Advanced Micro Devices,2\nGONE,Delisted,3\n",
        )
        .unwrap();

        let store = MemoryStore::new()
            .with_company(Company {
                symbol: "NVDA".to_string(),
                name: "NVIDIA".to_string(),
                description: Some("GPUs".to_string()),
                industry: Some("Semiconductors".to_string()),
                website: None,
                logo_url: None,
            })
            .with_prices("NVDA", prices(&[100.0, 110.0, 121.0]))
            .with_prices("AMD", prices(&[50.0, 50.0, 55.0]))
            .with_rank(RankEntry {
                symbol: "NVDA".to_string(),
                theme: "accelerated_computing".to_string(),
                rank: 1,
            })
            .with_evidence(Evidence {
                symbol: "NVDA".to_string(),
                head_title: Some("Data center demand".to_string()),
                evidence: Some("Orders up".to_string()),
                sources: None,
                source_date: Some(d(2024, 5, 2)),
            });

        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 4, 12, 0, 0).unwrap()));
        let catalog = Arc::new(ThemeCatalog::new(themes, data.join("industry_summary.csv")));
        let mut generator = PageGenerator::new(Arc::new(store), catalog, clock.clone());
        if with_benchmark {
            let cache = BenchmarkCache::new(data.join("spy_benchmark.csv"), Arc::new(FlatFetcher), clock);
            generator = generator.with_benchmark(Arc::new(cache));
        }

        let html = dir.path().join("html");
        Fixture {
            dir,
            html,
            generator,
        }
    }

    async fn generate(f: &Fixture, kind: ArtifactKind, identity: &str) -> String {
        let key = ArtifactKey::new(kind, identity);
        let request = GenerateRequest {
            path: key.path_in(&f.html),
            key,
        };
        let artifact = f.generator.generate(&request).await.unwrap();
        assert_eq!(artifact.path, request.path);
        std::fs::read_to_string(&artifact.path).unwrap()
    }

    #[tokio::test]
    async fn profile_includes_metrics_links_and_benchmark() {
        let f = fixture(true);
        let html = generate(&f, ArtifactKind::Profile, "NVDA").await;

        assert!(html.contains("NVIDIA (NVDA)"));
        assert!(html.contains("+10.00%"));
        assert!(html.contains("href=\"/theme/Accelerated_Computing\""));
        assert!(html.contains("Data center demand"));
        assert!(html.contains("\"label\":\"SPY\""));
    }

    #[tokio::test]
    async fn profile_without_prices_renders_placeholder() {
        let f = fixture(false);
        let html = generate(&f, ArtifactKind::Profile, "ZZZ").await;

        assert!(html.contains("No price data available."));
        assert!(html.contains("N/A"));
    }

    #[tokio::test]
    async fn theme_detail_lists_members() {
        let f = fixture(false);
        let html = generate(&f, ArtifactKind::ThemeDetail, "Accelerated Computing").await;

        assert!(html.contains("Semiconductors"));
        assert!(html.contains("/profile/AMD"));
        assert!(html.contains("/profile/GONE"));
        assert!(html.contains("/theme/Accelerated_Computing/equity"));
    }

    #[tokio::test]
    async fn equity_excludes_members_without_prices() {
        let f = fixture(false);
        let html = generate(&f, ArtifactKind::EquityChart, "Accelerated Computing").await;

        assert!(html.contains("2 of 3 members"));
        assert!(html.contains("equity-chart-data"));
    }

    #[tokio::test]
    async fn breakdown_ranks_members() {
        let f = fixture(true);
        let html = generate(&f, ArtifactKind::BreakdownChart, "Accelerated Computing").await;

        let nvda = html.find("<td><a href=\"/profile/NVDA\">").unwrap();
        let amd = html.find("<td><a href=\"/profile/AMD\">").unwrap();
        assert!(nvda < amd);
        assert!(html.contains("+21.00%"));
    }

    #[tokio::test]
    async fn breakdown_folds_members_beyond_top_n_into_others() {
        let mut f = fixture(false);
        f.generator = f.generator.with_top_n(1);
        let html = generate(&f, ArtifactKind::BreakdownChart, "Accelerated Computing").await;

        assert!(html.contains("\"Others\" averages the 1 members outside the top 1."));
        assert!(html.contains("\"label\":\"NVDA\""));
        assert!(!html.contains("\"label\":\"AMD\""));
    }

    #[tokio::test]
    async fn unknown_theme_still_renders() {
        let f = fixture(false);
        let html = generate(&f, ArtifactKind::ThemeDetail, "Quantum Widgets").await;
        assert!(html.contains("No members listed"));
        assert!(html.contains("Investment Theme"));
    }

    #[tokio::test]
    async fn malformed_registry_still_renders_theme_pages() {
        let f = fixture(false);
        std::fs::write(
            f.dir.path().join("data").join("industry_summary.csv"),
            "Name,Industry\nAccelerated Computing,Semiconductors\n",
        )
        .unwrap();

        let html = generate(&f, ArtifactKind::ThemeDetail, "Accelerated Computing").await;
        assert!(html.contains("/profile/AMD"));
        assert!(html.contains("Investment Theme"));

        let html = generate(&f, ArtifactKind::EquityChart, "Accelerated Computing").await;
        assert!(html.contains("2 of 3 members"));
    }
}
