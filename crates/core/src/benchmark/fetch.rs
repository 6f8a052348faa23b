use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use std::time::Duration;

use crate::config::Settings;
use crate::domain::market::PricePoint;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = "Mozilla/5.0 (reflex benchmark cache)";

#[async_trait::async_trait]
pub trait BenchmarkFetcher: Send + Sync {
    fn symbol(&self) -> &str;

    /// Full daily history from inception through `until`.
    async fn fetch_history(&self, until: NaiveDate) -> Result<Vec<PricePoint>>;
}

/// Daily history from a Yahoo-style chart endpoint (`{base_url}/{symbol}`).
#[derive(Debug, Clone)]
pub struct YahooChartFetcher {
    http: reqwest::Client,
    base_url: String,
    symbol: String,
}

impl YahooChartFetcher {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout_secs = std::env::var("BENCHMARK_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build benchmark http client")?;

        Ok(Self {
            http,
            base_url: settings.benchmark_base_url.clone(),
            symbol: settings.benchmark_symbol.clone(),
        })
    }

    fn url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.symbol)
    }
}

#[async_trait::async_trait]
impl BenchmarkFetcher for YahooChartFetcher {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn fetch_history(&self, until: NaiveDate) -> Result<Vec<PricePoint>> {
        let period2 = until
            .succ_opt()
            .unwrap_or(until)
            .and_hms_opt(0, 0, 0)
            .context("invalid benchmark end date")?
            .and_utc()
            .timestamp();

        let res = self
            .http
            .get(self.url())
            .query(&[
                ("period1", "0".to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "history".to_string()),
            ])
            .send()
            .await
            .context("benchmark request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read benchmark response")?;
        if !status.is_success() {
            anyhow::bail!("benchmark provider HTTP {status}: {}", truncate(&text, 300));
        }

        let points = parse_chart(&text)?;
        Ok(points.into_iter().filter(|p| p.date <= until).collect())
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Prefers adjusted closes; null entries are dropped.
pub fn parse_chart(text: &str) -> Result<Vec<PricePoint>> {
    let envelope: ChartEnvelope =
        serde_json::from_str(text).context("benchmark response is not a chart payload")?;
    if let Some(err) = envelope.chart.error.filter(|e| !e.is_null()) {
        anyhow::bail!("benchmark provider error: {err}");
    }

    let result = envelope
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .context("benchmark response has no result")?;

    let closes = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|a| a.adjclose)
        .filter(|c| !c.is_empty())
        .or_else(|| result.indicators.quote.into_iter().next().map(|q| q.close))
        .unwrap_or_default();

    let mut out = Vec::with_capacity(result.timestamp.len());
    for (ts, close) in result.timestamp.iter().zip(closes) {
        let (Some(dt), Some(close)) = (DateTime::from_timestamp(*ts, 0), close) else {
            continue;
        };
        if close.is_finite() {
            out.push(PricePoint::new(dt.date_naive(), close));
        }
    }
    Ok(out)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_adjusted_closes_and_skips_nulls() {
        let body = json!({
            "chart": {
                "result": [{
                    "timestamp": [1735828200, 1735914600, 1736173800],
                    "indicators": {
                        "quote": [{"close": [590.0, 595.0, 600.0]}],
                        "adjclose": [{"adjclose": [585.5, null, 596.25]}]
                    }
                }],
                "error": null
            }
        })
        .to_string();

        let points = parse_chart(&body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        assert_eq!(points[0].close, 585.5);
        assert_eq!(points[1].close, 596.25);
    }

    #[test]
    fn falls_back_to_raw_closes() {
        let body = json!({
            "chart": {
                "result": [{
                    "timestamp": [1735828200],
                    "indicators": {"quote": [{"close": [590.0]}]}
                }],
                "error": null
            }
        })
        .to_string();
        assert_eq!(parse_chart(&body).unwrap()[0].close, 590.0);
    }

    #[test]
    fn provider_error_is_reported() {
        let body = json!({
            "chart": {"result": null, "error": {"code": "Not Found", "description": "No data"}}
        })
        .to_string();
        assert!(parse_chart(&body).is_err());
    }
}
