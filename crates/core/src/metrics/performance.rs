use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use super::{pct_change, TRADING_DAYS_PER_YEAR};
use crate::domain::market::{PricePoint, PriceSeries};

const MONTH_DAYS: i64 = 30;
const QUARTER_DAYS: i64 = 90;
const HALF_YEAR_DAYS: i64 = 180;
const YEAR_DAYS: i64 = 365;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRecord {
    pub last_date: NaiveDate,
    pub last_close: f64,
    pub prev_close: f64,
    pub day_change_pct: f64,
    pub month_pct: Option<f64>,
    pub ytd_pct: Option<f64>,
    pub year_pct: Option<f64>,
    pub three_year_pct: Option<f64>,
    pub volatility_30d: Option<f64>,
    pub volatility_90d: Option<f64>,
    pub volatility_180d: Option<f64>,
    pub volatility_1y: Option<f64>,
    pub week_52_high: Option<f64>,
    pub week_52_low: Option<f64>,
    pub distance_from_high_pct: Option<f64>,
}

/// `None` only for an empty series. A single observation uses itself as the previous close.
pub fn compute_performance(series: &PriceSeries) -> Option<PerformanceRecord> {
    let last = *series.last()?;
    let prev_close = match series.points() {
        [.., prev, _] => prev.close,
        _ => last.close,
    };

    let last_date = last.date;
    let year_start = NaiveDate::from_ymd_opt(last_date.year(), 1, 1)?;
    let windowed = |target: NaiveDate| change_since(series, target, last.close);

    let trailing_year = series.since(last_date - Duration::days(YEAR_DAYS));
    let week_52_high = max_close(trailing_year);
    let week_52_low = min_close(trailing_year);
    let distance_from_high_pct = week_52_high
        .filter(|h| *h != 0.0)
        .map(|h| (last.close - h) / h * 100.0);

    Some(PerformanceRecord {
        last_date,
        last_close: last.close,
        prev_close,
        day_change_pct: pct_change(prev_close, last.close) * 100.0,
        month_pct: windowed(last_date - Duration::days(MONTH_DAYS)),
        ytd_pct: windowed(year_start),
        year_pct: windowed(last_date - Duration::days(YEAR_DAYS)),
        three_year_pct: windowed(last_date - Duration::days(3 * YEAR_DAYS)),
        volatility_30d: trailing_volatility(series, last_date, MONTH_DAYS),
        volatility_90d: trailing_volatility(series, last_date, QUARTER_DAYS),
        volatility_180d: trailing_volatility(series, last_date, HALF_YEAR_DAYS),
        volatility_1y: trailing_volatility(series, last_date, YEAR_DAYS),
        week_52_high,
        week_52_low,
        distance_from_high_pct,
    })
}

// Change from the latest close at or before `target`; `None` when no such close exists or it is
// zero.
fn change_since(series: &PriceSeries, target: NaiveDate, last_close: f64) -> Option<f64> {
    let base = series.close_at_or_before(target)?;
    if base == 0.0 {
        return None;
    }
    Some((last_close - base) / base * 100.0)
}

fn trailing_volatility(series: &PriceSeries, last_date: NaiveDate, days: i64) -> Option<f64> {
    annualized_volatility(series.since(last_date - Duration::days(days)))
}

/// Sample standard deviation of daily returns, annualized with sqrt(252), in percent.
/// Needs at least two returns; zero-close days contribute no return.
pub fn annualized_volatility(points: &[PricePoint]) -> Option<f64> {
    let returns: Vec<f64> = points
        .windows(2)
        .filter(|w| w[0].close != 0.0)
        .map(|w| (w[1].close - w[0].close) / w[0].close)
        .collect();

    if returns.len() < 2 {
        return None;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt() * TRADING_DAYS_PER_YEAR.sqrt() * 100.0)
}

fn max_close(points: &[PricePoint]) -> Option<f64> {
    points.iter().map(|p| p.close).reduce(f64::max)
}

fn min_close(points: &[PricePoint]) -> Option<f64> {
    points.iter().map(|p| p.close).reduce(f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn daily(start: NaiveDate, closes: &[f64]) -> PriceSeries {
        PriceSeries::new(
            "TEST",
            closes
                .iter()
                .enumerate()
                .map(|(i, c)| PricePoint::new(start + Duration::days(i as i64), *c))
                .collect(),
        )
    }

    #[test]
    fn day_change_uses_last_two_closes() {
        let s = daily(d(2025, 6, 1), &[100.0, 110.0, 121.0]);
        let rec = compute_performance(&s).unwrap();
        assert_eq!(rec.last_close, 121.0);
        assert_eq!(rec.prev_close, 110.0);
        assert!((rec.day_change_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn zero_previous_close_gives_zero_day_change() {
        let s = daily(d(2025, 6, 1), &[0.0, 5.0]);
        let rec = compute_performance(&s).unwrap();
        assert_eq!(rec.day_change_pct, 0.0);
        assert!(rec.day_change_pct.is_finite());
    }

    #[test]
    fn empty_series_has_no_record() {
        assert!(compute_performance(&PriceSeries::new("X", vec![])).is_none());
    }

    #[test]
    fn short_history_leaves_long_windows_empty() {
        let s = daily(d(2025, 6, 1), &[100.0, 110.0, 121.0]);
        let rec = compute_performance(&s).unwrap();
        assert_eq!(rec.month_pct, None);
        assert_eq!(rec.year_pct, None);
        assert_eq!(rec.three_year_pct, None);
        // Jan 1 predates the first observation as well.
        assert_eq!(rec.ytd_pct, None);
    }

    #[test]
    fn windowed_change_uses_close_at_or_before_target() {
        // 40 daily closes starting 2025-01-01; last date 2025-02-09, month target 2025-01-10.
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let s = daily(d(2025, 1, 1), &closes);
        let rec = compute_performance(&s).unwrap();

        let month_base = 109.0;
        let expected = (139.0 - month_base) / month_base * 100.0;
        assert!((rec.month_pct.unwrap() - expected).abs() < 1e-9);

        let ytd_expected = (139.0 - 100.0) / 100.0 * 100.0;
        assert!((rec.ytd_pct.unwrap() - ytd_expected).abs() < 1e-9);
    }

    #[test]
    fn volatility_needs_two_returns() {
        let s = daily(d(2025, 6, 1), &[100.0, 101.0]);
        let rec = compute_performance(&s).unwrap();
        assert_eq!(rec.volatility_30d, None);

        let s = daily(d(2025, 6, 1), &[100.0, 110.0, 99.0]);
        let rec = compute_performance(&s).unwrap();
        let r = [0.1, -0.1];
        let mean = 0.0;
        let var = r.iter().map(|x: &f64| (x - mean).powi(2)).sum::<f64>() / 1.0;
        let expected = var.sqrt() * 252f64.sqrt() * 100.0;
        assert!((rec.volatility_30d.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn constant_prices_have_zero_volatility() {
        let s = daily(d(2025, 6, 1), &[50.0; 10]);
        assert_eq!(compute_performance(&s).unwrap().volatility_30d, Some(0.0));
    }

    #[test]
    fn week_52_range_and_distance_from_high() {
        let mut points = vec![PricePoint::new(d(2023, 1, 2), 500.0)];
        points.push(PricePoint::new(d(2024, 8, 1), 80.0));
        points.push(PricePoint::new(d(2024, 12, 1), 200.0));
        points.push(PricePoint::new(d(2025, 6, 1), 150.0));
        let s = PriceSeries::new("X", points);

        let rec = compute_performance(&s).unwrap();
        assert_eq!(rec.week_52_high, Some(200.0));
        assert_eq!(rec.week_52_low, Some(80.0));
        assert_eq!(rec.distance_from_high_pct, Some(-25.0));
        assert_eq!(rec.year_pct, Some((150.0 - 500.0) / 500.0 * 100.0));
    }
}
