use chrono::NaiveDate;
use serde::Serialize;

use super::frame::AlignedFrame;
use super::{pct_change, OUTLIER_RETURN_THRESHOLD};
use crate::domain::market::PriceSeries;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvePoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Compounded growth of 1.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EquityCurve {
    pub points: Vec<CurvePoint>,
}

impl EquityCurve {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }
}

pub fn daily_returns(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| pct_change(w[0], w[1])).collect()
}

pub fn clamp_outliers(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .map(|r| if *r > OUTLIER_RETURN_THRESHOLD { 0.0 } else { *r })
        .collect()
}

/// `start`, then `start * prod(1 + r)` for each return.
pub fn compound(start: f64, returns: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(returns.len() + 1);
    let mut acc = start;
    out.push(acc);
    for r in returns {
        acc *= 1.0 + r;
        out.push(acc);
    }
    out
}

/// Rebuilds a price path with >300% daily moves replaced by 0%, compounding forward from the
/// first price.
pub fn correct_splits(values: &[f64]) -> Vec<f64> {
    let Some(first) = values.first() else {
        return Vec::new();
    };
    compound(*first, &clamp_outliers(&daily_returns(values)))
}

pub fn correct_series(series: &PriceSeries) -> PriceSeries {
    let closes: Vec<f64> = series.points().iter().map(|p| p.close).collect();
    let fixed = correct_splits(&closes);
    let points = series
        .points()
        .iter()
        .zip(fixed)
        .map(|(p, close)| crate::domain::market::PricePoint::new(p.date, close))
        .collect();
    PriceSeries::new(series.symbol.clone(), points)
}

/// Equal-weight basket curve. Each asset is split-corrected, the per-day mean of available asset
/// returns is compounded from 1.0, and the first point is pinned to exactly 1.0. Assets without
/// any history are excluded rather than zero-filled.
pub fn compute_portfolio_curve(series_set: &[PriceSeries]) -> EquityCurve {
    let frame = AlignedFrame::from_series(series_set).corrected();
    if frame.dates.is_empty() || frame.columns.is_empty() {
        return EquityCurve::default();
    }

    let mut points = Vec::with_capacity(frame.dates.len());
    points.push(CurvePoint {
        date: frame.dates[0],
        value: 1.0,
    });

    let mut acc = 1.0;
    for t in 1..frame.dates.len() {
        let mut sum = 0.0;
        let mut n = 0usize;
        for col in &frame.columns {
            if let (Some(prev), Some(cur)) = (col.values[t - 1], col.values[t]) {
                sum += pct_change(prev, cur);
                n += 1;
            }
        }
        let avg = if n == 0 { 0.0 } else { sum / n as f64 };
        acc *= 1.0 + avg;
        points.push(CurvePoint {
            date: frame.dates[t],
            value: acc,
        });
    }

    EquityCurve { points }
}

/// Cumulative percent change from the first value: `(v / v[0] - 1) * 100`.
/// `None` when the series is empty or starts at zero.
pub fn cumulative_roi(values: &[f64]) -> Option<Vec<f64>> {
    let base = *values.first()?;
    if base == 0.0 || !base.is_finite() {
        return None;
    }
    Some(values.iter().map(|v| (v / base - 1.0) * 100.0).collect())
}

/// Browser-side form of [`normalize_to_roi`] for one value `v`, with `f0 = 1 + v0/100`. The chart
/// zoom handler evaluates this expression, so it changes together with the function below.
pub const NORMALIZE_TO_ROI_JS: &str = "((1 + v / 100) / f0 - 1) * 100";

/// Rebases a cumulative-percent series at `base_index`:
/// `((1 + v/100) / (1 + v0/100) - 1) * 100`.
///
/// Rebasing at a point whose value is 0% returns the input unchanged. `None` when the index is
/// out of range or the base growth factor is zero.
pub fn normalize_to_roi(series: &[f64], base_index: usize) -> Option<Vec<f64>> {
    let v0 = *series.get(base_index)?;
    let base = 1.0 + v0 / 100.0;
    if base == 0.0 || !base.is_finite() {
        return None;
    }
    if base == 1.0 {
        return Some(series.to_vec());
    }
    Some(
        series
            .iter()
            .map(|v| ((1.0 + v / 100.0) / base - 1.0) * 100.0)
            .collect(),
    )
}

/// Rebases a primary series and its benchmark at the same index.
pub fn rebase_pair(
    primary: &[f64],
    benchmark: &[f64],
    base_index: usize,
) -> Option<(Vec<f64>, Vec<f64>)> {
    Some((
        normalize_to_roi(primary, base_index)?,
        normalize_to_roi(benchmark, base_index)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::PricePoint;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn series(symbol: &str, closes: &[f64]) -> PriceSeries {
        PriceSeries::new(
            symbol,
            closes
                .iter()
                .enumerate()
                .map(|(i, c)| PricePoint::new(d(i as u32 + 1), *c))
                .collect(),
        )
    }

    fn assert_close(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-9, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn split_day_is_clamped_to_zero() {
        // 4-for-1 split recorded unadjusted: +400% on day 3.
        let raw = [10.0, 11.0, 55.0, 60.5];
        let fixed = correct_splits(&raw);

        let mut returns = daily_returns(&raw);
        returns[1] = 0.0;
        assert_close(&fixed, &compound(10.0, &returns));
        assert_close(&fixed, &[10.0, 11.0, 11.0, 12.1]);
    }

    #[test]
    fn split_correction_is_idempotent() {
        let raw = [5.0, 5.5, 30.0, 31.0, 1.0, 8.0];
        let once = correct_splits(&raw);
        let twice = correct_splits(&once);
        assert_close(&once, &twice);
    }

    #[test]
    fn returns_at_threshold_are_kept() {
        let raw = [1.0, 4.0];
        assert_close(&correct_splits(&raw), &[1.0, 4.0]);
    }

    #[test]
    fn zero_previous_close_yields_zero_return() {
        assert_eq!(daily_returns(&[0.0, 5.0]), vec![0.0]);
    }

    #[test]
    fn portfolio_averages_daily_returns_and_pins_start() {
        let a = series("A", &[100.0, 110.0, 121.0]);
        let b = series("B", &[50.0, 50.0, 45.0]);
        let curve = compute_portfolio_curve(&[a, b]);

        assert_close(&curve.values(), &[1.0, 1.05, 1.05 * 1.0]);
        assert_eq!(curve.points[0].value, 1.0);
    }

    #[test]
    fn missing_symbol_is_excluded_from_basket() {
        let a = series("A", &[100.0, 110.0, 121.0, 99.0]);
        let missing = PriceSeries::new("B", vec![]);

        let basket = compute_portfolio_curve(&[a.clone(), missing]);
        let single = compute_portfolio_curve(&[a]);
        assert_eq!(basket, single);
        assert_close(&single.values(), &[1.0, 1.1, 1.21, 0.99]);
    }

    #[test]
    fn late_listing_joins_basket_when_it_starts_trading() {
        let a = series("A", &[10.0, 10.0, 10.0]);
        let b = PriceSeries::new(
            "B",
            vec![PricePoint::new(d(2), 20.0), PricePoint::new(d(3), 30.0)],
        );
        let curve = compute_portfolio_curve(&[a, b]);
        // Day 2: only A has a return (0%). Day 3: mean of 0% and +50%.
        assert_close(&curve.values(), &[1.0, 1.0, 1.25]);
    }

    #[test]
    fn cumulative_roi_starts_at_zero() {
        let roi = cumulative_roi(&[100.0, 110.0, 121.0]).unwrap();
        assert_close(&roi, &[0.0, 10.0, 21.0]);
        assert!(cumulative_roi(&[0.0, 1.0]).is_none());
        assert!(cumulative_roi(&[]).is_none());
    }

    #[test]
    fn rebase_at_zero_is_identity() {
        let s = vec![0.0, 10.0, -3.3, 21.7];
        assert_eq!(normalize_to_roi(&s, 0), Some(s.clone()));
    }

    #[test]
    fn rebase_is_pure_and_relative_to_new_start() {
        let s = vec![0.0, 10.0, 21.0];
        let a = normalize_to_roi(&s, 1).unwrap();
        let b = normalize_to_roi(&s, 1).unwrap();
        assert_eq!(a, b);
        assert_close(&a, &[(1.0 / 1.1 - 1.0) * 100.0, 0.0, 10.0]);
    }

    #[test]
    fn rebase_rejects_bad_index_or_total_loss() {
        assert!(normalize_to_roi(&[0.0, 1.0], 5).is_none());
        assert!(normalize_to_roi(&[0.0, -100.0], 1).is_none());
    }

    #[test]
    fn rebase_pair_moves_both_series() {
        let (p, b) = rebase_pair(&[0.0, 50.0, 80.0], &[0.0, 20.0, 20.0], 1).unwrap();
        assert_close(&p, &[(1.0 / 1.5 - 1.0) * 100.0, 0.0, 20.0]);
        assert_close(&b, &[(1.0 / 1.2 - 1.0) * 100.0, 0.0, 0.0]);
    }
}
