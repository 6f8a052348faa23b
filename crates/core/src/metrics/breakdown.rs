use chrono::{Duration, NaiveDate};
use serde::Serialize;

use super::frame::{AlignedFrame, Column};
use crate::domain::market::{PricePoint, PriceSeries};

pub const DEFAULT_TOP_N: usize = 10;
pub const DEFAULT_LOOKBACK_DAYS: i64 = 3 * 365;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub symbol: String,
    pub start_price: Option<f64>,
    pub end_price: Option<f64>,
    /// `None` when the window starts at a non-positive price.
    pub roi_pct: Option<f64>,
}

/// One chart line in cumulative percent from the window start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownLine {
    pub label: String,
    pub values: Vec<Option<f64>>,
}

impl BreakdownLine {
    pub fn last_value(&self) -> Option<f64> {
        self.values.iter().rev().find_map(|v| *v)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Breakdown {
    pub dates: Vec<NaiveDate>,
    /// All symbols with data, best ROI first.
    pub ranked: Vec<Contribution>,
    pub top: Vec<BreakdownLine>,
    /// Mean of the individually normalized curves outside the top N.
    pub others: Option<BreakdownLine>,
    pub benchmark: Option<BreakdownLine>,
    pub others_count: usize,
}

impl Breakdown {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

/// Latest benchmark value at or before each date. Dates before the first benchmark point take
/// the first value. `None` for an empty benchmark.
pub fn align_asof(dates: &[NaiveDate], benchmark: &[PricePoint]) -> Option<Vec<f64>> {
    let first = benchmark.first()?;
    Some(
        dates
            .iter()
            .map(|date| {
                let idx = benchmark.partition_point(|p| p.date <= *date);
                if idx == 0 {
                    first.close
                } else {
                    benchmark[idx - 1].close
                }
            })
            .collect(),
    )
}

/// Ranks basket members by split-corrected ROI over a trailing window (default three years,
/// clipped to available data) and builds the top-N / others / benchmark chart lines.
pub fn rank_contributions(
    series_set: &[PriceSeries],
    top_n: usize,
    lookback_days: Option<i64>,
    benchmark: Option<&[PricePoint]>,
) -> Breakdown {
    let frame = AlignedFrame::from_series(series_set);
    let Some(last_date) = frame.dates.last().copied() else {
        return Breakdown::default();
    };
    let window_start = last_date - Duration::days(lookback_days.unwrap_or(DEFAULT_LOOKBACK_DAYS));
    let frame = frame.since(window_start).corrected();

    let mut ranked: Vec<Contribution> = frame.columns.iter().map(contribution).collect();
    // Stable: equal ROIs keep basket order, missing ROIs go last.
    ranked.sort_by(|a, b| match (a.roi_pct, b.roi_pct) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let column = |symbol: &str| frame.columns.iter().find(|c| c.symbol == symbol);

    let top: Vec<BreakdownLine> = ranked
        .iter()
        .take(top_n)
        .filter_map(|c| column(&c.symbol))
        .filter_map(|col| {
            normalize_column(&col.values).map(|values| BreakdownLine {
                label: col.symbol.clone(),
                values,
            })
        })
        .collect();

    let other_curves: Vec<Vec<Option<f64>>> = ranked
        .iter()
        .skip(top_n)
        .filter_map(|c| column(&c.symbol))
        .filter_map(|col| normalize_column(&col.values))
        .collect();
    let others_count = other_curves.len();
    let others = mean_curve(&other_curves, frame.dates.len()).map(|values| BreakdownLine {
        label: "Others".to_string(),
        values,
    });

    let benchmark = benchmark
        .and_then(|b| align_asof(&frame.dates, b))
        .and_then(|aligned| super::curve::cumulative_roi(&aligned))
        .map(|values| BreakdownLine {
            label: "Benchmark".to_string(),
            values: values.into_iter().map(Some).collect(),
        });

    Breakdown {
        dates: frame.dates,
        ranked,
        top,
        others,
        benchmark,
        others_count,
    }
}

fn contribution(col: &Column) -> Contribution {
    let start = col.first_valid().map(|(_, v)| v);
    let end = col.last_valid().map(|(_, v)| v);
    let roi_pct = match (start, end) {
        (Some(s), Some(e)) if s > 0.0 => Some((e - s) / s * 100.0),
        _ => None,
    };
    Contribution {
        symbol: col.symbol.clone(),
        start_price: start,
        end_price: end,
        roi_pct,
    }
}

// Cumulative percent from the first valid value; `None` if that value is not positive.
fn normalize_column(values: &[Option<f64>]) -> Option<Vec<Option<f64>>> {
    let base = values.iter().find_map(|v| *v)?;
    if base <= 0.0 {
        return None;
    }
    Some(
        values
            .iter()
            .map(|v| v.map(|v| (v / base - 1.0) * 100.0))
            .collect(),
    )
}

fn mean_curve(curves: &[Vec<Option<f64>>], len: usize) -> Option<Vec<Option<f64>>> {
    if curves.is_empty() {
        return None;
    }
    Some(
        (0..len)
            .map(|t| {
                let vals: Vec<f64> = curves.iter().filter_map(|c| c[t]).collect();
                if vals.is_empty() {
                    None
                } else {
                    Some(vals.iter().sum::<f64>() / vals.len() as f64)
                }
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, day).unwrap()
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

    #[test]
    fn align_asof_picks_latest_prior_and_backfills_start() {
        let bench = vec![PricePoint::new(d(2), 10.0), PricePoint::new(d(4), 12.0)];
        let aligned = align_asof(&[d(1), d(2), d(3), d(5)], &bench).unwrap();
        assert_eq!(aligned, vec![10.0, 10.0, 10.0, 12.0]);
        assert!(align_asof(&[d(1)], &[]).is_none());
    }

    #[test]
    fn ranks_by_roi_and_aggregates_others() {
        let set = vec![
            series("LOW", &[10.0, 10.0, 9.0]),
            series("HIGH", &[10.0, 15.0, 20.0]),
            series("MID", &[10.0, 11.0, 12.0]),
            series("NONE", &[]),
        ];
        let bench = vec![PricePoint::new(d(1), 100.0), PricePoint::new(d(3), 110.0)];
        let b = rank_contributions(&set, 2, None, Some(&bench));

        let order: Vec<&str> = b.ranked.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(order, vec!["HIGH", "MID", "LOW"]);
        assert_eq!(b.ranked[0].roi_pct, Some(100.0));

        assert_eq!(b.top.len(), 2);
        assert_eq!(b.top[0].last_value(), Some(100.0));
        assert_eq!(b.others_count, 1);
        let others = b.others.unwrap();
        assert_eq!(others.values[0], Some(0.0));
        assert!((others.last_value().unwrap() + 10.0).abs() < 1e-9);

        let bench_line = b.benchmark.unwrap();
        assert!((bench_line.last_value().unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn split_artifacts_do_not_win_the_ranking() {
        let set = vec![
            series("SPLIT", &[10.0, 10.0, 50.0]),
            series("REAL", &[10.0, 11.0, 12.0]),
        ];
        let b = rank_contributions(&set, 10, None, None);
        assert_eq!(b.ranked[0].symbol, "REAL");
        assert_eq!(b.ranked[1].roi_pct, Some(0.0));
        assert!(b.others.is_none());
        assert!(b.benchmark.is_none());
    }

    #[test]
    fn zero_start_price_sorts_last() {
        let set = vec![series("ZERO", &[0.0, 1.0]), series("OK", &[1.0, 0.5])];
        let b = rank_contributions(&set, 10, None, None);
        assert_eq!(b.ranked[0].symbol, "OK");
        assert_eq!(b.ranked[1].roi_pct, None);
        assert_eq!(b.top.len(), 1);
    }

    #[test]
    fn empty_basket_yields_empty_breakdown() {
        let b = rank_contributions(&[PriceSeries::new("X", vec![])], 10, None, None);
        assert!(b.is_empty());
        assert!(b.ranked.is_empty());
    }
}
