use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub symbol: String,
    pub name: String,
    pub description: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// Daily closes for one symbol, ascending by date with no duplicate dates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Sorts by date and collapses duplicate dates, keeping the last value seen for a date.
    /// Non-finite closes are dropped.
    pub fn new(symbol: impl Into<String>, mut points: Vec<PricePoint>) -> Self {
        points.retain(|p| p.close.is_finite());
        points.sort_by_key(|p| p.date);

        let mut deduped: Vec<PricePoint> = Vec::with_capacity(points.len());
        for p in points {
            match deduped.last_mut() {
                Some(last) if last.date == p.date => *last = p,
                _ => deduped.push(p),
            }
        }

        Self {
            symbol: symbol.into(),
            points: deduped,
        }
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Latest close at or before `date`.
    pub fn close_at_or_before(&self, date: NaiveDate) -> Option<f64> {
        let idx = self.points.partition_point(|p| p.date <= date);
        if idx == 0 {
            return None;
        }
        Some(self.points[idx - 1].close)
    }

    pub fn since(&self, start: NaiveDate) -> &[PricePoint] {
        let lo = self.points.partition_point(|p| p.date < start);
        &self.points[lo..]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub symbol: String,
    pub head_title: Option<String>,
    pub evidence: Option<String>,
    pub sources: Option<String>,
    pub source_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankEntry {
    pub symbol: String,
    pub theme: String,
    pub rank: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeMember {
    pub symbol: String,
    pub name: Option<String>,
    pub rank: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    #[test]
    fn new_sorts_and_keeps_last_duplicate() {
        let s = PriceSeries::new(
            "NVDA",
            vec![
                PricePoint::new(d(1, 3), 3.0),
                PricePoint::new(d(1, 1), 1.0),
                PricePoint::new(d(1, 3), 4.0),
                PricePoint::new(d(1, 2), f64::NAN),
            ],
        );
        let closes: Vec<f64> = s.points().iter().map(|p| p.close).collect();
        assert_eq!(closes, vec![1.0, 4.0]);
    }

    #[test]
    fn close_at_or_before_uses_latest_prior_point() {
        let s = PriceSeries::new(
            "X",
            vec![PricePoint::new(d(1, 2), 10.0), PricePoint::new(d(1, 6), 12.0)],
        );
        assert_eq!(s.close_at_or_before(d(1, 1)), None);
        assert_eq!(s.close_at_or_before(d(1, 2)), Some(10.0));
        assert_eq!(s.close_at_or_before(d(1, 5)), Some(10.0));
        assert_eq!(s.close_at_or_before(d(2, 1)), Some(12.0));
    }

    #[test]
    fn since_is_inclusive() {
        let s = PriceSeries::new(
            "X",
            (1..=5).map(|i| PricePoint::new(d(1, i), i as f64)).collect(),
        );
        assert!(s.since(d(2, 1)).is_empty());
        assert_eq!(s.since(d(1, 4)).len(), 2);
    }
}
