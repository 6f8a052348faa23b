use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::domain::market::PriceSeries;

/// Several series aligned on the union of their dates, forward-filled. A column is `None` before
/// its first observation.
#[derive(Debug, Clone, Default)]
pub struct AlignedFrame {
    pub dates: Vec<NaiveDate>,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub symbol: String,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn first_valid(&self) -> Option<(usize, f64)> {
        self.values
            .iter()
            .enumerate()
            .find_map(|(i, v)| v.map(|v| (i, v)))
    }

    pub fn last_valid(&self) -> Option<(usize, f64)> {
        self.values
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, v)| v.map(|v| (i, v)))
    }
}

impl AlignedFrame {
    /// Empty series are skipped, so a symbol with no history never becomes a column.
    pub fn from_series(series_set: &[PriceSeries]) -> Self {
        let dates: Vec<NaiveDate> = series_set
            .iter()
            .flat_map(|s| s.points().iter().map(|p| p.date))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut columns = Vec::new();
        for series in series_set.iter().filter(|s| !s.is_empty()) {
            let points = series.points();
            let mut values = Vec::with_capacity(dates.len());
            let mut cursor = 0;
            let mut current: Option<f64> = None;
            for date in &dates {
                while cursor < points.len() && points[cursor].date <= *date {
                    current = Some(points[cursor].close);
                    cursor += 1;
                }
                values.push(current);
            }
            columns.push(Column {
                symbol: series.symbol.clone(),
                values,
            });
        }

        Self { dates, columns }
    }

    /// Drops rows dated before `start`.
    pub fn since(mut self, start: NaiveDate) -> Self {
        let lo = self.dates.partition_point(|d| *d < start);
        self.dates.drain(..lo);
        for col in &mut self.columns {
            col.values.drain(..lo);
        }
        self.columns.retain(|c| c.values.iter().any(Option::is_some));
        self
    }

    /// Applies split correction to each column from its first valid value.
    pub fn corrected(mut self) -> Self {
        for col in &mut self.columns {
            let Some((start, _)) = col.first_valid() else {
                continue;
            };
            let raw: Vec<f64> = col.values[start..].iter().map(|v| v.unwrap_or(0.0)).collect();
            let fixed = super::curve::correct_splits(&raw);
            for (slot, v) in col.values[start..].iter_mut().zip(fixed) {
                *slot = Some(v);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::PricePoint;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    #[test]
    fn aligns_on_union_with_forward_fill() {
        let a = PriceSeries::new("A", vec![PricePoint::new(d(1), 1.0), PricePoint::new(d(3), 3.0)]);
        let b = PriceSeries::new("B", vec![PricePoint::new(d(2), 20.0)]);
        let empty = PriceSeries::new("C", vec![]);

        let frame = AlignedFrame::from_series(&[a, b, empty]);
        assert_eq!(frame.dates, vec![d(1), d(2), d(3)]);
        assert_eq!(frame.columns.len(), 2);
        assert_eq!(frame.columns[0].values, vec![Some(1.0), Some(1.0), Some(3.0)]);
        assert_eq!(frame.columns[1].values, vec![None, Some(20.0), Some(20.0)]);
    }

    #[test]
    fn since_trims_rows() {
        let a = PriceSeries::new(
            "A",
            (1..=4).map(|i| PricePoint::new(d(i), i as f64)).collect(),
        );
        let frame = AlignedFrame::from_series(&[a]).since(d(3));
        assert_eq!(frame.dates, vec![d(3), d(4)]);
        assert_eq!(frame.columns[0].values, vec![Some(3.0), Some(4.0)]);
    }
}
