use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::market::PricePoint;

#[derive(Debug, Serialize, Deserialize)]
struct Row {
    date: NaiveDate,
    value: f64,
}

/// Rows that fail to parse are skipped.
pub fn read_series(path: &Path) -> anyhow::Result<Vec<PricePoint>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open benchmark file {}", path.display()))?;

    let mut out = Vec::new();
    let mut skipped = 0usize;
    for row in reader.deserialize::<Row>() {
        match row {
            Ok(row) if row.value.is_finite() => out.push(PricePoint::new(row.date, row.value)),
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::debug!(path = %path.display(), skipped, "skipped malformed benchmark rows");
    }

    Ok(sorted_unique(out))
}

/// Writes through a temp file in the same directory, then renames over the target.
pub fn write_series(path: &Path, series: &[PricePoint]) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        for p in series {
            writer.serialize(Row {
                date: p.date,
                value: p.close,
            })?;
        }
        writer.flush().context("failed to flush benchmark file")?;
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Ascending by date; the last value wins for a repeated date.
pub fn sorted_unique(mut series: Vec<PricePoint>) -> Vec<PricePoint> {
    series.sort_by_key(|p| p.date);
    let mut out: Vec<PricePoint> = Vec::with_capacity(series.len());
    for p in series {
        match out.last_mut() {
            Some(last) if last.date == p.date => *last = p,
            _ => out.push(p),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_reads_back_skipping_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("spy.csv");
        let d = |day| NaiveDate::from_ymd_opt(2025, 1, day).unwrap();

        write_series(&path, &[PricePoint::new(d(2), 10.5), PricePoint::new(d(3), 11.0)]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("date,value\n2025-01-02,10.5\n"));

        std::fs::write(
            &path,
            "date,value\n2025-01-03,11\nnot-a-date,1\n2025-01-02,10.5\n2025-01-03,12\n",
        )
        .unwrap();
        let series = read_series(&path).unwrap();
        assert_eq!(
            series,
            vec![PricePoint::new(d(2), 10.5), PricePoint::new(d(3), 12.0)]
        );
    }
}
