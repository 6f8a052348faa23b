use anyhow::Context;
use std::path::Path;

use crate::domain::market::ThemeMember;

/// Reads a theme member file.
///
/// Column names are matched loosely: the first header containing `symbol` or `ticker` is the
/// symbol; `name` / `company_name` is the display name; `rank` is optional. Unparseable ranks
/// become 0, and if no row has a usable rank the file order becomes the rank.
pub fn read_members(path: &Path) -> anyhow::Result<Vec<ThemeMember>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open theme file {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();

    let symbol_col = headers
        .iter()
        .position(|h| h.contains("symbol") || h.contains("ticker"))
        .with_context(|| format!("theme file {} has no symbol column", path.display()))?;
    let name_col = headers
        .iter()
        .position(|h| h == "name" || h == "company_name");
    let rank_col = headers.iter().position(|h| h == "rank");

    let mut members: Vec<ThemeMember> = Vec::new();
    for record in reader.records() {
        // Ragged or badly quoted rows are skipped.
        let Ok(record) = record else { continue };
        let Some(symbol) = record
            .get(symbol_col)
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
        else {
            continue;
        };
        if members.iter().any(|m| m.symbol == symbol) {
            continue;
        }

        let name = name_col
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let rank = rank_col
            .and_then(|i| record.get(i))
            .and_then(parse_rank)
            .unwrap_or(0);

        members.push(ThemeMember { symbol, name, rank });
    }

    if members.iter().all(|m| m.rank == 0) {
        for (i, m) in members.iter_mut().enumerate() {
            m.rank = i as i32 + 1;
        }
    }

    members.sort_by_key(|m| m.rank);
    Ok(members)
}

fn parse_rank(s: &str) -> Option<i32> {
    let s = s.trim();
    s.parse::<i32>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i32))
}
