use std::collections::BTreeMap;

use super::{canonical_symbol, DataStore};
use crate::domain::market::{Company, Evidence, PricePoint, PriceSeries, RankEntry};

/// In-process store used by tests and offline tooling.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    companies: BTreeMap<String, Company>,
    prices: BTreeMap<String, Vec<PricePoint>>,
    evidence: Vec<Evidence>,
    ranks: Vec<RankEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(mut self, company: Company) -> Self {
        self.companies
            .insert(canonical_symbol(&company.symbol), company);
        self
    }

    pub fn with_prices(mut self, symbol: &str, points: Vec<PricePoint>) -> Self {
        self.prices.insert(canonical_symbol(symbol), points);
        self
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }

    pub fn with_rank(mut self, rank: RankEntry) -> Self {
        self.ranks.push(rank);
        self
    }
}

#[async_trait::async_trait]
impl DataStore for MemoryStore {
    async fn company(&self, symbol: &str) -> anyhow::Result<Option<Company>> {
        Ok(self.companies.get(&canonical_symbol(symbol)).cloned())
    }

    async fn price_history(&self, symbol: &str) -> anyhow::Result<PriceSeries> {
        let symbol = canonical_symbol(symbol);
        let points = self.prices.get(&symbol).cloned().unwrap_or_default();
        Ok(PriceSeries::new(symbol, points))
    }

    async fn evidence(&self, symbols: &[String]) -> anyhow::Result<Vec<Evidence>> {
        let wanted: Vec<String> = symbols.iter().map(|s| canonical_symbol(s)).collect();
        let mut out: Vec<Evidence> = self
            .evidence
            .iter()
            .filter(|e| wanted.contains(&canonical_symbol(&e.symbol)))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.source_date.cmp(&a.source_date));
        Ok(out)
    }

    async fn ranks(&self, symbol: &str) -> anyhow::Result<Vec<RankEntry>> {
        let symbol = canonical_symbol(symbol);
        let mut out: Vec<RankEntry> = self
            .ranks
            .iter()
            .filter(|r| canonical_symbol(&r.symbol) == symbol)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.theme.cmp(&b.theme)));
        Ok(out)
    }

    async fn symbols(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.companies.keys().cloned().collect())
    }
}
