//! Read-only access to the research database.

pub mod memory;
pub mod postgres;

use crate::domain::market::{Company, Evidence, PriceSeries, RankEntry};

pub use memory::MemoryStore;
pub use postgres::PgDataStore;

#[async_trait::async_trait]
pub trait DataStore: Send + Sync {
    async fn company(&self, symbol: &str) -> anyhow::Result<Option<Company>>;

    /// Full daily close history, ascending. Unknown symbols yield an empty series.
    async fn price_history(&self, symbol: &str) -> anyhow::Result<PriceSeries>;

    /// Newest first.
    async fn evidence(&self, symbols: &[String]) -> anyhow::Result<Vec<Evidence>>;

    /// Theme ranks for a symbol, best rank first.
    async fn ranks(&self, symbol: &str) -> anyhow::Result<Vec<RankEntry>>;

    async fn symbols(&self) -> anyhow::Result<Vec<String>>;
}

pub(crate) fn canonical_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}
