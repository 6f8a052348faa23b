use anyhow::Context;
use chrono::NaiveDate;

use super::{canonical_symbol, DataStore};
use crate::domain::market::{Company, Evidence, PricePoint, PriceSeries, RankEntry};

#[derive(Debug, Clone)]
pub struct PgDataStore {
    pool: sqlx::PgPool,
}

impl PgDataStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connect DATABASE_URL failed")?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl DataStore for PgDataStore {
    async fn company(&self, symbol: &str) -> anyhow::Result<Option<Company>> {
        let symbol = canonical_symbol(symbol);
        let row = sqlx::query_as::<
            _,
            (
                String,
                String,
                Option<String>,
                Option<String>,
                Option<String>,
                Option<String>,
            ),
        >(
            "SELECT symbol, name, description, industry, website, logo_url \
             FROM companies \
             WHERE symbol = $1 \
             LIMIT 1",
        )
        .persistent(false)
        .bind(&symbol)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("select companies failed (symbol={symbol})"))?;

        Ok(row.map(
            |(symbol, name, description, industry, website, logo_url)| Company {
                symbol,
                name,
                description,
                industry,
                website,
                logo_url,
            },
        ))
    }

    async fn price_history(&self, symbol: &str) -> anyhow::Result<PriceSeries> {
        let symbol = canonical_symbol(symbol);
        let rows = sqlx::query_as::<_, (NaiveDate, f64)>(
            "SELECT date, close \
             FROM stock_prices \
             WHERE symbol = $1 \
             ORDER BY date ASC",
        )
        .persistent(false)
        .bind(&symbol)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("select stock_prices failed (symbol={symbol})"))?;

        let points = rows
            .into_iter()
            .map(|(date, close)| PricePoint::new(date, close))
            .collect();
        Ok(PriceSeries::new(symbol, points))
    }

    async fn evidence(&self, symbols: &[String]) -> anyhow::Result<Vec<Evidence>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let symbols: Vec<String> = symbols.iter().map(|s| canonical_symbol(s)).collect();

        let rows = sqlx::query_as::<
            _,
            (
                String,
                Option<String>,
                Option<String>,
                Option<String>,
                Option<NaiveDate>,
            ),
        >(
            "SELECT symbol, head_title, evidence, evidence_sources, source_date \
             FROM evidence \
             WHERE symbol = ANY($1) \
             ORDER BY source_date DESC NULLS LAST, symbol ASC",
        )
        .persistent(false)
        .bind(&symbols)
        .fetch_all(&self.pool)
        .await
        .context("select evidence failed")?;

        Ok(rows
            .into_iter()
            .map(
                |(symbol, head_title, evidence, sources, source_date)| Evidence {
                    symbol,
                    head_title,
                    evidence,
                    sources,
                    source_date,
                },
            )
            .collect())
    }

    async fn ranks(&self, symbol: &str) -> anyhow::Result<Vec<RankEntry>> {
        let symbol = canonical_symbol(symbol);
        let rows = sqlx::query_as::<_, (String, String, i32)>(
            "SELECT symbol, theme, rank \
             FROM ranks \
             WHERE symbol = $1 \
             ORDER BY rank ASC, theme ASC",
        )
        .persistent(false)
        .bind(&symbol)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("select ranks failed (symbol={symbol})"))?;

        Ok(rows
            .into_iter()
            .map(|(symbol, theme, rank)| RankEntry {
                symbol,
                theme,
                rank,
            })
            .collect())
    }

    async fn symbols(&self) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT symbol FROM companies ORDER BY symbol ASC",
        )
        .persistent(false)
        .fetch_all(&self.pool)
        .await
        .context("select company symbols failed")?;
        Ok(rows)
    }
}
