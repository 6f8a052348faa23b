use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reflex_core::benchmark::BenchmarkCache;
use reflex_core::cache::CacheManager;
use reflex_core::catalog::ThemeCatalog;
use reflex_core::domain::artifact::{ArtifactKey, ArtifactKind};
use reflex_core::storage::{DataStore, PgDataStore};
use reflex_core::time::{Clock, SystemClock};

const PROFILE_SUFFIX: &str = "_profile.html";

#[derive(Debug, Parser)]
#[command(name = "reflex_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Regenerate artifacts regardless of age.
    Regenerate {
        #[arg(long, value_enum)]
        kind: Target,

        /// Limit to these symbols / theme names. Repeatable.
        #[arg(long)]
        only: Vec<String>,

        /// Profiles for every symbol in the database instead of only those already generated.
        #[arg(long)]
        all_symbols: bool,

        /// List what would be regenerated without running any generator.
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-download the benchmark series.
    RefreshBenchmark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    Profile,
    /// Theme detail page plus its equity and breakdown charts.
    Theme,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = reflex_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let benchmark = Arc::new(BenchmarkCache::from_settings(&settings, clock.clone())?);

    match args.command {
        Command::RefreshBenchmark => {
            let points = benchmark.refresh().await.map_err(|e| {
                sentry_anyhow::capture_anyhow(&e);
                e
            })?;
            tracing::info!(symbol = benchmark.symbol(), points, "benchmark refreshed");
            println!("{}: {points} points", benchmark.symbol());
            Ok(())
        }
        Command::Regenerate {
            kind,
            only,
            all_symbols,
            dry_run,
        } => {
            let db_url = settings.require_database_url()?;
            let store: Arc<dyn DataStore> = Arc::new(
                PgDataStore::connect(db_url)
                    .await
                    .context("connect DATABASE_URL failed")?,
            );
            let catalog = Arc::new(ThemeCatalog::from_settings(&settings));
            let generator = reflex_core::generate::from_settings(
                &settings,
                Some(store.clone()),
                catalog.clone(),
                benchmark,
                clock.clone(),
            )?;
            let manager = CacheManager::from_settings(&settings, generator, catalog.clone(), clock);

            let keys = plan(&manager, store.as_ref(), &catalog, kind, &only, all_symbols).await?;
            if dry_run {
                for key in &keys {
                    println!("{} {}", key.kind, key.identity);
                }
                tracing::info!(artifacts = keys.len(), dry_run = true, "regeneration planned");
                return Ok(());
            }
            regenerate(&manager, &keys).await
        }
    }
}

async fn plan(
    manager: &CacheManager,
    store: &dyn DataStore,
    catalog: &ThemeCatalog,
    target: Target,
    only: &[String],
    all_symbols: bool,
) -> anyhow::Result<Vec<ArtifactKey>> {
    let mut keys = Vec::new();
    match target {
        Target::Profile => {
            let symbols = if !only.is_empty() {
                only.to_vec()
            } else if all_symbols {
                store.symbols().await?
            } else {
                existing_profile_symbols(manager.html_dir())?
            };
            for raw in symbols {
                let (identity, _) = manager.canonicalize(ArtifactKind::Profile, &raw);
                keys.push(ArtifactKey::new(ArtifactKind::Profile, identity));
            }
        }
        Target::Theme => {
            let names = if only.is_empty() {
                catalog.registry()?.into_iter().map(|e| e.name).collect()
            } else {
                only.to_vec()
            };
            for raw in names {
                let (identity, _) = manager.canonicalize(ArtifactKind::ThemeDetail, &raw);
                for kind in [
                    ArtifactKind::ThemeDetail,
                    ArtifactKind::EquityChart,
                    ArtifactKind::BreakdownChart,
                ] {
                    keys.push(ArtifactKey::new(kind, identity.clone()));
                }
            }
        }
    }
    keys.dedup();
    Ok(keys)
}

async fn regenerate(manager: &CacheManager, keys: &[ArtifactKey]) -> anyhow::Result<()> {
    let mut succeeded = 0usize;
    let mut failed = 0usize;

    for key in keys {
        match manager.force_generate(key).await {
            Ok(artifact) => {
                succeeded += 1;
                tracing::info!(kind = %key.kind, identity = %key.identity, path = %artifact.path.display(), "regenerated");
            }
            Err(e) => {
                failed += 1;
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(kind = %key.kind, identity = %key.identity, error = %format!("{e:#}"), "regeneration failed");
            }
        }
    }

    println!("regenerated {succeeded}, failed {failed}");
    anyhow::ensure!(failed == 0, "{failed} of {} artifacts failed to regenerate", keys.len());
    Ok(())
}

/// Symbols of profiles already present in the HTML dir, upper-cased and sorted.
fn existing_profile_symbols(html_dir: &Path) -> anyhow::Result<Vec<String>> {
    if !html_dir.exists() {
        return Ok(Vec::new());
    }
    let mut symbols = Vec::new();
    for entry in std::fs::read_dir(html_dir)
        .with_context(|| format!("failed to list {}", html_dir.display()))?
    {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if let Some(stem) = name.strip_suffix(PROFILE_SUFFIX) {
            if !stem.is_empty() {
                symbols.push(stem.to_ascii_uppercase());
            }
        }
    }
    symbols.sort();
    symbols.dedup();
    Ok(symbols)
}

fn init_sentry(settings: &reflex_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
