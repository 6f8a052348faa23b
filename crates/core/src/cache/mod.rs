//! On-demand artifact cache.
//!
//! Per artifact: `ABSENT -> generate -> FRESH -> (age > staleness) -> STALE -> generate -> FRESH`.
//! Age comes from the sidecar [`CacheIndex`] record, or from the file mtime for artifacts that
//! predate the index. Generation runs one at a time; a request that waited on the generation
//! lock re-checks freshness before invoking the generator again.

pub mod error;
pub mod index;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::ThemeCatalog;
use crate::domain::artifact::{Artifact, ArtifactKey, ArtifactKind};
use crate::generate::{GenerateRequest, Generator};
use crate::resolve::ResolvedName;
use crate::time::Clock;

pub use error::GenerationError;
pub use index::{CacheIndex, CacheRecord, JsonFileIndex, MemoryIndex};

pub const DEFAULT_STALENESS_HOURS: i64 = 24;
const DEFAULT_GENERATOR_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Absent,
    Fresh,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    Hit,
    Generated { previous: Freshness },
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheResponse {
    pub artifact: Artifact,
    pub outcome: CacheOutcome,
    /// Set when the identity went through name resolution.
    pub resolution: Option<ResolvedName>,
}

#[derive(Debug, Clone)]
struct Inspection {
    path: PathBuf,
    freshness: Freshness,
    generated_at: Option<DateTime<Utc>>,
}

pub struct CacheManager {
    html_dir: PathBuf,
    staleness: chrono::Duration,
    generator_timeout: Duration,
    generator: Arc<dyn Generator>,
    index: Arc<dyn CacheIndex>,
    clock: Arc<dyn Clock>,
    catalog: Option<Arc<ThemeCatalog>>,
    generation: tokio::sync::Mutex<()>,
}

impl CacheManager {
    pub fn new(
        html_dir: PathBuf,
        generator: Arc<dyn Generator>,
        index: Arc<dyn CacheIndex>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            html_dir,
            staleness: chrono::Duration::hours(DEFAULT_STALENESS_HOURS),
            generator_timeout: Duration::from_secs(DEFAULT_GENERATOR_TIMEOUT_SECS),
            generator,
            index,
            clock,
            catalog: None,
            generation: tokio::sync::Mutex::new(()),
        }
    }

    /// JSON sidecar index in the HTML dir, thresholds and timeout from settings.
    pub fn from_settings(
        settings: &crate::config::Settings,
        generator: Arc<dyn Generator>,
        catalog: Arc<ThemeCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let index = Arc::new(JsonFileIndex::in_dir(&settings.html_dir));
        Self::new(settings.html_dir.clone(), generator, index, clock)
            .with_staleness(settings.staleness)
            .with_generator_timeout(settings.generator_timeout)
            .with_catalog(catalog)
    }

    pub fn with_staleness(mut self, staleness: chrono::Duration) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn with_generator_timeout(mut self, timeout: Duration) -> Self {
        self.generator_timeout = timeout;
        self
    }

    /// Theme identities are resolved against this catalog; without one they are title-cased.
    pub fn with_catalog(mut self, catalog: Arc<ThemeCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn html_dir(&self) -> &Path {
        &self.html_dir
    }

    /// Maps raw input to a canonical identity. Symbols are trimmed and upper-cased; theme names
    /// are resolved through the catalog. Unresolved themes keep a title-cased display name.
    pub fn canonicalize(&self, kind: ArtifactKind, raw: &str) -> (String, Option<ResolvedName>) {
        if kind.is_symbol_keyed() {
            return (raw.trim().to_ascii_uppercase(), None);
        }
        let resolved = match &self.catalog {
            Some(catalog) => catalog.resolve_theme(raw).name,
            None => ResolvedName::unresolved(raw),
        };
        if !resolved.is_resolved() {
            tracing::info!(query = raw, display = %resolved.display_name(), "theme not resolved; using display name");
        }
        (resolved.display_name(), Some(resolved))
    }

    /// Resolves `raw`, then serves the cached artifact or regenerates it.
    pub async fn get_or_generate(&self, raw: &str, kind: ArtifactKind) -> anyhow::Result<CacheResponse> {
        let (identity, resolution) = self.canonicalize(kind, raw);
        anyhow::ensure!(
            !crate::domain::artifact::safe_stem(&identity).is_empty(),
            "empty identity for {kind} (input={raw:?})"
        );
        let mut response = self.get_or_generate_key(&ArtifactKey::new(kind, identity)).await?;
        response.resolution = resolution;
        Ok(response)
    }

    /// Same as [`get_or_generate`](Self::get_or_generate) for an identity that is already canonical.
    pub async fn get_or_generate_key(&self, key: &ArtifactKey) -> anyhow::Result<CacheResponse> {
        let inspection = self.inspect(key)?;
        if let (Freshness::Fresh, Some(generated_at)) = (inspection.freshness, inspection.generated_at) {
            tracing::debug!(kind = %key.kind, identity = %key.identity, path = %inspection.path.display(), "artifact cache hit");
            return Ok(CacheResponse {
                artifact: Artifact {
                    identity: key.identity.clone(),
                    kind: key.kind,
                    path: inspection.path,
                    generated_at,
                },
                outcome: CacheOutcome::Hit,
                resolution: None,
            });
        }

        let _guard = self.generation.lock().await;

        // Another request may have regenerated it while this one waited.
        let inspection = self.inspect(key)?;
        if let (Freshness::Fresh, Some(generated_at)) = (inspection.freshness, inspection.generated_at) {
            return Ok(CacheResponse {
                artifact: Artifact {
                    identity: key.identity.clone(),
                    kind: key.kind,
                    path: inspection.path,
                    generated_at,
                },
                outcome: CacheOutcome::Hit,
                resolution: None,
            });
        }

        tracing::info!(
            kind = %key.kind,
            identity = %key.identity,
            state = ?inspection.freshness,
            path = %inspection.path.display(),
            "artifact needs generation"
        );
        let artifact = self.run_generator(key, inspection.path).await?;
        Ok(CacheResponse {
            artifact,
            outcome: CacheOutcome::Generated {
                previous: inspection.freshness,
            },
            resolution: None,
        })
    }

    /// Regenerates regardless of age.
    pub async fn force_generate(&self, key: &ArtifactKey) -> anyhow::Result<Artifact> {
        let _guard = self.generation.lock().await;
        let path = key.path_in(&self.html_dir);
        self.run_generator(key, path).await
    }

    pub fn freshness(&self, key: &ArtifactKey) -> anyhow::Result<Freshness> {
        Ok(self.inspect(key)?.freshness)
    }

    fn inspect(&self, key: &ArtifactKey) -> anyhow::Result<Inspection> {
        let path = key.path_in(&self.html_dir);
        if !path.is_file() {
            return Ok(Inspection {
                path,
                freshness: Freshness::Absent,
                generated_at: None,
            });
        }

        let generated_at = match self.index.get(&key.file_name())? {
            Some(record) => record.generated_at,
            None => modified_at(&path)?,
        };

        let age = self.clock.now() - generated_at;
        let freshness = if age <= self.staleness {
            Freshness::Fresh
        } else {
            Freshness::Stale
        };

        Ok(Inspection {
            path,
            freshness,
            generated_at: Some(generated_at),
        })
    }

    async fn run_generator(&self, key: &ArtifactKey, path: PathBuf) -> anyhow::Result<Artifact> {
        std::fs::create_dir_all(&self.html_dir)
            .with_context(|| format!("failed to create {}", self.html_dir.display()))?;

        let request = GenerateRequest {
            key: key.clone(),
            path: path.clone(),
        };
        let started = std::time::Instant::now();

        let artifact = match tokio::time::timeout(self.generator_timeout, self.generator.generate(&request)).await {
            Ok(Ok(artifact)) => artifact,
            Ok(Err(err)) => {
                tracing::error!(kind = %key.kind, identity = %key.identity, error = %format!("{err:#}"), "generator failed");
                return Err(GenerationError::new(key.kind, &key.identity, "generate", format!("{err:#}")).into());
            }
            Err(_) => {
                tracing::error!(kind = %key.kind, identity = %key.identity, timeout_secs = self.generator_timeout.as_secs(), "generator timed out");
                return Err(GenerationError::new(
                    key.kind,
                    &key.identity,
                    "timeout",
                    format!("no result after {:?}", self.generator_timeout),
                )
                .into());
            }
        };

        if !artifact.path.is_file() {
            return Err(GenerationError::new(
                key.kind,
                &key.identity,
                "verify",
                format!("generator reported success but {} is missing", artifact.path.display()),
            )
            .into());
        }

        self.index.put(
            &key.file_name(),
            CacheRecord {
                identity: key.identity.clone(),
                kind: key.kind,
                generated_at: artifact.generated_at,
            },
        )?;

        tracing::info!(
            kind = %key.kind,
            identity = %key.identity,
            path = %artifact.path.display(),
            elapsed_ms = started.elapsed().as_millis(),
            "artifact generated"
        );
        Ok(artifact)
    }
}

fn modified_at(path: &Path) -> anyhow::Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("failed to read mtime of {}", path.display()))?;
    Ok(DateTime::<Utc>::from(modified))
}
