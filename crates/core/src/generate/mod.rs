//! Artifact generators.
//!
//! A generator's only obligation to the cache is: on `Ok`, a complete file exists at the
//! requested path. On `Err`, whatever was at the path before is untouched.

pub mod command;
pub mod page;

use anyhow::Context;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::benchmark::BenchmarkCache;
use crate::catalog::ThemeCatalog;
use crate::config::Settings;
use crate::domain::artifact::{Artifact, ArtifactKey};
use crate::storage::DataStore;
use crate::time::Clock;

pub use command::CommandGenerator;
pub use page::PageGenerator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub key: ArtifactKey,
    /// Where the artifact must end up.
    pub path: PathBuf,
}

#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<Artifact>;
}

/// Refuses every request. Used when no data source is configured, so cached artifacts are still
/// served but nothing new is produced.
#[derive(Debug, Clone)]
pub struct UnavailableGenerator {
    reason: String,
}

impl UnavailableGenerator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait::async_trait]
impl Generator for UnavailableGenerator {
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<Artifact> {
        anyhow::bail!(
            "cannot generate {} for {}: {}",
            request.key.kind,
            request.key.identity,
            self.reason
        )
    }
}

/// `GENERATOR_COMMAND` wins when set; otherwise pages are built in-process, which needs a store.
pub fn from_settings(
    settings: &Settings,
    store: Option<Arc<dyn DataStore>>,
    catalog: Arc<ThemeCatalog>,
    benchmark: Arc<BenchmarkCache>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn Generator>> {
    if let Some(line) = settings.generator_command.as_deref() {
        tracing::info!(command = line, "using external renderer");
        return Ok(Arc::new(CommandGenerator::from_command_line(
            line,
            settings.generator_timeout,
            clock,
        )?));
    }
    match store {
        Some(store) => Ok(Arc::new(
            PageGenerator::new(store, catalog, clock)
                .with_benchmark(benchmark)
                .with_top_n(settings.breakdown_top_n),
        )),
        None => Ok(Arc::new(UnavailableGenerator::new("no data store configured"))),
    }
}

/// Writes `contents` to a temp file next to `path`, then renames it over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let file_name = path
        .file_name()
        .with_context(|| format!("no file name in {}", path.display()))?;
    let tmp = dir.join(format!(".{}.tmp", file_name.to_string_lossy()));

    let result = (|| -> anyhow::Result<()> {
        let mut file = std::fs::File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        file.write_all(contents)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to move {} into place", path.display()))?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.html");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["out.html".to_string()]);
    }

    #[tokio::test]
    async fn unavailable_generator_always_fails() {
        let key = ArtifactKey::new(crate::domain::artifact::ArtifactKind::Profile, "NVDA");
        let request = GenerateRequest {
            path: PathBuf::from("nvda_profile.html"),
            key,
        };
        let err = UnavailableGenerator::new("offline")
            .generate(&request)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("offline"));
    }

    #[test]
    fn write_atomic_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("a.html");
        write_atomic(&path, b"x").unwrap();
        assert!(path.is_file());
    }
}
