//! Theme registry and per-theme member files.
//!
//! The registry (`industry_summary.csv`, columns `Theme`, `Industry`) lists canonical theme names.
//! Each theme's members live in `themes/<theme>.csv`, whose file stems only loosely follow the
//! registry names, so lookups go registry first and fall back to the raw file listing.

pub mod members;

use anyhow::Context;
use std::path::{Path, PathBuf};

use crate::resolve::{self, MatchConfidence, MatchPolicy, ResolvedName};

pub use members::read_members;

pub const DEFAULT_INDUSTRY: &str = "Investment Theme";

#[derive(Debug, Clone, PartialEq)]
pub struct ThemeEntry {
    pub name: String,
    pub industry: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ThemeResolution {
    pub name: ResolvedName,
    pub file: Option<PathBuf>,
    pub industry: Option<String>,
}

impl ThemeResolution {
    pub fn display_name(&self) -> String {
        self.name.display_name()
    }

    pub fn industry_label(&self) -> &str {
        self.industry.as_deref().unwrap_or(DEFAULT_INDUSTRY)
    }
}

#[derive(Debug, Clone)]
pub struct ThemeCatalog {
    themes_dir: PathBuf,
    summary_path: PathBuf,
    name_policy: MatchPolicy,
    file_policy: MatchPolicy,
}

impl ThemeCatalog {
    pub fn new(themes_dir: PathBuf, summary_path: PathBuf) -> Self {
        Self {
            themes_dir,
            summary_path,
            name_policy: MatchPolicy::LOOSE_DISPLAY_NAME,
            file_policy: MatchPolicy::STRICT_FILENAME,
        }
    }

    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        Self::new(settings.themes_dir(), settings.industry_summary_path())
            .with_policies(settings.name_match, settings.filename_match)
    }

    pub fn with_policies(mut self, name_policy: MatchPolicy, file_policy: MatchPolicy) -> Self {
        self.name_policy = name_policy;
        self.file_policy = file_policy;
        self
    }

    pub fn name_policy(&self) -> MatchPolicy {
        self.name_policy
    }

    /// Registry entries in file order, duplicates removed. A missing registry is empty.
    pub fn registry(&self) -> anyhow::Result<Vec<ThemeEntry>> {
        if !self.summary_path.exists() {
            return Ok(Vec::new());
        }
        read_registry(&self.summary_path)
    }

    /// Theme member files, sorted by file name so lookups are stable.
    pub fn theme_files(&self) -> anyhow::Result<Vec<PathBuf>> {
        if !self.themes_dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.themes_dir)
            .with_context(|| format!("failed to list {}", self.themes_dir.display()))?
        {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
            if is_csv && path.is_file() {
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    }

    /// Registry first (loose name policy), then the file listing (strict filename policy, then
    /// word overlap). Never fails: an unknown theme is simply unresolved, and an unreadable
    /// registry or theme directory is logged and treated as empty.
    pub fn resolve_theme(&self, query: &str) -> ThemeResolution {
        let registry = self.registry().unwrap_or_else(|err| {
            tracing::warn!(path = %self.summary_path.display(), error = %err, "unreadable theme registry; ignoring it");
            Vec::new()
        });
        let files = self.theme_files().unwrap_or_else(|err| {
            tracing::warn!(path = %self.themes_dir.display(), error = %err, "unreadable theme directory; ignoring it");
            Vec::new()
        });
        let stems: Vec<String> = files.iter().map(|f| file_stem(f)).collect();

        let by_name = resolve::resolve(
            query,
            registry.iter().map(|e| e.name.as_str()),
            self.name_policy,
        );

        if let Some(canonical) = by_name.canonical.clone() {
            let file = self.find_file(&canonical, &files, &stems);
            let industry = registry
                .iter()
                .find(|e| e.name == canonical)
                .and_then(|e| e.industry.clone());
            tracing::debug!(
                query,
                %canonical,
                confidence = ?by_name.confidence,
                has_file = file.is_some(),
                "theme resolved via registry"
            );
            return ThemeResolution {
                name: by_name,
                file,
                industry,
            };
        }

        let by_file = resolve::resolve(query, stems.iter().map(String::as_str), self.file_policy);
        let matched = match by_file.canonical.as_deref() {
            Some(stem) => Some((stem.to_string(), by_file.confidence, by_file.score)),
            None => resolve::find_by_tokens(query, stems.iter().map(String::as_str))
                .map(|stem| (stem.to_string(), MatchConfidence::Fuzzy, 0.0)),
        };

        let Some((stem, confidence, score)) = matched else {
            tracing::debug!(query, "theme not found in registry or file listing");
            return ThemeResolution {
                name: ResolvedName::unresolved(query),
                file: None,
                industry: None,
            };
        };

        let file = stems
            .iter()
            .position(|s| *s == stem)
            .map(|idx| files[idx].clone());
        ThemeResolution {
            name: ResolvedName {
                query: query.to_string(),
                canonical: Some(resolve::title_case(&stem)),
                confidence,
                score,
            },
            file,
            industry: None,
        }
    }

    fn find_file(&self, canonical: &str, files: &[PathBuf], stems: &[String]) -> Option<PathBuf> {
        let idx = {
            let r = resolve::resolve(canonical, stems.iter().map(String::as_str), self.file_policy);
            match r.canonical {
                Some(stem) => stems.iter().position(|s| *s == stem),
                None => {
                    let stem = resolve::find_by_tokens(canonical, stems.iter().map(String::as_str))?;
                    stems.iter().position(|s| s == stem)
                }
            }
        }?;
        files.get(idx).cloned()
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_registry(path: &Path) -> anyhow::Result<Vec<ThemeEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open theme registry {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let col = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    };
    let theme_col = col("theme").context("theme registry has no Theme column")?;
    let industry_col = col("industry");

    let mut out: Vec<ThemeEntry> = Vec::new();
    for record in reader.records() {
        let Ok(record) = record else { continue };
        let Some(name) = record.get(theme_col).map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        if out.iter().any(|e| e.name == name) {
            continue;
        }
        let industry = industry_col
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        out.push(ThemeEntry {
            name: name.to_string(),
            industry,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(files: &[&str], registry: &str) -> (tempfile::TempDir, ThemeCatalog) {
        let dir = tempfile::tempdir().unwrap();
        let themes = dir.path().join("themes");
        std::fs::create_dir_all(&themes).unwrap();
        for f in files {
            std::fs::write(themes.join(f), "symbol,name,rank\nNVDA,Nvidia,1\n").unwrap();
        }
        let summary = dir.path().join("industry_summary.csv");
        std::fs::write(&summary, registry).unwrap();
        let catalog = ThemeCatalog::new(themes, summary);
        (dir, catalog)
    }

    #[test]
    fn registry_exact_match_finds_file() {
        let (_dir, catalog) = catalog_with(
            &["accelerated_computing.csv", "cloud_security.csv"],
            "Theme,Industry\nAccelerated Computing,Semiconductors\nCloud Security,Software\n",
        );

        let r = catalog.resolve_theme("accelerated_computing");
        assert_eq!(r.name.confidence, MatchConfidence::Exact);
        assert_eq!(r.display_name(), "Accelerated Computing");
        assert_eq!(r.industry_label(), "Semiconductors");
        assert!(r.file.unwrap().ends_with("accelerated_computing.csv"));
    }

    #[test]
    fn registry_miss_falls_back_to_file_listing() {
        let (_dir, catalog) = catalog_with(
            &["agribusiness_and_farming.csv", "space_economy.csv"],
            "Theme,Industry\nCloud Security,Software\n",
        );

        let r = catalog.resolve_theme("Agri Business");
        assert_eq!(r.name.confidence, MatchConfidence::Fuzzy);
        assert_eq!(r.display_name(), "Agribusiness And Farming");
        assert_eq!(r.industry_label(), DEFAULT_INDUSTRY);
        assert!(r.file.unwrap().ends_with("agribusiness_and_farming.csv"));
    }

    #[test]
    fn unknown_theme_is_unresolved_not_an_error() {
        let (_dir, catalog) = catalog_with(&["space_economy.csv"], "Theme\nSpace Economy\n");
        let r = catalog.resolve_theme("quantum_biology");
        assert!(!r.name.is_resolved());
        assert!(r.file.is_none());
        assert_eq!(r.display_name(), "Quantum Biology");
    }

    #[test]
    fn missing_registry_and_directory_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ThemeCatalog::new(dir.path().join("nope"), dir.path().join("nope.csv"));
        assert!(catalog.registry().unwrap().is_empty());
        assert!(catalog.theme_files().unwrap().is_empty());
        assert!(!catalog.resolve_theme("anything").name.is_resolved());
    }

    #[test]
    fn malformed_registry_falls_back_to_file_listing() {
        let (_dir, catalog) = catalog_with(
            &["accelerated_computing.csv"],
            "Name,Industry\nAccelerated Computing,Semiconductors\n",
        );
        assert!(catalog.registry().is_err());

        let r = catalog.resolve_theme("Accelerated Computing");
        assert!(r.name.is_resolved());
        assert_eq!(r.display_name(), "Accelerated Computing");
        assert_eq!(r.industry_label(), DEFAULT_INDUSTRY);
        assert!(r.file.unwrap().ends_with("accelerated_computing.csv"));
    }
}
