use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Profile,
    ThemeDetail,
    BreakdownChart,
    EquityChart,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Profile,
        ArtifactKind::ThemeDetail,
        ArtifactKind::BreakdownChart,
        ArtifactKind::EquityChart,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Profile => "profile",
            ArtifactKind::ThemeDetail => "theme_detail",
            ArtifactKind::BreakdownChart => "breakdown_chart",
            ArtifactKind::EquityChart => "equity_chart",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            ArtifactKind::Profile => "_profile.html",
            ArtifactKind::ThemeDetail => "_detail.html",
            ArtifactKind::BreakdownChart => "_breakdown.html",
            ArtifactKind::EquityChart => "_equity.html",
        }
    }

    /// Profiles are keyed by ticker; every other kind by theme name.
    pub fn is_symbol_keyed(self) -> bool {
        matches!(self, ArtifactKind::Profile)
    }

    /// Deterministic file name for a canonical identity.
    pub fn file_name(self, identity: &str) -> String {
        format!("{}{}", safe_stem(identity), self.suffix())
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "profile" => Ok(ArtifactKind::Profile),
            "theme" | "theme_detail" => Ok(ArtifactKind::ThemeDetail),
            "breakdown" | "breakdown_chart" => Ok(ArtifactKind::BreakdownChart),
            "equity" | "equity_chart" => Ok(ArtifactKind::EquityChart),
            other => anyhow::bail!("unknown artifact kind: {other}"),
        }
    }
}

/// Lowercase, spaces and dashes to underscores. Anything else that is not alphanumeric is
/// dropped so an identity can never escape the artifact directory.
pub fn safe_stem(identity: &str) -> String {
    let mut out = String::with_capacity(identity.len());
    for c in identity.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if c == ' ' || c == '-' || c == '_' {
            if !out.ends_with('_') {
                out.push('_');
            }
        }
    }
    out.trim_matches('_').to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub kind: ArtifactKind,
    pub identity: String,
}

impl ArtifactKey {
    pub fn new(kind: ArtifactKind, identity: impl Into<String>) -> Self {
        Self {
            kind,
            identity: identity.into(),
        }
    }

    pub fn file_name(&self) -> String {
        self.kind.file_name(&self.identity)
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub identity: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub generated_at: DateTime<Utc>,
}

impl Artifact {
    /// Server-relative URL of the artifact, for redirects.
    pub fn url_path(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("/{name}")
    }
}
