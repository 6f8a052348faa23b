use std::fmt;

use crate::domain::artifact::ArtifactKind;

/// A generator run that did not produce a usable artifact. Whatever was on disk before the run
/// is left as it was.
#[derive(Debug, Clone)]
pub struct GenerationError {
    pub kind: ArtifactKind,
    pub identity: String,
    pub stage: &'static str,
    pub detail: String,
}

impl GenerationError {
    pub fn new(
        kind: ArtifactKind,
        identity: impl Into<String>,
        stage: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            identity: identity.into(),
            stage,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "artifact generation failed (kind={}, identity={}, stage={}): {}",
            self.kind, self.identity, self.stage, self.detail
        )
    }
}

impl std::error::Error for GenerationError {}
