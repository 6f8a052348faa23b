use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

use crate::domain::artifact::ArtifactKind;

pub const INDEX_FILE_NAME: &str = ".artifact_index.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub identity: String,
    pub kind: ArtifactKind,
    pub generated_at: DateTime<Utc>,
}

/// Generation timestamps keyed by artifact file name.
pub trait CacheIndex: Send + Sync {
    fn get(&self, file_name: &str) -> anyhow::Result<Option<CacheRecord>>;

    fn put(&self, file_name: &str, record: CacheRecord) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryIndex {
    records: Mutex<BTreeMap<String, CacheRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheIndex for MemoryIndex {
    fn get(&self, file_name: &str) -> anyhow::Result<Option<CacheRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("cache index lock poisoned"))?;
        Ok(records.get(file_name).cloned())
    }

    fn put(&self, file_name: &str, record: CacheRecord) -> anyhow::Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("cache index lock poisoned"))?;
        records.insert(file_name.to_string(), record);
        Ok(())
    }
}

/// JSON sidecar stored next to the artifacts, shared by every process serving the same directory.
/// The in-memory copy is re-read whenever the file changes on disk, and every `put` merges into
/// the latest on-disk contents before rewriting the file atomically.
#[derive(Debug)]
pub struct JsonFileIndex {
    path: PathBuf,
    cached: Mutex<Option<Snapshot>>,
}

#[derive(Debug)]
struct Snapshot {
    stamp: Option<FileStamp>,
    records: BTreeMap<String, CacheRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

impl JsonFileIndex {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cached: Mutex::new(None),
        }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(INDEX_FILE_NAME))
    }

    fn stamp(&self) -> Option<FileStamp> {
        let meta = std::fs::metadata(&self.path).ok()?;
        Some(FileStamp {
            modified: meta.modified().ok()?,
            len: meta.len(),
        })
    }

    fn load(&self) -> BTreeMap<String, CacheRecord> {
        let Ok(text) = std::fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        match serde_json::from_str(&text) {
            Ok(records) => records,
            Err(err) => {
                // Falls back to artifact mtimes until the next write replaces it.
                tracing::warn!(path = %self.path.display(), error = %err, "ignoring corrupt cache index");
                BTreeMap::new()
            }
        }
    }

    /// Current records, re-read from disk when the file's stamp moved since the last read.
    fn with_records<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, CacheRecord>) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let mut guard = self
            .cached
            .lock()
            .map_err(|_| anyhow::anyhow!("cache index lock poisoned"))?;
        let stamp = self.stamp();
        let snapshot = match guard.take() {
            Some(snapshot) if snapshot.stamp == stamp && stamp.is_some() => snapshot,
            _ => Snapshot {
                stamp,
                records: self.load(),
            },
        };
        let snapshot = guard.insert(snapshot);
        f(&mut snapshot.records)
    }

    fn write(&self, records: &BTreeMap<String, CacheRecord>) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(records).context("serialize cache index failed")?;
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .path
            .with_extension(format!("json.{}.{seq}.tmp", std::process::id()));
        std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl CacheIndex for JsonFileIndex {
    fn get(&self, file_name: &str) -> anyhow::Result<Option<CacheRecord>> {
        self.with_records(|records| Ok(records.get(file_name).cloned()))
    }

    fn put(&self, file_name: &str, record: CacheRecord) -> anyhow::Result<()> {
        let mut guard = self
            .cached
            .lock()
            .map_err(|_| anyhow::anyhow!("cache index lock poisoned"))?;
        let mut records = self.load();
        records.insert(file_name.to_string(), record);
        self.write(&records)?;
        *guard = Some(Snapshot {
            stamp: self.stamp(),
            records,
        });
        Ok(())
    }
}
