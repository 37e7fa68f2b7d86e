//! FileStore: append-only JSON persistence for snapshots and audit records.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use vigil_core::{AuditLog, AuditRecord, DeploymentSnapshot, RecoveryRecord, RollbackRecord};

use crate::error::{StateError, StateResult};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const SNAPSHOTS_DIR: &str = "snapshots";
const LOGS_DIR: &str = "logs";

struct Dirs {
    snapshots: PathBuf,
    logs: PathBuf,
}

/// Thread-safe, directory-backed store.
#[derive(Clone)]
pub struct FileStore {
    root: Arc<PathBuf>,
    dirs: Arc<Dirs>,
}

impl FileStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: &Path) -> StateResult<Self> {
        let dirs = Dirs {
            snapshots: root.join(SNAPSHOTS_DIR),
            logs: root.join(LOGS_DIR),
        };
        std::fs::create_dir_all(&dirs.snapshots).map_err(map_err!(Open))?;
        std::fs::create_dir_all(&dirs.logs).map_err(map_err!(Open))?;
        debug!(?root, "state store opened");
        Ok(Self {
            root: Arc::new(root.to_path_buf()),
            dirs: Arc::new(dirs),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ── Snapshots ──────────────────────────────────────────────────

    /// Persist a new snapshot. Existing ids are never overwritten.
    pub fn put_snapshot(&self, snapshot: &DeploymentSnapshot) -> StateResult<()> {
        let path = document_path(&self.dirs.snapshots, &snapshot.id)?;
        write_new(&path, &snapshot.id, snapshot)?;
        debug!(id = %snapshot.id, "snapshot stored");
        Ok(())
    }

    pub fn get_snapshot(&self, id: &str) -> StateResult<Option<DeploymentSnapshot>> {
        let path = document_path(&self.dirs.snapshots, id)?;
        if !path.exists() {
            return Ok(None);
        }
        read_document(&path).map(Some)
    }

    /// All snapshots, oldest first.
    pub fn list_snapshots(&self) -> StateResult<Vec<DeploymentSnapshot>> {
        let mut snapshots: Vec<DeploymentSnapshot> = read_all(&self.dirs.snapshots, None)?;
        snapshots.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        Ok(snapshots)
    }

    /// The newest snapshot captured while every deploy target was healthy.
    pub fn latest_valid_snapshot(&self) -> StateResult<Option<DeploymentSnapshot>> {
        Ok(self
            .list_snapshots()?
            .into_iter()
            .rev()
            .find(|s| s.is_rollback_candidate()))
    }

    // ── Audit log ──────────────────────────────────────────────────

    /// Append an audit record as `logs/<id>.json`.
    pub fn append_record(&self, record: &AuditRecord) -> StateResult<()> {
        let path = document_path(&self.dirs.logs, record.id())?;
        write_new(&path, record.id(), record)?;
        debug!(id = %record.id(), kind = record.kind(), "audit record appended");
        Ok(())
    }

    /// Audit records, oldest first, optionally restricted to one kind.
    pub fn list_records(&self, kind: Option<&str>) -> StateResult<Vec<AuditRecord>> {
        let prefix = kind.map(|k| format!("{k}-"));
        let mut records: Vec<AuditRecord> = read_all(&self.dirs.logs, prefix.as_deref())?;
        records.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(records)
    }

    /// Rollback runs, newest first.
    pub fn rollback_history(&self) -> StateResult<Vec<RollbackRecord>> {
        let mut history: Vec<RollbackRecord> = self
            .list_records(Some("rollback"))?
            .into_iter()
            .filter_map(|r| match r {
                AuditRecord::Rollback(run) => Some(run),
                _ => None,
            })
            .collect();
        history.reverse();
        Ok(history)
    }

    /// Recovery sequences, newest first.
    pub fn recovery_history(&self) -> StateResult<Vec<RecoveryRecord>> {
        let mut history: Vec<RecoveryRecord> = self
            .list_records(Some("recovery"))?
            .into_iter()
            .filter_map(|r| match r {
                AuditRecord::Recovery(rec) => Some(rec),
                _ => None,
            })
            .collect();
        history.reverse();
        Ok(history)
    }
}

#[async_trait]
impl AuditLog for FileStore {
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()> {
        self.append_record(record)?;
        Ok(())
    }
}

/// Resolve `<dir>/<id>.json`, refusing ids that could escape the directory.
fn document_path(dir: &Path, id: &str) -> StateResult<PathBuf> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid || id.contains("..") {
        return Err(StateError::InvalidId(id.to_string()));
    }
    Ok(dir.join(format!("{id}.json")))
}

/// Write a document that must not exist yet, via temp file + rename.
fn write_new<T: Serialize>(path: &Path, id: &str, value: &T) -> StateResult<()> {
    if path.exists() {
        return Err(StateError::AlreadyExists(id.to_string()));
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(map_err!(Serialize))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes).map_err(map_err!(Write))?;
    std::fs::rename(&tmp, path).map_err(map_err!(Write))?;
    Ok(())
}

fn read_document<T: DeserializeOwned>(path: &Path) -> StateResult<T> {
    let bytes = std::fs::read(path).map_err(map_err!(Read))?;
    serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))
}

fn read_all<T: DeserializeOwned>(dir: &Path, prefix: Option<&str>) -> StateResult<Vec<T>> {
    let mut results = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(map_err!(Read))? {
        let entry = entry.map_err(map_err!(Read))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(".json") {
            continue;
        }
        if prefix.is_some_and(|p| !name.starts_with(p)) {
            continue;
        }
        results.push(read_document(&entry.path())?);
    }
    Ok(results)
}
