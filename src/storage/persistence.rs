//! Snapshot persistence for the shared catalog.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::catalog::{Namespace, RelationSet, Role};
use crate::parser::ast::Persistence;
use crate::core::{DbError, Result};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: u32,
    pub created_at: u64,
    pub next_oid: u32,
    pub namespaces: Vec<Namespace>,
    pub roles: Vec<Role>,
    pub relations: RelationSet,
}

impl DatabaseSnapshot {
    /// Captures durable state. Temporary namespaces and relations never persist,
    /// and unlogged relations keep their definition but lose their rows.
    pub fn capture(next_oid: u32, namespaces: Vec<Namespace>, roles: Vec<Role>, relations: &RelationSet) -> Self {
        let mut durable = RelationSet::new();
        for relation in relations.iter().filter(|r| !r.is_temporary()) {
            let mut relation = relation.clone();
            if relation.persistence == Persistence::Unlogged {
                relation.data.truncate();
            }
            durable.insert(relation);
        }
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            version: SNAPSHOT_VERSION,
            created_at,
            next_oid,
            namespaces: namespaces.into_iter().filter(|n| !n.temporary).collect(),
            roles,
            relations: durable,
        }
    }
}

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Writes to a temporary file in the target directory and renames it into place.
    pub fn save(&self, snapshot: &DatabaseSnapshot) -> Result<()> {
        let dir = match self.snapshot_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .map_err(|e| DbError::IoError(format!("Failed to create snapshot directory: {}", e)))?;

        let serialized = rmp_serde::to_vec(snapshot)
            .map_err(|e| DbError::ExecutionError(format!("Failed to serialize snapshot: {}", e)))?;
        let mut temp = NamedTempFile::new_in(&dir)
            .map_err(|e| DbError::IoError(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(&serialized)
            .map_err(|e| DbError::IoError(format!("Failed to write snapshot: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| DbError::IoError(format!("Failed to sync snapshot: {}", e)))?;
        temp.persist(&self.snapshot_path)
            .map_err(|e| DbError::IoError(format!("Failed to rename snapshot: {}", e)))?;

        info!(
            path = %self.snapshot_path.display(),
            relations = snapshot.relations.len(),
            bytes = serialized.len(),
            "snapshot saved"
        );
        Ok(())
    }

    pub fn load(&self) -> Result<Option<DatabaseSnapshot>> {
        if !self.snapshot_path.exists() {
            debug!(path = %self.snapshot_path.display(), "no snapshot to load");
            return Ok(None);
        }
        let data = fs::read(&self.snapshot_path)
            .map_err(|e| DbError::IoError(format!("Failed to read snapshot: {}", e)))?;
        let snapshot: DatabaseSnapshot = rmp_serde::from_slice(&data)
            .map_err(|e| DbError::ExecutionError(format!("Failed to deserialize snapshot: {}", e)))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(DbError::ExecutionError(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, NamespaceId, RelationId, Value};
    use crate::parser::ast::OnCommit;
    use crate::storage::catalog::{ColumnMeta, Relation, RelationDef};
    use tempfile::TempDir;

    fn relation(id: u32, name: &str, persistence: Persistence) -> Relation {
        let def = RelationDef {
            namespace: NamespaceId(2200),
            name: name.into(),
            persistence,
            on_commit: OnCommit::PreserveRows,
            owner: None,
            columns: vec![ColumnMeta::new("id", DataType::Integer)],
            constraints: Vec::new(),
            comment: None,
        };
        let mut rel = Relation::from_def(RelationId(id), def, "admin".into());
        rel.data.insert(vec![Value::Integer(1)]);
        rel
    }

    #[test]
    fn test_snapshot_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(temp_dir.path().join("db.snapshot"));

        let mut relations = RelationSet::new();
        relations.insert(relation(1, "durable", Persistence::Permanent));
        relations.insert(relation(2, "placeholder", Persistence::Unlogged));
        relations.insert(relation(3, "scratch", Persistence::Temporary));

        let snapshot = DatabaseSnapshot::capture(100, Vec::new(), Vec::new(), &relations);
        manager.save(&snapshot).unwrap();
        assert!(manager.exists());

        let loaded = manager.load().unwrap().unwrap();
        assert_eq!(loaded.next_oid, 100);
        assert_eq!(loaded.relations.len(), 2);
        assert_eq!(loaded.relations.get(RelationId(1)).unwrap().data.row_count(), 1);
        assert!(loaded.relations.get(RelationId(2)).unwrap().data.is_empty());
        assert!(loaded.relations.get(RelationId(3)).is_none());
    }

    #[test]
    fn test_load_missing_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(temp_dir.path().join("missing.snapshot"));
        assert!(manager.load().unwrap().is_none());
    }
}
