use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::connection::{Session, SessionConfig};
use crate::core::{DbError, NamespaceId, Result};
use crate::executor::context::BOOTSTRAP_SUPERUSER;
use crate::executor::{ExecutionContext, ExecutorPipeline, SessionState, SharedState};
use crate::gtt::{CatalogRegistry, GttConfig};
use crate::parser::SqlParserAdapter;
use crate::storage::SnapshotManager;
use crate::storage::catalog::PUBLIC_SCHEMA;

/// Namespace id no relation ever lives in, used by maintenance contexts that have no temp namespace.
const NO_TEMP_NAMESPACE: NamespaceId = NamespaceId(0);

/// Handle to one database. Cheap to clone; every clone and every session
/// opened from it share the same catalog.
#[derive(Clone)]
pub struct Database {
    shared: Arc<Mutex<SharedState>>,
    pipeline: Arc<ExecutorPipeline>,
    parser: Arc<SqlParserAdapter>,
}

impl Database {
    /// Fresh database holding only `pg_catalog`, `public` and the bootstrap superuser.
    pub fn new() -> Self {
        Self::from_state(SharedState::bootstrap())
    }

    fn from_state(state: SharedState) -> Self {
        Self {
            shared: Arc::new(Mutex::new(state)),
            pipeline: Arc::new(ExecutorPipeline::standard()),
            parser: Arc::new(SqlParserAdapter::new()),
        }
    }

    /// Opens the snapshot at `path`, or starts empty when there is none yet.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let manager = SnapshotManager::new(path);
        match manager.load()? {
            Some(snapshot) => {
                info!(
                    path = %manager.path().display(),
                    relations = snapshot.relations.len(),
                    "database restored from snapshot"
                );
                Ok(Self::from_state(SharedState::from_snapshot(snapshot)))
            }
            None => Ok(Self::new()),
        }
    }

    /// Writes every durable relation to `path`. Temporary relations are left out.
    pub async fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let snapshot = self.shared.lock().await.snapshot();
        SnapshotManager::new(path).save(&snapshot)
    }

    pub async fn create_user(&self, name: &str, superuser: bool) -> Result<()> {
        self.shared.lock().await.create_role(name, superuser)?;
        info!(user = name, superuser, "user created");
        Ok(())
    }

    /// Creates the managing schema and its registry table. Idempotent.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use globaltemp::{Database, GttConfig, SessionConfig};
    ///
    /// # tokio_test::block_on(async {
    /// let db = Database::new();
    /// db.install_global_temp(&GttConfig::default()).await.unwrap();
    /// let mut session = db.connect(SessionConfig::default()).await.unwrap();
    /// session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await.unwrap();
    /// # });
    /// ```
    pub async fn install_global_temp(&self, config: &GttConfig) -> Result<()> {
        config.validate()?;
        let mut shared = self.shared.lock().await;
        if shared.namespace_named(&config.schema).is_none() {
            shared.create_namespace(&config.schema, BOOTSTRAP_SUPERUSER, false)?;
            info!(schema = %config.schema, "managing schema created");
        }

        let registry = CatalogRegistry::new(&config.schema, &config.registry_table);
        self.maintenance(&mut shared, |ctx| registry.install(ctx).map(|_| ()))
    }

    /// Whether `config`'s managing schema and registry table exist.
    pub async fn is_global_temp_installed(&self, config: &GttConfig) -> bool {
        let mut shared = self.shared.lock().await;
        let registry = CatalogRegistry::new(&config.schema, &config.registry_table);
        self.maintenance(&mut shared, |ctx| registry.relation_id(ctx).map(|_| ()))
            .is_ok()
    }

    pub async fn connect(&self, config: SessionConfig) -> Result<Session> {
        Session::open(self.clone(), config).await
    }

    /// Runs `f` as the bootstrap superuser in a transaction of its own.
    fn maintenance<T>(
        &self,
        shared: &mut SharedState,
        f: impl FnOnce(&mut ExecutionContext<'_>) -> Result<T>,
    ) -> Result<T> {
        let id = shared.allocate_session();
        let mut session = SessionState::new(
            id,
            BOOTSTRAP_SUPERUSER,
            vec![PUBLIC_SCHEMA.to_string()],
            NO_TEMP_NAMESPACE,
        );
        let mut ctx = ExecutionContext::new(shared, &mut session, &self.pipeline, &self.parser);
        ctx.begin(false)?;
        match f(&mut ctx) {
            Ok(value) => {
                ctx.commit()?;
                Ok(value)
            }
            Err(err) => {
                warn!(error = %err, "maintenance transaction rolled back");
                ctx.rollback();
                Err(err)
            }
        }
    }

    pub(crate) async fn lock_shared(&self) -> MutexGuard<'_, SharedState> {
        self.shared.lock().await
    }

    pub(crate) fn try_lock_shared(&self) -> Result<MutexGuard<'_, SharedState>> {
        self.shared
            .try_lock()
            .map_err(|e| DbError::LockError(format!("database is busy: {}", e)))
    }

    pub(crate) fn pipeline(&self) -> &ExecutorPipeline {
        &self.pipeline
    }

    pub(crate) fn parser(&self) -> &SqlParserAdapter {
        &self.parser
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("executors", &self.pipeline.executor_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_install_is_idempotent() {
        let db = Database::new();
        let config = GttConfig::default();
        assert!(!db.is_global_temp_installed(&config).await);

        db.install_global_temp(&config).await.unwrap();
        db.install_global_temp(&config).await.unwrap();
        assert!(db.is_global_temp_installed(&config).await);
    }

    #[tokio::test]
    async fn test_duplicate_user() {
        let db = Database::new();
        db.create_user("alice", false).await.unwrap();
        assert!(db.create_user("alice", false).await.is_err());
    }
}
