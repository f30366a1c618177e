//! The contract between the global temporary table core and the engine hosting it.
//!
//! The core never touches storage directly. Everything it needs (name
//! resolution, DDL, row access to the registry, locks, role switching) goes
//! through [`HostEngine`]. The in-memory engine in [`crate::executor`] is the
//! reference implementation.

use crate::core::{DataType, NamespaceId, RelationId, Result, Row, RowId, SessionId};
use crate::parser::ast::{ObjectName, OnCommit, Persistence, Statement};
use crate::result::QueryResult;
use crate::storage::{IndexDef, LikeOptions, LockMode, RelationDef};

/// Read-only view of a relation's catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationInfo {
    pub id: RelationId,
    pub namespace: NamespaceId,
    pub namespace_name: String,
    pub name: String,
    pub persistence: Persistence,
    pub on_commit: OnCommit,
    pub owner: String,
    pub columns: Vec<(String, DataType)>,
    pub comment: Option<String>,
    /// Lives in the system catalog namespace.
    pub is_catalog: bool,
}

/// One step of an expanded `CREATE TABLE ... (LIKE source ...)`.
#[derive(Debug, Clone, PartialEq)]
pub enum SubCommand {
    CreateRelation(RelationDef),
    CreateIndex {
        namespace: NamespaceId,
        relation: String,
        index: IndexDef,
    },
}

pub trait HostEngine {
    // ---- identity and rights ----
    fn session_id(&self) -> SessionId;
    /// The role the session authenticated as. Unaffected by role switching.
    fn session_user(&self) -> String;
    fn current_role(&self) -> String;
    fn set_current_role(&mut self, role: &str) -> Result<()>;
    fn superuser_role(&self) -> String;
    fn is_superuser(&self) -> bool;

    // ---- namespaces ----
    fn namespace_by_name(&self, name: &str) -> Option<NamespaceId>;
    fn namespace_name(&self, id: NamespaceId) -> Option<String>;
    fn temp_namespace(&self) -> NamespaceId;
    fn search_path(&self) -> Vec<String>;
    fn set_search_path(&mut self, path: Vec<String>) -> Result<()>;

    // ---- relations ----
    /// Catalog entry of a relation visible to this session.
    fn relation(&self, id: RelationId) -> Option<RelationInfo>;
    /// Resolves a possibly qualified name the way the engine resolves names in queries.
    fn resolve_relation(&self, name: &ObjectName) -> Option<RelationId>;
    fn relation_in(&self, namespace: NamespaceId, name: &str) -> Option<RelationId>;
    fn relation_exists(&self, id: RelationId) -> bool {
        self.relation(id).is_some()
    }
    /// Fails unless the current role may alter or drop the relation.
    fn check_ownership(&self, id: RelationId) -> Result<()>;
    fn rename_relation(&mut self, id: RelationId, new_name: &str) -> Result<()>;
    /// Hands a relation over to another role, like ALTER TABLE ... OWNER TO.
    fn alter_owner(&mut self, id: RelationId, owner: &str) -> Result<()>;
    /// Creates a relation from a full definition, owned by the current role.
    fn define_relation(&mut self, def: RelationDef) -> Result<RelationId>;
    /// Expands a LIKE clause against `source` into subcommands creating a
    /// same-named temporary relation in this session's temporary namespace.
    fn expand_like(&self, source: RelationId, on_commit: OnCommit, options: LikeOptions) -> Result<Vec<SubCommand>>;
    /// Returns the id of the relation created, if the subcommand created one.
    fn execute_subcommand(&mut self, command: SubCommand) -> Result<Option<RelationId>>;
    /// Creates `target` from the result shape of `query`, copying its rows when `with_data`.
    fn create_table_as(
        &mut self,
        target: &ObjectName,
        persistence: Persistence,
        on_commit: OnCommit,
        query: &str,
        with_data: bool,
    ) -> Result<RelationId>;

    // ---- locks (held until transaction end unless released) ----
    fn lock_relation(&mut self, id: RelationId, mode: LockMode) -> Result<()>;
    fn unlock_relation(&mut self, id: RelationId, mode: LockMode) -> bool;

    // ---- rows ----
    fn scan_rows(&self, id: RelationId) -> Result<Vec<(RowId, Row)>>;
    fn insert_row(&mut self, id: RelationId, row: Row) -> Result<RowId>;
    fn update_row(&mut self, id: RelationId, row_id: RowId, row: Row) -> Result<()>;
    fn delete_row(&mut self, id: RelationId, row_id: RowId) -> Result<()>;

    /// The engine's own processing of a utility statement, with no interceptors involved.
    fn standard_process_utility(&mut self, stmt: &Statement, source: &str) -> Result<QueryResult>;
}
