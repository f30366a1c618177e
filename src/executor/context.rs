use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::ExecutorPipeline;
use crate::core::{DbError, NamespaceId, RelationId, Result, Row, RowId, SessionId};
use crate::gtt::host::{HostEngine, RelationInfo, SubCommand};
use crate::parser::SqlParserAdapter;
use crate::parser::ast::{ObjectName, OnCommit, Persistence, Statement};
use crate::result::QueryResult;
use crate::storage::catalog::{PG_CATALOG, PUBLIC_SCHEMA, TEMP_SCHEMA_ALIAS};
use crate::storage::{
    DatabaseSnapshot, IndexDef, LikeOptions, LockManager, LockMode, Namespace, Relation, RelationDef,
    RelationSet, Role,
};
use crate::transaction::{Change, Transaction};

/// First object id handed out to user objects; lower ids belong to bootstrap objects.
pub const FIRST_NORMAL_OID: u32 = 16384;
pub const PG_CATALOG_NAMESPACE: NamespaceId = NamespaceId(11);
pub const PUBLIC_NAMESPACE: NamespaceId = NamespaceId(2200);
pub const BOOTSTRAP_SUPERUSER: &str = "admin";

/// State shared by every session of a database.
#[derive(Debug)]
pub struct SharedState {
    pub(crate) namespaces: BTreeMap<NamespaceId, Namespace>,
    pub(crate) relations: RelationSet,
    pub(crate) roles: BTreeMap<String, Role>,
    pub(crate) locks: LockManager,
    next_oid: u32,
    next_session: u64,
}

impl SharedState {
    pub fn bootstrap() -> Self {
        let mut namespaces = BTreeMap::new();
        for (id, name) in [(PG_CATALOG_NAMESPACE, PG_CATALOG), (PUBLIC_NAMESPACE, PUBLIC_SCHEMA)] {
            namespaces.insert(
                id,
                Namespace {
                    id,
                    name: name.to_string(),
                    owner: BOOTSTRAP_SUPERUSER.to_string(),
                    temporary: false,
                },
            );
        }
        let mut roles = BTreeMap::new();
        roles.insert(
            BOOTSTRAP_SUPERUSER.to_string(),
            Role {
                name: BOOTSTRAP_SUPERUSER.to_string(),
                superuser: true,
            },
        );

        Self {
            namespaces,
            relations: RelationSet::new(),
            roles,
            locks: LockManager::new(),
            next_oid: FIRST_NORMAL_OID,
            next_session: 1,
        }
    }

    pub fn from_snapshot(snapshot: DatabaseSnapshot) -> Self {
        let mut state = Self::bootstrap();
        for namespace in snapshot.namespaces {
            state.namespaces.insert(namespace.id, namespace);
        }
        for role in snapshot.roles {
            state.roles.insert(role.name.clone(), role);
        }
        state.relations = snapshot.relations;
        state.next_oid = snapshot.next_oid.max(FIRST_NORMAL_OID);
        state
    }

    pub fn snapshot(&self) -> DatabaseSnapshot {
        DatabaseSnapshot::capture(
            self.next_oid,
            self.namespaces.values().cloned().collect(),
            self.roles.values().cloned().collect(),
            &self.relations,
        )
    }

    pub fn allocate_oid(&mut self) -> u32 {
        let oid = self.next_oid;
        self.next_oid += 1;
        oid
    }

    pub fn allocate_session(&mut self) -> SessionId {
        let id = SessionId(self.next_session);
        self.next_session += 1;
        id
    }

    pub fn namespace_named(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.values().find(|n| n.name == name)
    }

    pub fn create_namespace(&mut self, name: &str, owner: &str, temporary: bool) -> Result<NamespaceId> {
        if self.namespace_named(name).is_some() {
            return Err(DbError::ExecutionError(format!("schema \"{}\" already exists", name)));
        }
        let id = NamespaceId(self.allocate_oid());
        self.namespaces.insert(
            id,
            Namespace {
                id,
                name: name.to_string(),
                owner: owner.to_string(),
                temporary,
            },
        );
        Ok(id)
    }

    /// Removes a namespace together with any relation still in it.
    pub fn drop_namespace(&mut self, id: NamespaceId) -> Option<Namespace> {
        let orphans: Vec<RelationId> = self
            .relations
            .iter()
            .filter(|r| r.namespace == id)
            .map(|r| r.id)
            .collect();
        for relation in orphans {
            self.relations.remove(relation);
        }
        self.namespaces.remove(&id)
    }

    pub fn create_role(&mut self, name: &str, superuser: bool) -> Result<()> {
        if self.roles.contains_key(name) {
            return Err(DbError::ExecutionError(format!("role \"{}\" already exists", name)));
        }
        self.roles.insert(
            name.to_string(),
            Role {
                name: name.to_string(),
                superuser,
            },
        );
        Ok(())
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn is_superuser(&self, role: &str) -> bool {
        self.roles.get(role).is_some_and(|r| r.superuser)
    }
}

/// Per-session state of the engine.
#[derive(Debug)]
pub struct SessionState {
    pub(crate) id: SessionId,
    pub(crate) user: String,
    pub(crate) role: String,
    pub(crate) search_path: Vec<String>,
    pub(crate) temp_namespace: NamespaceId,
    pub(crate) temp_relations: RelationSet,
    pub(crate) transaction: Option<Transaction>,
    pub(crate) settings: BTreeMap<String, String>,
}

impl SessionState {
    pub fn new(id: SessionId, user: &str, search_path: Vec<String>, temp_namespace: NamespaceId) -> Self {
        Self {
            id,
            user: user.to_string(),
            role: user.to_string(),
            search_path,
            temp_namespace,
            temp_relations: RelationSet::new(),
            transaction: None,
            settings: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn in_transaction_block(&self) -> bool {
        self.transaction.as_ref().is_some_and(|t| t.is_explicit())
    }
}

/// Everything a statement executes against: the shared catalog plus this session's state.
pub struct ExecutionContext<'a> {
    pub(crate) shared: &'a mut SharedState,
    pub(crate) session: &'a mut SessionState,
    pub(crate) pipeline: &'a ExecutorPipeline,
    pub(crate) parser: &'a SqlParserAdapter,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        shared: &'a mut SharedState,
        session: &'a mut SessionState,
        pipeline: &'a ExecutorPipeline,
        parser: &'a SqlParserAdapter,
    ) -> Self {
        Self {
            shared,
            session,
            pipeline,
            parser,
        }
    }

    // ------------------------------------------------------------------
    // catalog access
    // ------------------------------------------------------------------

    pub fn relation_ref(&self, id: RelationId) -> Option<&Relation> {
        self.session
            .temp_relations
            .get(id)
            .or_else(|| self.shared.relations.get(id))
    }

    pub fn relation_mut(&mut self, id: RelationId) -> Option<&mut Relation> {
        if self.session.temp_relations.contains(id) {
            self.session.temp_relations.get_mut(id)
        } else {
            self.shared.relations.get_mut(id)
        }
    }

    pub fn require_relation(&self, id: RelationId) -> Result<&Relation> {
        self.relation_ref(id)
            .ok_or_else(|| DbError::TableNotFound(format!("relation with OID {}", id)))
    }

    pub fn require_relation_mut(&mut self, id: RelationId) -> Result<&mut Relation> {
        self.relation_mut(id)
            .ok_or_else(|| DbError::TableNotFound(format!("relation with OID {}", id)))
    }

    fn is_temp_alias(&self, schema: &str) -> bool {
        schema == TEMP_SCHEMA_ALIAS
            || self
                .shared
                .namespaces
                .get(&self.session.temp_namespace)
                .is_some_and(|n| n.name == schema)
    }

    /// Resolves a schema name, mapping the `pg_temp` alias to this session's namespace.
    pub fn resolve_namespace(&self, schema: &str) -> Result<NamespaceId> {
        if self.is_temp_alias(schema) {
            return Ok(self.session.temp_namespace);
        }
        match self.shared.namespace_named(schema) {
            Some(ns) if !ns.temporary => Ok(ns.id),
            _ => Err(DbError::SchemaNotFound(schema.to_string())),
        }
    }

    pub fn find_in(&self, namespace: NamespaceId, name: &str) -> Option<RelationId> {
        if namespace == self.session.temp_namespace {
            self.session.temp_relations.find(namespace, name).map(|r| r.id)
        } else {
            self.shared.relations.find(namespace, name).map(|r| r.id)
        }
    }

    /// Temp namespace first, then each schema on the search path.
    pub fn lookup(&self, name: &ObjectName) -> Option<RelationId> {
        if let Some(schema) = &name.schema {
            let namespace = self.resolve_namespace(schema).ok()?;
            return self.find_in(namespace, &name.name);
        }
        if let Some(id) = self.find_in(self.session.temp_namespace, &name.name) {
            return Some(id);
        }
        self.session
            .search_path
            .iter()
            .filter(|schema| !self.is_temp_alias(schema))
            .filter_map(|schema| self.shared.namespace_named(schema))
            .find_map(|ns| self.find_in(ns.id, &name.name))
    }

    pub fn resolve(&self, name: &ObjectName) -> Result<RelationId> {
        self.lookup(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    /// Namespace a new relation goes into: the explicit schema, the temp
    /// namespace for temporary relations, else the first existing schema on the search path.
    /// Naming the temp namespace explicitly makes the relation temporary.
    pub fn creation_namespace(
        &self,
        name: &ObjectName,
        persistence: Persistence,
    ) -> Result<(NamespaceId, Persistence)> {
        let temp = self.session.temp_namespace;
        match (&name.schema, persistence) {
            (Some(schema), Persistence::Temporary) => {
                let ns = self.resolve_namespace(schema)?;
                if ns != temp {
                    return Err(DbError::ExecutionError(
                        "cannot create temporary relation in non-temporary schema".into(),
                    ));
                }
                Ok((ns, Persistence::Temporary))
            }
            (Some(schema), persistence) => {
                let ns = self.resolve_namespace(schema)?;
                if ns == temp {
                    Ok((ns, Persistence::Temporary))
                } else {
                    Ok((ns, persistence))
                }
            }
            (None, Persistence::Temporary) => Ok((temp, Persistence::Temporary)),
            (None, persistence) => self
                .session
                .search_path
                .iter()
                .filter(|schema| !self.is_temp_alias(schema))
                .find_map(|schema| self.shared.namespace_named(schema))
                .map(|ns| (ns.id, persistence))
                .ok_or_else(|| DbError::SchemaNotFound("no schema has been selected to create in".into())),
        }
    }

    pub fn namespace_label(&self, id: NamespaceId) -> String {
        self.shared
            .namespaces
            .get(&id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn info(&self, relation: &Relation) -> RelationInfo {
        RelationInfo {
            id: relation.id,
            namespace: relation.namespace,
            namespace_name: self.namespace_label(relation.namespace),
            name: relation.name.clone(),
            persistence: relation.persistence,
            on_commit: relation.on_commit,
            owner: relation.owner.clone(),
            columns: relation
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.data_type))
                .collect(),
            comment: relation.comment.clone(),
            is_catalog: relation.namespace == PG_CATALOG_NAMESPACE,
        }
    }

    // ------------------------------------------------------------------
    // privileges
    // ------------------------------------------------------------------

    pub fn current_is_superuser(&self) -> bool {
        self.shared.is_superuser(&self.session.role)
    }

    pub fn ensure_can_create_in(&self, namespace: NamespaceId) -> Result<()> {
        if namespace == self.session.temp_namespace || namespace == PUBLIC_NAMESPACE || self.current_is_superuser() {
            return Ok(());
        }
        match self.shared.namespaces.get(&namespace) {
            Some(ns) if ns.owner == self.session.role => Ok(()),
            Some(ns) => Err(DbError::PermissionDenied(format!("permission denied for schema {}", ns.name))),
            None => Err(DbError::SchemaNotFound(namespace.to_string())),
        }
    }

    pub fn ensure_owner(&self, id: RelationId) -> Result<()> {
        let relation = self.require_relation(id)?;
        if relation.owner == self.session.role || self.current_is_superuser() {
            Ok(())
        } else {
            Err(DbError::PermissionDenied(format!("must be owner of table {}", relation.name)))
        }
    }

    /// Row writes are open in `public` and the temp namespace, owner-only elsewhere.
    pub fn ensure_can_write(&self, id: RelationId) -> Result<()> {
        let relation = self.require_relation(id)?;
        if relation.namespace == PUBLIC_NAMESPACE || relation.namespace == self.session.temp_namespace {
            return Ok(());
        }
        if relation.namespace == PG_CATALOG_NAMESPACE {
            return Err(DbError::PermissionDenied(format!(
                "permission denied for catalog relation {}",
                relation.name
            )));
        }
        self.ensure_owner(id)
    }

    // ------------------------------------------------------------------
    // DDL primitives, each recorded in the undo log
    // ------------------------------------------------------------------

    pub fn record(&mut self, change: Change) {
        match self.session.transaction.as_mut() {
            Some(txn) => txn.record(change),
            None => warn!(relation = %change.relation(), "change recorded outside a transaction"),
        }
    }

    pub fn create_relation(&mut self, def: RelationDef) -> Result<RelationId> {
        self.ensure_can_create_in(def.namespace)?;
        let is_temp_ns = def.namespace == self.session.temp_namespace;
        if is_temp_ns != (def.persistence == Persistence::Temporary) {
            return Err(DbError::Internal(format!(
                "relation {} has persistence {:?} but targets namespace {}",
                def.name, def.persistence, def.namespace
            )));
        }
        if def.on_commit != OnCommit::PreserveRows && !is_temp_ns {
            return Err(DbError::ExecutionError("ON COMMIT can only be used on temporary tables".into()));
        }
        if self.find_in(def.namespace, &def.name).is_some() {
            return Err(DbError::TableExists(def.name));
        }

        let id = RelationId(self.shared.allocate_oid());
        let relation = Relation::from_def(id, def, self.session.role.clone());
        debug!(
            relation = %id,
            name = %relation.name,
            namespace = %self.namespace_label(relation.namespace),
            owner = %relation.owner,
            "relation created"
        );
        if is_temp_ns {
            self.session.temp_relations.insert(relation);
        } else {
            self.shared.relations.insert(relation);
        }
        self.shared.locks.acquire(self.session.id, id, LockMode::AccessExclusive)?;
        self.record(Change::CreateRelation { relation: id });
        Ok(id)
    }

    pub fn drop_relation(&mut self, id: RelationId) -> Result<()> {
        self.ensure_owner(id)?;
        if self.require_relation(id)?.namespace == PG_CATALOG_NAMESPACE {
            return Err(DbError::PermissionDenied("cannot drop catalog relations".into()));
        }
        self.shared.locks.acquire(self.session.id, id, LockMode::AccessExclusive)?;
        let removed = if self.session.temp_relations.contains(id) {
            self.session.temp_relations.remove(id)
        } else {
            self.shared.relations.remove(id)
        };
        if let Some(relation) = removed {
            debug!(relation = %id, name = %relation.name, "relation dropped");
            self.record(Change::DropRelation {
                relation: Box::new(relation),
            });
        }
        Ok(())
    }

    pub fn rename(&mut self, id: RelationId, new_name: &str) -> Result<()> {
        self.ensure_owner(id)?;
        self.shared.locks.acquire(self.session.id, id, LockMode::AccessExclusive)?;
        let namespace = self.require_relation(id)?.namespace;
        if self.find_in(namespace, new_name).is_some() {
            return Err(DbError::TableExists(new_name.to_string()));
        }
        let relation = self.require_relation_mut(id)?;
        let old_name = std::mem::replace(&mut relation.name, new_name.to_string());
        self.record(Change::RenameRelation { relation: id, old_name });
        Ok(())
    }

    /// Runs a metadata change on a relation, recording its previous definition for undo.
    pub fn alter_relation<T>(&mut self, id: RelationId, alter: impl FnOnce(&mut Relation) -> Result<T>) -> Result<T> {
        let previous = self.require_relation(id)?.clone();
        let result = alter(self.require_relation_mut(id)?);
        match result {
            Ok(value) => {
                self.record(Change::AlterRelation {
                    previous: Box::new(previous),
                });
                Ok(value)
            }
            Err(err) => {
                // partial edits must not survive a failed alter
                *self.require_relation_mut(id)? = previous;
                Err(err)
            }
        }
    }

    pub fn add_index(&mut self, id: RelationId, index: IndexDef) -> Result<()> {
        self.alter_relation(id, |relation| {
            if relation.has_index_named(&index.name) {
                return Err(DbError::ExecutionError(format!(
                    "relation \"{}\" already exists",
                    index.name
                )));
            }
            for column in &index.columns {
                relation.column_index(column)?;
            }
            relation.indexes.push(index.clone());
            if index.unique {
                // revalidate existing rows against the new key
                let rows: Vec<(RowId, Row)> = relation.data.scan().map(|(id, r)| (id, r.clone())).collect();
                for (row_id, mut row) in rows {
                    relation.validate_row(&mut row, Some(row_id))?;
                }
            }
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // row primitives
    // ------------------------------------------------------------------

    pub fn insert_validated(&mut self, id: RelationId, mut row: Row) -> Result<RowId> {
        let relation = self.require_relation_mut(id)?;
        relation.validate_row(&mut row, None)?;
        let row_id = relation.data.insert(row);
        self.record(Change::InsertRow { relation: id, row_id });
        Ok(row_id)
    }

    pub fn update_validated(&mut self, id: RelationId, row_id: RowId, mut row: Row) -> Result<()> {
        let relation = self.require_relation_mut(id)?;
        relation.validate_row(&mut row, Some(row_id))?;
        let old_row = relation
            .data
            .update(row_id, row)
            .ok_or_else(|| DbError::ExecutionError(format!("row {:?} vanished", row_id)))?;
        self.record(Change::UpdateRow {
            relation: id,
            row_id,
            old_row,
        });
        Ok(())
    }

    pub fn delete_tracked(&mut self, id: RelationId, row_id: RowId) -> Result<()> {
        let relation = self.require_relation_mut(id)?;
        if let Some(old_row) = relation.data.delete(row_id) {
            self.record(Change::DeleteRow {
                relation: id,
                row_id,
                old_row,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // transactions
    // ------------------------------------------------------------------

    pub fn begin(&mut self, explicit: bool) -> Result<()> {
        if let Some(txn) = &self.session.transaction {
            if txn.is_explicit() && explicit {
                warn!(session = %self.session.id, "there is already a transaction in progress");
                return Ok(());
            }
            return Err(DbError::Internal("transaction already open".into()));
        }
        let txn = Transaction::begin(explicit);
        debug!(session = %self.session.id, txn = %txn.id(), explicit, "transaction started");
        self.session.transaction = Some(txn);
        Ok(())
    }

    /// Applies ON COMMIT actions of temporary relations and releases locks.
    pub fn commit(&mut self) -> Result<()> {
        let Some(txn) = self.session.transaction.take() else {
            warn!(session = %self.session.id, "there is no transaction in progress");
            return Ok(());
        };
        if txn.is_failed() {
            debug!(session = %self.session.id, txn = %txn.id(), "commit of failed transaction rolls back");
            self.undo(txn);
            return Err(DbError::TransactionAborted);
        }

        let mut dropped = Vec::new();
        for relation in self.session.temp_relations.iter_mut() {
            match relation.on_commit {
                OnCommit::DeleteRows => {
                    relation.data.truncate();
                }
                OnCommit::Drop => dropped.push(relation.id),
                OnCommit::PreserveRows => {}
            }
        }
        for id in dropped {
            self.session.temp_relations.remove(id);
        }
        self.shared.locks.release_all(self.session.id);
        debug!(session = %self.session.id, txn = %txn.id(), changes = txn.change_count(), "transaction committed");
        Ok(())
    }

    pub fn rollback(&mut self) {
        match self.session.transaction.take() {
            Some(txn) => self.undo(txn),
            None => warn!(session = %self.session.id, "there is no transaction in progress"),
        }
    }

    fn undo(&mut self, txn: Transaction) {
        let txn_id = txn.id();
        for change in txn.into_undo_log() {
            match change {
                Change::CreateRelation { relation } => {
                    if self.session.temp_relations.remove(relation).is_none() {
                        self.shared.relations.remove(relation);
                    }
                }
                Change::DropRelation { relation } => {
                    if relation.namespace == self.session.temp_namespace {
                        self.session.temp_relations.insert(*relation);
                    } else {
                        self.shared.relations.insert(*relation);
                    }
                }
                Change::RenameRelation { relation, old_name } => {
                    if let Some(rel) = self.relation_mut(relation) {
                        rel.name = old_name;
                    }
                }
                Change::AlterRelation { previous } => {
                    if let Some(rel) = self.relation_mut(previous.id) {
                        *rel = *previous;
                    }
                }
                Change::InsertRow { relation, row_id } => {
                    if let Some(rel) = self.relation_mut(relation) {
                        rel.data.delete(row_id);
                    }
                }
                Change::UpdateRow { relation, row_id, old_row } => {
                    if let Some(rel) = self.relation_mut(relation) {
                        rel.data.update(row_id, old_row);
                    }
                }
                Change::DeleteRow { relation, row_id, old_row } => {
                    if let Some(rel) = self.relation_mut(relation) {
                        rel.data.restore(row_id, old_row);
                    }
                }
            }
        }
        self.shared.locks.release_all(self.session.id);
        debug!(session = %self.session.id, txn = %txn_id, "transaction rolled back");
    }

    pub fn mark_failed(&mut self) {
        if let Some(txn) = self.session.transaction.as_mut() {
            txn.mark_failed();
        }
    }
}

impl HostEngine for ExecutionContext<'_> {
    fn session_id(&self) -> SessionId {
        self.session.id
    }

    fn session_user(&self) -> String {
        self.session.user.clone()
    }

    fn current_role(&self) -> String {
        self.session.role.clone()
    }

    fn set_current_role(&mut self, role: &str) -> Result<()> {
        if self.shared.role(role).is_none() {
            return Err(DbError::ExecutionError(format!("role \"{}\" does not exist", role)));
        }
        self.session.role = role.to_string();
        Ok(())
    }

    fn superuser_role(&self) -> String {
        BOOTSTRAP_SUPERUSER.to_string()
    }

    fn is_superuser(&self) -> bool {
        self.current_is_superuser()
    }

    fn namespace_by_name(&self, name: &str) -> Option<NamespaceId> {
        self.resolve_namespace(name).ok()
    }

    fn namespace_name(&self, id: NamespaceId) -> Option<String> {
        self.shared.namespaces.get(&id).map(|n| n.name.clone())
    }

    fn temp_namespace(&self) -> NamespaceId {
        self.session.temp_namespace
    }

    fn search_path(&self) -> Vec<String> {
        self.session.search_path.clone()
    }

    fn set_search_path(&mut self, path: Vec<String>) -> Result<()> {
        debug!(session = %self.session.id, ?path, "search_path changed");
        self.session.search_path = path;
        Ok(())
    }

    fn relation(&self, id: RelationId) -> Option<RelationInfo> {
        self.relation_ref(id).map(|r| self.info(r))
    }

    fn resolve_relation(&self, name: &ObjectName) -> Option<RelationId> {
        self.lookup(name)
    }

    fn relation_in(&self, namespace: NamespaceId, name: &str) -> Option<RelationId> {
        self.find_in(namespace, name)
    }

    fn check_ownership(&self, id: RelationId) -> Result<()> {
        self.ensure_owner(id)
    }

    fn rename_relation(&mut self, id: RelationId, new_name: &str) -> Result<()> {
        self.rename(id, new_name)
    }

    fn alter_owner(&mut self, id: RelationId, owner: &str) -> Result<()> {
        if self.shared.role(owner).is_none() {
            return Err(DbError::ExecutionError(format!("role \"{}\" does not exist", owner)));
        }
        self.ensure_owner(id)?;
        self.alter_relation(id, |relation| {
            relation.owner = owner.to_string();
            Ok(())
        })
    }

    fn define_relation(&mut self, def: RelationDef) -> Result<RelationId> {
        self.create_relation(def)
    }

    fn expand_like(&self, source: RelationId, on_commit: OnCommit, options: LikeOptions) -> Result<Vec<SubCommand>> {
        let relation = self.require_relation(source)?;
        let namespace = self.session.temp_namespace;
        let (def, indexes) =
            relation.like_definition(namespace, &relation.name, Persistence::Temporary, on_commit, options);
        let mut commands = vec![SubCommand::CreateRelation(def)];
        commands.extend(indexes.into_iter().map(|index| SubCommand::CreateIndex {
            namespace,
            relation: relation.name.clone(),
            index,
        }));
        Ok(commands)
    }

    fn execute_subcommand(&mut self, command: SubCommand) -> Result<Option<RelationId>> {
        match command {
            SubCommand::CreateRelation(def) => self.create_relation(def).map(Some),
            SubCommand::CreateIndex {
                namespace,
                relation,
                index,
            } => {
                let id = self
                    .find_in(namespace, &relation)
                    .ok_or_else(|| DbError::TableNotFound(relation.clone()))?;
                self.add_index(id, index)?;
                Ok(None)
            }
        }
    }

    fn create_table_as(
        &mut self,
        target: &ObjectName,
        persistence: Persistence,
        on_commit: OnCommit,
        query: &str,
        with_data: bool,
    ) -> Result<RelationId> {
        let parser = self.parser;
        let query = match parser.parse(query)?.into_iter().next() {
            Some(Statement::Query(query)) => query,
            _ => {
                return Err(DbError::ParseError(format!("expected a SELECT statement: {}", query)));
            }
        };
        super::ddl::create_table_as(self, target, persistence, on_commit, &query, with_data)
    }

    fn lock_relation(&mut self, id: RelationId, mode: LockMode) -> Result<()> {
        self.shared.locks.acquire(self.session.id, id, mode)
    }

    fn unlock_relation(&mut self, id: RelationId, mode: LockMode) -> bool {
        self.shared.locks.release(self.session.id, id, mode)
    }

    fn scan_rows(&self, id: RelationId) -> Result<Vec<(RowId, Row)>> {
        Ok(self
            .require_relation(id)?
            .data
            .scan()
            .map(|(row_id, row)| (row_id, row.clone()))
            .collect())
    }

    fn insert_row(&mut self, id: RelationId, row: Row) -> Result<RowId> {
        self.ensure_can_write(id)?;
        self.insert_validated(id, row)
    }

    fn update_row(&mut self, id: RelationId, row_id: RowId, row: Row) -> Result<()> {
        self.ensure_can_write(id)?;
        self.update_validated(id, row_id, row)
    }

    fn delete_row(&mut self, id: RelationId, row_id: RowId) -> Result<()> {
        self.ensure_can_write(id)?;
        self.delete_tracked(id, row_id)
    }

    fn standard_process_utility(&mut self, stmt: &Statement, _source: &str) -> Result<QueryResult> {
        let pipeline = self.pipeline;
        pipeline.execute(stmt, self)
    }
}
