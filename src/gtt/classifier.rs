//! Decides what a utility statement means for global temporary tables.
//!
//! Template creation and renaming are carried out here entirely. Drops are
//! redirected to the placeholder and then run normally. Other DDL on a
//! template is refused while the template is materialized in this session.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use super::host::HostEngine;
use super::materializer;
use super::namespace::append_schema;
use super::privilege::ElevatedRights;
use super::registry::RegistryStore;
use super::session::GttSession;
use super::template::{SessionBinding, Template};
use crate::core::{DbError, RelationId, Result};
use crate::executor::settings::SEARCH_PATH;
use crate::parser::ast::{
    AlterTableStmt, CommentStmt, CreateIndexStmt, CreateTableAsStmt, CreateTableStmt, DropTableStmt, ObjectName,
    OnCommit, Persistence, SetVariableStmt, Statement, TableConstraint,
};
use crate::result::QueryResult;

lazy_static! {
    static ref GLOBAL_MARKER_RE: Regex =
        Regex::new(r"(?is)^\s*CREATE\s+(/\*\s*)?GLOBAL(\s*\*/)?").expect("GLOBAL marker pattern");
}

const ON_COMMIT_DROP_MSG: &str = "use of ON COMMIT DROP with GLOBAL TEMPORARY is not allowed";
const FOREIGN_KEY_MSG: &str = "attempt to create referential integrity constraint on global temporary table";
const PARTITION_MSG: &str = "global temporary table can not be partitioned";
const IN_USE_DROP_MSG: &str = "can not drop a GTT that is in use.";

fn in_use(action: &str) -> DbError {
    DbError::StateConflict(format!(
        "a temporary table has been created and is active, can not {} the GTT table in this session.",
        action
    ))
}

/// Outcome of classifying one utility statement.
#[derive(Debug)]
pub enum Classification {
    /// The statement was fully processed here; normal execution is skipped.
    Handled(QueryResult),
    /// Normal execution continues, possibly with a rewritten statement.
    PassThrough,
}

/// Whether a CREATE TEMPORARY statement asks for a global temporary table,
/// either through the parsed GLOBAL keyword or the `CREATE /*GLOBAL*/` form.
pub fn is_global_definition(global_keyword: bool, source: &str) -> bool {
    global_keyword || GLOBAL_MARKER_RE.is_match(source)
}

pub fn classify(
    session: &mut GttSession,
    host: &mut dyn HostEngine,
    stmt: &mut Statement,
    source: &str,
) -> Result<Classification> {
    match stmt {
        Statement::CreateTable(create)
            if create.persistence == Persistence::Temporary && is_global_definition(create.global, source) =>
        {
            create_template(session, host, create, source)
        }
        Statement::CreateTableAs(ctas)
            if ctas.persistence == Persistence::Temporary
                && !ctas.is_select_into
                && is_global_definition(ctas.global, source) =>
        {
            create_template_as(session, host, ctas, source)
        }
        Statement::DropTable(drop) => drop_templates(session, host, drop),
        Statement::AlterTable(alter) => alter_template(session, host, alter),
        Statement::Comment(comment) => comment_template(session, host, comment),
        Statement::CreateIndex(index) => index_template(session, host, index),
        Statement::SetVariable(set) => {
            force_schema_in_path(session, set);
            Ok(Classification::PassThrough)
        }
        _ => Ok(Classification::PassThrough),
    }
}

/// Template name denoted by `name`, whether it resolves to the placeholder or to
/// this session's materialization.
pub fn locate_template(session: &mut GttSession, host: &dyn HostEngine, name: &ObjectName) -> Result<Option<String>> {
    if name.schema.as_deref() == Some(session.schema()) {
        return Ok(session.load_binding(host, &name.name)?.then(|| name.name.clone()));
    }
    match host.resolve_relation(name) {
        Some(id) => session.template_for_relation(host, id),
        None => Ok(None),
    }
}

fn check_duplicate(session: &mut GttSession, host: &dyn HostEngine, name: &str, if_not_exists: bool) -> Result<bool> {
    if !session.load_binding(host, name)? {
        return Ok(false);
    }
    if if_not_exists {
        info!(template = name, "global temporary table already exists, skipping");
        return Ok(true);
    }
    Err(DbError::DuplicateTemplate(name.to_string()))
}

/// Runs the placeholder creation as superuser, hands the placeholder back to
/// the caller's role and records the template.
fn register_placeholder(
    session: &GttSession,
    host: &mut dyn HostEngine,
    placeholder: &Statement,
    source: &str,
    name: &str,
    preserve_on_commit: bool,
    definition_text: String,
) -> Result<Template> {
    let mut elevated = ElevatedRights::enter(host)?;
    let owner = elevated.original_role();
    elevated.standard_process_utility(placeholder, source)?;

    let namespace = elevated
        .namespace_by_name(session.schema())
        .ok_or_else(|| DbError::Configuration(format!("managing schema \"{}\" does not exist", session.schema())))?;
    let placeholder_id: RelationId = elevated
        .relation_in(namespace, name)
        .ok_or_else(|| DbError::Internal(format!("placeholder of {} was not created", name)))?;
    elevated.alter_owner(placeholder_id, &owner)?;

    let template = Template {
        placeholder_id,
        owning_schema: session.schema().to_string(),
        name: name.to_string(),
        preserve_on_commit,
        definition_text,
    };
    session.registry().register(&mut *elevated, &template)?;
    Ok(template)
}

fn create_template(
    session: &mut GttSession,
    host: &mut dyn HostEngine,
    create: &CreateTableStmt,
    source: &str,
) -> Result<Classification> {
    if create.partitioned {
        return Err(DbError::Definition(PARTITION_MSG.into()));
    }
    let has_foreign_key = create.columns.iter().any(|c| c.references.is_some())
        || create
            .constraints
            .iter()
            .any(|c| matches!(c, TableConstraint::ForeignKey { .. }));
    if has_foreign_key {
        return Err(DbError::Definition(FOREIGN_KEY_MSG.into()));
    }
    if create.on_commit == Some(OnCommit::Drop) {
        return Err(DbError::Definition(ON_COMMIT_DROP_MSG.into()));
    }
    let name = create.name.name.clone();
    if check_duplicate(session, host, &name, create.if_not_exists)? {
        return Ok(Classification::Handled(QueryResult::empty()));
    }

    let mut placeholder = create.clone();
    placeholder.name = ObjectName::qualified(session.schema(), name.clone());
    placeholder.persistence = Persistence::Unlogged;
    placeholder.global = false;
    placeholder.on_commit = None;

    let preserve = create.on_commit != Some(OnCommit::DeleteRows);
    let template = register_placeholder(
        session,
        host,
        &Statement::CreateTable(placeholder),
        source,
        &name,
        preserve,
        create.definition.clone(),
    )?;
    info!(template = %name, placeholder = %template.placeholder_id, preserve, "global temporary table created");
    session.cache_mut().insert_or_replace(SessionBinding::new(template));
    Ok(Classification::Handled(QueryResult::empty()))
}

fn create_template_as(
    session: &mut GttSession,
    host: &mut dyn HostEngine,
    ctas: &CreateTableAsStmt,
    source: &str,
) -> Result<Classification> {
    if ctas.on_commit == Some(OnCommit::Drop) {
        return Err(DbError::Definition(ON_COMMIT_DROP_MSG.into()));
    }
    let name = ctas.name.name.clone();
    if check_duplicate(session, host, &name, ctas.if_not_exists)? {
        return Ok(Classification::Handled(QueryResult::empty()));
    }

    let mut placeholder = ctas.clone();
    placeholder.name = ObjectName::qualified(session.schema(), name.clone());
    placeholder.persistence = Persistence::Unlogged;
    placeholder.global = false;
    placeholder.on_commit = None;
    placeholder.skip_data = true;

    let preserve = ctas.on_commit != Some(OnCommit::DeleteRows);
    let template = register_placeholder(
        session,
        host,
        &Statement::CreateTableAs(placeholder),
        source,
        &name,
        preserve,
        format!("AS {}", ctas.query_text),
    )?;
    info!(template = %name, placeholder = %template.placeholder_id, preserve, "global temporary table created from query");

    let mut binding = SessionBinding::new(template);
    let mut result = QueryResult::empty();
    if !ctas.skip_data {
        let id = materializer::materialize(host, &binding.template, true)?;
        result = QueryResult::affected(host.scan_rows(id)?.len());
        binding.materialized_id = Some(id);
    }
    session.cache_mut().insert_or_replace(binding);
    Ok(Classification::Handled(result))
}

fn drop_templates(session: &mut GttSession, host: &mut dyn HostEngine, drop: &mut DropTableStmt) -> Result<Classification> {
    for name in drop.names.iter_mut() {
        let Some(template) = locate_template(session, host, name)? else {
            continue;
        };
        if session.revalidate(host, &template) {
            return Err(DbError::StateConflict(IN_USE_DROP_MSG.into()));
        }
        let placeholder = session
            .cache()
            .lookup(&template)
            .map(|b| b.template.placeholder_id)
            .ok_or_else(|| DbError::Internal(format!("template {} is not cached", template)))?;
        if host.relation_exists(placeholder) {
            host.check_ownership(placeholder)?;
        }

        {
            let mut elevated = ElevatedRights::enter(host)?;
            let registry = session.registry();
            if registry.unregister(&mut *elevated, placeholder)? == 0 {
                registry.unregister_by_name(&mut *elevated, &template)?;
            }
        }
        session.cache_mut().delete(&template);
        *name = ObjectName::qualified(session.schema(), template.clone());
        debug!(template = %template, target = %name, "drop redirected to placeholder");
    }
    Ok(Classification::PassThrough)
}

fn alter_template(session: &mut GttSession, host: &mut dyn HostEngine, alter: &AlterTableStmt) -> Result<Classification> {
    let Some(template) = locate_template(session, host, &alter.name)? else {
        return Ok(Classification::PassThrough);
    };

    if let Some(new_name) = alter.rename_target() {
        if session.revalidate(host, &template) {
            return Err(in_use("rename"));
        }
        let placeholder = session
            .cache()
            .lookup(&template)
            .map(|b| b.template.placeholder_id)
            .ok_or_else(|| DbError::Internal(format!("template {} is not cached", template)))?;
        host.rename_relation(placeholder, new_name)?;
        {
            let mut elevated = ElevatedRights::enter(host)?;
            session.registry().rename(&mut *elevated, placeholder, new_name)?;
        }
        session.cache_mut().rename(&template, new_name);
        info!(from = %template, to = new_name, "global temporary table renamed");
        return Ok(Classification::Handled(QueryResult::empty()));
    }

    if alter.adds_foreign_key() {
        return Err(DbError::Definition(FOREIGN_KEY_MSG.into()));
    }
    if session.revalidate(host, &template) {
        return Err(in_use("alter"));
    }
    Ok(Classification::PassThrough)
}

fn comment_template(session: &mut GttSession, host: &mut dyn HostEngine, comment: &CommentStmt) -> Result<Classification> {
    let Some(id) = host.resolve_relation(comment.target.table()) else {
        return Ok(Classification::PassThrough);
    };
    if host.relation(id).map(|r| r.namespace) != Some(host.temp_namespace()) {
        return Ok(Classification::PassThrough);
    }
    if let Some(template) = session.template_for_relation(host, id)? {
        if session.revalidate(host, &template) {
            return Err(in_use("add a comment on"));
        }
    }
    Ok(Classification::PassThrough)
}

fn index_template(session: &mut GttSession, host: &mut dyn HostEngine, index: &CreateIndexStmt) -> Result<Classification> {
    if let Some(template) = locate_template(session, host, &index.table)? {
        if session.revalidate(host, &template) {
            return Err(in_use("create an index on"));
        }
    }
    Ok(Classification::PassThrough)
}

fn force_schema_in_path(session: &GttSession, set: &mut SetVariableStmt) {
    if !set.name.eq_ignore_ascii_case(SEARCH_PATH) {
        return;
    }
    if append_schema(&mut set.values, session.schema()) {
        debug!(path = ?set.values, "managing schema appended to requested search_path");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_marker() {
        assert!(is_global_definition(true, "create temp table t (id int)"));
        assert!(is_global_definition(false, "CREATE GLOBAL TEMPORARY TABLE t (id int)"));
        assert!(is_global_definition(false, "  create\n/*GLOBAL*/ temporary table t (id int)"));
        assert!(is_global_definition(false, "CREATE /* global */ TEMP TABLE t AS SELECT 1"));
        assert!(!is_global_definition(false, "CREATE TEMPORARY TABLE t (id int)"));
        assert!(!is_global_definition(false, "CREATE LOCAL TEMPORARY TABLE global (id int)"));
    }

    #[test]
    fn test_state_conflict_messages() {
        let err = in_use("rename");
        assert_eq!(err.class(), crate::core::ErrorClass::StateConflict);
        assert_eq!(
            err.to_string(),
            "a temporary table has been created and is active, can not rename the GTT table in this session."
        );
    }
}
