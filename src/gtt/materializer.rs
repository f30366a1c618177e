use tracing::debug;

use super::host::HostEngine;
use super::template::Template;
use crate::core::{DbError, ErrorClass, RelationId, Result};
use crate::parser::ast::{ObjectName, Persistence};
use crate::storage::catalog::TEMP_SCHEMA_ALIAS;
use crate::storage::{LikeOptions, LockMode};

/// Everything a LIKE clause can carry over; foreign keys never exist on templates.
pub const TEMPLATE_LIKE_OPTIONS: LikeOptions = LikeOptions::all();

/// Creates this session's private relation for `template` and returns its id.
///
/// The placeholder is held in SHARE UPDATE EXCLUSIVE mode while its structure
/// is read, so a concurrent rename or drop cannot interleave. The lock is
/// released on every path.
pub fn materialize(host: &mut dyn HostEngine, template: &Template, with_data: bool) -> Result<RelationId> {
    let placeholder = template.placeholder_id;
    host.lock_relation(placeholder, LockMode::ShareUpdateExclusive)?;
    let result = build(host, template, with_data);
    host.unlock_relation(placeholder, LockMode::ShareUpdateExclusive);

    match result {
        Ok(id) => {
            debug!(template = %template.name, placeholder = %placeholder, relation = %id, "template materialized");
            Ok(id)
        }
        Err(err) if matches!(err.class(), ErrorClass::Internal | ErrorClass::StateConflict) => Err(err),
        Err(err) => Err(DbError::Internal(format!(
            "can not create global temporary table {}: {}",
            template.name, err
        ))),
    }
}

fn build(host: &mut dyn HostEngine, template: &Template, with_data: bool) -> Result<RelationId> {
    if !host.relation_exists(template.placeholder_id) {
        return Err(DbError::Internal(format!(
            "placeholder relation {} of {} does not exist",
            template.placeholder_id, template.name
        )));
    }

    // the private copy takes the template's name in pg_temp
    if host.relation_in(host.temp_namespace(), &template.name).is_some() {
        return Err(DbError::StateConflict(format!(
            "a temporary table named \"{}\" already exists in this session, can not create the GTT table.",
            template.name
        )));
    }

    if let Some(query) = template.query() {
        let target = ObjectName::qualified(TEMP_SCHEMA_ALIAS, template.name.clone());
        return host.create_table_as(&target, Persistence::Temporary, template.on_commit(), query, with_data);
    }

    let commands = host.expand_like(template.placeholder_id, template.on_commit(), TEMPLATE_LIKE_OPTIONS)?;
    let mut created = None;
    for command in commands {
        if let Some(id) = host.execute_subcommand(command)? {
            created.get_or_insert(id);
        }
    }
    created.ok_or_else(|| DbError::Internal(format!("no relation created for template {}", template.name)))
}
