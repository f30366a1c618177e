use super::ExecutionContext;
use super::{dml, query};
use crate::core::{DbError, Result};
use crate::parser::ast::Statement;
use crate::planner::PlannedStatement;
use crate::result::QueryResult;

/// Runs a planned query or DML statement.
///
/// Permission checks run against the plan's permission list, which must only
/// name relations of its range table.
pub fn execute_plan(ctx: &mut ExecutionContext<'_>, planned: &PlannedStatement) -> Result<QueryResult> {
    for permission in &planned.permissions {
        if !planned.rtable.iter().any(|rte| rte.relid == permission.relid) {
            return Err(DbError::Internal(format!(
                "permission check on relation {} which is not in the range table",
                permission.relid
            )));
        }
        if permission.required.writes() {
            ctx.ensure_can_write(permission.relid)?;
        }
    }
    for rte in &planned.rtable {
        ctx.require_relation(rte.relid)?;
    }

    let target = planned.relid_at(planned.result_relation);
    let source = planned.relid_at(planned.source_relation);
    let missing = || DbError::Internal("plan has no result relation".into());

    match &planned.statement {
        Statement::Query(q) => Ok(query::run_query(ctx, q, source)?.into()),
        Statement::Insert(insert) => dml::insert(ctx, insert, target.ok_or_else(missing)?, source),
        Statement::Update(update) => dml::update(ctx, update, target.ok_or_else(missing)?),
        Statement::Delete(delete) => dml::delete(ctx, delete, target.ok_or_else(missing)?),
        other => Err(DbError::Internal(format!("cannot execute {} as a plan", other.tag()))),
    }
}
