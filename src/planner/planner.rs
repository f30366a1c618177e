use tracing::trace;

use super::analyzed::{
    AnalyzedStatement, CommandKind, PermissionInfo, PlannedStatement, Privileges, RangeTableEntry,
};
use crate::core::{DbError, Result};
use crate::executor::ExecutionContext;
use crate::gtt::host::HostEngine;
use crate::parser::ast::{InsertSource, ObjectName, Statement};
use crate::storage::LockMode;

/// Resolves names of DML and queries into range tables, then turns them into plans.
pub struct QueryPlanner;

impl QueryPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Name resolution. Locks every referenced relation at the mode the statement needs.
    pub fn analyze(&self, ctx: &mut ExecutionContext<'_>, statement: Statement) -> Result<AnalyzedStatement> {
        let mut builder = RangeTableBuilder::default();

        let (command, result_relation, source_relation) = match &statement {
            Statement::Query(query) => {
                let source = match &query.from {
                    Some(from) => Some(builder.add(
                        ctx,
                        &from.name,
                        from.alias.clone(),
                        LockMode::AccessShare,
                        Privileges::SELECT,
                    )?),
                    None => None,
                };
                (CommandKind::Select, None, source)
            }
            Statement::Insert(insert) => {
                let target = builder.add(ctx, &insert.table, None, LockMode::RowExclusive, Privileges::INSERT)?;
                let source = match &insert.source {
                    InsertSource::Query(query) => match &query.from {
                        Some(from) => Some(builder.add(
                            ctx,
                            &from.name,
                            from.alias.clone(),
                            LockMode::AccessShare,
                            Privileges::SELECT,
                        )?),
                        None => None,
                    },
                    InsertSource::Values(_) => None,
                };
                (CommandKind::Insert, Some(target), source)
            }
            Statement::Update(update) => {
                let target = builder.add(
                    ctx,
                    &update.table,
                    None,
                    LockMode::RowExclusive,
                    Privileges::UPDATE | Privileges::SELECT,
                )?;
                (CommandKind::Update, Some(target), None)
            }
            Statement::Delete(delete) => {
                let target = builder.add(
                    ctx,
                    &delete.table,
                    None,
                    LockMode::RowExclusive,
                    Privileges::DELETE | Privileges::SELECT,
                )?;
                (CommandKind::Delete, Some(target), None)
            }
            other => {
                return Err(DbError::Internal(format!(
                    "{} is a utility statement and cannot be analyzed",
                    other.tag()
                )));
            }
        };

        trace!(command = ?command, relations = builder.rtable.len(), "statement analyzed");
        Ok(AnalyzedStatement {
            command,
            rtable: builder.rtable,
            permissions: builder.permissions,
            result_relation,
            source_relation,
            statement,
        })
    }

    pub fn plan(&self, analyzed: AnalyzedStatement) -> PlannedStatement {
        PlannedStatement::from(analyzed)
    }

    /// Re-takes the locks recorded in a plan, for plans kept across transactions.
    pub fn acquire_locks(&self, ctx: &mut ExecutionContext<'_>, planned: &PlannedStatement) -> Result<()> {
        for rte in &planned.rtable {
            ctx.lock_relation(rte.relid, rte.lock_mode)?;
        }
        Ok(())
    }
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct RangeTableBuilder {
    rtable: Vec<RangeTableEntry>,
    permissions: Vec<PermissionInfo>,
}

impl RangeTableBuilder {
    fn add(
        &mut self,
        ctx: &mut ExecutionContext<'_>,
        name: &ObjectName,
        alias: Option<String>,
        lock_mode: LockMode,
        required: Privileges,
    ) -> Result<usize> {
        let relid = ctx.resolve(name)?;
        ctx.lock_relation(relid, lock_mode)?;

        match self.permissions.iter_mut().find(|p| p.relid == relid) {
            Some(existing) => existing.required |= required,
            None => self.permissions.push(PermissionInfo { relid, required }),
        }
        self.rtable.push(RangeTableEntry {
            relid,
            name: name.clone(),
            alias,
            lock_mode,
        });
        Ok(self.rtable.len() - 1)
    }
}
