use super::{ExecutionContext, Executor};
use crate::core::{DbError, Result, Value};
use crate::gtt::host::HostEngine;
use crate::parser::ast::Statement;
use crate::result::QueryResult;

pub const SEARCH_PATH: &str = "search_path";

/// SET name = value. `search_path` feeds name resolution, everything else
/// lands in the session's settings map.
pub struct SetVariableExecutor;

impl Executor for SetVariableExecutor {
    fn name(&self) -> &'static str {
        "SET"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::SetVariable(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::SetVariable(set) = stmt else {
            return Err(DbError::Internal("SET executor got another statement".into()));
        };

        if set.name == SEARCH_PATH {
            let path = set
                .values
                .iter()
                .filter(|v| !v.is_empty())
                .cloned()
                .collect();
            ctx.set_search_path(path)?;
        } else {
            ctx.session
                .settings
                .insert(set.name.clone(), set.values.join(", "));
        }
        Ok(QueryResult::empty())
    }
}

pub struct ShowVariableExecutor;

impl Executor for ShowVariableExecutor {
    fn name(&self) -> &'static str {
        "SHOW"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::ShowVariable(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::ShowVariable(name) = stmt else {
            return Err(DbError::Internal("SHOW executor got another statement".into()));
        };

        let value = if name == SEARCH_PATH {
            ctx.search_path().join(", ")
        } else {
            ctx.session.settings.get(name).cloned().ok_or_else(|| {
                DbError::ExecutionError(format!("unrecognized configuration parameter \"{}\"", name))
            })?
        };
        Ok(QueryResult::new(vec![name.clone()], vec![vec![Value::Text(value)]]))
    }
}
