use super::ExecutionContext;
use super::query::run_query;
use crate::core::{DbError, RelationId, Result, Row, RowId, Value};
use crate::evaluator::EvaluationContext;
use crate::parser::ast::{DeleteStmt, Expr, InsertSource, InsertStmt, UpdateStmt};
use crate::result::QueryResult;
use crate::storage::Relation;

/// INSERT into the resolved `target`; `source` is the FROM relation of an INSERT ... SELECT.
pub fn insert(
    ctx: &mut ExecutionContext<'_>,
    stmt: &InsertStmt,
    target: RelationId,
    source: Option<RelationId>,
) -> Result<QueryResult> {
    let relation = ctx.require_relation(target)?;
    let positions = match &stmt.columns {
        Some(columns) => columns
            .iter()
            .map(|c| relation.column_index(c))
            .collect::<Result<Vec<_>>>()?,
        None => (0..relation.columns.len()).collect(),
    };

    let inputs: Vec<Row> = match &stmt.source {
        InsertSource::Values(rows) => {
            let eval = EvaluationContext::constant();
            let empty = Vec::new();
            rows.iter()
                .map(|exprs| exprs.iter().map(|e| eval.evaluate(e, &empty)).collect::<Result<Row>>())
                .collect::<Result<_>>()?
        }
        InsertSource::Query(query) => run_query(ctx, query, source)?.rows,
    };

    let mut inserted = 0;
    for input in inputs {
        if input.len() > positions.len() {
            return Err(DbError::ExecutionError("INSERT has more expressions than target columns".into()));
        }
        let mut supplied: Vec<Option<Value>> = vec![None; ctx.require_relation(target)?.columns.len()];
        for (value, &position) in input.into_iter().zip(&positions) {
            supplied[position] = Some(value);
        }
        let row = complete_row(ctx.require_relation_mut(target)?, supplied)?;
        ctx.insert_validated(target, row)?;
        inserted += 1;
    }
    Ok(QueryResult::affected(inserted))
}

/// Fills in defaults, identity values and generated columns.
fn complete_row(relation: &mut Relation, supplied: Vec<Option<Value>>) -> Result<Row> {
    let constant = EvaluationContext::constant();
    let empty = Vec::new();
    let mut row = Vec::with_capacity(supplied.len());

    for (idx, value) in supplied.into_iter().enumerate() {
        let column = &relation.columns[idx];
        if column.generated.is_some() {
            if value.as_ref().is_some_and(|v| !v.is_null()) {
                return Err(DbError::ExecutionError(format!(
                    "cannot insert a non-DEFAULT value into column \"{}\"",
                    column.name
                )));
            }
            row.push(Value::Null);
            continue;
        }
        let value = match value {
            Some(value) => value,
            None if column.identity => Value::Integer(relation.data.next_identity(idx)),
            None => match &column.default {
                Some(expr) => constant.evaluate(expr, &empty)?,
                None => Value::Null,
            },
        };
        row.push(value);
    }

    compute_generated(relation, &mut row)?;
    Ok(row)
}

fn compute_generated(relation: &Relation, row: &mut Row) -> Result<()> {
    let names = relation.column_names();
    let eval = EvaluationContext::new(&names, &relation.name);
    for (idx, column) in relation.columns.iter().enumerate() {
        if let Some(expr) = &column.generated {
            let value = eval.evaluate(expr, row)?;
            row[idx] = value;
        }
    }
    Ok(())
}

fn matching_rows(ctx: &ExecutionContext<'_>, target: RelationId, selection: Option<&Expr>) -> Result<Vec<(RowId, Row)>> {
    let relation = ctx.require_relation(target)?;
    let names = relation.column_names();
    let eval = EvaluationContext::new(&names, &relation.name);
    let mut rows = Vec::new();
    for (row_id, row) in relation.data.scan() {
        if eval.matches(selection, row)? {
            rows.push((row_id, row.clone()));
        }
    }
    Ok(rows)
}

pub fn update(ctx: &mut ExecutionContext<'_>, stmt: &UpdateStmt, target: RelationId) -> Result<QueryResult> {
    let relation = ctx.require_relation(target)?;
    let mut assignments = Vec::with_capacity(stmt.assignments.len());
    for assignment in &stmt.assignments {
        let idx = relation.column_index(&assignment.column)?;
        if relation.columns[idx].generated.is_some() {
            return Err(DbError::ExecutionError(format!(
                "column \"{}\" can only be updated to DEFAULT",
                assignment.column
            )));
        }
        assignments.push((idx, &assignment.value));
    }

    let rows = matching_rows(ctx, target, stmt.selection.as_ref())?;
    let updated = rows.len();
    for (row_id, old_row) in rows {
        let relation = ctx.require_relation(target)?;
        let names = relation.column_names();
        let eval = EvaluationContext::new(&names, &relation.name);
        let mut new_row = old_row.clone();
        // every assignment sees the row as it was before the update
        for (idx, expr) in &assignments {
            new_row[*idx] = eval.evaluate(expr, &old_row)?;
        }
        compute_generated(relation, &mut new_row)?;
        ctx.update_validated(target, row_id, new_row)?;
    }
    Ok(QueryResult::affected(updated))
}

pub fn delete(ctx: &mut ExecutionContext<'_>, stmt: &DeleteStmt, target: RelationId) -> Result<QueryResult> {
    let rows = matching_rows(ctx, target, stmt.selection.as_ref())?;
    let deleted = rows.len();
    for (row_id, _) in rows {
        ctx.delete_tracked(target, row_id)?;
    }
    Ok(QueryResult::affected(deleted))
}
