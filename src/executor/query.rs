// ============================================================================
// SELECT over a single relation: filter, sort, limit, project
// ============================================================================

use std::cmp::Ordering;

use super::ExecutionContext;
use crate::core::{DataType, DbError, RelationId, Result, Row, Value};
use crate::evaluator::EvaluationContext;
use crate::parser::ast::{BinaryOp, Expr, QueryStmt, SelectItem, UnaryOp};
use crate::result::QueryResult;

/// Result rows of a query together with the inferred type of each output column.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<(String, DataType)>,
    pub rows: Vec<Row>,
}

impl From<QueryOutput> for QueryResult {
    fn from(output: QueryOutput) -> Self {
        let columns = output.columns.into_iter().map(|(name, _)| name).collect();
        QueryResult::new(columns, output.rows)
    }
}

/// Runs `query` against `source`, the already resolved relation of its FROM clause.
pub fn run_query(ctx: &ExecutionContext<'_>, query: &QueryStmt, source: Option<RelationId>) -> Result<QueryOutput> {
    let (names, types, table, input): (Vec<String>, Vec<DataType>, String, Vec<Row>) = match source {
        Some(id) => {
            let relation = ctx.require_relation(id)?;
            (
                relation.column_names(),
                relation.columns.iter().map(|c| c.data_type).collect(),
                relation.name.clone(),
                relation.data.scan().map(|(_, row)| row.clone()).collect(),
            )
        }
        None => (Vec::new(), Vec::new(), String::new(), vec![Vec::new()]),
    };
    let eval = EvaluationContext::new(&names, &table);

    let mut rows = Vec::new();
    for row in input {
        if eval.matches(query.selection.as_ref(), &row)? {
            rows.push(row);
        }
    }

    let output_columns = output_columns(&query.projection, &names, &types, &table)?;
    let mut projected = Vec::with_capacity(rows.len());
    for row in rows {
        let out = project(&eval, &query.projection, &row)?;
        projected.push((row, out));
    }

    if !query.order_by.is_empty() {
        let mut keyed = Vec::with_capacity(projected.len());
        for (row, out) in projected {
            let mut key = Vec::with_capacity(query.order_by.len());
            for order in &query.order_by {
                key.push(sort_key(&eval, &order.expr, &row, &out, &names, &output_columns)?);
            }
            keyed.push((key, row, out));
        }

        let mut failure = None;
        keyed.sort_by(|(a, ..), (b, ..)| {
            for ((x, y), order) in a.iter().zip(b).zip(&query.order_by) {
                let ordering = match x.compare(y) {
                    Ok(o) => o,
                    Err(err) => {
                        failure.get_or_insert(err);
                        Ordering::Equal
                    }
                };
                let ordering = if order.descending { ordering.reverse() } else { ordering };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        if let Some(err) = failure {
            return Err(err);
        }
        projected = keyed.into_iter().map(|(_, row, out)| (row, out)).collect();
    }

    if let Some(limit) = query.limit {
        projected.truncate(limit);
    }

    Ok(QueryOutput {
        columns: output_columns,
        rows: projected.into_iter().map(|(_, out)| out).collect(),
    })
}

fn project(eval: &EvaluationContext<'_>, projection: &[SelectItem], row: &Row) -> Result<Row> {
    let mut out = Vec::new();
    for item in projection {
        match item {
            SelectItem::Wildcard => out.extend(row.iter().cloned()),
            SelectItem::Expr { expr, .. } => out.push(eval.evaluate(expr, row)?),
        }
    }
    Ok(out)
}

/// ORDER BY may name a source column or an output alias.
fn sort_key(
    eval: &EvaluationContext<'_>,
    expr: &Expr,
    row: &Row,
    out: &Row,
    names: &[String],
    output: &[(String, DataType)],
) -> Result<Value> {
    if let Expr::Column(name) = expr {
        if !names.contains(name) {
            if let Some(idx) = output.iter().position(|(n, _)| n == name) {
                return Ok(out[idx].clone());
            }
        }
    }
    eval.evaluate(expr, row)
}

fn output_columns(
    projection: &[SelectItem],
    names: &[String],
    types: &[DataType],
    table: &str,
) -> Result<Vec<(String, DataType)>> {
    let mut columns = Vec::new();
    for item in projection {
        match item {
            SelectItem::Wildcard => {
                if names.is_empty() {
                    return Err(DbError::ExecutionError("SELECT * with no tables specified is not valid".into()));
                }
                columns.extend(names.iter().cloned().zip(types.iter().copied()));
            }
            SelectItem::Expr { expr, alias } => {
                let name = match (alias, expr) {
                    (Some(alias), _) => alias.clone(),
                    (None, Expr::Column(column)) => column.clone(),
                    (None, Expr::Cast { expr: inner, .. }) => match &**inner {
                        Expr::Column(column) => column.clone(),
                        _ => "?column?".to_string(),
                    },
                    _ => "?column?".to_string(),
                };
                columns.push((name, infer_type(expr, names, types, table)?));
            }
        }
    }
    Ok(columns)
}

/// Static type of an expression over the given columns.
pub fn infer_type(expr: &Expr, names: &[String], types: &[DataType], table: &str) -> Result<DataType> {
    let data_type = match expr {
        Expr::Literal(value) => match value {
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::Boolean(_) => DataType::Boolean,
            Value::Oid(_) => DataType::Oid,
            Value::Text(_) | Value::Null => DataType::Text,
        },
        Expr::Column(name) => {
            let idx = names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| DbError::ColumnNotFound(name.clone(), table.to_string()))?;
            types[idx]
        }
        Expr::Cast { data_type, .. } => *data_type,
        Expr::IsNull { .. } => DataType::Boolean,
        Expr::UnaryOp { op: UnaryOp::Not, .. } => DataType::Boolean,
        Expr::UnaryOp { expr, .. } => infer_type(expr, names, types, table)?,
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq
            | BinaryOp::And
            | BinaryOp::Or => DataType::Boolean,
            BinaryOp::Concat => DataType::Text,
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
                let lhs = infer_type(left, names, types, table)?;
                let rhs = infer_type(right, names, types, table)?;
                let integral = |t: DataType| matches!(t, DataType::Integer | DataType::Oid);
                if integral(lhs) && integral(rhs) {
                    DataType::Integer
                } else {
                    DataType::Float
                }
            }
        },
    };
    Ok(data_type)
}
