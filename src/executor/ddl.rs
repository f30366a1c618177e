use tracing::info;

use super::query::run_query;
use super::{ExecutionContext, Executor};
use crate::core::{DbError, RelationId, Result, Row, RowId, Value};
use crate::evaluator::EvaluationContext;
use crate::gtt::host::HostEngine;
use crate::parser::ast::{
    AlterTableOperation, AlterTableStmt, ColumnDef, CommentStmt, CommentTarget, CreateIndexStmt,
    CreateTableAsStmt, CreateTableStmt, DropTableStmt, ObjectName, OnCommit, Persistence, QueryStmt,
    Statement, TableConstraint,
};
use crate::result::QueryResult;
use crate::storage::catalog::constraint_name;
use crate::storage::{ColumnMeta, ConstraintDef, ConstraintKind, IndexDef, LockMode, Relation, RelationDef};

pub struct CreateTableExecutor;

impl Executor for CreateTableExecutor {
    fn name(&self) -> &'static str {
        "CREATE_TABLE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::CreateTable(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::CreateTable(create) = stmt else {
            return Err(DbError::Internal("CREATE_TABLE executor got another statement".into()));
        };
        create_table(ctx, create)?;
        Ok(QueryResult::empty())
    }
}

/// Creates a relation from a CREATE TABLE statement and returns its id,
/// or `None` when IF NOT EXISTS found an existing one.
pub fn create_table(ctx: &mut ExecutionContext<'_>, create: &CreateTableStmt) -> Result<Option<RelationId>> {
    if create.partitioned {
        return Err(DbError::UnsupportedOperation("partitioned tables are not supported".into()));
    }
    let (namespace, persistence) = ctx.creation_namespace(&create.name, create.persistence)?;
    if create.if_not_exists && ctx.find_in(namespace, &create.name.name).is_some() {
        info!(table = %create.name, "relation already exists, skipping");
        return Ok(None);
    }

    let (columns, constraints) = build_columns(&create.name.name, &create.columns, &create.constraints)?;
    let def = RelationDef {
        namespace,
        name: create.name.name.clone(),
        persistence,
        on_commit: create.on_commit.unwrap_or(OnCommit::PreserveRows),
        owner: None,
        columns,
        constraints,
        comment: None,
    };
    ctx.create_relation(def).map(Some)
}

/// Turns parsed column and table constraint definitions into catalog entries.
pub fn build_columns(
    table: &str,
    defs: &[ColumnDef],
    table_constraints: &[TableConstraint],
) -> Result<(Vec<ColumnMeta>, Vec<ConstraintDef>)> {
    let mut columns: Vec<ColumnMeta> = Vec::with_capacity(defs.len());
    let mut constraints = Vec::new();

    for def in defs {
        if def.references.is_some() {
            return Err(DbError::UnsupportedOperation(
                "foreign key constraints are not supported".into(),
            ));
        }
        if columns.iter().any(|c| c.name == def.name) {
            return Err(DbError::ExecutionError(format!(
                "column \"{}\" specified more than once",
                def.name
            )));
        }
        columns.push(ColumnMeta {
            name: def.name.clone(),
            data_type: def.data_type,
            nullable: def.nullable && !def.primary_key,
            default: def.default.clone(),
            identity: def.identity,
            generated: def.generated.clone(),
            comment: None,
        });

        let single = std::slice::from_ref(&def.name);
        if def.primary_key {
            constraints.push(ConstraintDef {
                name: constraint_name(table, "pkey", &[]),
                kind: ConstraintKind::PrimaryKey(single.to_vec()),
            });
        }
        if def.unique {
            constraints.push(ConstraintDef {
                name: constraint_name(table, "key", single),
                kind: ConstraintKind::Unique(single.to_vec()),
            });
        }
        if let Some(check) = &def.check {
            constraints.push(ConstraintDef {
                name: constraint_name(table, "check", single),
                kind: ConstraintKind::Check(check.clone()),
            });
        }
    }

    for constraint in table_constraints {
        let def = table_constraint(table, constraint, &constraints)?;
        if let ConstraintKind::PrimaryKey(keys) = &def.kind {
            for key in keys {
                let column = columns.iter_mut().find(|c| &c.name == key).ok_or_else(|| {
                    DbError::ColumnNotFound(key.clone(), table.to_string())
                })?;
                column.nullable = false;
            }
        }
        constraints.push(def);
    }

    let primary_keys = constraints
        .iter()
        .filter(|c| matches!(c.kind, ConstraintKind::PrimaryKey(_)))
        .count();
    if primary_keys > 1 {
        return Err(DbError::ExecutionError(format!(
            "multiple primary keys for table \"{}\" are not allowed",
            table
        )));
    }
    for constraint in &constraints {
        if let ConstraintKind::Unique(keys) = &constraint.kind {
            for key in keys {
                if !columns.iter().any(|c| &c.name == key) {
                    return Err(DbError::ColumnNotFound(key.clone(), table.to_string()));
                }
            }
        }
    }
    Ok((columns, constraints))
}

fn table_constraint(table: &str, constraint: &TableConstraint, existing: &[ConstraintDef]) -> Result<ConstraintDef> {
    let def = match constraint {
        TableConstraint::PrimaryKey { name, columns } => ConstraintDef {
            name: name.clone().unwrap_or_else(|| constraint_name(table, "pkey", &[])),
            kind: ConstraintKind::PrimaryKey(columns.clone()),
        },
        TableConstraint::Unique { name, columns } => ConstraintDef {
            name: name.clone().unwrap_or_else(|| constraint_name(table, "key", columns)),
            kind: ConstraintKind::Unique(columns.clone()),
        },
        TableConstraint::Check { name, expr } => {
            let name = name.clone().unwrap_or_else(|| {
                let base = constraint_name(table, "check", &[]);
                let taken = existing.iter().filter(|c| c.name.starts_with(&base)).count();
                if taken == 0 { base } else { format!("{}{}", base, taken) }
            });
            ConstraintDef {
                name,
                kind: ConstraintKind::Check(expr.clone()),
            }
        }
        TableConstraint::ForeignKey { .. } => {
            return Err(DbError::UnsupportedOperation(
                "foreign key constraints are not supported".into(),
            ));
        }
    };
    Ok(def)
}

pub struct CreateTableAsExecutor;

impl Executor for CreateTableAsExecutor {
    fn name(&self) -> &'static str {
        "CREATE_TABLE_AS"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::CreateTableAs(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::CreateTableAs(ctas) = stmt else {
            return Err(DbError::Internal("CREATE_TABLE_AS executor got another statement".into()));
        };
        execute_create_table_as(ctx, ctas)
    }
}

fn execute_create_table_as(ctx: &mut ExecutionContext<'_>, ctas: &CreateTableAsStmt) -> Result<QueryResult> {
    if ctas.if_not_exists && ctx.lookup(&ctas.name).is_some() {
        info!(table = %ctas.name, "relation already exists, skipping");
        return Ok(QueryResult::empty());
    }
    let on_commit = ctas.on_commit.unwrap_or(OnCommit::PreserveRows);
    let id = create_table_as(ctx, &ctas.name, ctas.persistence, on_commit, &ctas.query, !ctas.skip_data)?;
    let rows = ctx.require_relation(id)?.data.row_count();
    Ok(QueryResult::affected(rows))
}

/// Creates `target` with the result columns of `query`, and fills it when `with_data` is set.
pub fn create_table_as(
    ctx: &mut ExecutionContext<'_>,
    target: &ObjectName,
    persistence: Persistence,
    on_commit: OnCommit,
    query: &QueryStmt,
    with_data: bool,
) -> Result<RelationId> {
    let (namespace, persistence) = ctx.creation_namespace(target, persistence)?;
    let source = match &query.from {
        Some(table) => {
            let id = ctx.resolve(&table.name)?;
            ctx.lock_relation(id, LockMode::AccessShare)?;
            Some(id)
        }
        None => None,
    };
    let output = run_query(ctx, query, source)?;

    let mut columns: Vec<ColumnMeta> = Vec::with_capacity(output.columns.len());
    for (name, data_type) in output.columns {
        if columns.iter().any(|c| c.name == name) {
            return Err(DbError::ExecutionError(format!(
                "column \"{}\" specified more than once",
                name
            )));
        }
        columns.push(ColumnMeta::new(name, data_type));
    }

    let def = RelationDef {
        namespace,
        name: target.name.clone(),
        persistence,
        on_commit,
        owner: None,
        columns,
        constraints: Vec::new(),
        comment: None,
    };
    let id = ctx.create_relation(def)?;
    if with_data {
        for row in output.rows {
            ctx.insert_validated(id, row)?;
        }
    }
    Ok(id)
}

pub struct DropTableExecutor;

impl Executor for DropTableExecutor {
    fn name(&self) -> &'static str {
        "DROP_TABLE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::DropTable(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::DropTable(drop) = stmt else {
            return Err(DbError::Internal("DROP_TABLE executor got another statement".into()));
        };
        drop_tables(ctx, drop)?;
        Ok(QueryResult::empty())
    }
}

fn drop_tables(ctx: &mut ExecutionContext<'_>, drop: &DropTableStmt) -> Result<()> {
    for name in &drop.names {
        match ctx.lookup(name) {
            Some(id) => ctx.drop_relation(id)?,
            None if drop.if_exists => info!(table = %name, "table does not exist, skipping"),
            None => return Err(DbError::TableNotFound(name.to_string())),
        }
    }
    Ok(())
}

pub struct AlterTableExecutor;

impl Executor for AlterTableExecutor {
    fn name(&self) -> &'static str {
        "ALTER_TABLE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::AlterTable(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::AlterTable(alter) = stmt else {
            return Err(DbError::Internal("ALTER_TABLE executor got another statement".into()));
        };
        alter_table(ctx, alter)?;
        Ok(QueryResult::empty())
    }
}

fn alter_table(ctx: &mut ExecutionContext<'_>, alter: &AlterTableStmt) -> Result<()> {
    let Some(id) = ctx.lookup(&alter.name) else {
        if alter.if_exists {
            info!(table = %alter.name, "relation does not exist, skipping");
            return Ok(());
        }
        return Err(DbError::TableNotFound(alter.name.to_string()));
    };
    ctx.ensure_owner(id)?;
    ctx.lock_relation(id, LockMode::AccessExclusive)?;

    for operation in &alter.operations {
        match operation {
            AlterTableOperation::RenameTable(new_name) => ctx.rename(id, new_name)?,
            AlterTableOperation::AddColumn(def) => add_column(ctx, id, def)?,
            AlterTableOperation::AddConstraint(constraint) => {
                ctx.alter_relation(id, |relation| {
                    let def = table_constraint(&relation.name, constraint, &relation.constraints)?;
                    if relation.has_index_named(&def.name) {
                        return Err(DbError::ExecutionError(format!(
                            "constraint \"{}\" for relation \"{}\" already exists",
                            def.name, relation.name
                        )));
                    }
                    if let ConstraintKind::PrimaryKey(keys) | ConstraintKind::Unique(keys) = &def.kind {
                        for key in keys {
                            relation.column_index(key)?;
                        }
                    }
                    relation.constraints.push(def);
                    revalidate(relation)
                })?;
            }
            AlterTableOperation::Other(text) => {
                return Err(DbError::UnsupportedOperation(format!(
                    "ALTER TABLE {} is not supported",
                    text
                )));
            }
        }
    }
    Ok(())
}

fn add_column(ctx: &mut ExecutionContext<'_>, id: RelationId, def: &ColumnDef) -> Result<()> {
    ctx.alter_relation(id, |relation| {
        let (mut columns, constraints) = build_columns(&relation.name, std::slice::from_ref(def), &[])?;
        let column = columns.remove(0);
        if relation.columns.iter().any(|c| c.name == column.name) {
            return Err(DbError::ExecutionError(format!(
                "column \"{}\" of relation \"{}\" already exists",
                column.name, relation.name
            )));
        }
        if column.identity && !relation.data.is_empty() {
            return Err(DbError::UnsupportedOperation(
                "adding an identity column to a non-empty table is not supported".into(),
            ));
        }
        let fill = match &column.default {
            Some(expr) => EvaluationContext::constant().evaluate(expr, &Vec::new())?,
            None => Value::Null,
        };
        relation.columns.push(column);
        relation.data.extend_rows(&fill);
        relation.constraints.extend(constraints);
        revalidate(relation)
    })
}

/// Checks every stored row against the relation's current definition.
fn revalidate(relation: &mut Relation) -> Result<()> {
    let rows: Vec<(RowId, Row)> = relation.data.scan().map(|(id, row)| (id, row.clone())).collect();
    for (row_id, mut row) in rows {
        relation.validate_row(&mut row, Some(row_id))?;
        relation.data.update(row_id, row);
    }
    Ok(())
}

pub struct CreateIndexExecutor;

impl Executor for CreateIndexExecutor {
    fn name(&self) -> &'static str {
        "CREATE_INDEX"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::CreateIndex(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::CreateIndex(create) = stmt else {
            return Err(DbError::Internal("CREATE_INDEX executor got another statement".into()));
        };
        create_index(ctx, create)?;
        Ok(QueryResult::empty())
    }
}

fn create_index(ctx: &mut ExecutionContext<'_>, create: &CreateIndexStmt) -> Result<()> {
    let id = ctx.resolve(&create.table)?;
    ctx.ensure_owner(id)?;
    ctx.lock_relation(id, LockMode::Share)?;

    let relation = ctx.require_relation(id)?;
    let name = create
        .name
        .clone()
        .unwrap_or_else(|| constraint_name(&relation.name, "idx", &create.columns));
    if create.if_not_exists && relation.has_index_named(&name) {
        info!(index = %name, "relation already exists, skipping");
        return Ok(());
    }
    ctx.add_index(
        id,
        IndexDef {
            name,
            columns: create.columns.clone(),
            unique: create.unique,
            comment: None,
        },
    )
}

pub struct CommentExecutor;

impl Executor for CommentExecutor {
    fn name(&self) -> &'static str {
        "COMMENT"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Comment(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Comment(comment) = stmt else {
            return Err(DbError::Internal("COMMENT executor got another statement".into()));
        };
        set_comment(ctx, comment)?;
        Ok(QueryResult::empty())
    }
}

fn set_comment(ctx: &mut ExecutionContext<'_>, stmt: &CommentStmt) -> Result<()> {
    let id = ctx.resolve(stmt.target.table())?;
    ctx.ensure_owner(id)?;
    ctx.lock_relation(id, LockMode::ShareUpdateExclusive)?;
    ctx.alter_relation(id, |relation| {
        match &stmt.target {
            CommentTarget::Table(_) => relation.comment = stmt.comment.clone(),
            CommentTarget::Column { column, .. } => {
                let idx = relation.column_index(column)?;
                relation.columns[idx].comment = stmt.comment.clone();
            }
        }
        Ok(())
    })
}
