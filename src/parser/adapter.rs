use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::ast as sql_ast;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::trace;

use crate::core::{DataType, DbError, Result, Value};
use crate::parser::ast::*;

lazy_static! {
    static ref SET_RE: Regex = Regex::new(
        r"(?is)^SET\s+(?:(SESSION|LOCAL)\s+)?([A-Za-z_][A-Za-z0-9_.]*)\s*(?:=|\s+TO\s+)\s*(.+)$"
    )
    .expect("SET pattern");
    static ref SHOW_RE: Regex =
        Regex::new(r"(?i)^SHOW\s+([A-Za-z_][A-Za-z0-9_.]*)$").expect("SHOW pattern");
    static ref DATA_CLAUSE_RE: Regex =
        Regex::new(r"(?is)\s+WITH\s+(NO\s+)?DATA\s*$").expect("WITH DATA pattern");
    static ref CONSTRAINT_RE: Regex = Regex::new(
        r#"(?is)^(?:CONSTRAINT\s+("(?:[^"]|"")+"|\w+)\s+)?(PRIMARY\s+KEY|UNIQUE|FOREIGN\s+KEY|CHECK)\b\s*(.*)$"#
    )
    .expect("constraint pattern");
}

/// Translates SQL text into the engine's own statement tree using sqlparser's PostgreSQL dialect.
pub struct SqlParserAdapter {
    dialect: PostgreSqlDialect,
}

impl SqlParserAdapter {
    pub fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
        }
    }

    pub fn parse(&self, sql: &str) -> Result<Vec<Statement>> {
        split_statements(sql)
            .into_iter()
            .map(|text| self.parse_one(text))
            .collect::<Result<Vec<_>>>()
            .map(|batches| batches.into_iter().flatten().collect())
    }

    /// Like [`parse`](Self::parse), pairing every statement with the source text it came from.
    pub fn parse_with_source(&self, sql: &str) -> Result<Vec<(Statement, String)>> {
        let mut statements = Vec::new();
        for text in split_statements(sql) {
            for stmt in self.parse_one(text)? {
                statements.push((stmt, text.trim().to_string()));
            }
        }
        Ok(statements)
    }

    fn parse_one(&self, text: &str) -> Result<Vec<Statement>> {
        // Transaction control and SET are handled before sqlparser sees the text
        let upper = text.to_ascii_uppercase();
        let words: Vec<&str> = upper.split_whitespace().collect();
        match words.as_slice() {
            ["BEGIN"] | ["BEGIN", "TRANSACTION" | "WORK"] | ["START", "TRANSACTION"] => {
                return Ok(vec![Statement::Begin]);
            }
            ["COMMIT" | "END"] | ["COMMIT" | "END", "TRANSACTION" | "WORK"] => {
                return Ok(vec![Statement::Commit]);
            }
            ["ROLLBACK" | "ABORT"] | ["ROLLBACK" | "ABORT", "TRANSACTION" | "WORK"] => {
                return Ok(vec![Statement::Rollback]);
            }
            _ => {}
        }

        if let Some(caps) = SET_RE.captures(text) {
            let name = caps[2].to_ascii_lowercase();
            let local = caps
                .get(1)
                .is_some_and(|m| m.as_str().eq_ignore_ascii_case("LOCAL"));
            let values = split_set_values(&caps[3]);
            return Ok(vec![Statement::SetVariable(SetVariableStmt {
                name,
                values,
                local,
            })]);
        }
        if let Some(caps) = SHOW_RE.captures(text) {
            return Ok(vec![Statement::ShowVariable(caps[1].to_ascii_lowercase())]);
        }

        // sqlparser has no notion of WITH [NO] DATA, strip it and remember the choice
        let (text, skip_data) = match DATA_CLAUSE_RE.captures(text) {
            Some(caps) if upper.contains(" AS ") || upper.contains(")AS ") => {
                let skip = caps.get(1).is_some();
                let stripped = &text[..caps.get(0).map_or(text.len(), |m| m.start())];
                (stripped, skip)
            }
            _ => (text, false),
        };

        let statements = Parser::parse_sql(&self.dialect, text)?;
        statements
            .into_iter()
            .map(|stmt| self.convert_statement(stmt, skip_data))
            .collect()
    }

    fn convert_statement(&self, stmt: sql_ast::Statement, skip_data: bool) -> Result<Statement> {
        match stmt {
            sql_ast::Statement::CreateTable(create) => self.convert_create_table(create, skip_data),
            sql_ast::Statement::CreateIndex(ci) => {
                Ok(Statement::CreateIndex(self.convert_create_index(&ci)?))
            }
            sql_ast::Statement::AlterTable {
                name,
                if_exists,
                operations,
                ..
            } => Ok(Statement::AlterTable(AlterTableStmt {
                name: convert_object_name(&name)?,
                if_exists,
                operations: operations
                    .into_iter()
                    .map(|op| self.convert_alter_operation(op))
                    .collect::<Result<Vec<_>>>()?,
            })),
            sql_ast::Statement::Drop {
                object_type,
                names,
                if_exists,
                cascade,
                ..
            } => {
                if let sql_ast::ObjectType::Table = object_type {
                    Ok(Statement::DropTable(DropTableStmt {
                        names: names
                            .iter()
                            .map(convert_object_name)
                            .collect::<Result<Vec<_>>>()?,
                        if_exists,
                        cascade,
                    }))
                } else {
                    Err(DbError::UnsupportedOperation(format!(
                        "Only DROP TABLE supported, got: {}",
                        object_type
                    )))
                }
            }
            sql_ast::Statement::Comment {
                object_type,
                object_name,
                comment,
                ..
            } => Ok(Statement::Comment(self.convert_comment(
                object_type,
                &object_name,
                comment,
            )?)),
            sql_ast::Statement::Insert(insert) => Ok(Statement::Insert(self.convert_insert(insert)?)),
            sql_ast::Statement::Query(query) => self.convert_top_level_query(*query),
            sql_ast::Statement::Delete(delete) => Ok(Statement::Delete(self.convert_delete(delete)?)),
            sql_ast::Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => Ok(Statement::Update(self.convert_update(
                table,
                assignments,
                selection,
            )?)),
            other => Err(DbError::UnsupportedOperation(format!(
                "Statement type not supported: {}",
                other
            ))),
        }
    }

    fn convert_create_table(&self, create: sql_ast::CreateTable, skip_data: bool) -> Result<Statement> {
        let name = convert_object_name(&create.name)?;
        let persistence = if create.temporary {
            Persistence::Temporary
        } else {
            Persistence::Permanent
        };
        let global = create.global == Some(true);
        let on_commit = create.on_commit.map(|on_commit| match on_commit {
            sql_ast::OnCommit::DeleteRows => OnCommit::DeleteRows,
            sql_ast::OnCommit::PreserveRows => OnCommit::PreserveRows,
            sql_ast::OnCommit::Drop => OnCommit::Drop,
        });

        if let Some(query) = create.query {
            let query_text = query.to_string();
            let query = self.convert_query(*query)?;
            return Ok(Statement::CreateTableAs(CreateTableAsStmt {
                name,
                persistence,
                global,
                if_not_exists: create.if_not_exists,
                on_commit,
                query: Box::new(query),
                query_text,
                skip_data,
                is_select_into: false,
            }));
        }

        let definition = create
            .columns
            .iter()
            .map(|col| col.to_string())
            .chain(create.constraints.iter().map(|c| c.to_string()))
            .collect::<Vec<_>>()
            .join(", ");
        let columns = create
            .columns
            .iter()
            .map(|col| self.convert_column_def(col))
            .collect::<Result<Vec<_>>>()?;
        let constraints = create
            .constraints
            .iter()
            .map(|c| self.convert_table_constraint(&c.to_string()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Statement::CreateTable(CreateTableStmt {
            name,
            persistence,
            global,
            if_not_exists: create.if_not_exists,
            columns,
            constraints,
            on_commit,
            partitioned: create.partition_by.is_some(),
            definition,
        }))
    }

    fn convert_column_def(&self, col: &sql_ast::ColumnDef) -> Result<ColumnDef> {
        let rendered_type = col.data_type.to_string();
        let data_type = DataType::from_sql_name(&rendered_type).ok_or_else(|| {
            DbError::TypeMismatch(format!("Unsupported data type: {}", rendered_type))
        })?;
        let mut def = ColumnDef::new(ident_value(&col.name), data_type);
        if rendered_type.to_ascii_lowercase().contains("serial") {
            def.identity = true;
            def.nullable = false;
        }

        for option in &col.options {
            match &option.option {
                sql_ast::ColumnOption::NotNull => def.nullable = false,
                sql_ast::ColumnOption::Null => def.nullable = true,
                sql_ast::ColumnOption::Default(expr) => {
                    def.default = Some(self.convert_expr(expr.clone())?);
                }
                other => self.apply_column_option(&mut def, &other.to_string())?,
            }
        }
        Ok(def)
    }

    /// Column options other than NULL/NOT NULL/DEFAULT are recognised from their rendered form.
    fn apply_column_option(&self, def: &mut ColumnDef, rendered: &str) -> Result<()> {
        let upper = rendered.to_ascii_uppercase();
        if upper.starts_with("PRIMARY KEY") {
            def.primary_key = true;
            def.nullable = false;
        } else if upper.starts_with("UNIQUE") {
            def.unique = true;
        } else if let Some(rest) = strip_keyword(rendered, "REFERENCES") {
            let target = rest.split(['(', ' ']).next().unwrap_or_default();
            def.references = Some(unquote(target));
        } else if let Some(rest) = strip_keyword(rendered, "CHECK") {
            def.check = Some(self.parse_expr_text(rest)?);
        } else if upper.starts_with("GENERATED") {
            if upper.contains("IDENTITY") {
                def.identity = true;
                def.nullable = false;
            } else if let Some(pos) = upper.find(" AS ") {
                let body = rendered[pos + 4..].trim();
                let body = ["STORED", "VIRTUAL"]
                    .iter()
                    .find_map(|kw| body.strip_suffix(kw))
                    .unwrap_or(body);
                def.generated = Some(self.parse_expr_text(body)?);
            }
        } else {
            trace!(option = rendered, "ignoring column option");
        }
        Ok(())
    }

    fn convert_table_constraint(&self, rendered: &str) -> Result<TableConstraint> {
        let caps = CONSTRAINT_RE.captures(rendered.trim()).ok_or_else(|| {
            DbError::UnsupportedOperation(format!("Unsupported table constraint: {}", rendered))
        })?;
        let name = caps.get(1).map(|m| unquote(m.as_str()));
        let kind = caps[2].to_ascii_uppercase();
        let rest = caps.get(3).map_or("", |m| m.as_str());

        if kind.starts_with("PRIMARY") {
            Ok(TableConstraint::PrimaryKey {
                name,
                columns: parenthesized_list(rest),
            })
        } else if kind == "UNIQUE" {
            Ok(TableConstraint::Unique {
                name,
                columns: parenthesized_list(rest),
            })
        } else if kind.starts_with("FOREIGN") {
            let foreign_table = strip_keyword(rest, "REFERENCES")
                .or_else(|| {
                    rest.to_ascii_uppercase()
                        .find("REFERENCES")
                        .map(|pos| &rest[pos + "REFERENCES".len()..])
                })
                .and_then(|tail| tail.split(['(', ' ']).find(|s| !s.is_empty()))
                .map(unquote)
                .unwrap_or_default();
            Ok(TableConstraint::ForeignKey {
                name,
                columns: parenthesized_list(rest),
                foreign_table,
            })
        } else {
            Ok(TableConstraint::Check {
                name,
                expr: self.parse_expr_text(rest)?,
            })
        }
    }

    fn convert_alter_operation(&self, operation: sql_ast::AlterTableOperation) -> Result<AlterTableOperation> {
        if let sql_ast::AlterTableOperation::AddColumn { column_def, .. } = &operation {
            return Ok(AlterTableOperation::AddColumn(self.convert_column_def(column_def)?));
        }

        let rendered = operation.to_string();
        let upper = rendered.to_ascii_uppercase();
        if let Some(new_name) = ["RENAME TO ", "RENAME AS "]
            .iter()
            .find(|prefix| upper.starts_with(*prefix))
            .map(|prefix| rendered[prefix.len()..].trim())
        {
            let target = new_name.rsplit('.').next().unwrap_or(new_name);
            return Ok(AlterTableOperation::RenameTable(unquote(target)));
        }
        if upper.starts_with("ADD ") && !upper.starts_with("ADD COLUMN") {
            if let Ok(constraint) = self.convert_table_constraint(&rendered[4..]) {
                return Ok(AlterTableOperation::AddConstraint(constraint));
            }
        }
        Ok(AlterTableOperation::Other(rendered))
    }

    fn convert_create_index(&self, ci: &sql_ast::CreateIndex) -> Result<CreateIndexStmt> {
        let name = ci
            .name
            .as_ref()
            .map(convert_object_name)
            .transpose()?
            .map(|n| n.name);
        let columns = ci
            .columns
            .iter()
            .map(|col| {
                let rendered = col.to_string();
                let first = rendered.split_whitespace().next().unwrap_or_default();
                unquote(first)
            })
            .collect();

        Ok(CreateIndexStmt {
            name,
            table: convert_object_name(&ci.table_name)?,
            columns,
            unique: ci.unique,
            if_not_exists: ci.if_not_exists,
        })
    }

    fn convert_comment(
        &self,
        object_type: sql_ast::CommentObject,
        object_name: &sql_ast::ObjectName,
        comment: Option<String>,
    ) -> Result<CommentStmt> {
        let target = match object_type {
            sql_ast::CommentObject::Table => CommentTarget::Table(convert_object_name(object_name)?),
            sql_ast::CommentObject::Column => {
                let parts: Vec<String> = object_name.0.iter().map(object_name_part).collect();
                match parts.as_slice() {
                    [table, column] => CommentTarget::Column {
                        table: ObjectName::bare(table.clone()),
                        column: column.clone(),
                    },
                    [.., schema, table, column] => CommentTarget::Column {
                        table: ObjectName::qualified(schema.clone(), table.clone()),
                        column: column.clone(),
                    },
                    _ => {
                        return Err(DbError::ParseError(format!(
                            "column name must be qualified: {}",
                            object_name
                        )));
                    }
                }
            }
            other => {
                return Err(DbError::UnsupportedOperation(format!(
                    "COMMENT ON {} not supported",
                    other
                )));
            }
        };
        Ok(CommentStmt { target, comment })
    }

    fn convert_insert(&self, insert: sql_ast::Insert) -> Result<InsertStmt> {
        let table = parse_object_name_text(&insert.table.to_string())?;

        let columns = if insert.columns.is_empty() {
            None
        } else {
            Some(insert.columns.iter().map(ident_value).collect())
        };

        let Some(source) = insert.source else {
            return Err(DbError::UnsupportedOperation(
                "INSERT without a source is not supported".into(),
            ));
        };
        let source = match *source.body {
            sql_ast::SetExpr::Values(values) => InsertSource::Values(
                values
                    .rows
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(|expr| self.convert_expr(expr))
                            .collect::<Result<Vec<_>>>()
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            _ => InsertSource::Query(Box::new(self.convert_query(*source)?)),
        };

        Ok(InsertStmt {
            table,
            columns,
            source,
        })
    }

    /// A top-level SELECT ... INTO creates a table and is treated as CREATE TABLE AS.
    fn convert_top_level_query(&self, mut query: sql_ast::Query) -> Result<Statement> {
        let into = match query.body.as_mut() {
            sql_ast::SetExpr::Select(select) => select.into.take(),
            _ => None,
        };
        let Some(into) = into else {
            return Ok(Statement::Query(self.convert_query(query)?));
        };

        let query_text = query.to_string();
        let persistence = if into.temporary {
            Persistence::Temporary
        } else if into.unlogged {
            Persistence::Unlogged
        } else {
            Persistence::Permanent
        };
        Ok(Statement::CreateTableAs(CreateTableAsStmt {
            name: convert_object_name(&into.name)?,
            persistence,
            global: false,
            if_not_exists: false,
            on_commit: None,
            query: Box::new(self.convert_query(query)?),
            query_text,
            skip_data: false,
            is_select_into: true,
        }))
    }

    fn convert_query(&self, query: sql_ast::Query) -> Result<QueryStmt> {
        let order_by = self.convert_order_by(query.order_by)?;
        let limit = self.convert_limit_clause(&query.limit_clause)?;

        let select = match *query.body {
            sql_ast::SetExpr::Select(select) => select,
            sql_ast::SetExpr::Query(inner) => return self.convert_query(*inner),
            other => {
                return Err(DbError::UnsupportedOperation(format!(
                    "Only SELECT queries supported, got: {}",
                    other
                )));
            }
        };

        let projection = select
            .projection
            .into_iter()
            .map(|item| self.convert_select_item(item))
            .collect::<Result<Vec<_>>>()?;

        let from = match select.from.as_slice() {
            [] => None,
            [table] if table.joins.is_empty() => Some(self.convert_table_factor(&table.relation)?),
            _ => {
                return Err(DbError::UnsupportedOperation(
                    "Only single-table FROM clauses are supported".into(),
                ));
            }
        };

        let selection = select
            .selection
            .map(|expr| self.convert_expr(expr))
            .transpose()?;

        Ok(QueryStmt {
            projection,
            from,
            selection,
            order_by,
            limit,
        })
    }

    fn convert_table_factor(&self, factor: &sql_ast::TableFactor) -> Result<TableRef> {
        match factor {
            sql_ast::TableFactor::Table { name, alias, .. } => Ok(TableRef {
                name: convert_object_name(name)?,
                alias: alias.as_ref().map(|a| ident_value(&a.name)),
            }),
            other => Err(DbError::UnsupportedOperation(format!(
                "Unsupported table reference: {}",
                other
            ))),
        }
    }

    fn convert_order_by(&self, order_by: Option<sql_ast::OrderBy>) -> Result<Vec<OrderByExpr>> {
        let Some(order_by) = order_by else {
            return Ok(Vec::new());
        };

        match order_by.kind {
            sql_ast::OrderByKind::Expressions(exprs) => exprs
                .into_iter()
                .map(|order| {
                    Ok(OrderByExpr {
                        descending: order.options.asc.map(|asc| !asc).unwrap_or(false),
                        expr: self.convert_expr(order.expr)?,
                    })
                })
                .collect(),
            sql_ast::OrderByKind::All(_) => Err(DbError::UnsupportedOperation(
                "ORDER BY ALL not supported".into(),
            )),
        }
    }

    fn convert_limit_clause(&self, limit_clause: &Option<sql_ast::LimitClause>) -> Result<Option<usize>> {
        let limit = match limit_clause {
            None => return Ok(None),
            Some(sql_ast::LimitClause::LimitOffset { limit, .. }) => limit.as_ref(),
            Some(sql_ast::LimitClause::OffsetCommaLimit { limit, .. }) => Some(limit),
        };
        match limit {
            None => Ok(None),
            Some(sql_ast::Expr::Value(value)) => match &value.value {
                sql_ast::Value::Number(n, _) => n
                    .parse::<usize>()
                    .map(Some)
                    .map_err(|_| DbError::ParseError(format!("Invalid LIMIT value: {}", n))),
                other => Err(DbError::UnsupportedOperation(format!(
                    "Only numeric LIMIT supported, got: {}",
                    other
                ))),
            },
            Some(_) => Err(DbError::UnsupportedOperation(
                "Only numeric LIMIT supported".into(),
            )),
        }
    }

    fn convert_select_item(&self, item: sql_ast::SelectItem) -> Result<SelectItem> {
        match item {
            sql_ast::SelectItem::Wildcard(_) | sql_ast::SelectItem::QualifiedWildcard(..) => {
                Ok(SelectItem::Wildcard)
            }
            sql_ast::SelectItem::UnnamedExpr(expr) => Ok(SelectItem::Expr {
                expr: self.convert_expr(expr)?,
                alias: None,
            }),
            sql_ast::SelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::Expr {
                expr: self.convert_expr(expr)?,
                alias: Some(ident_value(&alias)),
            }),
            #[allow(unreachable_patterns)]
            _ => Err(DbError::UnsupportedOperation("Unsupported select item".into())),
        }
    }

    fn convert_delete(&self, delete: sql_ast::Delete) -> Result<DeleteStmt> {
        let tables = match &delete.from {
            sql_ast::FromTable::WithFromKeyword(tables) | sql_ast::FromTable::WithoutKeyword(tables) => {
                tables
            }
        };
        let Some(first) = tables.first() else {
            return Err(DbError::ParseError("DELETE requires a table name".into()));
        };
        let table = self.convert_table_factor(&first.relation)?.name;

        let selection = delete
            .selection
            .map(|expr| self.convert_expr(expr))
            .transpose()?;

        Ok(DeleteStmt { table, selection })
    }

    fn convert_update(
        &self,
        table: sql_ast::TableWithJoins,
        assignments: Vec<sql_ast::Assignment>,
        selection: Option<sql_ast::Expr>,
    ) -> Result<UpdateStmt> {
        let table = self.convert_table_factor(&table.relation)?.name;

        let assignments = assignments
            .into_iter()
            .map(|assign| {
                let column = match &assign.target {
                    sql_ast::AssignmentTarget::ColumnName(col_name) => col_name
                        .0
                        .last()
                        .map(object_name_part)
                        .ok_or_else(|| DbError::ParseError("empty assignment target".into()))?,
                    _ => {
                        return Err(DbError::UnsupportedOperation(
                            "Only simple column names supported in UPDATE".into(),
                        ));
                    }
                };
                Ok(Assignment {
                    column,
                    value: self.convert_expr(assign.value)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let selection = selection.map(|expr| self.convert_expr(expr)).transpose()?;

        Ok(UpdateStmt {
            table,
            assignments,
            selection,
        })
    }

    pub fn convert_expr(&self, expr: sql_ast::Expr) -> Result<Expr> {
        match expr {
            sql_ast::Expr::Identifier(ident) => Ok(Expr::Column(ident_value(&ident))),
            sql_ast::Expr::CompoundIdentifier(parts) => parts
                .last()
                .map(|ident| Expr::Column(ident_value(ident)))
                .ok_or_else(|| DbError::ParseError("empty identifier".into())),
            sql_ast::Expr::Value(value) => Ok(Expr::Literal(convert_value(&value.value)?)),
            sql_ast::Expr::Nested(inner) => self.convert_expr(*inner),
            sql_ast::Expr::IsNull(inner) => Ok(Expr::IsNull {
                expr: Box::new(self.convert_expr(*inner)?),
                negated: false,
            }),
            sql_ast::Expr::IsNotNull(inner) => Ok(Expr::IsNull {
                expr: Box::new(self.convert_expr(*inner)?),
                negated: true,
            }),
            sql_ast::Expr::Cast { expr, data_type, .. } => {
                let rendered = data_type.to_string();
                let data_type = DataType::from_sql_name(&rendered).ok_or_else(|| {
                    DbError::TypeMismatch(format!("Unsupported data type: {}", rendered))
                })?;
                Ok(Expr::Cast {
                    expr: Box::new(self.convert_expr(*expr)?),
                    data_type,
                })
            }
            sql_ast::Expr::UnaryOp { op, expr } => {
                let op = match op {
                    sql_ast::UnaryOperator::Not => UnaryOp::Not,
                    sql_ast::UnaryOperator::Minus => UnaryOp::Minus,
                    sql_ast::UnaryOperator::Plus => UnaryOp::Plus,
                    other => {
                        return Err(DbError::UnsupportedOperation(format!(
                            "Unsupported unary operator: {}",
                            other
                        )));
                    }
                };
                Ok(Expr::UnaryOp {
                    op,
                    expr: Box::new(self.convert_expr(*expr)?),
                })
            }
            sql_ast::Expr::BinaryOp { left, op, right } => {
                let op = match op {
                    sql_ast::BinaryOperator::Plus => BinaryOp::Add,
                    sql_ast::BinaryOperator::Minus => BinaryOp::Subtract,
                    sql_ast::BinaryOperator::Multiply => BinaryOp::Multiply,
                    sql_ast::BinaryOperator::Divide => BinaryOp::Divide,
                    sql_ast::BinaryOperator::Modulo => BinaryOp::Modulo,
                    sql_ast::BinaryOperator::Eq => BinaryOp::Eq,
                    sql_ast::BinaryOperator::NotEq => BinaryOp::NotEq,
                    sql_ast::BinaryOperator::Lt => BinaryOp::Lt,
                    sql_ast::BinaryOperator::LtEq => BinaryOp::LtEq,
                    sql_ast::BinaryOperator::Gt => BinaryOp::Gt,
                    sql_ast::BinaryOperator::GtEq => BinaryOp::GtEq,
                    sql_ast::BinaryOperator::And => BinaryOp::And,
                    sql_ast::BinaryOperator::Or => BinaryOp::Or,
                    sql_ast::BinaryOperator::StringConcat => BinaryOp::Concat,
                    other => {
                        return Err(DbError::UnsupportedOperation(format!(
                            "Unsupported operator: {}",
                            other
                        )));
                    }
                };
                Ok(Expr::BinaryOp {
                    left: Box::new(self.convert_expr(*left)?),
                    op,
                    right: Box::new(self.convert_expr(*right)?),
                })
            }
            other => Err(DbError::UnsupportedOperation(format!(
                "Unsupported expression: {}",
                other
            ))),
        }
    }

    fn parse_expr_text(&self, text: &str) -> Result<Expr> {
        let expr = Parser::new(&self.dialect)
            .try_with_sql(text.trim())?
            .parse_expr()?;
        self.convert_expr(expr)
    }
}

impl Default for SqlParserAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn convert_value(value: &sql_ast::Value) -> Result<Value> {
    match value {
        sql_ast::Value::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Value::Integer(i))
            } else {
                n.parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| DbError::ParseError(format!("Invalid number: {}", n)))
            }
        }
        sql_ast::Value::SingleQuotedString(s) => Ok(Value::Text(s.clone())),
        sql_ast::Value::Boolean(b) => Ok(Value::Boolean(*b)),
        sql_ast::Value::Null => Ok(Value::Null),
        other => Err(DbError::UnsupportedOperation(format!(
            "Unsupported literal: {}",
            other
        ))),
    }
}

/// Unquoted identifiers fold to lower case, quoted ones keep their spelling.
fn ident_value(ident: &sql_ast::Ident) -> String {
    if ident.quote_style.is_some() {
        ident.value.clone()
    } else {
        ident.value.to_lowercase()
    }
}

fn object_name_part(part: &sql_ast::ObjectNamePart) -> String {
    match part {
        sql_ast::ObjectNamePart::Identifier(ident) => ident_value(ident),
        #[allow(unreachable_patterns)]
        other => other.to_string(),
    }
}

fn convert_object_name(name: &sql_ast::ObjectName) -> Result<ObjectName> {
    let parts: Vec<String> = name.0.iter().map(object_name_part).collect();
    name_from_parts(parts, &name.to_string())
}

/// Parses an already rendered name such as `gtt."Orders"`.
fn parse_object_name_text(text: &str) -> Result<ObjectName> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut was_quoted = false;
    let mut chars = text.trim().chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => {
                quoted = !quoted;
                was_quoted = true;
            }
            '.' if !quoted => {
                parts.push(fold(&current, was_quoted));
                current.clear();
                was_quoted = false;
            }
            c => current.push(c),
        }
    }
    parts.push(fold(&current, was_quoted));
    name_from_parts(parts, text)
}

fn fold(part: &str, quoted: bool) -> String {
    if quoted {
        part.to_string()
    } else {
        part.to_lowercase()
    }
}

fn name_from_parts(parts: Vec<String>, rendered: &str) -> Result<ObjectName> {
    let mut parts = parts.into_iter();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(name), None, None, None) => Ok(ObjectName::bare(name)),
        (Some(schema), Some(name), None, None) => Ok(ObjectName::qualified(schema, name)),
        // catalog.schema.relation, the catalog part is ignored
        (Some(_), Some(schema), Some(name), None) => Ok(ObjectName::qualified(schema, name)),
        _ => Err(DbError::ParseError(format!(
            "improper relation name (too many dotted names): {}",
            rendered
        ))),
    }
}

fn unquote(text: &str) -> String {
    let text = text.trim();
    match text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        None => text.to_lowercase(),
    }
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let trimmed = text.trim_start();
    let head = trimmed.get(..keyword.len())?;
    head.eq_ignore_ascii_case(keyword)
        .then(|| trimmed[keyword.len()..].trim_start())
}

/// Contents of the first parenthesized, comma separated identifier list in `text`.
fn parenthesized_list(text: &str) -> Vec<String> {
    let Some(start) = text.find('(') else {
        return Vec::new();
    };
    let Some(len) = text[start + 1..].find(')') else {
        return Vec::new();
    };
    text[start + 1..start + 1 + len]
        .split(',')
        .map(unquote)
        .filter(|s| !s.is_empty())
        .collect()
}

fn split_set_values(raw: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut was_quoted = false;
    for c in raw.trim().chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                was_quoted = true;
            }
            (None, ',') => {
                values.push(finish_set_value(&current, was_quoted));
                current.clear();
                was_quoted = false;
            }
            (None, c) => current.push(c),
        }
    }
    if !current.trim().is_empty() || was_quoted {
        values.push(finish_set_value(&current, was_quoted));
    }
    values
}

fn finish_set_value(value: &str, quoted: bool) -> String {
    if quoted {
        value.trim().to_string()
    } else {
        value.trim().to_lowercase()
    }
}

/// Splits a batch on top-level semicolons, ignoring those inside quotes and comments.
fn split_statements(sql: &str) -> Vec<&str> {
    let bytes = sql.as_bytes();
    let mut statements = Vec::new();
    let mut start = 0;
    let mut i = 0;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'-' if bytes.get(i + 1) == Some(&b'-') => {
                    while i < bytes.len() && bytes[i] != b'\n' {
                        i += 1;
                    }
                    continue;
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    i += 2;
                    while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                        i += 1;
                    }
                    i += 2;
                    continue;
                }
                b';' => {
                    statements.push(&sql[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
        i += 1;
    }
    if start < sql.len() {
        statements.push(&sql[start..]);
    }
    statements
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
