use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::table::Table;
use crate::core::{DataType, DbError, NamespaceId, RelationId, Result, Row, RowId, Value};
use crate::evaluator::EvaluationContext;
use crate::parser::ast::{Expr, OnCommit, Persistence};

pub const PG_CATALOG: &str = "pg_catalog";
pub const PUBLIC_SCHEMA: &str = "public";
/// Alias that always resolves to the current session's temporary namespace.
pub const TEMP_SCHEMA_ALIAS: &str = "pg_temp";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    pub id: NamespaceId,
    pub name: String,
    pub owner: String,
    pub temporary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub superuser: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub default: Option<Expr>,
    pub identity: bool,
    pub generated: Option<Expr>,
    pub comment: Option<String>,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
            identity: false,
            generated: None,
            comment: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstraintKind {
    PrimaryKey(Vec<String>),
    Unique(Vec<String>),
    Check(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDef {
    pub name: String,
    pub kind: ConstraintKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub comment: Option<String>,
}

bitflags! {
    /// What a `LIKE source INCLUDING ...` clause copies besides column names, types and NOT NULL.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LikeOptions: u32 {
        const DEFAULTS = 1 << 0;
        const CONSTRAINTS = 1 << 1;
        const INDEXES = 1 << 2;
        const IDENTITY = 1 << 3;
        const GENERATED = 1 << 4;
        const COMMENTS = 1 << 5;
    }
}

/// Request to create a relation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDef {
    pub namespace: NamespaceId,
    pub name: String,
    pub persistence: Persistence,
    pub on_commit: OnCommit,
    /// Owner to record; `None` means the creating role.
    pub owner: Option<String>,
    pub columns: Vec<ColumnMeta>,
    pub constraints: Vec<ConstraintDef>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    pub namespace: NamespaceId,
    pub name: String,
    pub persistence: Persistence,
    pub on_commit: OnCommit,
    pub owner: String,
    pub columns: Vec<ColumnMeta>,
    pub constraints: Vec<ConstraintDef>,
    pub indexes: Vec<IndexDef>,
    pub comment: Option<String>,
    pub data: Table,
}

impl Relation {
    pub fn from_def(id: RelationId, def: RelationDef, owner: String) -> Self {
        Self {
            id,
            namespace: def.namespace,
            name: def.name,
            persistence: def.persistence,
            on_commit: def.on_commit,
            owner: def.owner.unwrap_or(owner),
            columns: def.columns,
            constraints: def.constraints,
            indexes: Vec::new(),
            comment: def.comment,
            data: Table::new(),
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.persistence == Persistence::Temporary
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| DbError::ColumnNotFound(name.to_string(), self.name.clone()))
    }

    pub fn has_index_named(&self, name: &str) -> bool {
        self.indexes.iter().any(|i| i.name == name)
            || self.constraints.iter().any(|c| c.name == name)
    }

    /// Coerces values to the column types, then enforces NOT NULL, CHECK and uniqueness.
    /// `existing` is the id of the row being replaced, excluded from uniqueness checks.
    pub fn validate_row(&self, row: &mut Row, existing: Option<RowId>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(DbError::ExecutionError(format!(
                "row has {} values but table '{}' has {} columns",
                row.len(),
                self.name,
                self.columns.len()
            )));
        }

        for (value, column) in row.iter_mut().zip(&self.columns) {
            if value.is_null() {
                if !column.nullable {
                    return Err(DbError::ConstraintViolation(format!(
                        "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                        column.name, self.name
                    )));
                }
                continue;
            }
            *value = value.cast_to(&column.data_type)?;
        }

        let names = self.column_names();
        let ctx = EvaluationContext::new(&names, &self.name);
        for constraint in &self.constraints {
            if let ConstraintKind::Check(expr) = &constraint.kind {
                // NULL satisfies a check constraint
                let verdict = ctx.evaluate(expr, row)?;
                if !verdict.is_null() && !verdict.as_bool() {
                    return Err(DbError::ConstraintViolation(format!(
                        "new row for relation \"{}\" violates check constraint \"{}\"",
                        self.name, constraint.name
                    )));
                }
            }
        }

        for (name, positions) in self.unique_keys()? {
            let key: Vec<&Value> = positions.iter().map(|&p| &row[p]).collect();
            if key.iter().any(|v| v.is_null()) {
                continue;
            }
            let duplicate = self.data.scan().any(|(id, other)| {
                Some(id) != existing && positions.iter().zip(&key).all(|(&p, v)| &other[p] == *v)
            });
            if duplicate {
                return Err(DbError::ConstraintViolation(format!(
                    "duplicate key value violates unique constraint \"{}\"",
                    name
                )));
            }
        }
        Ok(())
    }

    fn unique_keys(&self) -> Result<Vec<(String, Vec<usize>)>> {
        let constraint_keys = self.constraints.iter().filter_map(|c| match &c.kind {
            ConstraintKind::PrimaryKey(cols) | ConstraintKind::Unique(cols) => Some((&c.name, cols)),
            ConstraintKind::Check(_) => None,
        });
        let index_keys = self
            .indexes
            .iter()
            .filter(|i| i.unique)
            .map(|i| (&i.name, &i.columns));

        constraint_keys
            .chain(index_keys)
            .map(|(name, cols)| {
                let positions = cols
                    .iter()
                    .map(|c| self.column_index(c))
                    .collect::<Result<Vec<_>>>()?;
                Ok((name.clone(), positions))
            })
            .collect()
    }

    /// Definition of a new relation shaped like this one, plus the indexes to build on it.
    pub fn like_definition(
        &self,
        namespace: NamespaceId,
        name: &str,
        persistence: Persistence,
        on_commit: OnCommit,
        options: LikeOptions,
    ) -> (RelationDef, Vec<IndexDef>) {
        let columns = self
            .columns
            .iter()
            .map(|col| ColumnMeta {
                name: col.name.clone(),
                data_type: col.data_type,
                nullable: col.nullable,
                default: col.default.clone().filter(|_| options.contains(LikeOptions::DEFAULTS)),
                identity: col.identity && options.contains(LikeOptions::IDENTITY),
                generated: col
                    .generated
                    .clone()
                    .filter(|_| options.contains(LikeOptions::GENERATED)),
                comment: col.comment.clone().filter(|_| options.contains(LikeOptions::COMMENTS)),
            })
            .collect();

        let constraints = self
            .constraints
            .iter()
            .filter_map(|c| match &c.kind {
                ConstraintKind::Check(_) if options.contains(LikeOptions::CONSTRAINTS) => Some(c.clone()),
                ConstraintKind::PrimaryKey(cols) if options.contains(LikeOptions::INDEXES) => {
                    Some(ConstraintDef {
                        name: constraint_name(name, "pkey", &[]),
                        kind: ConstraintKind::PrimaryKey(cols.clone()),
                    })
                }
                ConstraintKind::Unique(cols) if options.contains(LikeOptions::INDEXES) => Some(ConstraintDef {
                    name: constraint_name(name, "key", cols),
                    kind: ConstraintKind::Unique(cols.clone()),
                }),
                _ => None,
            })
            .collect();

        let indexes = if options.contains(LikeOptions::INDEXES) {
            self.indexes
                .iter()
                .map(|i| IndexDef {
                    name: constraint_name(name, "idx", &i.columns),
                    columns: i.columns.clone(),
                    unique: i.unique,
                    comment: i.comment.clone().filter(|_| options.contains(LikeOptions::COMMENTS)),
                })
                .collect()
        } else {
            Vec::new()
        };

        let def = RelationDef {
            namespace,
            name: name.to_string(),
            persistence,
            on_commit,
            owner: None,
            columns,
            constraints,
            comment: None,
        };
        (def, indexes)
    }
}

/// Builds names such as `orders_pkey` or `orders_id_code_key`.
pub fn constraint_name(table: &str, suffix: &str, columns: &[String]) -> String {
    let mut parts = vec![table.to_string()];
    parts.extend(columns.iter().cloned());
    parts.push(suffix.to_string());
    parts.join("_")
}

/// Relations keyed by id, for one storage area (shared catalog or a session's temp namespace).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationSet {
    relations: BTreeMap<RelationId, Relation>,
}

impl RelationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RelationId) -> Option<&Relation> {
        self.relations.get(&id)
    }

    pub fn get_mut(&mut self, id: RelationId) -> Option<&mut Relation> {
        self.relations.get_mut(&id)
    }

    pub fn contains(&self, id: RelationId) -> bool {
        self.relations.contains_key(&id)
    }

    pub fn insert(&mut self, relation: Relation) {
        self.relations.insert(relation.id, relation);
    }

    pub fn remove(&mut self, id: RelationId) -> Option<Relation> {
        self.relations.remove(&id)
    }

    pub fn find(&self, namespace: NamespaceId, name: &str) -> Option<&Relation> {
        self.relations
            .values()
            .find(|r| r.namespace == namespace && r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Relation> {
        self.relations.values_mut()
    }

    pub fn ids(&self) -> Vec<RelationId> {
        self.relations.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::BinaryOp;

    fn orders() -> Relation {
        let def = RelationDef {
            namespace: NamespaceId(2200),
            name: "orders".into(),
            persistence: Persistence::Unlogged,
            on_commit: OnCommit::PreserveRows,
            owner: None,
            columns: vec![
                ColumnMeta {
                    identity: true,
                    comment: Some("order number".into()),
                    ..ColumnMeta::new("id", DataType::Integer).not_null()
                },
                ColumnMeta {
                    default: Some(Expr::Literal(Value::Integer(1))),
                    ..ColumnMeta::new("qty", DataType::Integer)
                },
            ],
            constraints: vec![
                ConstraintDef {
                    name: "orders_pkey".into(),
                    kind: ConstraintKind::PrimaryKey(vec!["id".into()]),
                },
                ConstraintDef {
                    name: "orders_qty_check".into(),
                    kind: ConstraintKind::Check(Expr::BinaryOp {
                        left: Box::new(Expr::Column("qty".into())),
                        op: BinaryOp::Gt,
                        right: Box::new(Expr::Literal(Value::Integer(0))),
                    }),
                },
            ],
            comment: Some("placeholder".into()),
        };
        Relation::from_def(RelationId(16384), def, "admin".into())
    }

    #[test]
    fn test_validate_row_enforces_constraints() {
        let mut rel = orders();
        let mut row = vec![Value::Integer(1), Value::Text("5".into())];
        rel.validate_row(&mut row, None).unwrap();
        assert_eq!(row[1], Value::Integer(5));
        rel.data.insert(row);

        let mut dup = vec![Value::Integer(1), Value::Integer(2)];
        assert!(matches!(
            rel.validate_row(&mut dup, None),
            Err(DbError::ConstraintViolation(msg)) if msg.contains("orders_pkey")
        ));

        let mut bad = vec![Value::Integer(2), Value::Integer(0)];
        assert!(rel.validate_row(&mut bad, None).is_err());

        let mut null_id = vec![Value::Null, Value::Integer(1)];
        assert!(rel.validate_row(&mut null_id, None).is_err());
    }

    #[test]
    fn test_like_definition_respects_options() {
        let rel = orders();
        let all = LikeOptions::all();
        let (def, _) = rel.like_definition(NamespaceId(9), "orders", Persistence::Temporary, OnCommit::DeleteRows, all);
        assert_eq!(def.columns, rel.columns);
        assert_eq!(def.constraints.len(), 2);
        assert_eq!(def.comment, None);

        let (bare, _) = rel.like_definition(
            NamespaceId(9),
            "copy",
            Persistence::Temporary,
            OnCommit::PreserveRows,
            LikeOptions::empty(),
        );
        assert!(bare.constraints.is_empty());
        assert!(bare.columns.iter().all(|c| c.default.is_none() && !c.identity && c.comment.is_none()));
        assert!(!bare.columns[0].nullable);
    }
}
