//! Durable store of template definitions: one row per template in the
//! registry table of the managing schema.
//!
//! Every mutation goes through the host's ordinary row operations, so it joins
//! the caller's transaction and disappears with it on rollback.

use tracing::{debug, info};

use super::host::HostEngine;
use super::template::Template;
use crate::core::{DataType, DbError, RelationId, Result, Row, RowId, Value};
use crate::parser::ast::{OnCommit, Persistence};
use crate::storage::{ColumnMeta, ConstraintDef, ConstraintKind, RelationDef};
use crate::storage::catalog::constraint_name;

/// Registry columns, in positional order.
pub const REGISTRY_COLUMNS: [&str; 5] = [
    "placeholder_id",
    "owning_schema",
    "name",
    "preserve_on_commit",
    "definition_text",
];

pub trait RegistryStore {
    /// Fails with [`DbError::DuplicateTemplate`] when the name is taken.
    fn register(&self, host: &mut dyn HostEngine, template: &Template) -> Result<()>;
    fn unregister(&self, host: &mut dyn HostEngine, placeholder: RelationId) -> Result<usize>;
    /// For rows whose placeholder id is not known to the caller.
    fn unregister_by_name(&self, host: &mut dyn HostEngine, name: &str) -> Result<usize>;
    fn rename(&self, host: &mut dyn HostEngine, placeholder: RelationId, new_name: &str) -> Result<()>;
    fn load_all(&self, host: &dyn HostEngine) -> Result<Vec<Template>>;

    fn find_by_name(&self, host: &dyn HostEngine, name: &str) -> Result<Option<Template>> {
        Ok(self.load_all(host)?.into_iter().find(|t| t.name == name))
    }

    fn find_by_placeholder(&self, host: &dyn HostEngine, placeholder: RelationId) -> Result<Option<Template>> {
        Ok(self
            .load_all(host)?
            .into_iter()
            .find(|t| t.placeholder_id == placeholder))
    }
}

/// Registry kept in an ordinary table of the host catalog.
#[derive(Debug, Clone)]
pub struct CatalogRegistry {
    schema: String,
    table: String,
}

impl CatalogRegistry {
    pub fn new(schema: &str, table: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: table.to_string(),
        }
    }

    /// Creates the registry table. The managing schema must already exist.
    pub fn install(&self, host: &mut dyn HostEngine) -> Result<RelationId> {
        let namespace = host
            .namespace_by_name(&self.schema)
            .ok_or_else(|| DbError::Configuration(format!("schema \"{}\" does not exist", self.schema)))?;
        if let Some(existing) = host.relation_in(namespace, &self.table) {
            return Ok(existing);
        }

        let not_null = |name: &str, data_type| ColumnMeta::new(name, data_type).not_null();
        let def = RelationDef {
            namespace,
            name: self.table.clone(),
            persistence: Persistence::Permanent,
            on_commit: OnCommit::PreserveRows,
            owner: None,
            columns: vec![
                not_null(REGISTRY_COLUMNS[0], DataType::Oid),
                not_null(REGISTRY_COLUMNS[1], DataType::Text),
                not_null(REGISTRY_COLUMNS[2], DataType::Text),
                not_null(REGISTRY_COLUMNS[3], DataType::Boolean),
                not_null(REGISTRY_COLUMNS[4], DataType::Text),
            ],
            constraints: vec![
                ConstraintDef {
                    name: constraint_name(&self.table, "pkey", &[]),
                    kind: ConstraintKind::PrimaryKey(vec![REGISTRY_COLUMNS[0].to_string()]),
                },
                ConstraintDef {
                    name: constraint_name(&self.table, "key", &[REGISTRY_COLUMNS[1].into(), REGISTRY_COLUMNS[2].into()]),
                    kind: ConstraintKind::Unique(vec![REGISTRY_COLUMNS[1].into(), REGISTRY_COLUMNS[2].into()]),
                },
            ],
            comment: Some("global temporary table definitions".into()),
        };
        let id = host.define_relation(def)?;
        info!(schema = %self.schema, table = %self.table, "registry table created");
        Ok(id)
    }

    /// Id of the registry table; a missing table means the subsystem was never installed.
    pub fn relation_id(&self, host: &dyn HostEngine) -> Result<RelationId> {
        let namespace = host.namespace_by_name(&self.schema).ok_or_else(|| {
            DbError::Configuration(format!("managing schema \"{}\" does not exist", self.schema))
        })?;
        host.relation_in(namespace, &self.table).ok_or_else(|| {
            DbError::Configuration(format!(
                "registry table \"{}.{}\" does not exist",
                self.schema, self.table
            ))
        })
    }

    fn rows(&self, host: &dyn HostEngine) -> Result<(RelationId, Vec<(RowId, Template)>)> {
        let relid = self.relation_id(host)?;
        let rows = host
            .scan_rows(relid)?
            .into_iter()
            .map(|(row_id, row)| decode(&row).map(|t| (row_id, t)))
            .collect::<Result<Vec<_>>>()?;
        Ok((relid, rows))
    }

    fn delete_where(&self, host: &mut dyn HostEngine, pred: impl Fn(&Template) -> bool) -> Result<usize> {
        let (relid, rows) = self.rows(host)?;
        let mut removed = 0;
        for (row_id, template) in rows {
            if pred(&template) {
                host.delete_row(relid, row_id)?;
                debug!(template = %template.name, placeholder = %template.placeholder_id, "registry row removed");
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl RegistryStore for CatalogRegistry {
    fn register(&self, host: &mut dyn HostEngine, template: &Template) -> Result<()> {
        let (relid, rows) = self.rows(host)?;
        if rows
            .iter()
            .any(|(_, t)| t.name == template.name && t.owning_schema == template.owning_schema)
        {
            return Err(DbError::DuplicateTemplate(template.name.clone()));
        }
        host.insert_row(relid, encode(template))?;
        debug!(
            template = %template.name,
            placeholder = %template.placeholder_id,
            preserve = template.preserve_on_commit,
            "template registered"
        );
        Ok(())
    }

    fn unregister(&self, host: &mut dyn HostEngine, placeholder: RelationId) -> Result<usize> {
        self.delete_where(host, |t| t.placeholder_id == placeholder)
    }

    fn unregister_by_name(&self, host: &mut dyn HostEngine, name: &str) -> Result<usize> {
        let schema = self.schema.clone();
        self.delete_where(host, |t| t.name == name && t.owning_schema == schema)
    }

    fn rename(&self, host: &mut dyn HostEngine, placeholder: RelationId, new_name: &str) -> Result<()> {
        let (relid, rows) = self.rows(host)?;
        let (row_id, mut template) = rows
            .into_iter()
            .find(|(_, t)| t.placeholder_id == placeholder)
            .ok_or_else(|| DbError::Internal(format!("relation {} is not a registered template", placeholder)))?;
        template.name = new_name.to_string();
        host.update_row(relid, row_id, encode(&template))?;
        debug!(placeholder = %placeholder, name = new_name, "registry row renamed");
        Ok(())
    }

    fn load_all(&self, host: &dyn HostEngine) -> Result<Vec<Template>> {
        let (_, rows) = self.rows(host)?;
        Ok(rows.into_iter().map(|(_, t)| t).collect())
    }
}

fn encode(template: &Template) -> Row {
    vec![
        template.placeholder_id.into(),
        Value::Text(template.owning_schema.clone()),
        Value::Text(template.name.clone()),
        Value::Boolean(template.preserve_on_commit),
        Value::Text(template.definition_text.clone()),
    ]
}

fn decode(row: &Row) -> Result<Template> {
    let malformed = || DbError::Internal(format!("malformed registry row: {:?}", row));
    let text = |idx: usize| -> Result<String> {
        row.get(idx)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(malformed)
    };
    let placeholder = row.get(0).and_then(|v| v.as_oid()).ok_or_else(malformed)?;
    let preserve = match row.get(3) {
        Some(Value::Boolean(b)) => *b,
        _ => return Err(malformed()),
    };
    Ok(Template {
        placeholder_id: RelationId(placeholder),
        owning_schema: text(1)?,
        name: text(2)?,
        preserve_on_commit: preserve,
        definition_text: text(4)?,
    })
}
