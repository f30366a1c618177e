use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{DataType, Value};

/// Root statement type
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(CreateTableStmt),
    CreateTableAs(CreateTableAsStmt),
    DropTable(DropTableStmt),
    AlterTable(AlterTableStmt),
    CreateIndex(CreateIndexStmt),
    Comment(CommentStmt),
    SetVariable(SetVariableStmt),
    ShowVariable(String),
    Insert(InsertStmt),
    Query(QueryStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    Begin,
    Commit,
    Rollback,
}

impl Statement {
    /// Utility statements skip analysis and planning and go straight to utility processing.
    pub fn is_utility(&self) -> bool {
        !matches!(
            self,
            Self::Insert(_) | Self::Query(_) | Self::Update(_) | Self::Delete(_)
        )
    }

    pub fn is_transaction_control(&self) -> bool {
        matches!(self, Self::Begin | Self::Commit | Self::Rollback)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::CreateTable(_) | Self::CreateTableAs(_) => "CREATE TABLE",
            Self::DropTable(_) => "DROP TABLE",
            Self::AlterTable(_) => "ALTER TABLE",
            Self::CreateIndex(_) => "CREATE INDEX",
            Self::Comment(_) => "COMMENT",
            Self::SetVariable(_) => "SET",
            Self::ShowVariable(_) => "SHOW",
            Self::Insert(_) => "INSERT",
            Self::Query(_) => "SELECT",
            Self::Update(_) => "UPDATE",
            Self::Delete(_) => "DELETE",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Rollback => "ROLLBACK",
        }
    }
}

/// Possibly schema-qualified relation name. Unquoted identifiers are already folded to lower case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectName {
    pub schema: Option<String>,
    pub name: String,
}

impl ObjectName {
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => write!(f, "{}", quote_ident(&self.name)),
        }
    }
}

/// Quotes an identifier when it would not survive case folding unchanged.
pub fn quote_ident(ident: &str) -> String {
    let plain = !ident.is_empty()
        && ident
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && ident
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if plain {
        ident.to_string()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Persistence {
    Permanent,
    Unlogged,
    Temporary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnCommit {
    PreserveRows,
    DeleteRows,
    Drop,
}

/// CREATE TABLE statement with an explicit column list
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStmt {
    pub name: ObjectName,
    pub persistence: Persistence,
    /// The GLOBAL keyword was present.
    pub global: bool,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<TableConstraint>,
    pub on_commit: Option<OnCommit>,
    pub partitioned: bool,
    /// Column and constraint list rendered back to SQL, without the surrounding parentheses.
    pub definition: String,
}

/// CREATE TABLE ... AS SELECT, also produced for SELECT ... INTO
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableAsStmt {
    pub name: ObjectName,
    pub persistence: Persistence,
    pub global: bool,
    pub if_not_exists: bool,
    pub on_commit: Option<OnCommit>,
    pub query: Box<QueryStmt>,
    /// The query rendered back to SQL.
    pub query_text: String,
    /// WITH NO DATA was given.
    pub skip_data: bool,
    pub is_select_into: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub default: Option<Expr>,
    pub primary_key: bool,
    pub unique: bool,
    pub identity: bool,
    pub generated: Option<Expr>,
    pub check: Option<Expr>,
    pub references: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
            primary_key: false,
            unique: false,
            identity: false,
            generated: None,
            check: None,
            references: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraint {
    PrimaryKey {
        name: Option<String>,
        columns: Vec<String>,
    },
    Unique {
        name: Option<String>,
        columns: Vec<String>,
    },
    Check {
        name: Option<String>,
        expr: Expr,
    },
    ForeignKey {
        name: Option<String>,
        columns: Vec<String>,
        foreign_table: String,
    },
}

/// DROP TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DropTableStmt {
    pub names: Vec<ObjectName>,
    pub if_exists: bool,
    pub cascade: bool,
}

/// ALTER TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct AlterTableStmt {
    pub name: ObjectName,
    pub if_exists: bool,
    pub operations: Vec<AlterTableOperation>,
}

impl AlterTableStmt {
    pub fn rename_target(&self) -> Option<&str> {
        self.operations.iter().find_map(|op| match op {
            AlterTableOperation::RenameTable(new_name) => Some(new_name.as_str()),
            _ => None,
        })
    }

    pub fn adds_foreign_key(&self) -> bool {
        self.operations.iter().any(|op| {
            matches!(
                op,
                AlterTableOperation::AddConstraint(TableConstraint::ForeignKey { .. })
            ) || matches!(op, AlterTableOperation::AddColumn(col) if col.references.is_some())
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlterTableOperation {
    AddColumn(ColumnDef),
    AddConstraint(TableConstraint),
    RenameTable(String),
    /// Any other subcommand, kept in rendered form.
    Other(String),
}

/// CREATE INDEX statement
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexStmt {
    pub name: Option<String>,
    pub table: ObjectName,
    pub columns: Vec<String>,
    pub unique: bool,
    pub if_not_exists: bool,
}

/// COMMENT ON TABLE / COLUMN statement
#[derive(Debug, Clone, PartialEq)]
pub struct CommentStmt {
    pub target: CommentTarget,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommentTarget {
    Table(ObjectName),
    Column { table: ObjectName, column: String },
}

impl CommentTarget {
    pub fn table(&self) -> &ObjectName {
        match self {
            Self::Table(table) | Self::Column { table, .. } => table,
        }
    }
}

/// SET name = value [, ...]
#[derive(Debug, Clone, PartialEq)]
pub struct SetVariableStmt {
    pub name: String,
    pub values: Vec<String>,
    pub local: bool,
}

/// INSERT statement
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub table: ObjectName,
    pub columns: Option<Vec<String>>, // None = all columns
    pub source: InsertSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Query(Box<QueryStmt>),
}

/// SELECT query statement
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStmt {
    pub projection: Vec<SelectItem>,
    pub from: Option<TableRef>,
    pub selection: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: ObjectName,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub descending: bool,
}

/// DELETE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub table: ObjectName,
    pub selection: Option<Expr>,
}

/// UPDATE statement
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub table: ObjectName,
    pub assignments: Vec<Assignment>,
    pub selection: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: Expr,
}

/// Scalar expression. Serializable because column defaults and checks live in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    Column(String),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Cast {
        expr: Box<Expr>,
        data_type: DataType,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
}
