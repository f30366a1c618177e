use bitflags::bitflags;

use crate::core::RelationId;
use crate::parser::ast::{ObjectName, Statement};
use crate::storage::LockMode;

bitflags! {
    /// Privileges a statement needs on one relation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Privileges: u8 {
        const SELECT = 1 << 0;
        const INSERT = 1 << 1;
        const UPDATE = 1 << 2;
        const DELETE = 1 << 3;
    }
}

impl Privileges {
    pub fn writes(self) -> bool {
        self.intersects(Self::INSERT | Self::UPDATE | Self::DELETE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// One relation referenced by a statement, resolved to its id.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeTableEntry {
    pub relid: RelationId,
    /// Name as written in the statement.
    pub name: ObjectName,
    pub alias: Option<String>,
    /// Lock taken on the relation during analysis.
    pub lock_mode: LockMode,
}

/// Permission check deferred to execution. Tracked apart from the range table,
/// so anything that swaps relation ids must update both.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionInfo {
    pub relid: RelationId,
    pub required: Privileges,
}

/// A statement after name resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedStatement {
    pub command: CommandKind,
    pub rtable: Vec<RangeTableEntry>,
    pub permissions: Vec<PermissionInfo>,
    /// Index into `rtable` of the relation written by INSERT, UPDATE or DELETE.
    pub result_relation: Option<usize>,
    /// Index into `rtable` of the relation read by a SELECT or INSERT ... SELECT.
    pub source_relation: Option<usize>,
    pub statement: Statement,
}

impl AnalyzedStatement {
    /// The relation the statement is chiefly about: its write target, else its FROM relation.
    pub fn primary_relation(&self) -> Option<usize> {
        self.result_relation.or(self.source_relation)
    }

    pub fn relation_ids(&self) -> Vec<RelationId> {
        self.rtable.iter().map(|rte| rte.relid).collect()
    }
}

/// An analyzed statement ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStatement {
    pub command: CommandKind,
    pub rtable: Vec<RangeTableEntry>,
    pub permissions: Vec<PermissionInfo>,
    pub result_relation: Option<usize>,
    pub source_relation: Option<usize>,
    pub statement: Statement,
}

impl PlannedStatement {
    pub fn relid_at(&self, index: Option<usize>) -> Option<RelationId> {
        index.and_then(|i| self.rtable.get(i)).map(|rte| rte.relid)
    }
}

impl From<AnalyzedStatement> for PlannedStatement {
    fn from(analyzed: AnalyzedStatement) -> Self {
        Self {
            command: analyzed.command,
            rtable: analyzed.rtable,
            permissions: analyzed.permissions,
            result_relation: analyzed.result_relation,
            source_relation: analyzed.source_relation,
            statement: analyzed.statement,
        }
    }
}
