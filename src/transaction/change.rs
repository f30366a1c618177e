// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Undo log entries. Writes are applied in place and each one records how to
// reverse itself; rollback replays the log backwards.
//
// ============================================================================

use crate::core::{RelationId, Row, RowId};
use crate::storage::Relation;

/// A single reversible change in a transaction
#[derive(Debug, Clone)]
pub enum Change {
    /// A relation was created; undo removes it.
    CreateRelation { relation: RelationId },

    /// A relation was dropped; undo reinstates it with its rows.
    DropRelation { relation: Box<Relation> },

    RenameRelation { relation: RelationId, old_name: String },

    /// Metadata change (comment, index, column or constraint); undo restores the prior definition.
    AlterRelation { previous: Box<Relation> },

    InsertRow { relation: RelationId, row_id: RowId },

    UpdateRow {
        relation: RelationId,
        row_id: RowId,
        old_row: Row,
    },

    DeleteRow {
        relation: RelationId,
        row_id: RowId,
        old_row: Row,
    },
}

impl Change {
    /// Relation affected by this change
    pub fn relation(&self) -> RelationId {
        match self {
            Change::CreateRelation { relation }
            | Change::RenameRelation { relation, .. }
            | Change::InsertRow { relation, .. }
            | Change::UpdateRow { relation, .. }
            | Change::DeleteRow { relation, .. } => *relation,
            Change::DropRelation { relation } => relation.id,
            Change::AlterRelation { previous } => previous.id,
        }
    }

    pub fn is_ddl(&self) -> bool {
        matches!(
            self,
            Change::CreateRelation { .. }
                | Change::DropRelation { .. }
                | Change::RenameRelation { .. }
                | Change::AlterRelation { .. }
        )
    }

    pub fn is_dml(&self) -> bool {
        !self.is_ddl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    #[test]
    fn test_change_classification() {
        let insert = Change::InsertRow {
            relation: RelationId(7),
            row_id: RowId(1),
        };
        assert!(insert.is_dml());
        assert_eq!(insert.relation(), RelationId(7));

        let update = Change::UpdateRow {
            relation: RelationId(7),
            row_id: RowId(1),
            old_row: vec![Value::Integer(1)],
        };
        assert!(update.is_dml());

        let create = Change::CreateRelation {
            relation: RelationId(8),
        };
        assert!(create.is_ddl());
    }
}
