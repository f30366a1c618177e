use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{Row, RowId};

/// Row storage of a single relation, keyed by a per-table row id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    rows: BTreeMap<RowId, Row>,
    next_row_id: u64,
    /// Next value of each identity column, keyed by column position.
    identity_next: BTreeMap<usize, i64>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, row: Row) -> RowId {
        self.next_row_id += 1;
        let id = RowId(self.next_row_id);
        self.rows.insert(id, row);
        id
    }

    /// Puts a row back under its former id, used when undoing a delete.
    pub fn restore(&mut self, id: RowId, row: Row) {
        self.next_row_id = self.next_row_id.max(id.0);
        self.rows.insert(id, row);
    }

    pub fn get(&self, id: RowId) -> Option<&Row> {
        self.rows.get(&id)
    }

    pub fn update(&mut self, id: RowId, row: Row) -> Option<Row> {
        self.rows.get_mut(&id).map(|slot| std::mem::replace(slot, row))
    }

    pub fn delete(&mut self, id: RowId) -> Option<Row> {
        self.rows.remove(&id)
    }

    pub fn scan(&self) -> impl Iterator<Item = (RowId, &Row)> {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    pub fn truncate(&mut self) -> usize {
        let removed = self.rows.len();
        self.rows.clear();
        removed
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Identity values are not transactional; a rolled back insert still consumes one.
    pub fn next_identity(&mut self, column: usize) -> i64 {
        let next = self.identity_next.entry(column).or_insert(1);
        let value = *next;
        *next += 1;
        value
    }

    /// Appends a value to every row, used by ADD COLUMN.
    pub fn extend_rows(&mut self, value: &crate::core::Value) {
        for row in self.rows.values_mut() {
            row.push(value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    #[test]
    fn test_insert_update_delete() {
        let mut table = Table::new();
        let a = table.insert(vec![Value::Integer(1)]);
        let b = table.insert(vec![Value::Integer(2)]);
        assert_ne!(a, b);

        let old = table.update(a, vec![Value::Integer(10)]).unwrap();
        assert_eq!(old, vec![Value::Integer(1)]);
        assert_eq!(table.delete(b), Some(vec![Value::Integer(2)]));
        assert_eq!(table.row_count(), 1);

        table.restore(b, vec![Value::Integer(2)]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.truncate(), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn test_identity_sequence() {
        let mut table = Table::new();
        assert_eq!(table.next_identity(0), 1);
        assert_eq!(table.next_identity(0), 2);
        assert_eq!(table.next_identity(1), 1);
    }
}
