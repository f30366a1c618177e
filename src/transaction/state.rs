// ============================================================================
// Transaction State Management
// ============================================================================
//
// A session has at most one open transaction. Statements outside an explicit
// block run in an implicit transaction that commits when the statement ends.
//
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use super::Change;

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// ```text
/// Active ──error inside BEGIN block──> Failed ──ROLLBACK──> (closed)
///   └──COMMIT / ROLLBACK──> (closed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    /// An error occurred inside an explicit block; only ROLLBACK is accepted.
    Failed,
}

#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    explicit: bool,
    changes: Vec<Change>,
}

impl Transaction {
    pub fn begin(explicit: bool) -> Self {
        Self {
            id: TransactionId::new(),
            state: TransactionState::Active,
            explicit,
            changes: Vec::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    pub fn is_failed(&self) -> bool {
        self.state == TransactionState::Failed
    }

    pub fn mark_failed(&mut self) {
        self.state = TransactionState::Failed;
    }

    pub fn record(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    /// Hands the undo log over in reverse order, newest first.
    pub fn into_undo_log(self) -> impl Iterator<Item = Change> {
        self.changes.into_iter().rev()
    }
}
