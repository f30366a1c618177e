use std::collections::HashMap;
use std::fmt;

use crate::core::{DbError, RelationId, Result, SessionId};

/// Relation-level lock modes, a subset of the PostgreSQL table lock hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockMode {
    AccessShare,
    RowExclusive,
    ShareUpdateExclusive,
    Share,
    AccessExclusive,
}

impl LockMode {
    pub fn conflicts_with(self, other: LockMode) -> bool {
        use LockMode::*;
        match self {
            AccessShare => other == AccessExclusive,
            RowExclusive => matches!(other, Share | AccessExclusive),
            ShareUpdateExclusive => matches!(other, ShareUpdateExclusive | Share | AccessExclusive),
            Share => matches!(other, RowExclusive | ShareUpdateExclusive | AccessExclusive),
            AccessExclusive => true,
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AccessShare => "AccessShareLock",
            Self::RowExclusive => "RowExclusiveLock",
            Self::ShareUpdateExclusive => "ShareUpdateExclusiveLock",
            Self::Share => "ShareLock",
            Self::AccessExclusive => "AccessExclusiveLock",
        };
        f.write_str(name)
    }
}

/// Non-waiting lock table. A conflicting request fails immediately instead of blocking.
#[derive(Debug, Default)]
pub struct LockManager {
    held: HashMap<RelationId, Vec<(SessionId, LockMode)>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, session: SessionId, relation: RelationId, mode: LockMode) -> Result<()> {
        let holders = self.held.entry(relation).or_default();
        if let Some((other, held)) = holders
            .iter()
            .find(|(owner, held)| *owner != session && mode.conflicts_with(*held))
        {
            return Err(DbError::LockNotAvailable(format!(
                "{} on relation {} conflicts with {} held by session {}",
                mode, relation, held, other
            )));
        }
        holders.push((session, mode));
        Ok(())
    }

    /// Releases one acquisition of `mode`. Returns false if none was held.
    pub fn release(&mut self, session: SessionId, relation: RelationId, mode: LockMode) -> bool {
        let Some(holders) = self.held.get_mut(&relation) else {
            return false;
        };
        let Some(pos) = holders.iter().position(|entry| *entry == (session, mode)) else {
            return false;
        };
        holders.remove(pos);
        if holders.is_empty() {
            self.held.remove(&relation);
        }
        true
    }

    pub fn release_all(&mut self, session: SessionId) {
        self.held.retain(|_, holders| {
            holders.retain(|(owner, _)| *owner != session);
            !holders.is_empty()
        });
    }

    pub fn held_by(&self, session: SessionId, relation: RelationId) -> Vec<LockMode> {
        self.held
            .get(&relation)
            .map(|holders| {
                holders
                    .iter()
                    .filter(|(owner, _)| *owner == session)
                    .map(|(_, mode)| *mode)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: SessionId = SessionId(1);
    const B: SessionId = SessionId(2);
    const REL: RelationId = RelationId(16384);

    #[test]
    fn test_share_update_exclusive_is_self_conflicting() {
        let mut locks = LockManager::new();
        locks.acquire(A, REL, LockMode::ShareUpdateExclusive).unwrap();
        assert!(matches!(
            locks.acquire(B, REL, LockMode::ShareUpdateExclusive),
            Err(DbError::LockNotAvailable(_))
        ));
        // readers and writers are not blocked
        locks.acquire(B, REL, LockMode::AccessShare).unwrap();
        locks.acquire(B, REL, LockMode::RowExclusive).unwrap();
    }

    #[test]
    fn test_same_session_never_conflicts() {
        let mut locks = LockManager::new();
        locks.acquire(A, REL, LockMode::AccessExclusive).unwrap();
        locks.acquire(A, REL, LockMode::ShareUpdateExclusive).unwrap();
        assert_eq!(locks.held_by(A, REL).len(), 2);
    }

    #[test]
    fn test_release() {
        let mut locks = LockManager::new();
        locks.acquire(A, REL, LockMode::AccessExclusive).unwrap();
        assert!(locks.release(A, REL, LockMode::AccessExclusive));
        assert!(!locks.release(A, REL, LockMode::AccessExclusive));
        locks.acquire(B, REL, LockMode::AccessShare).unwrap();

        locks.acquire(A, REL, LockMode::AccessShare).unwrap();
        locks.release_all(A);
        assert!(locks.held_by(A, REL).is_empty());
        assert_eq!(locks.held_by(B, REL), vec![LockMode::AccessShare]);
    }
}
