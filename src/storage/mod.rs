pub mod catalog;
pub mod locks;
pub mod persistence;
pub mod table;

pub use catalog::{
    ColumnMeta, ConstraintDef, ConstraintKind, IndexDef, LikeOptions, Namespace, Relation, RelationDef,
    RelationSet, Role,
};
pub use locks::{LockManager, LockMode};
pub use persistence::{DatabaseSnapshot, SnapshotManager};
pub use table::Table;
