#![allow(clippy::module_inception)]
pub mod analyzed;
pub mod planner;

pub use analyzed::{
    AnalyzedStatement, CommandKind, PermissionInfo, PlannedStatement, Privileges, RangeTableEntry,
};
pub use planner::QueryPlanner;
