// ============================================================================
// globaltemp: global temporary tables over an in-memory SQL engine
// ============================================================================
//
// A template declared with `CREATE GLOBAL TEMPORARY TABLE` is shared by every
// session, while each session reads and writes its own private copy, created
// the first time the session touches the template.

pub mod connection;
pub mod core;
pub mod evaluator;
pub mod executor;
pub mod facade;
pub mod gtt;
pub mod hooks;
pub mod parser;
pub mod planner;
pub mod result;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use connection::config::SessionConfig;
pub use connection::{PreparedStatement, Session};
pub use core::{DataType, DbError, ErrorClass, Result, Value};
pub use facade::Database;
pub use gtt::{GlobalTempTables, GttConfig, SessionBinding, Template};
pub use hooks::{Interceptor, StatementTrace};
pub use result::QueryResult;
