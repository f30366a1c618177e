pub mod context;
pub mod ddl;
pub mod dml;
pub mod executor;
pub mod plan;
pub mod query;
pub mod settings;

pub use context::{ExecutionContext, SessionState, SharedState};
pub use executor::{Executor, ExecutorPipeline};
pub use plan::execute_plan;
pub use query::QueryOutput;
