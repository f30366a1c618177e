use super::ExecutionContext;
use crate::core::{DbError, Result};
use crate::parser::ast::Statement;
use crate::result::QueryResult;

/// Executes one kind of utility statement against the engine.
///
/// Executors are synchronous: the session holds the database lock for the
/// whole statement, so nothing inside a statement awaits.
pub trait Executor: Send + Sync {
    /// Name for tracing
    fn name(&self) -> &'static str;

    fn can_handle(&self, stmt: &Statement) -> bool;
    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult>;
}

pub struct ExecutorPipeline {
    executors: Vec<Box<dyn Executor>>,
}

impl ExecutorPipeline {
    pub fn new() -> Self {
        Self {
            executors: Vec::new(),
        }
    }

    /// Pipeline with every built-in utility executor registered.
    pub fn standard() -> Self {
        use super::ddl::{
            AlterTableExecutor, CommentExecutor, CreateIndexExecutor, CreateTableAsExecutor,
            CreateTableExecutor, DropTableExecutor,
        };
        use super::settings::{SetVariableExecutor, ShowVariableExecutor};

        let mut pipeline = Self::new();
        pipeline.register(Box::new(CreateTableExecutor));
        pipeline.register(Box::new(CreateTableAsExecutor));
        pipeline.register(Box::new(DropTableExecutor));
        pipeline.register(Box::new(AlterTableExecutor));
        pipeline.register(Box::new(CreateIndexExecutor));
        pipeline.register(Box::new(CommentExecutor));
        pipeline.register(Box::new(SetVariableExecutor));
        pipeline.register(Box::new(ShowVariableExecutor));
        pipeline
    }

    pub fn register(&mut self, executor: Box<dyn Executor>) {
        self.executors.push(executor);
    }

    pub fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        for executor in &self.executors {
            if executor.can_handle(stmt) {
                tracing::trace!(executor = executor.name(), "dispatching utility statement");
                return executor.execute(stmt, ctx);
            }
        }

        Err(DbError::UnsupportedOperation(format!(
            "No executor found for statement: {}",
            stmt.tag()
        )))
    }

    pub fn executor_names(&self) -> Vec<&'static str> {
        self.executors.iter().map(|e| e.name()).collect()
    }
}

impl Default for ExecutorPipeline {
    fn default() -> Self {
        Self::standard()
    }
}
