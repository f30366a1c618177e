use std::any::Any;

use tracing::debug;

use super::{AnalyzeNext, ExecutorStartNext, Interceptor, UtilityNext};
use crate::core::Result;
use crate::gtt::host::HostEngine;
use crate::parser::ast::Statement;
use crate::planner::{AnalyzedStatement, PlannedStatement};
use crate::result::QueryResult;

/// Logs every hook invocation and keeps the order in which stages were seen.
#[derive(Debug, Default)]
pub struct StatementTrace {
    events: Vec<String>,
}

impl StatementTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages seen so far, such as `utility:CREATE TABLE` or `analyze:INSERT`.
    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Interceptor for StatementTrace {
    fn name(&self) -> &'static str {
        "statement_trace"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn session_start(&mut self, host: &mut dyn HostEngine) -> Result<()> {
        debug!(session = %host.session_id(), "session start");
        self.events.push("session_start".into());
        Ok(())
    }

    fn session_end(&mut self, host: &mut dyn HostEngine) {
        debug!(session = %host.session_id(), "session end");
        self.events.push("session_end".into());
    }

    fn process_utility(
        &mut self,
        host: &mut dyn HostEngine,
        stmt: &mut Statement,
        source: &str,
        next: UtilityNext<'_>,
    ) -> Result<QueryResult> {
        debug!(session = %host.session_id(), tag = stmt.tag(), source, "utility");
        self.events.push(format!("utility:{}", stmt.tag()));
        next.run(host, stmt, source)
    }

    fn post_analyze(
        &mut self,
        host: &mut dyn HostEngine,
        analyzed: &mut AnalyzedStatement,
        next: AnalyzeNext<'_>,
    ) -> Result<()> {
        debug!(relations = ?analyzed.relation_ids(), "post analyze");
        self.events.push(format!("analyze:{}", analyzed.statement.tag()));
        next.run(host, analyzed)
    }

    fn executor_start(
        &mut self,
        host: &mut dyn HostEngine,
        planned: &mut PlannedStatement,
        next: ExecutorStartNext<'_>,
    ) -> Result<()> {
        self.events.push(format!("executor_start:{}", planned.statement.tag()));
        next.run(host, planned)
    }

    fn transaction_end(&mut self, _host: &mut dyn HostEngine, committed: bool) {
        self.events
            .push(if committed { "commit" } else { "rollback" }.to_string());
    }
}
