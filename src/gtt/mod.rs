//! Global temporary tables.
//!
//! A template is declared once with `CREATE GLOBAL TEMPORARY TABLE` and is
//! visible to every session, yet each session works on its own private
//! relation, created the first time the session touches the template. The
//! pieces:
//!
//! * [`registry`] keeps template definitions in an ordinary table of the
//!   managing schema, next to one empty placeholder relation per template;
//! * [`cache`] holds the session's view of templates and its materializations;
//! * [`classifier`] intercepts DDL on templates;
//! * [`materializer`] builds the private relation of a template;
//! * [`rewriter`] swaps placeholder references in resolved statements for the
//!   session's private relation;
//! * [`namespace`] keeps the managing schema on the search path.
//!
//! [`GlobalTempTables`] wires all of it into a session's hook chain.

pub mod cache;
pub mod classifier;
pub mod config;
pub mod host;
pub mod materializer;
pub mod namespace;
pub mod privilege;
pub mod registry;
pub mod rewriter;
pub mod session;
pub mod template;

use std::any::Any;

use tracing::{debug, warn};

use crate::core::{DbError, Result, Value};
use crate::hooks::{AnalyzeNext, ExecutorStartNext, Interceptor, UtilityNext};
use crate::parser::ast::Statement;
use crate::planner::{AnalyzedStatement, PlannedStatement};
use crate::result::QueryResult;

pub use cache::SessionCache;
pub use classifier::{Classification, classify, is_global_definition};
pub use config::{ENABLED_SETTING, GttConfig, parse_switch};
pub use host::{HostEngine, RelationInfo, SubCommand};
pub use registry::{CatalogRegistry, RegistryStore};
pub use session::GttSession;
pub use template::{SessionBinding, Template};

/// The interceptor that gives a session global temporary tables.
#[derive(Debug)]
pub struct GlobalTempTables {
    session: GttSession,
}

impl GlobalTempTables {
    pub fn new(config: GttConfig) -> Self {
        Self {
            session: GttSession::new(config),
        }
    }

    pub fn session(&self) -> &GttSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut GttSession {
        &mut self.session
    }

    pub fn is_enabled(&self) -> bool {
        self.session.is_enabled()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.session.set_enabled(enabled);
    }

    /// Snapshot of the session's bindings, ordered by name.
    pub fn templates(&self) -> Vec<SessionBinding> {
        self.session.cache().bindings().cloned().collect()
    }

    /// `SET` / `SHOW globaltemp.enabled`, answered even while switched off.
    fn handle_switch(&mut self, stmt: &Statement) -> Result<Option<QueryResult>> {
        match stmt {
            Statement::SetVariable(set) if set.name == ENABLED_SETTING => {
                let value = set.values.first().ok_or_else(|| {
                    DbError::ExecutionError(format!("SET {} requires a value", ENABLED_SETTING))
                })?;
                self.session.set_enabled(parse_switch(value)?);
                Ok(Some(QueryResult::empty()))
            }
            Statement::ShowVariable(name) if name == ENABLED_SETTING => {
                let value = if self.session.is_enabled() { "on" } else { "off" };
                Ok(Some(QueryResult::new(
                    vec![name.clone()],
                    vec![vec![Value::Text(value.to_string())]],
                )))
            }
            _ => Ok(None),
        }
    }
}

impl Interceptor for GlobalTempTables {
    fn name(&self) -> &'static str {
        "global_temp_tables"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn session_start(&mut self, host: &mut dyn HostEngine) -> Result<()> {
        self.session.config().validate()?;
        let loaded = self.session.load(host)?;
        namespace::ensure_schema_visible(host, self.session.schema())?;
        debug!(session = %host.session_id(), templates = loaded, "global temporary tables ready");
        Ok(())
    }

    fn session_end(&mut self, host: &mut dyn HostEngine) {
        debug!(session = %host.session_id(), "releasing global temporary table cache");
        self.session.clear();
    }

    fn process_utility(
        &mut self,
        host: &mut dyn HostEngine,
        stmt: &mut Statement,
        source: &str,
        next: UtilityNext<'_>,
    ) -> Result<QueryResult> {
        if let Some(result) = self.handle_switch(stmt)? {
            return Ok(result);
        }
        if !self.session.is_enabled() {
            return next.run(host, stmt, source);
        }

        namespace::ensure_schema_visible(host, self.session.schema())?;
        match classify(&mut self.session, host, stmt, source)? {
            Classification::Handled(result) => Ok(result),
            Classification::PassThrough => next.run(host, stmt, source),
        }
    }

    fn post_analyze(
        &mut self,
        host: &mut dyn HostEngine,
        analyzed: &mut AnalyzedStatement,
        next: AnalyzeNext<'_>,
    ) -> Result<()> {
        if self.session.is_enabled() {
            namespace::ensure_schema_visible(host, self.session.schema())?;
            let primary = analyzed.primary_relation();
            rewriter::reroute(
                &mut self.session,
                host,
                &mut analyzed.rtable,
                &mut analyzed.permissions,
                primary,
            )?;
        }
        next.run(host, analyzed)
    }

    fn executor_start(
        &mut self,
        host: &mut dyn HostEngine,
        planned: &mut PlannedStatement,
        next: ExecutorStartNext<'_>,
    ) -> Result<()> {
        if self.session.is_enabled() {
            let primary = planned.result_relation.or(planned.source_relation);
            rewriter::reroute(
                &mut self.session,
                host,
                &mut planned.rtable,
                &mut planned.permissions,
                primary,
            )?;
        }
        next.run(host, planned)
    }

    fn transaction_end(&mut self, host: &mut dyn HostEngine, committed: bool) {
        if committed {
            return;
        }
        if let Err(err) = self.session.reconcile(host) {
            warn!(error = %err, "could not reconcile global temporary tables after rollback");
        }
    }
}
