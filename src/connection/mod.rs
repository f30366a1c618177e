pub mod config;

pub use config::SessionConfig;

use tracing::{debug, warn};

use crate::core::{DbError, Result, SessionId};
use crate::executor::{ExecutionContext, SessionState, SharedState, execute_plan};
use crate::facade::Database;
use crate::gtt::{GlobalTempTables, SessionBinding};
use crate::hooks::{HookChain, Interceptor};
use crate::parser::ast::Statement;
use crate::planner::{AnalyzedStatement, QueryPlanner};
use crate::result::QueryResult;
use crate::storage::RelationSet;

/// One client session.
///
/// Owns a private temporary namespace (`pg_temp_<id>`), its transaction state
/// and its interceptor chain. Statements run one at a time while the session
/// holds the database lock.
pub struct Session {
    db: Database,
    state: SessionState,
    hooks: HookChain,
    planner: QueryPlanner,
    closed: bool,
}

/// Query or DML statement analyzed once and run any number of times.
///
/// The stored form is the one name resolution produced, before any
/// interceptor rewrote it.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    sql: String,
    analyzed: AnalyzedStatement,
}

impl PreparedStatement {
    /// Get the SQL text of this prepared statement
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl Session {
    pub(crate) async fn open(db: Database, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let mut shared = db.lock_shared().await;
        if shared.role(&config.user).is_none() {
            return Err(DbError::PermissionDenied(format!("role \"{}\" does not exist", config.user)));
        }

        let id = shared.allocate_session();
        let temp_namespace = shared.create_namespace(&format!("pg_temp_{}", id), &config.user, true)?;
        let state = SessionState::new(id, &config.user, config.search_path.clone(), temp_namespace);

        let mut hooks = HookChain::new();
        if let Some(gtt) = &config.global_temp {
            hooks.register(Box::new(GlobalTempTables::new(gtt.clone())));
        }

        let mut session = Self {
            db: db.clone(),
            state,
            hooks,
            planner: QueryPlanner::new(),
            closed: false,
        };
        let started = session.in_transaction(&mut shared, |hooks, _, ctx| hooks.session_start(ctx));
        if let Err(err) = started {
            shared.drop_namespace(temp_namespace);
            session.closed = true;
            return Err(err);
        }
        debug!(session = %id, user = %config.user, "session opened");
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.state.id()
    }

    pub fn user(&self) -> &str {
        &self.state.user
    }

    pub fn search_path(&self) -> &[String] {
        &self.state.search_path
    }

    pub fn in_transaction_block(&self) -> bool {
        self.state.in_transaction_block()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Appends an interceptor to the chain and runs its session start.
    pub async fn register_interceptor(&mut self, mut interceptor: Box<dyn Interceptor>) -> Result<()> {
        self.ensure_open()?;
        let db = self.db.clone();
        let mut shared = db.lock_shared().await;
        let mut ctx = ExecutionContext::new(&mut shared, &mut self.state, db.pipeline(), db.parser());
        interceptor.session_start(&mut ctx)?;
        self.hooks.register(interceptor);
        Ok(())
    }

    /// First registered interceptor of type `T`.
    pub fn interceptor<T: Interceptor + 'static>(&self) -> Option<&T> {
        self.hooks.find::<T>()
    }

    pub fn interceptor_names(&self) -> Vec<&'static str> {
        self.hooks.names()
    }

    /// Turns global temporary tables on or off for this session, like
    /// `SET globaltemp.enabled`. Returns false when the session has none.
    pub fn set_global_temp_enabled(&mut self, enabled: bool) -> bool {
        match self.hooks.find_mut::<GlobalTempTables>() {
            Some(gtt) => {
                gtt.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    pub fn global_temp_enabled(&self) -> bool {
        self.hooks.find::<GlobalTempTables>().is_some_and(|g| g.is_enabled())
    }

    /// This session's view of every known template.
    pub fn templates(&self) -> Vec<SessionBinding> {
        self.hooks
            .find::<GlobalTempTables>()
            .map(|g| g.templates())
            .unwrap_or_default()
    }

    /// Executes one or more `;`-separated statements and returns the result of the last one.
    pub async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        self.ensure_open()?;
        let statements = self.db.parser().parse_with_source(sql)?;
        if statements.is_empty() {
            return Err(DbError::ParseError("No statement found".into()));
        }

        let db = self.db.clone();
        let mut shared = db.lock_shared().await;
        let mut last = QueryResult::empty();
        for (stmt, source) in statements {
            last = self.run_statement(&mut shared, stmt, &source)?;
        }
        Ok(last)
    }

    /// Alias for [`execute`](Self::execute).
    pub async fn query(&mut self, sql: &str) -> Result<QueryResult> {
        self.execute(sql).await
    }

    /// Analyzes a query or DML statement for later execution.
    pub async fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        self.ensure_open()?;
        let mut statements = self.db.parser().parse(sql)?;
        let stmt = match (statements.pop(), statements.is_empty()) {
            (Some(stmt), true) => stmt,
            (None, _) => return Err(DbError::ParseError("No statement found".into())),
            (Some(_), false) => {
                return Err(DbError::UnsupportedOperation(
                    "cannot prepare more than one statement".into(),
                ));
            }
        };
        if stmt.is_utility() {
            return Err(DbError::UnsupportedOperation(format!("cannot prepare {}", stmt.tag())));
        }

        let db = self.db.clone();
        let mut shared = db.lock_shared().await;
        let analyzed = self.in_transaction(&mut shared, |_, planner, ctx| planner.analyze(ctx, stmt))?;
        Ok(PreparedStatement {
            sql: sql.to_string(),
            analyzed,
        })
    }

    /// Runs a prepared statement. Interceptors see it at executor start only.
    pub async fn execute_prepared(&mut self, prepared: &PreparedStatement) -> Result<QueryResult> {
        self.ensure_open()?;
        let db = self.db.clone();
        let mut shared = db.lock_shared().await;
        self.in_transaction(&mut shared, |hooks, planner, ctx| {
            let mut planned = planner.plan(prepared.analyzed.clone());
            planner.acquire_locks(ctx, &planned)?;
            hooks.executor_start(ctx, &mut planned)?;
            execute_plan(ctx, &planned)
        })
    }

    /// Rolls back an open transaction, ends the session and drops its temporary namespace.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let db = self.db.clone();
        let mut shared = db.lock_shared().await;
        self.teardown(&mut shared);
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(DbError::ExecutionError("Session is closed".into()));
        }
        Ok(())
    }

    fn run_statement(&mut self, shared: &mut SharedState, stmt: Statement, source: &str) -> Result<QueryResult> {
        if stmt.is_transaction_control() {
            self.transaction_control(shared, &stmt)?;
            return Ok(QueryResult::empty());
        }
        self.in_transaction(shared, |hooks, planner, ctx| dispatch(hooks, planner, ctx, stmt, source))
    }

    fn transaction_control(&mut self, shared: &mut SharedState, stmt: &Statement) -> Result<()> {
        let Self { db, state, hooks, .. } = self;
        let mut ctx = ExecutionContext::new(shared, state, db.pipeline(), db.parser());

        if matches!(stmt, Statement::Begin) {
            return ctx.begin(true);
        }
        if ctx.session.transaction.is_none() {
            warn!(session = %ctx.session.id, "there is no transaction in progress");
            return Ok(());
        }
        let committed = match stmt {
            // committing an aborted block rolls it back
            Statement::Commit => ctx.commit().is_ok(),
            _ => {
                ctx.rollback();
                false
            }
        };
        hooks.transaction_end(&mut ctx, committed);
        Ok(())
    }

    /// Runs `f` inside the open transaction block, or in a transaction of its
    /// own committed on success and rolled back on failure. A failure inside a
    /// block aborts the block.
    fn in_transaction<T>(
        &mut self,
        shared: &mut SharedState,
        f: impl FnOnce(&mut HookChain, &QueryPlanner, &mut ExecutionContext<'_>) -> Result<T>,
    ) -> Result<T> {
        let Self {
            db, state, hooks, planner, ..
        } = self;
        let mut ctx = ExecutionContext::new(shared, state, db.pipeline(), db.parser());

        let in_block = ctx.session.in_transaction_block();
        if in_block && ctx.session.transaction.as_ref().is_some_and(|t| t.is_failed()) {
            return Err(DbError::TransactionAborted);
        }
        if !in_block {
            ctx.begin(false)?;
        }

        let result = f(hooks, planner, &mut ctx);
        match (&result, in_block) {
            (Ok(_), false) => {
                ctx.commit()?;
                hooks.transaction_end(&mut ctx, true);
            }
            (Err(err), false) => {
                debug!(session = %ctx.session.id, error = %err, "statement failed, rolling back");
                ctx.rollback();
                hooks.transaction_end(&mut ctx, false);
            }
            (Err(err), true) => {
                debug!(session = %ctx.session.id, error = %err, "statement failed, transaction block aborted");
                ctx.mark_failed();
            }
            (Ok(_), true) => {}
        }
        result
    }

    fn teardown(&mut self, shared: &mut SharedState) {
        let Self { db, state, hooks, .. } = self;
        {
            let mut ctx = ExecutionContext::new(shared, state, db.pipeline(), db.parser());
            if ctx.session.transaction.is_some() {
                ctx.rollback();
                hooks.transaction_end(&mut ctx, false);
            }
            hooks.session_end(&mut ctx);
        }
        shared.locks.release_all(state.id);
        state.temp_relations = RelationSet::new();
        shared.drop_namespace(state.temp_namespace);
        self.closed = true;
        debug!(session = %self.state.id, "session closed");
    }
}

/// Utility statements go through the utility chain; queries and DML are
/// analyzed, planned and run, with interceptors at each stage.
fn dispatch(
    hooks: &mut HookChain,
    planner: &QueryPlanner,
    ctx: &mut ExecutionContext<'_>,
    mut stmt: Statement,
    source: &str,
) -> Result<QueryResult> {
    if stmt.is_utility() {
        return hooks.process_utility(ctx, &mut stmt, source);
    }
    let mut analyzed = planner.analyze(ctx, stmt)?;
    hooks.post_analyze(ctx, &mut analyzed)?;
    let mut planned = planner.plan(analyzed);
    hooks.executor_start(ctx, &mut planned)?;
    execute_plan(ctx, &planned)
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let db = self.db.clone();
        match db.try_lock_shared() {
            Ok(mut shared) => self.teardown(&mut shared),
            Err(err) => warn!(session = %self.state.id, error = %err, "session dropped without cleanup"),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.state.id)
            .field("user", &self.state.user)
            .field("interceptors", &self.hooks.names())
            .field("closed", &self.closed)
            .finish()
    }
}
