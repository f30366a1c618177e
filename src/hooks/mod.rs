//! Interception points of statement processing.
//!
//! Interceptors are registered on a [`HookChain`] and run in registration
//! order. Each stage hands the interceptor a `next` continuation covering the
//! rest of the chain; calling it continues processing, not calling it stops
//! the chain right there. For utility statements the end of the chain is the
//! engine's standard processing.

mod trace;

use std::any::Any;

use crate::core::Result;
use crate::gtt::host::HostEngine;
use crate::parser::ast::Statement;
use crate::planner::{AnalyzedStatement, PlannedStatement};
use crate::result::QueryResult;

pub use trace::StatementTrace;

pub trait Interceptor: Send {
    fn name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Once per session, before its first statement.
    fn session_start(&mut self, _host: &mut dyn HostEngine) -> Result<()> {
        Ok(())
    }

    /// Once per session, after its last statement. Runs in reverse registration order.
    fn session_end(&mut self, _host: &mut dyn HostEngine) {}

    /// A utility statement about to be executed.
    fn process_utility(
        &mut self,
        host: &mut dyn HostEngine,
        stmt: &mut Statement,
        source: &str,
        next: UtilityNext<'_>,
    ) -> Result<QueryResult> {
        next.run(host, stmt, source)
    }

    /// A query or DML statement whose names have just been resolved.
    fn post_analyze(
        &mut self,
        host: &mut dyn HostEngine,
        analyzed: &mut AnalyzedStatement,
        next: AnalyzeNext<'_>,
    ) -> Result<()> {
        next.run(host, analyzed)
    }

    /// A plan about to start running.
    fn executor_start(
        &mut self,
        host: &mut dyn HostEngine,
        planned: &mut PlannedStatement,
        next: ExecutorStartNext<'_>,
    ) -> Result<()> {
        next.run(host, planned)
    }

    /// The session's transaction ended, `committed` tells how.
    fn transaction_end(&mut self, _host: &mut dyn HostEngine, _committed: bool) {}
}

/// Remainder of the chain for [`Interceptor::process_utility`].
pub struct UtilityNext<'a> {
    rest: &'a mut [Box<dyn Interceptor>],
}

impl UtilityNext<'_> {
    pub fn run(self, host: &mut dyn HostEngine, stmt: &mut Statement, source: &str) -> Result<QueryResult> {
        match self.rest.split_first_mut() {
            Some((first, rest)) => first.process_utility(host, stmt, source, UtilityNext { rest }),
            None => host.standard_process_utility(stmt, source),
        }
    }
}

/// Remainder of the chain for [`Interceptor::post_analyze`].
pub struct AnalyzeNext<'a> {
    rest: &'a mut [Box<dyn Interceptor>],
}

impl AnalyzeNext<'_> {
    pub fn run(self, host: &mut dyn HostEngine, analyzed: &mut AnalyzedStatement) -> Result<()> {
        match self.rest.split_first_mut() {
            Some((first, rest)) => first.post_analyze(host, analyzed, AnalyzeNext { rest }),
            None => Ok(()),
        }
    }
}

/// Remainder of the chain for [`Interceptor::executor_start`].
pub struct ExecutorStartNext<'a> {
    rest: &'a mut [Box<dyn Interceptor>],
}

impl ExecutorStartNext<'_> {
    pub fn run(self, host: &mut dyn HostEngine, planned: &mut PlannedStatement) -> Result<()> {
        match self.rest.split_first_mut() {
            Some((first, rest)) => first.executor_start(host, planned, ExecutorStartNext { rest }),
            None => Ok(()),
        }
    }
}

/// The interceptors of one session.
#[derive(Default)]
pub struct HookChain {
    interceptors: Vec<Box<dyn Interceptor>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, interceptor: Box<dyn Interceptor>) {
        tracing::debug!(interceptor = interceptor.name(), "interceptor registered");
        self.interceptors.push(interceptor);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// First registered interceptor of type `T`.
    pub fn find<T: Interceptor + 'static>(&self) -> Option<&T> {
        self.interceptors.iter().find_map(|i| i.as_any().downcast_ref::<T>())
    }

    pub fn find_mut<T: Interceptor + 'static>(&mut self) -> Option<&mut T> {
        self.interceptors
            .iter_mut()
            .find_map(|i| i.as_any_mut().downcast_mut::<T>())
    }

    pub fn session_start(&mut self, host: &mut dyn HostEngine) -> Result<()> {
        for interceptor in &mut self.interceptors {
            interceptor.session_start(host)?;
        }
        Ok(())
    }

    pub fn session_end(&mut self, host: &mut dyn HostEngine) {
        for interceptor in self.interceptors.iter_mut().rev() {
            interceptor.session_end(host);
        }
    }

    pub fn process_utility(
        &mut self,
        host: &mut dyn HostEngine,
        stmt: &mut Statement,
        source: &str,
    ) -> Result<QueryResult> {
        UtilityNext {
            rest: &mut self.interceptors,
        }
        .run(host, stmt, source)
    }

    pub fn post_analyze(&mut self, host: &mut dyn HostEngine, analyzed: &mut AnalyzedStatement) -> Result<()> {
        AnalyzeNext {
            rest: &mut self.interceptors,
        }
        .run(host, analyzed)
    }

    pub fn executor_start(&mut self, host: &mut dyn HostEngine, planned: &mut PlannedStatement) -> Result<()> {
        ExecutorStartNext {
            rest: &mut self.interceptors,
        }
        .run(host, planned)
    }

    pub fn transaction_end(&mut self, host: &mut dyn HostEngine, committed: bool) {
        for interceptor in &mut self.interceptors {
            interceptor.transaction_end(host, committed);
        }
    }
}
