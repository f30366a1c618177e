/// Session behaviour around global temporary tables
///
/// Start-up checks, the session switch, search_path handling, transaction
/// blocks, prepared statements and the interceptor chain.
/// Run with: cargo test --test session_tests

use std::any::Any;

use globaltemp::gtt::HostEngine;
use globaltemp::hooks::UtilityNext;
use globaltemp::parser::ast::Statement;
use globaltemp::{
    Database, DbError, ErrorClass, GttConfig, Interceptor, QueryResult, Result, Session, SessionConfig,
    StatementTrace, Value,
};

async fn setup() -> Result<Database> {
    let db = Database::new();
    db.install_global_temp(&GttConfig::default()).await?;
    Ok(db)
}

async fn admin_session(db: &Database) -> Result<Session> {
    db.connect(SessionConfig::default()).await
}

fn show(result: &QueryResult) -> String {
    match result.scalar() {
        Some(Value::Text(text)) => text.clone(),
        other => panic!("SHOW returned {:?}", other),
    }
}

#[tokio::test]
async fn test_session_requires_installed_subsystem() -> Result<()> {
    let db = Database::new();

    let err = db.connect(SessionConfig::default()).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Configuration);

    // without the subsystem the engine works as a plain database
    let mut plain = db.connect(SessionConfig::default().without_global_temp()).await?;
    assert!(plain.interceptor_names().is_empty());
    assert!(!plain.set_global_temp_enabled(true));
    plain.execute("CREATE TABLE t (id INT)").await?;
    assert_eq!(plain.execute("INSERT INTO t VALUES (1)").await?.affected_rows, 1);

    Ok(())
}

#[tokio::test]
async fn test_unknown_role_is_rejected() -> Result<()> {
    let db = setup().await?;
    let err = db.connect(SessionConfig::new("nobody")).await.unwrap_err();
    assert!(matches!(err, DbError::PermissionDenied(_)));
    Ok(())
}

#[tokio::test]
async fn test_custom_managing_schema() -> Result<()> {
    let db = Database::new();
    let config = GttConfig::new().schema("templates").registry_table("registry");
    db.install_global_temp(&config).await?;
    assert!(db.is_global_temp_installed(&config).await);
    assert!(!db.is_global_temp_installed(&GttConfig::default()).await);

    let mut session = db.connect(SessionConfig::default().global_temp(config)).await?;
    assert_eq!(session.search_path(), ["public", "templates"]);

    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    assert_eq!(session.templates()[0].template.owning_schema, "templates");
    assert_eq!(session.query("SELECT * FROM templates.registry").await?.row_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_switch_through_set_and_show() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;

    assert!(session.global_temp_enabled());
    assert_eq!(show(&session.query("SHOW globaltemp.enabled").await?), "on");

    session.execute("SET globaltemp.enabled = off").await?;
    assert!(!session.global_temp_enabled());
    assert_eq!(show(&session.query("SHOW globaltemp.enabled").await?), "off");

    // switched off, GLOBAL is just a plain temporary table
    session.execute("CREATE GLOBAL TEMPORARY TABLE t_local (id INT)").await?;
    session.execute("INSERT INTO t_local VALUES (1)").await?;
    assert!(session.templates().is_empty());
    let other = admin_session(&db).await?;
    assert!(other.templates().is_empty());

    session.execute("SET globaltemp.enabled TO true").await?;
    assert!(session.global_temp_enabled());

    assert!(session.set_global_temp_enabled(false));
    assert_eq!(show(&session.query("SHOW globaltemp.enabled").await?), "off");

    let err = session.execute("SET globaltemp.enabled = maybe").await.unwrap_err();
    assert!(err.to_string().contains("requires a Boolean value"));

    Ok(())
}

#[tokio::test]
async fn test_session_starting_switched_off() -> Result<()> {
    let db = setup().await?;
    let config = SessionConfig::default().global_temp(GttConfig::new().enabled(false));
    let mut session = db.connect(config).await?;

    assert!(!session.global_temp_enabled());
    session.execute("CREATE GLOBAL TEMPORARY TABLE t_local (id INT)").await?;
    assert!(session.templates().is_empty());

    session.execute("SET globaltemp.enabled = on").await?;
    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    assert_eq!(session.templates().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_managing_schema_stays_on_search_path() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;
    assert_eq!(session.search_path(), ["public", "gtt"]);

    session.execute("SET search_path TO public").await?;
    assert_eq!(show(&session.query("SHOW search_path").await?), "public, gtt");

    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    session.execute("SET search_path = 'public'").await?;
    assert_eq!(session.query("SELECT * FROM t_glob").await?.row_count(), 0);

    // switched off, the path is taken as given
    session.execute("SET globaltemp.enabled = off").await?;
    session.execute("SET search_path TO public").await?;
    assert_eq!(show(&session.query("SHOW search_path").await?), "public");

    // the first utility statement after switching back restores it
    session.execute("SET globaltemp.enabled = on").await?;
    assert_eq!(show(&session.query("SHOW search_path").await?), "public, gtt");

    Ok(())
}

#[tokio::test]
async fn test_rolled_back_definition_disappears() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;

    session.execute("BEGIN").await?;
    assert!(session.in_transaction_block());
    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    session.execute("INSERT INTO t_glob VALUES (1)").await?;
    assert_eq!(session.templates().len(), 1);
    session.execute("ROLLBACK").await?;

    assert!(!session.in_transaction_block());
    assert!(session.templates().is_empty());
    assert!(session.query("SELECT * FROM t_glob").await.is_err());

    // the name is free again
    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    assert_eq!(session.templates().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_rolled_back_materialization_does_not_block_ddl() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;
    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;

    session.execute("BEGIN").await?;
    session.execute("INSERT INTO t_glob VALUES (1)").await?;
    assert!(session.templates()[0].is_materialized());
    session.execute("ROLLBACK").await?;

    let binding = &session.templates()[0];
    assert_eq!(binding.name(), "t_glob");
    assert!(!binding.is_materialized());

    session.execute("ALTER TABLE t_glob RENAME TO t_moved").await?;
    session.execute("DROP TABLE t_moved").await?;
    assert!(session.templates().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_committed_materialization_survives_later_rollback() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;
    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    session.execute("INSERT INTO t_glob VALUES (1)").await?;
    let id = session.templates()[0].materialized_id;

    session.execute("BEGIN; INSERT INTO t_glob VALUES (2); ROLLBACK").await?;

    assert_eq!(session.templates()[0].materialized_id, id);
    assert_eq!(session.query("SELECT * FROM t_glob").await?.row_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_aborted_block_rejects_statements() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;
    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;

    session.execute("BEGIN").await?;
    session.execute("INSERT INTO t_glob VALUES (1)").await?;
    assert!(session.execute("SELECT * FROM missing").await.is_err());

    let err = session.execute("SELECT * FROM t_glob").await.unwrap_err();
    assert!(matches!(err, DbError::TransactionAborted));

    // COMMIT of an aborted block rolls it back
    session.execute("COMMIT").await?;
    assert!(!session.in_transaction_block());
    assert_eq!(session.query("SELECT * FROM t_glob").await?.row_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_state_conflict_inside_block_aborts_it() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;
    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;

    session.execute("BEGIN").await?;
    session.execute("INSERT INTO t_glob VALUES (1)").await?;
    let err = session.execute("DROP TABLE t_glob").await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::StateConflict);
    assert!(matches!(
        session.execute("SELECT 1").await.unwrap_err(),
        DbError::TransactionAborted
    ));
    session.execute("ROLLBACK").await?;

    assert_eq!(session.templates().len(), 1);
    assert_eq!(session.query("SELECT 1").await?.scalar(), Some(&Value::Integer(1)));

    Ok(())
}

#[tokio::test]
async fn test_prepared_statements_reach_the_session_relation() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;
    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;

    let insert = session.prepare("INSERT INTO t_glob VALUES (1)").await?;
    let select = session.prepare("SELECT id FROM t_glob").await?;
    assert_eq!(insert.sql(), "INSERT INTO t_glob VALUES (1)");
    assert!(!session.templates()[0].is_materialized());

    session.execute_prepared(&insert).await?;
    let id = session.templates()[0].materialized_id.expect("materialized on first execution");
    session.execute_prepared(&insert).await?;

    let rows = session.execute_prepared(&select).await?;
    assert_eq!(rows.row_count(), 2);
    assert_eq!(session.templates()[0].materialized_id, Some(id));

    // a statement prepared in one session runs against another session's relation
    let mut other = admin_session(&db).await?;
    assert_eq!(other.execute_prepared(&select).await?.row_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_prepare_rejects_utility_and_batches() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;

    assert!(matches!(
        session.prepare("CREATE TABLE t (id INT)").await.unwrap_err(),
        DbError::UnsupportedOperation(_)
    ));
    assert!(session.prepare("SELECT 1; SELECT 2").await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_statement_trace_sees_chain_order() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let db = setup().await?;
    let mut session = admin_session(&db).await?;
    session.register_interceptor(Box::new(StatementTrace::new())).await?;
    assert_eq!(session.interceptor_names(), vec!["global_temp_tables", "statement_trace"]);

    // handled entirely by the first interceptor, never reaches the trace
    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    session.execute("INSERT INTO t_glob VALUES (1)").await?;
    session.execute("CREATE TABLE plain (id INT)").await?;

    let trace = session.interceptor::<StatementTrace>().expect("trace registered");
    assert_eq!(
        trace.events(),
        [
            "session_start",
            "commit",
            "analyze:INSERT",
            "executor_start:INSERT",
            "commit",
            "utility:CREATE TABLE",
            "commit",
        ]
    );

    Ok(())
}

/// Refuses every DROP TABLE that reaches it.
struct NoDrops;

impl Interceptor for NoDrops {
    fn name(&self) -> &'static str {
        "no_drops"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn process_utility(
        &mut self,
        host: &mut dyn HostEngine,
        stmt: &mut Statement,
        source: &str,
        next: UtilityNext<'_>,
    ) -> Result<QueryResult> {
        if let Statement::DropTable(drop) = stmt {
            return Err(DbError::PermissionDenied(format!("drop of {} refused", drop.names[0])));
        }
        next.run(host, stmt, source)
    }
}

#[tokio::test]
async fn test_failure_later_in_chain_keeps_template() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;
    session.register_interceptor(Box::new(NoDrops)).await?;
    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;

    // the registry row is removed before the drop is refused, and comes back with the rollback
    let err = session.execute("DROP TABLE t_glob").await.unwrap_err();
    assert!(err.to_string().contains("drop of gtt.t_glob refused"));

    assert_eq!(session.templates().len(), 1);
    let other = admin_session(&db).await?;
    assert_eq!(other.templates().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_ordinary_users_own_their_templates() -> Result<()> {
    let db = setup().await?;
    db.create_user("alice", false).await?;
    db.create_user("bob", false).await?;
    let mut alice = db.connect(SessionConfig::new("alice")).await?;
    let mut bob = db.connect(SessionConfig::new("bob")).await?;

    // alice cannot create in the managing schema herself
    let err = alice.execute("CREATE TABLE gtt.direct (id INT)").await.unwrap_err();
    assert!(matches!(err, DbError::PermissionDenied(_)));

    alice.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    assert_eq!(alice.user(), "alice");

    // bob may use the template but not drop or rename it
    bob.execute("INSERT INTO t_glob VALUES (1)").await?;
    assert_eq!(bob.query("SELECT * FROM t_glob").await?.row_count(), 1);

    let mut bob_fresh = db.connect(SessionConfig::new("bob")).await?;
    assert!(matches!(
        bob_fresh.execute("DROP TABLE t_glob").await.unwrap_err(),
        DbError::PermissionDenied(_)
    ));
    assert!(matches!(
        bob_fresh.execute("ALTER TABLE t_glob RENAME TO t_taken").await.unwrap_err(),
        DbError::PermissionDenied(_)
    ));
    assert_eq!(bob_fresh.templates()[0].name(), "t_glob");

    alice.execute("ALTER TABLE t_glob RENAME TO t_mine").await?;
    alice.execute("DROP TABLE t_mine").await?;
    assert!(alice.templates().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_concurrent_sessions_keep_rows_apart() -> Result<()> {
    let db = setup().await?;
    let mut creator = admin_session(&db).await?;
    creator.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    creator.close().await?;

    let mut handles = Vec::new();
    for worker in 0..4 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            let mut session = db.connect(SessionConfig::default()).await?;
            for i in 0..=worker {
                session.execute(&format!("INSERT INTO t_glob VALUES ({})", i)).await?;
            }
            let rows = session.query("SELECT * FROM t_glob").await?.row_count();
            session.close().await?;
            Ok::<usize, DbError>(rows)
        }));
    }

    for (worker, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.expect("worker panicked")?, worker + 1);
    }

    Ok(())
}
