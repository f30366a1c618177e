/// Snapshot durability of template definitions
///
/// Run with: cargo test --test persistence_tests

use globaltemp::{Database, GttConfig, Result, SessionConfig, Value};
use tempfile::tempdir;

#[tokio::test]
async fn test_templates_survive_restart() -> Result<()> {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("catalog.db");

    {
        let db = Database::new();
        db.install_global_temp(&GttConfig::default()).await?;
        let mut session = db.connect(SessionConfig::default()).await?;

        session.execute("CREATE TABLE plain (id INT)").await?;
        session.execute("INSERT INTO plain VALUES (1), (2)").await?;
        session
            .execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT, lbl TEXT DEFAULT 'none') ON COMMIT DELETE ROWS")
            .await?;
        session.execute("BEGIN; INSERT INTO t_glob (id) VALUES (1)").await?;
        session.execute("COMMIT").await?;
        session.execute("CREATE GLOBAL TEMPORARY TABLE t_kept (id INT)").await?;
        session.execute("INSERT INTO t_kept VALUES (5)").await?;

        db.save_snapshot(&path).await?;
        session.close().await?;
    }

    let db = Database::open(&path).await?;
    assert!(db.is_global_temp_installed(&GttConfig::default()).await);

    let mut session = db.connect(SessionConfig::default()).await?;
    let templates = session.templates();
    let names: Vec<&str> = templates.iter().map(|b| b.name()).collect();
    assert_eq!(names, vec!["t_glob", "t_kept"]);
    assert!(templates.iter().all(|b| !b.is_materialized()));
    assert!(!templates[0].template.preserve_on_commit);
    assert!(templates[1].template.preserve_on_commit);

    // ordinary tables keep their rows, session relations start empty
    assert_eq!(session.query("SELECT * FROM plain").await?.row_count(), 2);
    assert_eq!(session.query("SELECT * FROM t_kept").await?.row_count(), 0);

    session.execute("BEGIN").await?;
    session.execute("INSERT INTO t_glob (id) VALUES (9)").await?;
    let row = session.query("SELECT id, lbl FROM t_glob").await?;
    assert_eq!(row.rows, vec![vec![Value::Integer(9), Value::Text("none".into())]]);
    session.execute("COMMIT").await?;

    // new objects do not collide with restored ones
    session.execute("CREATE GLOBAL TEMPORARY TABLE t_new (id INT)").await?;
    let ids: Vec<_> = session.templates().iter().map(|b| b.template.placeholder_id).collect();
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(ids.len(), unique.len());

    Ok(())
}

#[tokio::test]
async fn test_open_without_snapshot_starts_empty() -> Result<()> {
    let dir = tempdir().expect("temp dir");
    let db = Database::open(dir.path().join("missing.db")).await?;

    assert!(!db.is_global_temp_installed(&GttConfig::default()).await);
    db.install_global_temp(&GttConfig::default()).await?;
    let session = db.connect(SessionConfig::default()).await?;
    assert!(session.templates().is_empty());

    Ok(())
}
