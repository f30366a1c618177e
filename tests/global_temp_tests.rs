/// Global temporary table lifecycle tests
///
/// Template definition, lazy per-session materialization, DDL conflicts
/// and ON COMMIT behaviour.
/// Run with: cargo test --test global_temp_tests

use globaltemp::core::RelationId;
use globaltemp::{Database, DbError, ErrorClass, GttConfig, Result, Session, SessionConfig, Value};

async fn setup() -> Result<Database> {
    let db = Database::new();
    db.install_global_temp(&GttConfig::default()).await?;
    Ok(db)
}

async fn admin_session(db: &Database) -> Result<Session> {
    db.connect(SessionConfig::default()).await
}

fn materialized_id(session: &Session, name: &str) -> Option<RelationId> {
    session
        .templates()
        .into_iter()
        .find(|b| b.name() == name)
        .and_then(|b| b.materialized_id)
}

#[tokio::test]
async fn test_create_template_is_visible_to_every_session() -> Result<()> {
    let db = setup().await?;
    let mut s1 = admin_session(&db).await?;

    s1.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT, lbl TEXT)").await?;

    let templates = s1.templates();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].name(), "t_glob");
    assert!(!templates[0].is_materialized());
    assert!(templates[0].template.preserve_on_commit);
    assert_eq!(templates[0].template.owning_schema, "gtt");

    // a session opened later loads the template, not yet materialized
    let s2 = admin_session(&db).await?;
    let loaded = s2.templates();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].template, templates[0].template);
    assert!(loaded.iter().all(|b| !b.is_materialized()));

    Ok(())
}

#[tokio::test]
async fn test_rows_are_private_to_each_session() -> Result<()> {
    let db = setup().await?;
    let mut s1 = admin_session(&db).await?;
    let mut s2 = admin_session(&db).await?;

    s1.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT, lbl TEXT)").await?;

    let inserted = s1
        .execute("INSERT INTO t_glob VALUES (1, 'one'), (2, 'two')")
        .await?;
    assert_eq!(inserted.affected_rows, 2);

    let mine = s1.query("SELECT id, lbl FROM t_glob ORDER BY id").await?;
    assert_eq!(mine.row_count(), 2);
    assert_eq!(mine.rows[0], vec![Value::Integer(1), Value::Text("one".into())]);

    // s2 learns about the template from the registry and gets its own relation
    let theirs = s2.query("SELECT * FROM t_glob").await?;
    assert_eq!(theirs.row_count(), 0);

    let id1 = materialized_id(&s1, "t_glob").expect("s1 materialized");
    let id2 = materialized_id(&s2, "t_glob").expect("s2 materialized");
    assert_ne!(id1, id2);

    s2.execute("INSERT INTO t_glob VALUES (10, 'ten')").await?;
    assert_eq!(s1.query("SELECT * FROM t_glob").await?.row_count(), 2);
    assert_eq!(s2.query("SELECT * FROM t_glob").await?.row_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_materialization_happens_once_per_session() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;

    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    assert!(materialized_id(&session, "t_glob").is_none());

    session.execute("INSERT INTO t_glob VALUES (1)").await?;
    let first = materialized_id(&session, "t_glob").expect("materialized on first insert");

    session.execute("INSERT INTO t_glob VALUES (2)").await?;
    session.execute("UPDATE t_glob SET id = 3 WHERE id = 2").await?;
    session.execute("DELETE FROM t_glob WHERE id = 1").await?;
    let result = session.query("SELECT id FROM t_glob").await?;

    assert_eq!(materialized_id(&session, "t_glob"), Some(first));
    assert_eq!(result.rows, vec![vec![Value::Integer(3)]]);

    Ok(())
}

#[tokio::test]
async fn test_qualified_template_name_reaches_the_session_relation() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;

    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    session.execute("INSERT INTO gtt.t_glob VALUES (7)").await?;

    let id = materialized_id(&session, "t_glob").expect("materialized");
    assert_eq!(session.query("SELECT * FROM t_glob").await?.row_count(), 1);
    assert_eq!(session.query("SELECT * FROM pg_temp.t_glob").await?.row_count(), 1);
    assert_eq!(materialized_id(&session, "t_glob"), Some(id));

    Ok(())
}

#[tokio::test]
async fn test_materialization_copies_structure() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;

    session
        .execute(
            "CREATE GLOBAL TEMPORARY TABLE t_glob (
                id SERIAL PRIMARY KEY,
                qty INT NOT NULL DEFAULT 5 CHECK (qty > 0),
                lbl TEXT UNIQUE
            )",
        )
        .await?;

    session.execute("INSERT INTO t_glob (lbl) VALUES ('a')").await?;
    let rows = session.query("SELECT id, qty, lbl FROM t_glob").await?;
    assert_eq!(
        rows.rows,
        vec![vec![Value::Integer(1), Value::Integer(5), Value::Text("a".into())]]
    );

    let duplicate = session.execute("INSERT INTO t_glob (lbl) VALUES ('a')").await;
    assert!(duplicate.is_err());
    let negative = session.execute("INSERT INTO t_glob (qty, lbl) VALUES (-1, 'b')").await;
    assert!(negative.is_err());

    Ok(())
}

#[tokio::test]
async fn test_duplicate_template_name() -> Result<()> {
    let db = setup().await?;
    let mut s1 = admin_session(&db).await?;
    let mut s2 = admin_session(&db).await?;

    s1.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;

    let err = s2
        .execute("CREATE GLOBAL TEMPORARY TABLE t_glob (other TEXT)")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::DuplicateTemplate(ref name) if name == "t_glob"));
    assert_eq!(err.class(), ErrorClass::Internal);

    s2.execute("CREATE GLOBAL TEMPORARY TABLE IF NOT EXISTS t_glob (other TEXT)")
        .await?;
    assert_eq!(s2.templates().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_unsupported_definitions() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;
    session.execute("CREATE TABLE parent (id INT PRIMARY KEY)").await?;

    let err = session
        .execute("CREATE GLOBAL TEMPORARY TABLE t_drop (id INT) ON COMMIT DROP")
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Definition);
    assert!(err.to_string().contains("use of ON COMMIT DROP with GLOBAL TEMPORARY is not allowed"));

    let err = session
        .execute("CREATE GLOBAL TEMPORARY TABLE t_fk (id INT REFERENCES parent (id))")
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Definition);
    assert!(err.to_string().contains("referential integrity constraint"));

    let err = session
        .execute(
            "CREATE GLOBAL TEMPORARY TABLE t_fk2 (id INT, CONSTRAINT t_fk2_fk FOREIGN KEY (id) REFERENCES parent (id))",
        )
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Definition);

    let partitioned = session
        .execute("CREATE GLOBAL TEMPORARY TABLE t_part (id INT) PARTITION BY (id)")
        .await;
    assert!(partitioned.is_err());

    // nothing got registered along the way
    assert!(session.templates().is_empty());
    let fresh = admin_session(&db).await?;
    assert!(fresh.templates().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_foreign_key_cannot_be_added_later() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;
    session.execute("CREATE TABLE parent (id INT PRIMARY KEY)").await?;
    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;

    let err = session
        .execute("ALTER TABLE t_glob ADD CONSTRAINT t_glob_fk FOREIGN KEY (id) REFERENCES parent (id)")
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Definition);

    Ok(())
}

#[tokio::test]
async fn test_commented_global_marker() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;

    session
        .execute("CREATE /*GLOBAL*/ TEMPORARY TABLE t_marked (id INT)")
        .await?;
    session.execute("CREATE TEMPORARY TABLE t_local (id INT)").await?;

    let names: Vec<String> = session.templates().iter().map(|b| b.name().to_string()).collect();
    assert_eq!(names, vec!["t_marked"]);

    Ok(())
}

#[tokio::test]
async fn test_drop_conflicts_while_materialized() -> Result<()> {
    let db = setup().await?;
    let mut s1 = admin_session(&db).await?;
    let mut s2 = admin_session(&db).await?;

    s1.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    s1.execute("INSERT INTO t_glob VALUES (1)").await?;

    let err = s1.execute("DROP TABLE t_glob").await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::StateConflict);
    assert_eq!(err.to_string(), "can not drop a GTT that is in use.");
    assert_eq!(s1.templates().len(), 1);

    // a session that never touched the template may drop it
    s2.execute("DROP TABLE t_glob").await?;
    assert!(s2.templates().is_empty());

    let s3 = admin_session(&db).await?;
    assert!(s3.templates().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_drop_then_register_again() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;

    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    let first = session.templates()[0].template.placeholder_id;

    session.execute("DROP TABLE t_glob").await?;
    assert!(session.templates().is_empty());
    assert!(session.query("SELECT * FROM t_glob").await.is_err());

    session
        .execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT, extra TEXT)")
        .await?;
    let second = session.templates()[0].template.placeholder_id;
    assert_ne!(first, second);

    session.execute("INSERT INTO t_glob VALUES (1, 'x')").await?;
    assert_eq!(session.query("SELECT extra FROM t_glob").await?.scalar(), Some(&Value::Text("x".into())));

    Ok(())
}

#[tokio::test]
async fn test_drop_if_exists_mixes_templates_and_tables() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;

    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    session.execute("CREATE TABLE plain (id INT)").await?;

    session.execute("DROP TABLE IF EXISTS t_glob, plain, missing").await?;

    assert!(session.templates().is_empty());
    assert!(session.query("SELECT * FROM plain").await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_rename_template() -> Result<()> {
    let db = setup().await?;
    let mut s1 = admin_session(&db).await?;
    let mut s2 = admin_session(&db).await?;

    s1.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    s1.execute("INSERT INTO t_glob VALUES (1)").await?;

    let err = s1
        .execute("ALTER TABLE t_glob RENAME TO t_renamed")
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::StateConflict);
    assert_eq!(
        err.to_string(),
        "a temporary table has been created and is active, can not rename the GTT table in this session."
    );

    s2.execute("ALTER TABLE t_glob RENAME TO t_renamed").await?;
    let names: Vec<String> = s2.templates().iter().map(|b| b.name().to_string()).collect();
    assert_eq!(names, vec!["t_renamed"]);

    let s3 = admin_session(&db).await?;
    assert_eq!(s3.templates()[0].name(), "t_renamed");
    assert_eq!(s3.templates()[0].template.placeholder_id, s2.templates()[0].template.placeholder_id);

    s2.execute("INSERT INTO t_renamed VALUES (2)").await?;
    assert_eq!(s2.query("SELECT * FROM t_renamed").await?.row_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_rename_seen_by_a_session_opened_earlier() -> Result<()> {
    let db = setup().await?;
    let mut s1 = admin_session(&db).await?;
    s1.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;

    // s2 caches t_glob before the rename happens
    let mut s2 = admin_session(&db).await?;
    s1.execute("ALTER TABLE t_glob RENAME TO t_renamed").await?;

    s2.execute("INSERT INTO t_renamed VALUES (42)").await?;
    let names: Vec<String> = s2.templates().iter().map(|b| b.name().to_string()).collect();
    assert_eq!(names, vec!["t_renamed"]);
    assert!(materialized_id(&s2, "t_renamed").is_some());
    assert_eq!(s2.query("SELECT id FROM t_renamed").await?.scalar(), Some(&Value::Integer(42)));

    let err = s2.execute("DROP TABLE gtt.t_renamed").await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::StateConflict);
    assert_eq!(err.to_string(), "can not drop a GTT that is in use.");
    let err = s2.execute("DROP TABLE t_renamed").await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::StateConflict);

    // the template is still registered for everyone
    let s3 = admin_session(&db).await?;
    assert_eq!(s3.templates()[0].name(), "t_renamed");

    Ok(())
}

#[tokio::test]
async fn test_recreate_after_drop_in_another_session() -> Result<()> {
    let db = setup().await?;
    let mut s1 = admin_session(&db).await?;
    s1.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    let first = s1.templates()[0].template.placeholder_id;

    let mut s2 = admin_session(&db).await?;
    s1.execute("DROP TABLE t_glob").await?;

    s2.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT, lbl TEXT)").await?;
    let templates = s2.templates();
    assert_eq!(templates.len(), 1);
    assert_ne!(templates[0].template.placeholder_id, first);

    s2.execute("INSERT INTO t_glob VALUES (1, 'x')").await?;
    assert_eq!(s2.query("SELECT lbl FROM t_glob").await?.scalar(), Some(&Value::Text("x".into())));

    // s1 picks up the new definition on first reference
    assert_eq!(s1.query("SELECT id, lbl FROM t_glob").await?.row_count(), 0);
    assert_eq!(s1.templates()[0].template.placeholder_id, templates[0].template.placeholder_id);

    Ok(())
}

#[tokio::test]
async fn test_recreate_old_name_after_rename_in_another_session() -> Result<()> {
    let db = setup().await?;
    let mut s1 = admin_session(&db).await?;
    s1.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;

    let mut s2 = admin_session(&db).await?;
    s1.execute("ALTER TABLE t_glob RENAME TO t_renamed").await?;

    s2.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    s2.execute("INSERT INTO t_renamed VALUES (7)").await?;
    s2.execute("INSERT INTO t_glob VALUES (8)").await?;

    let names: Vec<String> = s2.templates().iter().map(|b| b.name().to_string()).collect();
    assert_eq!(names, vec!["t_glob", "t_renamed"]);
    assert_ne!(materialized_id(&s2, "t_glob"), materialized_id(&s2, "t_renamed"));
    assert_eq!(s2.query("SELECT id FROM t_renamed").await?.scalar(), Some(&Value::Integer(7)));
    assert_eq!(s2.query("SELECT id FROM t_glob").await?.scalar(), Some(&Value::Integer(8)));

    Ok(())
}

#[tokio::test]
async fn test_plain_temp_table_blocks_materialization() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;

    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    session.execute("CREATE TEMPORARY TABLE t_glob (id INT)").await?;

    let err = session.execute("INSERT INTO gtt.t_glob VALUES (1)").await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::StateConflict);
    assert!(!err.is_internal());
    assert_eq!(
        err.to_string(),
        "a temporary table named \"t_glob\" already exists in this session, can not create the GTT table."
    );
    assert!(materialized_id(&session, "t_glob").is_none());

    session.execute("DROP TABLE pg_temp.t_glob").await?;
    session.execute("INSERT INTO t_glob VALUES (1)").await?;
    assert!(materialized_id(&session, "t_glob").is_some());

    Ok(())
}

#[tokio::test]
async fn test_other_ddl_conflicts_while_materialized() -> Result<()> {
    let db = setup().await?;
    let mut s1 = admin_session(&db).await?;
    let mut s2 = admin_session(&db).await?;

    s1.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT, lbl TEXT)").await?;
    s1.execute("INSERT INTO t_glob VALUES (1, 'a')").await?;

    let cases = [
        ("COMMENT ON TABLE t_glob IS 'scratch rows'", "add a comment on"),
        ("CREATE INDEX t_glob_lbl_idx ON t_glob (lbl)", "create an index on"),
        ("ALTER TABLE t_glob ADD COLUMN note TEXT", "alter"),
    ];
    for (sql, action) in cases {
        let err = s1.execute(sql).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::StateConflict, "{}", sql);
        assert_eq!(
            err.to_string(),
            format!(
                "a temporary table has been created and is active, can not {} the GTT table in this session.",
                action
            )
        );
    }

    // the same statements change the template itself from a session that has not materialized it
    for (sql, _) in cases {
        s2.execute(sql).await?;
    }
    s2.execute("INSERT INTO t_glob VALUES (1, 'a', 'with note')").await?;
    let noted = s2.query("SELECT note FROM t_glob").await?;
    assert_eq!(noted.scalar(), Some(&Value::Text("with note".into())));

    Ok(())
}

#[tokio::test]
async fn test_on_commit_delete_rows() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;

    session
        .execute("CREATE GLOBAL TEMPORARY TABLE t_scratch (id INT) ON COMMIT DELETE ROWS")
        .await?;
    assert!(!session.templates()[0].template.preserve_on_commit);

    // autocommit empties the relation right after the insert
    session.execute("INSERT INTO t_scratch VALUES (1)").await?;
    let id = materialized_id(&session, "t_scratch").expect("materialized");
    assert_eq!(session.query("SELECT * FROM t_scratch").await?.row_count(), 0);

    session.execute("BEGIN").await?;
    session.execute("INSERT INTO t_scratch VALUES (1), (2)").await?;
    assert_eq!(session.query("SELECT * FROM t_scratch").await?.row_count(), 2);
    session.execute("COMMIT").await?;

    assert_eq!(session.query("SELECT * FROM t_scratch").await?.row_count(), 0);
    assert_eq!(materialized_id(&session, "t_scratch"), Some(id));

    Ok(())
}

#[tokio::test]
async fn test_on_commit_preserve_rows() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;

    session
        .execute("CREATE GLOBAL TEMPORARY TABLE t_kept (id INT) ON COMMIT PRESERVE ROWS")
        .await?;

    session.execute("BEGIN; INSERT INTO t_kept VALUES (1); COMMIT").await?;
    session.execute("INSERT INTO t_kept VALUES (2)").await?;

    assert_eq!(session.query("SELECT * FROM t_kept").await?.row_count(), 2);

    Ok(())
}

#[tokio::test]
async fn test_create_as_populates_the_creating_session() -> Result<()> {
    let db = setup().await?;
    let mut s1 = admin_session(&db).await?;

    s1.execute("CREATE TABLE src (id INT, lbl TEXT)").await?;
    s1.execute("INSERT INTO src VALUES (1, 'a'), (2, 'b'), (3, 'c')").await?;

    let created = s1
        .execute("CREATE GLOBAL TEMPORARY TABLE t_snap AS SELECT id, lbl FROM src WHERE id < 3")
        .await?;
    assert_eq!(created.affected_rows, 2);
    assert!(materialized_id(&s1, "t_snap").is_some());
    assert_eq!(s1.templates()[0].template.query(), Some("SELECT id, lbl FROM src WHERE id < 3"));

    assert_eq!(s1.query("SELECT * FROM t_snap").await?.row_count(), 2);

    // other sessions start from the structure only
    let mut s2 = admin_session(&db).await?;
    let theirs = s2.query("SELECT * FROM t_snap").await?;
    assert_eq!(theirs.columns, vec!["id", "lbl"]);
    assert_eq!(theirs.row_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_create_as_with_no_data() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;

    session.execute("CREATE TABLE src (id INT)").await?;
    session.execute("INSERT INTO src VALUES (1)").await?;
    session
        .execute("CREATE GLOBAL TEMPORARY TABLE t_empty AS SELECT id FROM src WITH NO DATA")
        .await?;

    assert!(materialized_id(&session, "t_empty").is_none());
    assert_eq!(session.query("SELECT * FROM t_empty").await?.row_count(), 0);
    assert!(materialized_id(&session, "t_empty").is_some());

    Ok(())
}

#[tokio::test]
async fn test_insert_select_between_template_and_table() -> Result<()> {
    let db = setup().await?;
    let mut session = admin_session(&db).await?;

    session.execute("CREATE TABLE src (id INT)").await?;
    session.execute("INSERT INTO src VALUES (1), (2)").await?;
    session.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;

    let copied = session.execute("INSERT INTO t_glob SELECT id FROM src").await?;
    assert_eq!(copied.affected_rows, 2);

    session.execute("CREATE TABLE archive (id INT)").await?;
    session.execute("INSERT INTO archive SELECT id FROM t_glob WHERE id > 1").await?;
    assert_eq!(session.query("SELECT * FROM archive").await?.row_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_closing_a_session_discards_its_relation() -> Result<()> {
    let db = setup().await?;
    let mut s1 = admin_session(&db).await?;

    s1.execute("CREATE GLOBAL TEMPORARY TABLE t_glob (id INT)").await?;
    s1.execute("INSERT INTO t_glob VALUES (1)").await?;
    s1.close().await?;
    assert!(s1.is_closed());
    assert!(s1.execute("SELECT 1").await.is_err());

    let mut s2 = admin_session(&db).await?;
    assert_eq!(s2.query("SELECT * FROM t_glob").await?.row_count(), 0);
    let err = s2.execute("DROP TABLE t_glob").await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::StateConflict);

    Ok(())
}
