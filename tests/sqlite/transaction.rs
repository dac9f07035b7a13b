use std::sync::{Arc, Mutex};

use litebind::sqlite::SqliteTransactionMode;
use litebind::{Error, SqliteConnectOptions, SqliteConnection};
use litebind_test::new;

/// Records every statement the connection starts.
fn trace(conn: &SqliteConnection) -> anyhow::Result<Arc<Mutex<Vec<String>>>> {
    let statements = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&statements);

    conn.set_trace(move |sql| sink.lock().unwrap().push(sql.to_owned()))?;

    Ok(statements)
}

fn count(statements: &Mutex<Vec<String>>, sql: &str) -> usize {
    statements.lock().unwrap().iter().filter(|s| *s == sql).count()
}

fn rows_in(conn: &SqliteConnection, table: &str) -> anyhow::Result<i64> {
    let mut statement = conn.create_statement()?;
    let mut rows = statement.execute_query(&format!("select count(*) from {table}"))?;

    assert!(rows.next()?);
    Ok(rows.get_long(1)?)
}

#[test]
fn it_commits_every_statement_in_auto_commit_mode() -> anyhow::Result<()> {
    let conn = new()?;
    conn.execute("create table t (x integer)")?;

    let statements = trace(&conn)?;

    let mut insert = conn.prepare("insert into t values (?)")?;
    for x in 0..3 {
        insert.bind(1, x)?;
        insert.execute_update()?;
    }

    // one `commit;` per completed statement
    assert_eq!(count(&statements, "commit;"), 3);
    assert!(!conn.in_transaction()?);

    Ok(())
}

#[test]
fn it_commits_a_batch_once() -> anyhow::Result<()> {
    let conn = new()?;
    conn.execute("create table t (x integer)")?;

    let statements = trace(&conn)?;

    let mut insert = conn.prepare("insert into t values (?)")?;
    for x in 0..5 {
        insert.bind(1, x)?;
        insert.add_batch()?;
    }
    insert.execute_batch()?;

    assert_eq!(count(&statements, "commit;"), 1);
    assert_eq!(rows_in(&conn, "t")?, 5);

    Ok(())
}

#[test]
fn it_does_not_commit_inside_a_transaction() -> anyhow::Result<()> {
    let conn = new()?;
    conn.execute("create table t (x integer)")?;

    conn.set_auto_commit(false)?;
    assert!(!conn.auto_commit());
    assert!(conn.in_transaction()?);

    let statements = trace(&conn)?;

    conn.execute("insert into t values (1)")?;
    conn.execute("insert into t values (2)")?;
    assert_eq!(count(&statements, "commit;"), 0);

    conn.commit()?;
    assert_eq!(count(&statements, "commit;"), 1);

    // a new transaction was opened straight away
    assert!(conn.in_transaction()?);
    assert_eq!(count(&statements, "begin;"), 1);

    Ok(())
}

#[test]
fn it_rolls_back() -> anyhow::Result<()> {
    let conn = new()?;
    conn.execute("create table t (x integer)")?;
    conn.execute("insert into t values (1)")?;

    conn.set_auto_commit(false)?;

    conn.execute("insert into t values (2)")?;
    assert_eq!(rows_in(&conn, "t")?, 2);

    conn.rollback()?;
    assert_eq!(rows_in(&conn, "t")?, 1);

    conn.execute("insert into t values (3)")?;

    // switching back commits the open transaction
    conn.set_auto_commit(true)?;
    assert!(conn.auto_commit());
    assert!(!conn.in_transaction()?);
    assert_eq!(rows_in(&conn, "t")?, 2);

    Ok(())
}

#[test]
fn it_refuses_commit_and_rollback_in_auto_commit_mode() -> anyhow::Result<()> {
    let conn = new()?;

    assert!(matches!(conn.commit(), Err(Error::AutoCommitMode)));
    assert!(matches!(conn.rollback(), Err(Error::AutoCommitMode)));

    // setting the current mode again does nothing
    conn.set_auto_commit(true)?;
    assert!(!conn.in_transaction()?);

    Ok(())
}

#[test]
fn it_begins_with_the_configured_transaction_mode() -> anyhow::Result<()> {
    let conn = SqliteConnectOptions::new()
        .in_memory(true)
        .transaction_mode(SqliteTransactionMode::Immediate)
        .connect()?;

    assert_eq!(conn.transaction_mode(), SqliteTransactionMode::Immediate);

    let statements = trace(&conn)?;

    conn.set_auto_commit(false)?;
    conn.commit()?;

    assert_eq!(count(&statements, "begin immediate;"), 2);

    conn.set_auto_commit(true)?;
    assert_eq!(count(&statements, "commit;"), 2);

    Ok(())
}

fn total(conn: &SqliteConnection) -> anyhow::Result<i64> {
    let mut statement = conn.create_statement()?;
    let mut rows = statement.execute_query("select coalesce(sum(c), 0) from t")?;

    assert!(rows.next()?);
    Ok(rows.get_long(1)?)
}

#[test]
fn it_rolls_back_to_savepoints() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let options = SqliteConnectOptions::new().filename(dir.path().join("savepoints.db"));

    let conn = options.connect()?;
    let other = options.connect()?;

    conn.execute("create table t (c integer)")?;

    let outer = conn.set_savepoint(Some("outer"))?;
    assert_eq!(outer.name(), "outer");
    assert!(!conn.auto_commit());

    conn.execute("insert into t values (1)")?;

    let inner = conn.set_savepoint(None)?;
    assert_eq!(inner.name(), format!("SQLITE_SAVEPOINT_{}", inner.id()));
    assert!(inner.id() > outer.id());

    conn.execute("insert into t values (2)")?;
    conn.rollback_to_savepoint(&inner)?;
    assert_eq!(total(&conn)?, 1);

    // rolling back keeps the savepoint
    conn.execute("insert into t values (3)")?;
    conn.release_savepoint(&inner)?;
    assert_eq!(total(&conn)?, 4);
    assert_eq!(total(&other)?, 0);

    conn.rollback_to_savepoint(&outer)?;
    assert_eq!(total(&conn)?, 0);

    conn.execute("insert into t values (5)")?;
    conn.commit()?;
    assert_eq!(total(&other)?, 5);

    conn.set_auto_commit(true)?;
    assert!(matches!(
        conn.release_savepoint(&outer),
        Err(Error::AutoCommitMode)
    ));
    assert!(matches!(
        conn.rollback_to_savepoint(&outer),
        Err(Error::AutoCommitMode)
    ));

    Ok(())
}

#[test]
fn it_rejects_unknown_savepoints() -> anyhow::Result<()> {
    let conn = new()?;

    let savepoint = conn.set_savepoint(Some("first"))?;
    conn.release_savepoint(&savepoint)?;

    // released savepoints are gone
    assert!(conn.rollback_to_savepoint(&savepoint).is_err());
    assert!(conn.release_savepoint(&savepoint).is_err());

    Ok(())
}
