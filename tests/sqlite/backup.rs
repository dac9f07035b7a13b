use std::path::Path;

use litebind::{
    BackupProgress, Error, SqliteConnection, SqliteErrorCode, SqliteErrorExt, StatementState,
};
use litebind_test::new;

fn count(conn: &SqliteConnection, table: &str) -> anyhow::Result<i64> {
    let mut statement = conn.create_statement()?;
    let mut rows = statement.execute_query(&format!("select count(*) from {table}"))?;

    assert!(rows.next()?);
    Ok(rows.get_long(1)?)
}

fn open(path: &Path) -> anyhow::Result<SqliteConnection> {
    Ok(SqliteConnection::connect(&format!(
        "sqlite://{}",
        path.display()
    ))?)
}

// large enough to need several backup steps
fn populated() -> anyhow::Result<SqliteConnection> {
    let conn = new()?;

    conn.execute("create table t (id integer primary key, padding text not null)")?;
    conn.execute(
        "with recursive n(i) as (select 1 union all select i + 1 from n where i < 500) \
         insert into t (padding) select hex(zeroblob(1000)) from n",
    )?;

    Ok(conn)
}

#[test]
fn it_backs_up_and_restores() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("backup.db");

    let conn = populated()?;

    let mut progress = Vec::<BackupProgress>::new();
    conn.backup_to("main", &path, |p| progress.push(p))?;

    // one report per step, the last one once nothing is left
    assert!(progress.len() > 1, "{progress:?}");
    let last = progress.last().copied().unwrap();
    assert_eq!(last.remaining, 0);
    assert!(last.page_count > 100);
    assert!(progress.windows(2).all(|w| w[0].remaining >= w[1].remaining));

    assert_eq!(count(&open(&path)?, "t")?, 500);

    let restored = new()?;
    restored.restore_from("main", &path, |_| {})?;
    assert_eq!(count(&restored, "t")?, 500);

    Ok(())
}

#[test]
fn it_replaces_the_content_of_the_target() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("backup.db");

    let target = open(&path)?;
    target.execute("create table stale (x integer)")?;
    target.close()?;

    let conn = new()?;
    conn.execute("create table fresh (x integer)")?;
    conn.execute("insert into fresh values (1)")?;
    conn.backup_to("main", &path, |_| {})?;

    let target = open(&path)?;
    assert_eq!(count(&target, "fresh")?, 1);
    assert!(target.execute("select * from stale").is_err());

    Ok(())
}

#[test]
fn it_runs_backup_and_restore_commands() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("with space.db");

    let conn = new()?;
    conn.execute("create table t (x integer)")?;
    conn.execute("insert into t values (1), (2)")?;

    let mut statement = conn.create_statement()?;
    assert!(!statement.execute(&format!("backup main to '{}'", path.display()))?);
    assert_eq!(statement.update_count(), Some(0));
    assert_eq!(statement.state(), StatementState::Unprepared);

    let restored = new()?;
    let mut statement = restored.create_statement()?;

    assert_eq!(
        statement.execute_update(&format!("RESTORE FROM \"{}\"", path.display()))?,
        0
    );
    assert_eq!(count(&restored, "t")?, 2);

    // commands never produce rows
    assert!(matches!(
        statement.execute_query(&format!("backup to '{}'", path.display())),
        Err(Error::QueryReturnedNoRows)
    ));

    Ok(())
}

#[test]
fn it_rejects_malformed_commands() -> anyhow::Result<()> {
    let conn = new()?;

    let err = conn.execute("backup main").unwrap_err();
    assert_eq!(err.sqlite_code(), Some(SqliteErrorCode::Error));
    assert!(err.to_string().contains("syntax error: backup main"), "{err}");

    assert!(conn.execute("restore main into somewhere.db").is_err());

    // a table named like a command is still ordinary SQL
    conn.execute("create table backup (x integer)")?;
    assert_eq!(count(&conn, "backup")?, 0);

    Ok(())
}

#[test]
fn it_fails_to_restore_a_missing_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let conn = new()?;

    let err = conn
        .restore_from("main", dir.path().join("missing.db"), |_| {})
        .unwrap_err();

    assert_eq!(err.sqlite_code(), Some(SqliteErrorCode::CantOpen));

    Ok(())
}
