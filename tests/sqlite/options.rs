use std::str::FromStr;

use litebind::sqlite::{SqliteJournalMode, SqliteTransactionMode};
use litebind::{
    Error, ErrorKind, SqliteConnectOptions, SqliteConnection, SqliteErrorCode, SqliteErrorExt,
};

fn pragma(conn: &SqliteConnection, name: &str) -> anyhow::Result<Option<String>> {
    let mut statement = conn.create_statement()?;
    let mut rows = statement.execute_query(&format!("pragma {name}"))?;

    assert!(rows.next()?);
    Ok(rows.get_string(1)?)
}

#[test]
fn it_applies_pragmas_from_the_url() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let url = format!(
        "sqlite://{}?journal_mode=wal&foreign_keys=on&user_version=7&cache_size=-4000",
        dir.path().join("pragmas.db").display()
    );

    let conn = SqliteConnection::connect(&url)?;

    assert_eq!(pragma(&conn, "journal_mode")?.as_deref(), Some("wal"));
    assert_eq!(pragma(&conn, "foreign_keys")?.as_deref(), Some("1"));
    assert_eq!(pragma(&conn, "user_version")?.as_deref(), Some("7"));
    assert_eq!(pragma(&conn, "cache_size")?.as_deref(), Some("-4000"));

    Ok(())
}

#[test]
fn it_applies_pragmas_from_the_builder() -> anyhow::Result<()> {
    let conn = SqliteConnectOptions::new()
        .in_memory(true)
        .recursive_triggers(true)
        .pragma("application_id", "1234")
        .connect()?;

    assert_eq!(pragma(&conn, "recursive_triggers")?.as_deref(), Some("1"));
    assert_eq!(pragma(&conn, "application_id")?.as_deref(), Some("1234"));

    Ok(())
}

#[test]
fn it_enforces_foreign_keys_when_asked() -> anyhow::Result<()> {
    let conn = SqliteConnectOptions::from_str("sqlite::memory:")?
        .foreign_keys(true)
        .connect()?;

    conn.execute("create table owner (id integer primary key)")?;
    conn.execute("create table pet (owner_id integer references owner (id))")?;

    let err = conn.execute("insert into pet values (1)").unwrap_err();
    assert_eq!(
        err.as_database_error().map(|e| e.kind()),
        Some(ErrorKind::ForeignKeyViolation)
    );

    Ok(())
}

#[test]
fn it_opens_read_only() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("read_only.db");

    let conn = SqliteConnectOptions::new().filename(&path).connect()?;
    conn.execute("create table t (x integer)")?;
    conn.execute("insert into t values (1)")?;
    conn.close()?;

    let conn = SqliteConnection::connect(&format!("sqlite://{}?mode=ro", path.display()))?;

    assert!(conn.execute("select * from t")?);

    let err = conn.execute("insert into t values (2)").unwrap_err();
    assert_eq!(err.sqlite_code(), Some(SqliteErrorCode::ReadOnly));

    Ok(())
}

#[test]
fn it_opens_immutable_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("immutable db.sqlite");

    let conn = SqliteConnectOptions::new().filename(&path).connect()?;
    conn.execute("create table t (x integer)")?;
    conn.execute("insert into t values (1)")?;
    conn.close()?;

    let conn = SqliteConnectOptions::new()
        .filename(&path)
        .immutable(true)
        .connect()?;

    assert_eq!(pragma(&conn, "user_version")?.as_deref(), Some("0"));
    assert!(conn.execute("select x from t")?);

    Ok(())
}

#[test]
fn it_does_not_create_files_unless_asked() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("missing.db");

    let err = SqliteConnection::connect(&format!("sqlite://{}?mode=rw", path.display()))
        .unwrap_err();

    assert_eq!(err.sqlite_code(), Some(SqliteErrorCode::CantOpen));
    assert!(!path.exists());

    SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .connect()?;

    assert!(path.exists());

    Ok(())
}

#[test]
fn it_reads_the_transaction_mode() -> anyhow::Result<()> {
    let conn = SqliteConnection::connect("sqlite::memory:?transaction_mode=exclusive")?;
    assert_eq!(conn.transaction_mode(), SqliteTransactionMode::Exclusive);

    let conn = SqliteConnection::connect("sqlite::memory:")?;
    assert_eq!(conn.transaction_mode(), SqliteTransactionMode::Deferred);

    Ok(())
}

#[test]
fn it_rejects_bad_urls() {
    assert!(matches!(
        SqliteConnection::connect("sqlite::memory:?colour=blue"),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        SqliteConnection::connect("sqlite::memory:?busy_timeout=soon"),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn it_keeps_the_last_value_of_a_pragma() {
    let options = SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Delete)
        .foreign_keys(false)
        .journal_mode(SqliteJournalMode::Memory);

    assert_eq!(options.get_pragma("journal_mode"), Some("MEMORY"));
    assert_eq!(options.get_pragma("foreign_keys"), Some("OFF"));
    assert_eq!(options.get_pragma("synchronous"), None);
}
