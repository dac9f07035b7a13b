use litebind::{Error, SqliteConnection, SqliteErrorCode, SqliteErrorExt, SqliteLimit};
use litebind_test::new;

#[test]
fn it_connects() -> anyhow::Result<()> {
    let conn = new()?;

    assert!(conn.execute("select 1")?);
    assert!(!conn.is_closed());
    assert!(conn.auto_commit());

    Ok(())
}

#[test]
fn it_fails_to_connect() -> anyhow::Result<()> {
    // the directory does not exist, and `mode=rw` won't create anything
    assert!(SqliteConnection::connect(
        "sqlite:///please_do_not_run_litebind_tests_as_root/db.sqlite?mode=rw"
    )
    .is_err());

    assert!(matches!(
        SqliteConnection::connect("sqlite::memory:?colour=blue"),
        Err(Error::Configuration(_))
    ));

    Ok(())
}

#[test]
fn it_fails_to_parse() -> anyhow::Result<()> {
    let conn = new()?;
    let res = conn.execute("SEELCT 1");

    let err = res.unwrap_err();
    let sqlite = err.as_sqlite_error().expect("expected a database error");

    assert_eq!(sqlite.kind(), SqliteErrorCode::Error);
    assert_eq!(sqlite.message(), "near \"SEELCT\": syntax error in 'SEELCT 1'");

    Ok(())
}

#[test]
fn it_executes() -> anyhow::Result<()> {
    let conn = new()?;

    conn.execute("CREATE TEMPORARY TABLE users (id INTEGER PRIMARY KEY)")?;

    let mut insert = conn.prepare("INSERT INTO users (id) VALUES (?)")?;

    for index in 1..=10_i32 {
        insert.bind(1, index)?;
        assert_eq!(insert.execute_update()?, 1);
    }

    let mut statement = conn.create_statement()?;
    let mut rows = statement.execute_query("SELECT id FROM users ORDER BY id")?;

    let mut ids = Vec::new();
    while rows.next()? {
        ids.push(rows.get_int(1)?);
    }

    assert_eq!(ids, (1..=10).collect::<Vec<_>>());

    Ok(())
}

#[test]
fn it_connects_through_the_registry() -> anyhow::Result<()> {
    let registry = litebind::registry();

    let conn = registry.connect("jdbc:sqlite::memory:")?;
    assert!(conn.execute("select 1")?);

    let conn = registry.connect("sqlite::memory:")?;
    assert!(conn.execute("select 1")?);

    assert!(matches!(
        registry.connect("postgres://localhost/db"),
        Err(Error::Configuration(_))
    ));

    Ok(())
}

#[test]
fn it_reports_the_library_version() {
    let version = SqliteConnection::libversion();

    assert!(version.starts_with("3."), "unexpected version {version}");
}

#[test]
fn it_closes_idempotently() -> anyhow::Result<()> {
    let conn = new()?;

    let mut statement = conn.prepare("select 1")?;

    conn.close()?;
    conn.close()?;
    assert!(conn.is_closed());

    assert!(matches!(conn.create_statement(), Err(Error::ConnectionClosed)));
    assert!(matches!(conn.prepare("select 1"), Err(Error::ConnectionClosed)));
    assert!(matches!(statement.execute(), Err(Error::ConnectionClosed)));

    // closing a statement of a closed connection is fine
    statement.close()?;

    Ok(())
}

#[test]
fn it_counts_changes() -> anyhow::Result<()> {
    let conn = new()?;

    conn.execute("create table t (id integer primary key, x integer)")?;
    let before = conn.total_changes()?;

    conn.execute("insert into t (x) values (1), (2), (3)")?;
    assert_eq!(conn.changes()?, 3);
    assert_eq!(conn.last_insert_rowid()?, 3);

    conn.execute("update t set x = x + 1 where id > 1")?;
    assert_eq!(conn.changes()?, 2);
    assert_eq!(conn.total_changes()? - before, 5);

    Ok(())
}

#[test]
fn it_sets_limits() -> anyhow::Result<()> {
    let conn = new()?;

    let original = conn.limit(SqliteLimit::Attached, -1)?;
    assert!(original > 0);

    assert_eq!(conn.limit(SqliteLimit::Attached, 1)?, original);
    assert_eq!(conn.limit(SqliteLimit::Attached, -1)?, 1);

    conn.execute("attach database ':memory:' as one")?;
    assert!(conn.execute("attach database ':memory:' as two").is_err());

    Ok(())
}

#[test]
fn it_can_share_a_connection_between_threads() -> anyhow::Result<()> {
    let conn = new()?;
    conn.execute("create table t (x integer)")?;

    std::thread::scope(|scope| -> anyhow::Result<()> {
        let worker = scope.spawn(|| -> litebind::Result<i64> {
            conn.execute("insert into t values (1)")?;
            conn.changes()
        });

        let changes = worker.join().expect("worker panicked")?;
        assert_eq!(changes, 1);

        Ok(())
    })?;

    let mut statement = conn.create_statement()?;
    let mut rows = statement.execute_query("select count(*) from t")?;
    assert!(rows.next()?);
    assert_eq!(rows.get_long(1)?, 1);

    Ok(())
}
