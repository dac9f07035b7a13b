use litebind::SqliteErrorCode;
use litebind::SqliteErrorExt;
use litebind_test::new;

fn count(conn: &litebind::SqliteConnection) -> anyhow::Result<i64> {
    let mut statement = conn.create_statement()?;
    let mut rows = statement.execute_query("select count(*) from t")?;

    assert!(rows.next()?);
    Ok(rows.get_long(1)?)
}

#[test]
fn it_serializes_and_deserializes() -> anyhow::Result<()> {
    let conn = new()?;
    conn.execute("create table t (id integer primary key, name text)")?;
    conn.execute("insert into t (name) values ('a'), ('b'), ('c')")?;

    let data = conn.serialize("main")?;

    // an image of the database file, header included
    assert!(data.starts_with(b"SQLite format 3\0"));

    let copy = new()?;
    copy.deserialize("main", &data, false)?;
    assert_eq!(count(&copy)?, 3);

    // a writable copy is independent of the original
    copy.execute("insert into t (name) values ('d')")?;
    assert_eq!(count(&copy)?, 4);
    assert_eq!(count(&conn)?, 3);

    Ok(())
}

#[test]
fn it_deserializes_read_only() -> anyhow::Result<()> {
    let conn = new()?;
    conn.execute("create table t (x integer)")?;
    conn.execute("insert into t values (1)")?;

    let data = conn.serialize("main")?;

    let copy = new()?;
    copy.deserialize("main", &data, true)?;
    assert_eq!(count(&copy)?, 1);

    let err = copy.execute("insert into t values (2)").unwrap_err();
    assert_eq!(err.sqlite_code(), Some(SqliteErrorCode::ReadOnly));

    Ok(())
}

#[test]
fn it_fails_to_serialize_an_unknown_schema() -> anyhow::Result<()> {
    let conn = new()?;

    assert!(conn.serialize("nope").is_err());

    Ok(())
}
