use libsqlite3_sys::{SQLITE_INTEGER, SQLITE_NULL, SQLITE_TEXT};
use litebind::{Error, Value};
use litebind_test::{new, with_tweets};

#[test]
fn it_iterates_forward_only() -> anyhow::Result<()> {
    let conn = with_tweets(3)?;
    let mut statement = conn.create_statement()?;

    let mut rows = statement.execute_query("select id, text from tweet order by id")?;

    assert_eq!(rows.row(), 0);
    assert!(matches!(rows.get_long(1), Err(Error::Protocol(_))));

    for expected in 1..=3 {
        assert!(rows.next()?);
        assert_eq!(rows.row(), expected);
        assert_eq!(rows.get_long(1)?, i64::try_from(expected)?);
    }

    // exhausting the rows closes the result set
    assert!(!rows.next()?);
    assert!(rows.is_closed());
    assert_eq!(rows.row(), 0);
    assert!(!rows.next()?);

    assert!(matches!(rows.get_long(1), Err(Error::ResultSetClosed)));

    Ok(())
}

#[test]
fn it_handles_queries_without_rows() -> anyhow::Result<()> {
    let conn = with_tweets(0)?;

    let mut statement = conn.create_statement()?;
    let mut rows = statement.execute_query("select id from tweet")?;

    assert!(!rows.next()?);
    assert!(rows.is_closed());

    Ok(())
}

#[test]
fn it_closes_when_the_statement_runs_again() -> anyhow::Result<()> {
    let conn = with_tweets(3)?;
    let mut statement = conn.create_statement()?;

    let mut first = statement.execute_query("select id from tweet order by id")?;
    assert!(first.next()?);

    let mut second = statement.execute_query("select id from tweet order by id desc")?;

    assert!(first.is_closed());
    assert!(!first.next()?);
    assert!(matches!(first.get_long(1), Err(Error::ResultSetClosed)));

    assert!(second.next()?);
    assert_eq!(second.get_long(1)?, 3);

    Ok(())
}

#[test]
fn it_closes_when_the_prepared_statement_runs_again() -> anyhow::Result<()> {
    let conn = with_tweets(3)?;
    let mut select = conn.prepare("select id from tweet where id >= ? order by id")?;

    select.bind(1, 1)?;
    let mut first = select.execute_query()?;
    assert!(first.next()?);

    select.bind(1, 3)?;
    let mut second = select.execute_query()?;

    assert!(first.is_closed());

    assert!(second.next()?);
    assert_eq!(second.get_long(1)?, 3);
    assert!(!second.next()?);

    Ok(())
}

#[test]
fn it_closes_with_its_statement() -> anyhow::Result<()> {
    let conn = with_tweets(3)?;
    let mut statement = conn.create_statement()?;

    let mut rows = statement.execute_query("select id from tweet")?;
    assert!(rows.next()?);

    statement.close()?;

    assert!(rows.is_closed());
    assert!(!rows.next()?);

    Ok(())
}

#[test]
fn it_closes_with_its_connection() -> anyhow::Result<()> {
    let conn = with_tweets(3)?;

    let mut statement = conn.create_statement()?;
    let mut rows = statement.execute_query("select id from tweet")?;
    assert!(rows.next()?);

    conn.close()?;

    assert!(!rows.next()?);
    assert!(rows.is_closed());
    assert!(matches!(rows.get_long(1), Err(Error::ResultSetClosed)));

    Ok(())
}

#[test]
fn it_frees_the_statement_on_close() -> anyhow::Result<()> {
    let conn = with_tweets(3)?;
    let mut statement = conn.create_statement()?;

    let mut rows = statement.execute_query("select id from tweet")?;
    assert!(rows.next()?);

    rows.close();
    rows.close();
    assert!(rows.is_closed());

    // the statement was reset, so the table isn't locked by a half-read cursor
    assert_eq!(statement.execute_update("delete from tweet")?, 3);

    Ok(())
}

#[test]
fn it_limits_rows() -> anyhow::Result<()> {
    let conn = with_tweets(5)?;
    let mut statement = conn.create_statement()?;

    statement.set_max_rows(2);
    assert_eq!(statement.max_rows(), 2);

    let mut rows = statement.execute_query("select id from tweet")?;

    assert!(rows.next()?);
    assert!(rows.next()?);
    assert!(!rows.next()?);
    assert!(rows.is_closed());

    Ok(())
}

#[test]
fn it_reads_values_and_nulls() -> anyhow::Result<()> {
    let conn = new()?;
    let mut statement = conn.create_statement()?;

    let mut rows =
        statement.execute_query("select 10 as a, null as b, 'x' as c, 1.5 as d, x'0102' as e")?;
    assert!(rows.next()?);

    assert_eq!(rows.get_int(1)?, 10);
    assert!(!rows.was_null());
    assert_eq!(rows.column_type(1)?, SQLITE_INTEGER);

    // NULL reads as the zero value of the requested type
    assert_eq!(rows.get_long(2)?, 0);
    assert!(rows.was_null());
    assert_eq!(rows.get_value(2)?, Value::Null);
    assert_eq!(rows.column_type(2)?, SQLITE_NULL);

    assert_eq!(rows.get_string(3)?.as_deref(), Some("x"));
    assert_eq!(rows.column_type(3)?, SQLITE_TEXT);

    assert_eq!(rows.get_double(4)?, 1.5);
    assert_eq!(rows.get_bytes(5)?, Some(vec![1, 2]));
    assert!(rows.get_bool(1)?);

    assert!(matches!(
        rows.get_int(0),
        Err(Error::ColumnIndexOutOfBounds { index: 0, len: 5 })
    ));
    assert!(matches!(
        rows.get_int(6),
        Err(Error::ColumnIndexOutOfBounds { index: 6, len: 5 })
    ));

    Ok(())
}

#[test]
fn it_finds_columns_by_name() -> anyhow::Result<()> {
    let conn = with_tweets(1)?;

    let mut statement = conn.create_statement()?;
    let mut rows = statement.execute_query("select id, text as Body, owner_id from tweet")?;

    assert_eq!(rows.column_count(), 3);
    assert_eq!(rows.column_names(), ["id", "Body", "owner_id"]);
    assert_eq!(rows.column_name(2)?, "Body");

    assert_eq!(rows.find_column("ID")?, 1);
    assert_eq!(rows.find_column("body")?, 2);
    assert!(matches!(
        rows.find_column("nope"),
        Err(Error::ColumnNotFound(name)) if name == "nope"
    ));

    assert!(rows.next()?);
    let body = rows.find_column("body")?;
    assert_eq!(rows.get_string(body)?.as_deref(), Some("tweet #1"));

    Ok(())
}

#[test]
fn it_describes_columns() -> anyhow::Result<()> {
    let conn = new()?;

    conn.execute(
        "create table account (\
            id integer primary key autoincrement, \
            name text not null, \
            email varchar(255)\
        )",
    )?;

    let mut statement = conn.create_statement()?;
    let rows = statement.execute_query("select id, name, email, 1 + 1 as two from account")?;

    // a rowid alias reports its declared type in upper case
    assert_eq!(rows.column_decltype(1)?, Some("INTEGER"));
    assert_eq!(rows.column_decltype(3)?, Some("varchar(255)"));
    assert_eq!(rows.column_decltype(4)?, None);

    assert_eq!(rows.column_table_name(2)?, Some("account"));
    assert_eq!(rows.column_table_name(4)?, None);

    assert!(rows.is_primary_key(1)?);
    assert!(rows.is_auto_increment(1)?);
    assert!(!rows.is_nullable(2)?);
    assert!(rows.is_nullable(3)?);
    assert!(!rows.is_primary_key(3)?);

    // expressions carry no metadata
    assert!(rows.is_nullable(4)?);
    assert!(!rows.is_primary_key(4)?);

    Ok(())
}
