use litebind::{
    Error, ErrorKind, FunctionFlags, SqliteConnection, SqliteErrorCode, SqliteErrorExt,
    StatementState, Value,
};
use litebind_test::new;

fn with_constraints() -> anyhow::Result<SqliteConnection> {
    let conn = new()?;

    conn.execute(
        "create table account (\
            id integer primary key, \
            email text not null unique, \
            balance integer not null check (balance >= 0)\
        )",
    )?;
    conn.execute("insert into account (email, balance) values ('a@example.com', 10)")?;

    Ok(conn)
}

fn kind_of(err: &Error) -> Option<ErrorKind> {
    err.as_database_error().map(|e| e.kind())
}

#[test]
fn it_maps_constraint_violations() -> anyhow::Result<()> {
    let conn = with_constraints()?;

    let err = conn
        .execute("insert into account (email, balance) values ('a@example.com', 1)")
        .unwrap_err();
    assert_eq!(kind_of(&err), Some(ErrorKind::UniqueViolation));
    assert!(err
        .as_database_error()
        .is_some_and(|e| e.is_unique_violation()));

    let err = conn
        .execute("insert into account (id, email, balance) values (1, 'b@example.com', 1)")
        .unwrap_err();
    assert_eq!(kind_of(&err), Some(ErrorKind::UniqueViolation));

    let err = conn
        .execute("insert into account (email, balance) values (null, 1)")
        .unwrap_err();
    assert_eq!(kind_of(&err), Some(ErrorKind::NotNullViolation));

    let err = conn
        .execute("insert into account (email, balance) values ('c@example.com', -1)")
        .unwrap_err();
    assert_eq!(kind_of(&err), Some(ErrorKind::CheckViolation));

    assert_eq!(err.sqlite_code(), Some(SqliteErrorCode::Constraint));

    Ok(())
}

#[test]
fn it_formats_database_errors() -> anyhow::Result<()> {
    let conn = with_constraints()?;

    let err = conn
        .execute("insert into account (email, balance) values ('a@example.com', 1)")
        .unwrap_err();

    let sqlite = err.as_sqlite_error().expect("a database error");
    assert_eq!(sqlite.kind(), SqliteErrorCode::Constraint);
    assert_eq!(sqlite.code(), libsqlite3_sys::SQLITE_CONSTRAINT_UNIQUE);
    assert_eq!(sqlite.message(), "UNIQUE constraint failed: account.email");

    assert_eq!(
        err.as_database_error().and_then(|e| e.code()).as_deref(),
        Some("2067")
    );
    assert_eq!(
        sqlite.to_string(),
        "[SQLITE_CONSTRAINT] Abort due to constraint violation (code 2067): \
         UNIQUE constraint failed: account.email"
    );

    Ok(())
}

#[test]
fn it_keeps_prepared_statements_after_constraint_violations() -> anyhow::Result<()> {
    let conn = with_constraints()?;
    let mut insert = conn.prepare("insert into account (email, balance) values (?, ?)")?;

    insert.bind(1, "a@example.com")?;
    insert.bind(2, 5)?;

    let err = insert.execute_update().unwrap_err();
    assert_eq!(kind_of(&err), Some(ErrorKind::UniqueViolation));
    assert_eq!(insert.state(), StatementState::Prepared);

    insert.bind(1, "b@example.com")?;
    assert_eq!(insert.execute_update()?, 1);

    Ok(())
}

#[test]
fn it_closes_prepared_statements_after_fatal_errors() -> anyhow::Result<()> {
    let conn = new()?;

    conn.create_function("explode", 0, FunctionFlags::NONE, |_| Err("boom".into()))?;

    let mut select = conn.prepare("select explode()")?;

    let err = select.execute().unwrap_err();
    assert_eq!(err.sqlite_code(), Some(SqliteErrorCode::Error));
    assert_eq!(select.state(), StatementState::Closed);
    assert!(select.is_closed());

    assert!(select.execute().is_err());

    Ok(())
}

#[test]
fn it_finalizes_statements_when_a_later_row_fails() -> anyhow::Result<()> {
    let conn = new()?;

    conn.create_function("checked", 1, FunctionFlags::NONE, |args| {
        let value = args[0].as_i64();

        if value < 0 {
            return Err(format!("{value} is negative").into());
        }

        Ok(Value::Long(value))
    })?;

    conn.execute("create table t (x integer)")?;
    conn.execute("insert into t values (1), (-2)")?;

    let mut select = conn.prepare("select checked(x) from t order by rowid")?;
    let mut rows = select.execute_query()?;

    assert!(rows.next()?);
    assert_eq!(rows.get_long(1)?, 1);

    let err = rows.next().unwrap_err();
    assert!(err.to_string().contains("-2 is negative"));
    assert!(rows.is_closed());
    drop(rows);

    assert_eq!(select.state(), StatementState::Closed);
    assert!(matches!(select.execute(), Err(Error::HandleClosed { .. })));

    let mut statement = conn.create_statement()?;
    let mut rows = statement.execute_query("select checked(x) from t order by rowid")?;

    assert!(rows.next()?);
    assert!(rows.next().is_err());
    drop(rows);

    assert_eq!(statement.state(), StatementState::Unprepared);
    assert_eq!(statement.execute_update("delete from t where x < 0")?, 1);

    Ok(())
}

#[test]
fn it_unprepares_statements_after_fatal_errors() -> anyhow::Result<()> {
    let conn = new()?;

    conn.create_function("explode", 0, FunctionFlags::NONE, |_| Err("boom".into()))?;

    let mut statement = conn.create_statement()?;

    assert!(statement.execute("select explode()").is_err());
    assert_eq!(statement.state(), StatementState::Unprepared);

    // the statement itself stays usable
    assert!(statement.execute("select 1")?);

    let mut rows = statement.result_set().expect("expected a result set");
    assert!(rows.next()?);
    assert_eq!(rows.get_value(1)?, Value::Long(1));

    Ok(())
}

#[test]
fn it_reports_errors_outside_the_database() -> anyhow::Result<()> {
    let conn = new()?;

    assert!(conn.execute("select 1")?);

    // trailing statements are ignored
    assert!(conn.execute("select 1; select 2")?);

    let mut insert = conn.prepare("select ?")?;
    let err = insert.bind(2, 1).unwrap_err();
    assert!(err.as_database_error().is_none());
    assert!(err.sqlite_code().is_none());

    conn.close()?;

    let err = conn.execute("select 1").unwrap_err();
    assert!(err.as_database_error().is_none());

    Ok(())
}
