use litebind::error::BoxDynError;
use litebind::{
    Aggregate, FunctionFlags, SqliteConnectOptions, SqliteConnection, SqliteErrorExt, Value,
};
use litebind_test::new;

fn query_long(conn: &SqliteConnection, sql: &str) -> anyhow::Result<Option<i64>> {
    let mut statement = conn.create_statement()?;
    let mut rows = statement.execute_query(sql)?;

    assert!(rows.next()?);
    let value = rows.get_long(1)?;

    Ok((!rows.was_null()).then_some(value))
}

fn query_strings(conn: &SqliteConnection, sql: &str) -> anyhow::Result<Vec<String>> {
    let mut statement = conn.create_statement()?;
    let mut rows = statement.execute_query(sql)?;
    let mut strings = Vec::new();

    while rows.next()? {
        strings.push(rows.get_string(1)?.unwrap_or_default());
    }

    Ok(strings)
}

#[derive(Default)]
struct Sum {
    total: Option<i64>,
}

impl Aggregate for Sum {
    fn step(&mut self, args: &[Value]) -> Result<(), BoxDynError> {
        if !args[0].is_null() {
            *self.total.get_or_insert(0) += args[0].as_i64();
        }

        Ok(())
    }

    fn finish(&mut self) -> Result<Value, BoxDynError> {
        Ok(self.total.into())
    }
}

struct Fails;

impl Aggregate for Fails {
    fn step(&mut self, _args: &[Value]) -> Result<(), BoxDynError> {
        Err("cannot add that up".into())
    }

    fn finish(&mut self) -> Result<Value, BoxDynError> {
        Ok(Value::Null)
    }
}

#[test]
fn it_calls_scalar_functions() -> anyhow::Result<()> {
    let conn = new()?;

    conn.create_function("double_it", 1, FunctionFlags::DETERMINISTIC, |args| {
        Ok(Value::Long(args[0].as_i64() * 2))
    })?;

    assert_eq!(query_long(&conn, "select double_it(21)")?, Some(42));
    assert_eq!(query_long(&conn, "select double_it('4')")?, Some(8));

    Ok(())
}

#[test]
fn it_accepts_any_number_of_arguments() -> anyhow::Result<()> {
    let conn = new()?;

    conn.create_function("arity", -1, FunctionFlags::NONE, |args| {
        Ok(Value::Long(i64::try_from(args.len())?))
    })?;

    assert_eq!(query_long(&conn, "select arity()")?, Some(0));
    assert_eq!(query_long(&conn, "select arity(1, 'a', null, x'00')")?, Some(4));

    Ok(())
}

#[test]
fn it_passes_values_through_unchanged() -> anyhow::Result<()> {
    let conn = new()?;

    conn.create_function("identity", 1, FunctionFlags::NONE, |args| Ok(args[0].clone()))?;

    let mut statement = conn.create_statement()?;
    let mut rows =
        statement.execute_query("select identity(1), identity(2.5), identity('x'), identity(null)")?;

    assert!(rows.next()?);
    assert_eq!(rows.get_value(1)?, Value::Long(1));
    assert_eq!(rows.get_value(2)?, Value::Double(2.5));
    assert_eq!(rows.get_value(3)?, Value::Text("x".into()));
    assert_eq!(rows.get_value(4)?, Value::Null);

    Ok(())
}

#[test]
fn it_reports_errors_from_functions() -> anyhow::Result<()> {
    let conn = new()?;

    conn.create_function("checked", 1, FunctionFlags::NONE, |args| {
        let value = args[0].as_i64();

        if value < 0 {
            return Err(format!("{value} is negative").into());
        }

        Ok(Value::Long(value))
    })?;

    assert_eq!(query_long(&conn, "select checked(3)")?, Some(3));

    let err = conn.execute("select checked(-3)").unwrap_err();
    let sqlite = err.as_sqlite_error().expect("a database error");

    assert_eq!(sqlite.message(), "-3 is negative");

    Ok(())
}

#[test]
fn it_replaces_and_destroys_functions() -> anyhow::Result<()> {
    let conn = new()?;

    conn.create_function("answer", 0, FunctionFlags::NONE, |_| Ok(Value::Long(41)))?;
    conn.create_function("answer", 0, FunctionFlags::NONE, |_| Ok(Value::Long(42)))?;

    assert_eq!(query_long(&conn, "select answer()")?, Some(42));

    conn.destroy_function("answer", 0)?;

    let err = conn.execute("select answer()").unwrap_err();
    assert!(err.to_string().contains("no such function: answer"), "{err}");

    Ok(())
}

#[test]
fn it_runs_aggregates() -> anyhow::Result<()> {
    let conn = new()?;

    conn.create_aggregate("my_sum", 1, FunctionFlags::NONE, Sum::default)?;

    conn.execute("create table t (grp text, x integer)")?;
    conn.execute("insert into t values ('a', 1), ('a', 2), ('b', 10), ('b', null), ('c', null)")?;

    assert_eq!(query_long(&conn, "select my_sum(x) from t")?, Some(13));

    // a group without rows still gets a result
    assert_eq!(query_long(&conn, "select my_sum(x) from t where x > 100")?, None);

    let mut statement = conn.create_statement()?;
    let mut rows = statement.execute_query("select grp, my_sum(x) from t group by grp order by grp")?;

    let mut groups = Vec::new();
    while rows.next()? {
        let total = rows.get_long(2)?;
        let total = (!rows.was_null()).then_some(total);

        groups.push((rows.get_string(1)?, total));
    }

    assert_eq!(
        groups,
        [
            (Some("a".to_owned()), Some(3)),
            (Some("b".to_owned()), Some(10)),
            (Some("c".to_owned()), None),
        ]
    );

    Ok(())
}

#[test]
fn it_reports_errors_from_aggregates() -> anyhow::Result<()> {
    let conn = new()?;

    conn.create_aggregate("fails", 1, FunctionFlags::NONE, || Fails)?;
    conn.execute("create table t (x integer)")?;
    conn.execute("insert into t values (1)")?;

    let err = conn.execute("select fails(x) from t").unwrap_err();
    assert_eq!(
        err.as_sqlite_error().map(|e| e.message()),
        Some("cannot add that up")
    );

    Ok(())
}

#[test]
fn it_sorts_with_collations() -> anyhow::Result<()> {
    let conn = new()?;

    conn.create_collation("reverse", |a, b| b.cmp(a))?;

    conn.execute("create table t (name text)")?;
    conn.execute("insert into t values ('b'), ('a'), ('c')")?;

    assert_eq!(
        query_strings(&conn, "select name from t order by name collate reverse")?,
        ["c", "b", "a"]
    );

    conn.destroy_collation("reverse")?;

    let err = conn
        .execute("select name from t order by name collate reverse")
        .unwrap_err();
    assert!(
        err.to_string().contains("no such collation sequence: reverse"),
        "{err}"
    );

    Ok(())
}

#[test]
fn it_registers_functions_and_collations_from_options() -> anyhow::Result<()> {
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .collation("by_length", |a: &str, b: &str| {
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        })
        .function("shout", 1, FunctionFlags::DETERMINISTIC, |args| {
            Ok(args[0]
                .as_text()
                .map_or(Value::Null, |text| Value::Text(text.to_uppercase())))
        })
        .aggregate("my_sum", 1, FunctionFlags::NONE, Sum::default);

    // every connection gets its own registrations
    for _ in 0..2 {
        let conn = options.connect()?;

        conn.execute("create table t (name text)")?;
        conn.execute("insert into t values ('ccc'), ('a'), ('bb')")?;

        assert_eq!(
            query_strings(&conn, "select shout(name) from t order by name collate by_length")?,
            ["A", "BB", "CCC"]
        );
        assert_eq!(
            query_long(&conn, "select my_sum(length(name)) from t")?,
            Some(6)
        );
    }

    Ok(())
}

#[test]
fn it_compares_with_declared_collations() -> anyhow::Result<()> {
    let conn = new()?;

    conn.create_collation("first_char", |a, b| {
        a.chars().next().cmp(&b.chars().next())
    })?;

    conn.execute("create table t (name text collate first_char)")?;
    conn.execute("insert into t values ('apple'), ('avocado'), ('banana')")?;

    // the declared collation applies to comparisons without a COLLATE clause
    assert_eq!(
        query_long(&conn, "select count(*) from t where name = 'a'")?,
        Some(2)
    );
    assert_eq!(
        query_strings(&conn, "select name from t where name > 'a' order by name")?,
        ["banana"]
    );

    Ok(())
}
