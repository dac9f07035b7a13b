use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use litebind::{
    CommitListener, SqliteErrorCode, SqliteErrorExt, SqliteOperation, UpdateListener,
};
use litebind_test::new;

type Updates = Arc<Mutex<Vec<(SqliteOperation, String, String, i64)>>>;

fn recorder() -> (Updates, Arc<dyn UpdateListener>) {
    let updates: Updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);

    let listener: Arc<dyn UpdateListener> = Arc::new(
        move |operation: SqliteOperation, database: &str, table: &str, rowid: i64| {
            sink.lock()
                .unwrap()
                .push((operation, database.to_owned(), table.to_owned(), rowid));
        },
    );

    (updates, listener)
}

#[derive(Default)]
struct Transactions {
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl CommitListener for Transactions {
    fn on_commit(&self) {
        self.commits.fetch_add(1, Ordering::SeqCst);
    }

    fn on_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn it_notifies_update_listeners() -> anyhow::Result<()> {
    let conn = new()?;
    conn.execute("create table t (id integer primary key, x integer)")?;

    let (updates, listener) = recorder();
    conn.add_update_listener(Arc::clone(&listener))?;

    conn.execute("insert into t (x) values (10)")?;
    conn.execute("update t set x = 11 where id = 1")?;
    conn.execute("delete from t where id = 1")?;

    assert_eq!(
        *updates.lock().unwrap(),
        [
            (SqliteOperation::Insert, "main".to_owned(), "t".to_owned(), 1),
            (SqliteOperation::Update, "main".to_owned(), "t".to_owned(), 1),
            (SqliteOperation::Delete, "main".to_owned(), "t".to_owned(), 1),
        ]
    );

    // removing the last listener disables the hook
    conn.remove_update_listener(&listener)?;
    conn.execute("insert into t (x) values (12)")?;
    assert_eq!(updates.lock().unwrap().len(), 3);

    Ok(())
}

#[test]
fn it_notifies_every_update_listener() -> anyhow::Result<()> {
    let conn = new()?;
    conn.execute("create table t (x integer)")?;

    let (first, a) = recorder();
    let (second, b) = recorder();

    conn.add_update_listener(Arc::clone(&a))?;
    conn.add_update_listener(Arc::clone(&b))?;

    conn.execute("insert into t values (1)")?;
    assert_eq!(first.lock().unwrap().len(), 1);
    assert_eq!(second.lock().unwrap().len(), 1);

    // the hook stays installed while a listener is left
    conn.remove_update_listener(&a)?;
    conn.execute("insert into t values (2)")?;
    assert_eq!(first.lock().unwrap().len(), 1);
    assert_eq!(second.lock().unwrap().len(), 2);

    Ok(())
}

#[test]
fn it_notifies_commit_listeners() -> anyhow::Result<()> {
    let conn = new()?;
    conn.execute("create table t (x integer)")?;

    let transactions = Arc::new(Transactions::default());
    let listener: Arc<dyn CommitListener> = transactions.clone();
    conn.add_commit_listener(Arc::clone(&listener))?;

    conn.set_auto_commit(false)?;
    conn.execute("insert into t values (1)")?;
    conn.commit()?;
    assert_eq!(transactions.commits.load(Ordering::SeqCst), 1);

    conn.execute("insert into t values (2)")?;
    conn.rollback()?;
    assert_eq!(transactions.rollbacks.load(Ordering::SeqCst), 1);

    conn.remove_commit_listener(&listener)?;

    conn.execute("insert into t values (3)")?;
    conn.commit()?;
    assert_eq!(transactions.commits.load(Ordering::SeqCst), 1);

    Ok(())
}

#[test]
fn it_profiles_statements() -> anyhow::Result<()> {
    let conn = new()?;

    let profiled = Arc::new(Mutex::new(Vec::<(String, Duration)>::new()));
    let sink = Arc::clone(&profiled);

    conn.set_profile(move |sql, elapsed| sink.lock().unwrap().push((sql.to_owned(), elapsed)))?;

    conn.execute("create table t (x integer)")?;

    assert!(profiled
        .lock()
        .unwrap()
        .iter()
        .any(|(sql, _)| sql == "create table t (x integer)"));

    conn.clear_profile()?;
    let seen = profiled.lock().unwrap().len();

    conn.execute("insert into t values (1)")?;
    assert_eq!(profiled.lock().unwrap().len(), seen);

    Ok(())
}

#[test]
fn it_traces_and_profiles_at_the_same_time() -> anyhow::Result<()> {
    let conn = new()?;

    let traced = Arc::new(AtomicUsize::new(0));
    let profiled = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&traced);
    conn.set_trace(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })?;

    let counter = Arc::clone(&profiled);
    conn.set_profile(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    })?;

    conn.execute("select 1")?;

    assert!(traced.load(Ordering::SeqCst) >= 1);
    assert!(profiled.load(Ordering::SeqCst) >= 1);

    conn.clear_trace()?;
    let before = traced.load(Ordering::SeqCst);

    conn.execute("select 2")?;
    assert_eq!(traced.load(Ordering::SeqCst), before);

    Ok(())
}

#[test]
fn it_interrupts_from_a_progress_handler() -> anyhow::Result<()> {
    let conn = new()?;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    conn.set_progress_handler(100, move || counter.fetch_add(1, Ordering::SeqCst) < 10)?;

    let err = conn
        .execute(
            "with recursive n(i) as (select 1 union all select i + 1 from n where i < 1000000) \
             select count(*) from n",
        )
        .unwrap_err();

    assert_eq!(err.sqlite_code(), Some(SqliteErrorCode::Interrupted));
    assert!(calls.load(Ordering::SeqCst) > 10);

    conn.clear_progress_handler()?;
    assert!(conn.execute("select 1")?);

    Ok(())
}

#[test]
fn it_gives_up_when_the_busy_handler_says_so() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}", dir.path().join("busy.db").display());

    let writer = litebind::SqliteConnection::connect(&url)?;
    let reader = litebind::SqliteConnection::connect(&url)?;

    writer.execute("create table t (x integer)")?;

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);

    reader.set_busy_handler(move |count| {
        counter.fetch_add(1, Ordering::SeqCst);
        count < 2
    })?;

    // hold the write lock
    writer.set_auto_commit(false)?;
    writer.execute("insert into t values (1)")?;

    let err = reader.execute("insert into t values (2)").unwrap_err();
    assert_eq!(err.sqlite_code(), Some(SqliteErrorCode::Busy));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    writer.commit()?;

    reader.clear_busy_handler()?;
    reader.set_busy_timeout(Duration::from_millis(500))?;
    reader.execute("insert into t values (2)")?;

    Ok(())
}
