use std::env;

use litebind::SqliteConnection;

pub fn setup_if_needed() {
    let _ = dotenvy::dotenv();
    let _ = env_logger::builder().is_test(true).try_init();
}

// Make a new connection
// Ensure [dotenvy] and [env_logger] have been setup
//
// `DATABASE_URL` picks the database; without it every connection gets a fresh in-memory one.
pub fn new() -> anyhow::Result<SqliteConnection> {
    setup_if_needed();

    let url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_owned());

    Ok(SqliteConnection::connect(&url)?)
}

/// A connection with a `tweet` table holding `rows` rows, with ids from `1` to `rows`.
pub fn with_tweets(rows: i64) -> anyhow::Result<SqliteConnection> {
    let conn = new()?;

    conn.execute(
        "create temporary table tweet (\
            id integer primary key, \
            text text not null, \
            is_sent boolean not null default true, \
            owner_id bigint\
        )",
    )?;

    let mut insert = conn.prepare("insert into tweet (id, text, owner_id) values (?, ?, ?)")?;

    for id in 1..=rows {
        insert.bind(1, id)?;
        insert.bind(2, format!("tweet #{id}"))?;
        insert.bind(3, (id % 2 == 0).then_some(id * 10))?;
        insert.execute_update()?;
    }

    Ok(conn)
}
