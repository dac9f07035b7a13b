use std::borrow::Cow;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use percent_encoding::percent_decode_str;

use crate::error::Error;
use crate::options::{
    SqliteConnectOptions, SqliteEncoding, SqliteJournalMode, SqliteLockingMode, SqliteSynchronous,
    SqliteTempStore,
};

// https://www.sqlite.org/uri.html

impl FromStr for SqliteConnectOptions {
    type Err = Error;

    fn from_str(mut url: &str) -> Result<Self, Self::Err> {
        let mut options = Self::new();

        // remove scheme from the URL
        url = url
            .trim_start_matches("jdbc:")
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");

        let mut database_and_params = url.splitn(2, '?');

        let database = database_and_params.next().unwrap_or_default();

        if database.is_empty() || database == ":memory:" {
            options.in_memory = true;
        } else {
            // % decode to allow for `?` or `#` in the filename
            options.filename = Cow::Owned(
                Path::new(
                    &*percent_decode_str(database)
                        .decode_utf8()
                        .map_err(Error::config)?,
                )
                .to_path_buf(),
            );
        }

        if let Some(params) = database_and_params.next() {
            for (key, value) in url::form_urlencoded::parse(params.as_bytes()) {
                options = options.apply_param(&key, &value)?;
            }
        }

        Ok(options)
    }
}

impl SqliteConnectOptions {
    fn apply_param(self, key: &str, value: &str) -> Result<Self, Error> {
        Ok(match key {
            // The mode query parameter determines if the new database is opened read-only,
            // read-write, read-write and created if it does not exist, or that the
            // database is a pure in-memory database that never interacts with disk,
            // respectively.
            "mode" => match value {
                "ro" => self.read_only(true),
                "rw" => self.create_if_missing(false),
                "rwc" => self.create_if_missing(true),
                "memory" => self.in_memory(true),

                _ => return Err(unknown_value(key, value)),
            },

            // The cache query parameter specifies the cache behaviour across multiple
            // connections to the same database within the process.
            "cache" => match value {
                "private" => self.shared_cache(false),
                "shared" => self.shared_cache(true),

                _ => return Err(unknown_value(key, value)),
            },

            "immutable" => self.immutable(parse_bool(key, value)?),

            "vfs" => self.vfs(value.to_owned()),

            "busy_timeout" => self.busy_timeout(Duration::from_millis(parse(key, value)?)),

            "transaction_mode" => self.transaction_mode(value.parse()?),

            "load_extension" => self.load_extension(parse_bool(key, value)?),

            "cache_size" => self.cache_size(parse(key, value)?),
            "journal_mode" => self.journal_mode(SqliteJournalMode::from_str(value)?),
            "synchronous" => self.synchronous(SqliteSynchronous::from_str(value)?),
            "locking_mode" => self.locking_mode(SqliteLockingMode::from_str(value)?),
            "foreign_keys" => self.foreign_keys(parse_bool(key, value)?),
            "temp_store" => self.temp_store(SqliteTempStore::from_str(value)?),
            "encoding" => self.encoding(SqliteEncoding::from_str(value)?),
            "page_size" => self.page_size(parse(key, value)?),
            "user_version" => self.user_version(parse(key, value)?),
            "case_sensitive_like" => self.case_sensitive_like(parse_bool(key, value)?),
            "recursive_triggers" => self.recursive_triggers(parse_bool(key, value)?),

            _ => {
                return Err(Error::Configuration(
                    format!("unknown query parameter `{key}` while parsing connection URL").into(),
                ));
            }
        })
    }
}

fn unknown_value(key: &str, value: &str) -> Error {
    Error::Configuration(format!("unknown value {value:?} for `{key}`").into())
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, Error> {
    value.parse().map_err(|_| unknown_value(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match &*value.to_ascii_lowercase() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(unknown_value(key, value)),
    }
}

#[test]
fn test_parse_in_memory() -> Result<(), Error> {
    let options: SqliteConnectOptions = "sqlite::memory:".parse()?;
    assert!(options.in_memory);

    let options: SqliteConnectOptions = "sqlite://?mode=memory".parse()?;
    assert!(options.in_memory);

    let options: SqliteConnectOptions = "sqlite://:memory:".parse()?;
    assert!(options.in_memory);

    let options: SqliteConnectOptions = "jdbc:sqlite:".parse()?;
    assert!(options.in_memory);

    Ok(())
}

#[test]
fn test_parse_read_only() -> Result<(), Error> {
    let options: SqliteConnectOptions = "sqlite://a.db?mode=ro".parse()?;
    assert!(options.read_only);
    assert_eq!(&*options.filename.to_string_lossy(), "a.db");

    Ok(())
}

#[test]
fn test_parse_jdbc_style() -> Result<(), Error> {
    let options: SqliteConnectOptions = "jdbc:sqlite:dir/a%3Fb.db?cache=shared".parse()?;
    assert_eq!(&*options.filename.to_string_lossy(), "dir/a?b.db");
    assert!(options.shared_cache);
    assert!(!options.in_memory);

    Ok(())
}

#[test]
fn test_parse_pragmas_in_order() -> Result<(), Error> {
    let options: SqliteConnectOptions =
        "sqlite:a.db?journal_mode=wal&foreign_keys=true&cache_size=-2000&busy_timeout=250"
            .parse()?;

    let pragmas: Vec<(&str, &str)> = options
        .pragmas
        .iter()
        .map(|(k, v)| (&**k, &**v))
        .collect();

    assert_eq!(
        pragmas,
        [
            ("journal_mode", "WAL"),
            ("foreign_keys", "ON"),
            ("cache_size", "-2000"),
        ]
    );
    assert_eq!(options.busy_timeout, Duration::from_millis(250));
    assert_eq!(
        options.pragma_string(),
        "PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON; PRAGMA cache_size = -2000; "
    );

    Ok(())
}

#[test]
fn test_parse_transaction_mode() -> Result<(), Error> {
    let options: SqliteConnectOptions = "sqlite::memory:?transaction_mode=immediate".parse()?;
    assert_eq!(
        options.transaction_mode,
        crate::options::SqliteTransactionMode::Immediate
    );
    assert_eq!(options.transaction_mode.begin_sql(), "begin immediate;");

    Ok(())
}

#[test]
fn test_reject_unknown() {
    let err = "sqlite:a.db?colour=blue"
        .parse::<SqliteConnectOptions>()
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("`colour`"));

    assert!("sqlite:a.db?mode=rx".parse::<SqliteConnectOptions>().is_err());
    assert!("sqlite:a.db?journal_mode=fast"
        .parse::<SqliteConnectOptions>()
        .is_err());
    assert!("sqlite:a.db?foreign_keys=maybe"
        .parse::<SqliteConnectOptions>()
        .is_err());
}
