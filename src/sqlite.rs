use std::{str::FromStr, thread, time::Duration};

use rusqlite::{
    types::{ToSqlOutput, ValueRef},
    Connection, ToSql,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::role_table::RoleTable;
use crate::row::{column_text, Row};
use crate::user_logins_table::UserLoginsTable;

/// Environment variable read by [`SqliteConfig::from_default_env`].
pub const DEFAULT_CONNECTION_ENV: &str = "DEFAULT_CONNECTION";

const DEFAULT_OPEN_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 30;

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Text(value.clone())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(text) => Value::Text(String::from_utf8_lossy(text).into_owned()),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b.as_slice())),
            Value::Boolean(b) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*b))),
        })
    }
}

/// Named parameter bindings for SQL statements, in insertion order.
///
/// Names without a `:`, `@` or `$` prefix are bound as `@name`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    values: Vec<(String, Value)>,
}

impl Params {
    /// Create a new Params object
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value. Adding a name twice replaces the earlier value.
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        let name = bind_name(name);
        let value = value.into();
        match self.values.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
        self
    }

    /// Value bound to `name`, prefix optional.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = bind_name(name);
        self.values
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, value)| value)
    }

    /// Bind names in insertion order, prefix included.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    /// Number of bound parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn bindings(&self) -> Vec<(&str, &dyn ToSql)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect()
    }
}

fn bind_name(name: &str) -> String {
    if name.starts_with(&[':', '@', '$'][..]) {
        name.to_owned()
    } else {
        format!("@{name}")
    }
}

/// SQL statement with its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Params,
}

impl SqlQuery {
    pub fn new(statement: &str) -> Self {
        Self {
            statement: statement.to_string(),
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// SQLite connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file
    pub db_path: String,
    /// Extra open attempts made when the first one fails
    #[serde(default = "default_open_retries")]
    pub open_retries: u32,
    /// Pause between open attempts, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Busy timeout applied to every opened connection, in milliseconds
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
}

fn default_open_retries() -> u32 {
    DEFAULT_OPEN_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl SqliteConfig {
    /// Create a config for the database at `db_path` with the default open policy.
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            open_retries: DEFAULT_OPEN_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            busy_timeout_ms: None,
        }
    }

    pub fn with_open_retries(mut self, retries: u32) -> Self {
        self.open_retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Parse a connection string.
    ///
    /// Accepts either a bare path or `Key=Value;` pairs. Recognised keys are
    /// `Data Source` (also `DataSource` and `Filename`) and `BusyTimeout`
    /// in milliseconds; other keys are ignored. A string that names none of
    /// the known keys is taken as a path, so `a=b.db` is a file name.
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let trimmed = connection_string.trim();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidConnectionString(
                "connection string is empty".to_string(),
            ));
        }
        if !is_key_value_string(trimmed) {
            return Ok(Self::new(trimmed));
        }

        let mut db_path = None;
        let mut busy_timeout_ms = None;
        for pair in trimmed.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                StoreError::InvalidConnectionString(format!("expected key=value, found `{pair}`"))
            })?;
            let key = normalize_key(key);
            let value = value.trim();
            match key.as_str() {
                "datasource" | "filename" => db_path = Some(value.to_owned()),
                "busytimeout" => {
                    let millis = value.parse::<u64>().map_err(|_| {
                        StoreError::InvalidConnectionString(format!(
                            "BusyTimeout must be a number of milliseconds, found `{value}`"
                        ))
                    })?;
                    busy_timeout_ms = Some(millis);
                }
                _ => debug!(key = %key, "ignoring connection string key"),
            }
        }

        let db_path = db_path.filter(|p| !p.is_empty()).ok_or_else(|| {
            StoreError::InvalidConnectionString("missing Data Source".to_string())
        })?;
        Ok(Self {
            busy_timeout_ms,
            ..Self::new(db_path)
        })
    }

    /// Read the connection string from the environment variable `var`.
    pub fn from_env(var: &str) -> Result<Self> {
        let value = std::env::var(var).map_err(|_| {
            StoreError::InvalidConnectionString(format!("environment variable {var} is not set"))
        })?;
        Self::from_connection_string(&value)
    }

    /// Read the connection string from [`DEFAULT_CONNECTION_ENV`].
    pub fn from_default_env() -> Result<Self> {
        Self::from_env(DEFAULT_CONNECTION_ENV)
    }

    fn open(&self) -> rusqlite::Result<Connection> {
        let connection = Connection::open(&self.db_path)?;
        if let Some(millis) = self.busy_timeout_ms {
            connection.busy_timeout(Duration::from_millis(millis))?;
        }
        Ok(connection)
    }
}

/// Connection string keys understood or knowingly ignored. A string holding
/// none of them is a path, even when it contains `=`.
const CONNECTION_STRING_KEYS: &[&str] = &[
    "datasource",
    "filename",
    "busytimeout",
    "version",
    "pooling",
    "journalmode",
    "synchronous",
    "foreignkeys",
    "readonly",
    "failifmissing",
    "password",
    "defaulttimeout",
    "cachesize",
    "pagesize",
];

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase().replace(' ', "")
}

fn is_key_value_string(connection_string: &str) -> bool {
    connection_string
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .any(|(key, _)| CONNECTION_STRING_KEYS.contains(&normalize_key(key).as_str()))
}

impl FromStr for SqliteConfig {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_connection_string(s)
    }
}

/// Owner of the single connection to the identity database.
///
/// Every operation opens the connection, runs one statement and closes the
/// connection again before returning, on success and on error alike. The
/// connection is never held between calls. Operations take `&mut self`, so
/// one instance serves one caller at a time.
#[derive(Debug)]
pub struct SqliteDatabase {
    config: SqliteConfig,
    connection: Option<Connection>,
}

impl SqliteDatabase {
    pub fn new(config: SqliteConfig) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        SqliteConfig::from_connection_string(connection_string).map(Self::new)
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Whether a connection is currently open. Always false between calls.
    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Close the connection if it is open.
    pub fn close(&mut self) {
        close_slot(&mut self.connection, &self.config.db_path);
    }

    /// Run a data-modifying statement and return the number of affected rows.
    pub fn execute(&mut self, statement: &str, params: &Params) -> Result<usize> {
        validate(statement)?;
        debug!(statement, params = ?params.names().collect::<Vec<_>>(), "execute");
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(statement)?;
            let affected = stmt.execute(params.bindings().as_slice())?;
            Ok(affected)
        })
    }

    /// Run a statement and return the first column of its first row.
    /// No rows and a NULL value are both `None`.
    pub fn query_value(&mut self, statement: &str, params: &Params) -> Result<Option<Value>> {
        validate(statement)?;
        debug!(statement, params = ?params.names().collect::<Vec<_>>(), "query value");
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(statement)?;
            let bindings = params.bindings();
            if stmt.column_count() == 0 {
                stmt.execute(bindings.as_slice())?;
                return Ok(None);
            }
            let mut rows = stmt.query(bindings.as_slice())?;
            let value = match rows.next()? {
                Some(row) => match Value::from(row.get_ref(0)?) {
                    Value::Null => None,
                    value => Some(value),
                },
                None => None,
            };
            Ok(value)
        })
    }

    /// Run a read statement and materialize every row before the
    /// connection is closed.
    pub fn query(&mut self, statement: &str, params: &Params) -> Result<Vec<Row>> {
        validate(statement)?;
        debug!(statement, params = ?params.names().collect::<Vec<_>>(), "query rows");
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(statement)?;
            let names: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(str::to_owned)
                .collect();
            let bindings = params.bindings();
            let mut rows = stmt.query(bindings.as_slice())?;
            let mut result = Vec::new();
            while let Some(row) = rows.next()? {
                let mut mapped = Row::new();
                for (index, name) in names.iter().enumerate() {
                    mapped = mapped.with_column(name.clone(), column_text(row.get_ref(index)?));
                }
                result.push(mapped);
            }
            Ok(result)
        })
    }

    /// [`SqliteDatabase::query_value`], keeping only text results.
    pub fn query_string(&mut self, statement: &str, params: &Params) -> Result<Option<String>> {
        Ok(match self.query_value(statement, params)? {
            Some(Value::Text(text)) => Some(text),
            _ => None,
        })
    }

    pub fn execute_query(&mut self, query: &SqlQuery) -> Result<usize> {
        self.execute(&query.statement, &query.params)
    }

    pub fn query_rows(&mut self, query: &SqlQuery) -> Result<Vec<Row>> {
        self.query(&query.statement, &query.params)
    }

    /// Role table backed by this database.
    pub fn roles(&mut self) -> RoleTable<'_> {
        RoleTable::new(self)
    }

    /// User login table backed by this database.
    pub fn user_logins(&mut self) -> UserLoginsTable<'_> {
        UserLoginsTable::new(self)
    }

    fn with_connection<T>(&mut self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut scope = self.scoped();
        let conn = scope.connection()?;
        op(conn)
    }

    fn scoped(&mut self) -> ScopedConnection<'_> {
        let open_error = self.ensure_open();
        ScopedConnection {
            slot: &mut self.connection,
            path: &self.config.db_path,
            open_error,
        }
    }

    /// Best-effort open: the first attempt plus `open_retries` more, pausing
    /// between attempts. Returns the last open error when every attempt failed;
    /// the caller reports it at execute time.
    fn ensure_open(&mut self) -> Option<rusqlite::Error> {
        if self.connection.is_some() {
            return None;
        }
        let mut last_error = None;
        for attempt in 0..=self.config.open_retries {
            if attempt > 0 {
                thread::sleep(self.config.retry_delay());
            }
            match self.config.open() {
                Ok(connection) => {
                    debug!(path = %self.config.db_path, attempt, "connection opened");
                    self.connection = Some(connection);
                    return None;
                }
                Err(err) => {
                    warn!(
                        path = %self.config.db_path,
                        attempt,
                        error = %err,
                        "failed to open connection"
                    );
                    last_error = Some(err);
                }
            }
        }
        last_error
    }
}

/// Connection borrowed for the span of one operation; closes it on drop.
struct ScopedConnection<'a> {
    slot: &'a mut Option<Connection>,
    path: &'a str,
    open_error: Option<rusqlite::Error>,
}

impl ScopedConnection<'_> {
    fn connection(&mut self) -> Result<&Connection> {
        if self.slot.is_none() {
            return Err(match self.open_error.take() {
                Some(err) => StoreError::Sqlite(err),
                None => StoreError::ConnectionUnavailable {
                    path: self.path.to_owned(),
                },
            });
        }
        self.slot
            .as_ref()
            .ok_or_else(|| StoreError::ConnectionUnavailable {
                path: self.path.to_owned(),
            })
    }
}

impl Drop for ScopedConnection<'_> {
    fn drop(&mut self) {
        close_slot(self.slot, self.path);
    }
}

fn close_slot(slot: &mut Option<Connection>, path: &str) {
    if let Some(connection) = slot.take() {
        match connection.close() {
            Ok(()) => debug!(path, "connection closed"),
            Err((_, err)) => warn!(path, error = %err, "failed to close connection"),
        }
    }
}

fn validate(statement: &str) -> Result<()> {
    if statement.trim().is_empty() {
        return Err(StoreError::InvalidStatement);
    }
    Ok(())
}
