use std::time::{Duration, Instant};

use anyhow::Result;
use rusqlite::Connection;
use rust_identity_sqlite::{
    Params, Role, SqlQuery, SqliteConfig, SqliteDatabase, StoreError, UserLoginInfo, Value,
};
use tempfile::NamedTempFile;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Helper function to create a temporary file-based database
fn create_temp_db() -> Result<(SqliteDatabase, NamedTempFile)> {
    init_tracing();
    let temp_file = NamedTempFile::new()?;
    let path = temp_file.path().to_str().unwrap().to_string();
    Connection::open(&path)?.execute_batch(
        r#"
        CREATE TABLE AspNetRoles (Id TEXT PRIMARY KEY NOT NULL, Name TEXT UNIQUE NOT NULL);
        CREATE TABLE AspNetUserLogins (
            LoginProvider TEXT NOT NULL,
            ProviderKey TEXT NOT NULL,
            UserId TEXT NOT NULL,
            PRIMARY KEY (LoginProvider, ProviderKey, UserId)
        );
        CREATE TABLE Notes (Id TEXT NOT NULL, Body TEXT, Score REAL);
        "#,
    )?;
    Ok((SqliteDatabase::new(SqliteConfig::new(path)), temp_file))
}

#[test]
fn every_operation_closes_the_connection() -> Result<()> {
    let (mut db, _file) = create_temp_db()?;
    let login = UserLoginInfo::new("GitHub", "gh-1");
    assert!(!db.is_open());

    db.roles().insert(&Role::new("r1", "Admin"))?;
    assert!(!db.is_open());
    db.roles().update(&Role::new("r1", "Owner"))?;
    assert!(!db.is_open());
    db.roles().get_role_by_id("r1")?;
    assert!(!db.is_open());
    db.roles().get_role_by_name("Owner")?;
    assert!(!db.is_open());
    db.roles().get_roles::<Role>()?;
    assert!(!db.is_open());
    db.roles().delete("r1")?;
    assert!(!db.is_open());

    db.user_logins().insert("u1", &login)?;
    assert!(!db.is_open());
    db.user_logins().find_user_id_by_login(&login)?;
    assert!(!db.is_open());
    db.user_logins().find_by_user_id("u1")?;
    assert!(!db.is_open());
    db.user_logins().delete("u1", &login)?;
    assert!(!db.is_open());
    db.user_logins().delete_all("u1")?;
    assert!(!db.is_open());
    Ok(())
}

#[test]
fn failed_operations_close_the_connection() -> Result<()> {
    let (mut db, _file) = create_temp_db()?;
    let none = Params::new();

    let err = db.execute("INSERT INTO Missing (Id) VALUES ('x')", &none).unwrap_err();
    assert!(matches!(err, StoreError::Sqlite(_)), "unexpected error: {err}");
    assert!(!db.is_open());

    assert!(matches!(db.query_value("SELEC 1", &none), Err(StoreError::Sqlite(_))));
    assert!(!db.is_open());

    assert!(matches!(db.query("SELECT * FROM Missing", &none), Err(StoreError::Sqlite(_))));
    assert!(!db.is_open());

    db.roles().insert(&Role::new("r1", "Admin"))?;
    assert!(db.roles().insert(&Role::new("r1", "Admin")).is_err());
    assert!(!db.is_open());

    // The connection still works after a failure.
    assert_eq!(db.roles().get_role_id("Admin")?.as_deref(), Some("r1"));
    Ok(())
}

#[test]
fn empty_statements_are_rejected_before_the_store() -> Result<()> {
    let (mut db, _file) = create_temp_db()?;
    let none = Params::new();

    assert!(matches!(db.execute("", &none), Err(StoreError::InvalidStatement)));
    assert!(matches!(db.query_value("", &none), Err(StoreError::InvalidStatement)));
    assert!(matches!(db.query_string(" \n", &none), Err(StoreError::InvalidStatement)));
    assert!(matches!(db.query("", &none), Err(StoreError::InvalidStatement)));
    assert!(!db.is_open());
    Ok(())
}

#[test]
fn unreachable_database_retries_then_fails_at_execute() {
    init_tracing();
    let config = SqliteConfig::new("/nonexistent-identity-dir/nested/identity.db")
        .with_open_retries(3)
        .with_retry_delay(Duration::from_millis(30));
    let mut db = SqliteDatabase::new(config);

    let started = Instant::now();
    let err = db.roles().get_role_by_id("r1").unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(90));
    assert!(matches!(err, StoreError::Sqlite(_)), "unexpected error: {err}");
    assert!(!db.is_open());
}

#[test]
fn unknown_parameter_name_is_a_store_error() -> Result<()> {
    let (mut db, _file) = create_temp_db()?;
    let params = Params::new().with_value("identifier", "r1");

    let err = db.execute("DELETE FROM AspNetRoles WHERE Id = @id", &params).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Sqlite(rusqlite::Error::InvalidParameterName(_))
    ));
    assert!(!db.is_open());
    Ok(())
}

#[test]
fn null_parameters_bind_as_sql_null() -> Result<()> {
    let (mut db, _file) = create_temp_db()?;
    let insert = SqlQuery::new("INSERT INTO Notes (Id, Body, Score) VALUES (:id, :body, :score)")
        .with_params(
            Params::new()
                .with_value(":id", "n1")
                .with_value(":body", None::<String>)
                .with_value(":score", 2.5),
        );
    assert_eq!(db.execute_query(&insert)?, 1);

    let rows = db.query_rows(&SqlQuery::new("SELECT Id, Body, Score FROM Notes"))?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("Id"), Some("n1"));
    assert_eq!(rows[0].get("Body"), None);
    assert_eq!(rows[0].get("Score"), Some("2.5"));
    assert_eq!(rows[0].column_names().collect::<Vec<_>>(), vec!["Id", "Body", "Score"]);

    let none = Params::new();
    assert_eq!(
        db.query_value("SELECT COUNT(*) FROM Notes WHERE Body IS NULL", &none)?,
        Some(Value::Integer(1))
    );
    assert_eq!(
        db.query_value("SELECT COUNT(*) FROM Notes WHERE Body = 'null'", &none)?,
        Some(Value::Integer(0))
    );
    assert_eq!(db.query_value("SELECT Body FROM Notes", &none)?, None);
    Ok(())
}

#[test]
fn scalar_queries() -> Result<()> {
    let (mut db, _file) = create_temp_db()?;
    let none = Params::new();
    db.roles().insert(&Role::new("r1", "Admin"))?;

    assert_eq!(
        db.query_value("SELECT COUNT(*) FROM AspNetRoles", &none)?,
        Some(Value::Integer(1))
    );
    // Not text: the string helper reports nothing.
    assert_eq!(db.query_string("SELECT COUNT(*) FROM AspNetRoles", &none)?, None);
    assert_eq!(
        db.query_string("SELECT Name FROM AspNetRoles", &none)?.as_deref(),
        Some("Admin")
    );
    assert_eq!(
        db.query_value("SELECT Name FROM AspNetRoles WHERE Id = 'none'", &none)?,
        None
    );
    Ok(())
}

#[test]
fn busy_timeout_connection_string() -> Result<()> {
    let (db, _file) = create_temp_db()?;
    let connection_string = format!("Data Source={};BusyTimeout=250", db.config().db_path);
    let mut db = SqliteDatabase::from_connection_string(&connection_string)?;
    assert_eq!(db.config().busy_timeout_ms, Some(250));

    db.roles().insert(&Role::new("r1", "Admin"))?;
    assert_eq!(db.roles().get_roles::<Role>()?, vec![Role::new("r1", "Admin")]);
    Ok(())
}

#[test]
fn config_deserializes_with_default_open_policy() -> Result<()> {
    let config: SqliteConfig = serde_json::from_str(r#"{ "db_path": "identity.db" }"#)?;
    assert_eq!(config, SqliteConfig::new("identity.db"));
    assert_eq!(config.open_retries, 3);
    assert_eq!(config.retry_delay_ms, 30);
    assert_eq!(config.busy_timeout_ms, None);
    Ok(())
}
