//! SQLite persistence for identity roles and external logins.
//!
//! # Intention
//!
//! - Map roles and user logins onto SQLite tables through parameterized statements.
//! - Keep connection handling in one place: open on demand with a short bounded
//!   retry, close before every call returns.
//!
//! # Architectural Boundaries
//!
//! - Only SQLite/database code belongs here.
//! - Schema provisioning, user lifecycle and the surrounding identity framework
//!   are owned by the embedding application.
//!
//! ```no_run
//! use rust_identity_sqlite::{Role, SqliteDatabase};
//!
//! let mut db = SqliteDatabase::from_connection_string("Data Source=identity.db")?;
//! db.roles().insert(&Role::new("r1", "Admin"))?;
//! assert!(db.roles().get_role_by_name("Admin")?.is_some());
//! # Ok::<(), rust_identity_sqlite::StoreError>(())
//! ```

pub mod error;
pub mod role_table;
pub mod row;
pub mod sqlite;
pub mod store;
pub mod user_logins_table;

pub use error::{Result, StoreError};
pub use role_table::{Role, RoleTable};
pub use row::{FromRow, MapError, Row};
pub use sqlite::{Params, SqlQuery, SqliteConfig, SqliteDatabase, Value};
pub use store::{IdentityStore, LoginStore, RoleStore};
pub use user_logins_table::{UserLoginInfo, UserLoginsTable};
