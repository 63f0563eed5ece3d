//! The `AspNetUserLogins` table: external logins keyed by (`LoginProvider`,
//! `ProviderKey`), each pointing at one `UserId`.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::row::{map_rows, FromRow, MapError, Row};
use crate::sqlite::{Params, SqliteDatabase};

const INSERT_LOGIN: &str = "INSERT INTO AspNetUserLogins (LoginProvider, ProviderKey, UserId) \
     VALUES (@loginProvider, @providerKey, @userId)";
const DELETE_LOGIN: &str = "DELETE FROM AspNetUserLogins \
     WHERE UserId = @userId AND LoginProvider = @loginProvider AND ProviderKey = @providerKey";
const DELETE_USER_LOGINS: &str = "DELETE FROM AspNetUserLogins WHERE UserId = @userId";
const SELECT_USER_ID: &str = "SELECT UserId FROM AspNetUserLogins \
     WHERE LoginProvider = @loginProvider AND ProviderKey = @providerKey";
const SELECT_USER_LOGINS: &str = "SELECT LoginProvider, ProviderKey, UserId \
     FROM AspNetUserLogins WHERE UserId = @userId";

/// One external login: the provider name and the user's key at that provider.
/// NULL columns come back as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserLoginInfo {
    pub login_provider: Option<String>,
    pub provider_key: Option<String>,
}

impl UserLoginInfo {
    pub fn new(login_provider: impl Into<String>, provider_key: impl Into<String>) -> Self {
        Self {
            login_provider: Some(login_provider.into()),
            provider_key: Some(provider_key.into()),
        }
    }

    fn params(&self) -> Params {
        Params::new()
            .with_value("loginProvider", self.login_provider.as_deref())
            .with_value("providerKey", self.provider_key.as_deref())
    }
}

impl FromRow for UserLoginInfo {
    fn from_row(row: &Row) -> std::result::Result<Self, MapError> {
        Ok(Self {
            login_provider: row.get("LoginProvider").map(str::to_owned),
            provider_key: row.get("ProviderKey").map(str::to_owned),
        })
    }
}

/// Login persistence over a borrowed [`SqliteDatabase`].
pub struct UserLoginsTable<'a> {
    database: &'a mut SqliteDatabase,
}

impl<'a> UserLoginsTable<'a> {
    pub fn new(database: &'a mut SqliteDatabase) -> Self {
        Self { database }
    }

    /// Attach a login to a user.
    pub fn insert(&mut self, user_id: &str, login: &UserLoginInfo) -> Result<usize> {
        let params = login.params().with_value("userId", user_id);
        self.database.execute(INSERT_LOGIN, &params)
    }

    /// Remove one login from a user. Affects at most one row.
    pub fn delete(&mut self, user_id: &str, login: &UserLoginInfo) -> Result<usize> {
        let params = login.params().with_value("userId", user_id);
        self.database.execute(DELETE_LOGIN, &params)
    }

    /// Remove every login of a user.
    pub fn delete_all(&mut self, user_id: &str) -> Result<usize> {
        let params = Params::new().with_value("userId", user_id);
        self.database.execute(DELETE_USER_LOGINS, &params)
    }

    /// Id of the user owning `login`, if any.
    pub fn find_user_id_by_login(&mut self, login: &UserLoginInfo) -> Result<Option<String>> {
        self.database.query_string(SELECT_USER_ID, &login.params())
    }

    /// Logins of a user in the order the store returns them.
    pub fn find_by_user_id(&mut self, user_id: &str) -> Result<Vec<UserLoginInfo>> {
        let params = Params::new().with_value("userId", user_id);
        let rows = self.database.query(SELECT_USER_LOGINS, &params)?;
        Ok(map_rows(&rows)?)
    }
}
