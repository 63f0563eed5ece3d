//! Async façade over the tables.
//!
//! [`IdentityStore`] shares one [`SqliteDatabase`] behind an async mutex, so
//! concurrent callers are serialized per instance. Each call still opens,
//! executes and closes within the lock.

use std::sync::Arc;

use async_trait::async_trait;
use futures::lock::Mutex;

use crate::error::Result;
use crate::role_table::Role;
use crate::sqlite::{SqliteConfig, SqliteDatabase};
use crate::user_logins_table::UserLoginInfo;

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn create_role(&self, role: &Role) -> Result<usize>;
    async fn delete_role(&self, role_id: &str) -> Result<usize>;
    async fn update_role(&self, role: &Role) -> Result<usize>;
    async fn find_role_by_id(&self, role_id: &str) -> Result<Option<Role>>;
    async fn find_role_by_name(&self, role_name: &str) -> Result<Option<Role>>;
    async fn roles(&self) -> Result<Vec<Role>>;
}

#[async_trait]
pub trait LoginStore: Send + Sync {
    async fn add_login(&self, user_id: &str, login: &UserLoginInfo) -> Result<usize>;
    async fn remove_login(&self, user_id: &str, login: &UserLoginInfo) -> Result<usize>;
    async fn remove_logins(&self, user_id: &str) -> Result<usize>;
    async fn find_user_id_by_login(&self, login: &UserLoginInfo) -> Result<Option<String>>;
    async fn logins(&self, user_id: &str) -> Result<Vec<UserLoginInfo>>;
}

#[derive(Clone)]
pub struct IdentityStore {
    database: Arc<Mutex<SqliteDatabase>>,
}

impl IdentityStore {
    pub fn new(config: SqliteConfig) -> Self {
        Self::from_database(SqliteDatabase::new(config))
    }

    pub fn from_database(database: SqliteDatabase) -> Self {
        Self {
            database: Arc::new(Mutex::new(database)),
        }
    }

    pub async fn is_open(&self) -> bool {
        self.database.lock().await.is_open()
    }
}

#[async_trait]
impl RoleStore for IdentityStore {
    async fn create_role(&self, role: &Role) -> Result<usize> {
        self.database.lock().await.roles().insert(role)
    }

    async fn delete_role(&self, role_id: &str) -> Result<usize> {
        self.database.lock().await.roles().delete(role_id)
    }

    async fn update_role(&self, role: &Role) -> Result<usize> {
        self.database.lock().await.roles().update(role)
    }

    async fn find_role_by_id(&self, role_id: &str) -> Result<Option<Role>> {
        self.database.lock().await.roles().get_role_by_id(role_id)
    }

    async fn find_role_by_name(&self, role_name: &str) -> Result<Option<Role>> {
        self.database.lock().await.roles().get_role_by_name(role_name)
    }

    async fn roles(&self) -> Result<Vec<Role>> {
        self.database.lock().await.roles().get_roles()
    }
}

#[async_trait]
impl LoginStore for IdentityStore {
    async fn add_login(&self, user_id: &str, login: &UserLoginInfo) -> Result<usize> {
        self.database.lock().await.user_logins().insert(user_id, login)
    }

    async fn remove_login(&self, user_id: &str, login: &UserLoginInfo) -> Result<usize> {
        self.database.lock().await.user_logins().delete(user_id, login)
    }

    async fn remove_logins(&self, user_id: &str) -> Result<usize> {
        self.database.lock().await.user_logins().delete_all(user_id)
    }

    async fn find_user_id_by_login(&self, login: &UserLoginInfo) -> Result<Option<String>> {
        self.database
            .lock()
            .await
            .user_logins()
            .find_user_id_by_login(login)
    }

    async fn logins(&self, user_id: &str) -> Result<Vec<UserLoginInfo>> {
        self.database.lock().await.user_logins().find_by_user_id(user_id)
    }
}
