//! The `AspNetRoles` table: `Id` and `Name`, both unique.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::row::{map_rows, scalar_to_string, FromRow, MapError, Row};
use crate::sqlite::{Params, SqliteDatabase};

const INSERT_ROLE: &str = "INSERT INTO AspNetRoles (Id, Name) VALUES (@id, @name)";
const DELETE_ROLE: &str = "DELETE FROM AspNetRoles WHERE Id = @id";
const UPDATE_ROLE: &str = "UPDATE AspNetRoles SET Name = @name WHERE Id = @id";
const SELECT_NAME_BY_ID: &str = "SELECT Name FROM AspNetRoles WHERE Id = @id";
const SELECT_ID_BY_NAME: &str = "SELECT Id FROM AspNetRoles WHERE Name = @name";
const SELECT_ROLES: &str = "SELECT Id, Name FROM AspNetRoles";

/// A role row. NULL columns come back as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn params(&self) -> Params {
        Params::new()
            .with_value("id", self.id.as_deref())
            .with_value("name", self.name.as_deref())
    }
}

impl FromRow for Role {
    fn from_row(row: &Row) -> std::result::Result<Self, MapError> {
        Ok(Self {
            id: row.get("Id").map(str::to_owned),
            name: row.get("Name").map(str::to_owned),
        })
    }
}

/// Role persistence over a borrowed [`SqliteDatabase`].
pub struct RoleTable<'a> {
    database: &'a mut SqliteDatabase,
}

impl<'a> RoleTable<'a> {
    pub fn new(database: &'a mut SqliteDatabase) -> Self {
        Self { database }
    }

    /// Insert a role. A duplicate id or name fails in the store.
    pub fn insert(&mut self, role: &Role) -> Result<usize> {
        self.database.execute(INSERT_ROLE, &role.params())
    }

    /// Delete a role by id. Unknown ids affect zero rows.
    pub fn delete(&mut self, role_id: &str) -> Result<usize> {
        let params = Params::new().with_value("id", role_id);
        self.database.execute(DELETE_ROLE, &params)
    }

    /// Rename the role with `role.id`.
    pub fn update(&mut self, role: &Role) -> Result<usize> {
        self.database.execute(UPDATE_ROLE, &role.params())
    }

    /// Name of the role with `role_id`, `None` when no text name matches.
    pub fn get_role_name(&mut self, role_id: &str) -> Result<Option<String>> {
        let params = Params::new().with_value("id", role_id);
        self.database.query_string(SELECT_NAME_BY_ID, &params)
    }

    /// Id of the role named `role_name`, coerced to a string.
    pub fn get_role_id(&mut self, role_name: &str) -> Result<Option<String>> {
        let params = Params::new().with_value("name", role_name);
        Ok(self
            .database
            .query_value(SELECT_ID_BY_NAME, &params)?
            .and_then(scalar_to_string))
    }

    /// Role with `role_id`, built from its name lookup.
    pub fn get_role_by_id(&mut self, role_id: &str) -> Result<Option<Role>> {
        Ok(self
            .get_role_name(role_id)?
            .map(|name| Role::new(role_id, name)))
    }

    /// Role named `role_name`, built from its id lookup.
    pub fn get_role_by_name(&mut self, role_name: &str) -> Result<Option<Role>> {
        Ok(self
            .get_role_id(role_name)?
            .map(|id| Role::new(id, role_name)))
    }

    /// Every role, one entity per row, in the order the store returns them.
    pub fn get_roles<R: FromRow>(&mut self) -> Result<Vec<R>> {
        let rows = self.database.query(SELECT_ROLES, &Params::new())?;
        Ok(map_rows(&rows)?)
    }

    /// Every role, built by `factory` from the mapped [`Role`].
    pub fn get_roles_with<R, F>(&mut self, factory: F) -> Result<Vec<R>>
    where
        F: FnMut(Role) -> R,
    {
        Ok(self.get_roles::<Role>()?.into_iter().map(factory).collect())
    }
}
