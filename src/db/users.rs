//! User role assignments

use std::fmt;
use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::StoryError;

/// Role levels, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Plays, rates and reports stories
    #[default]
    Player,
    /// Writes stories
    Author,
    /// Moderates everything
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Player => "player",
            Role::Author => "author",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "player" => Ok(Role::Player),
            "author" => Ok(Role::Author),
            "admin" => Ok(Role::Admin),
            other => Err(StoryError::Validation(format!("unknown role: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub role: Role,
    pub created_at: String,
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    let role: String = row.get(1)?;
    Ok(UserRow {
        id: row.get(0)?,
        role: role.parse().map_err(|e: StoryError| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?,
        created_at: row.get(2)?,
    })
}

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<UserRow>, StoryError> {
    Ok(conn
        .query_row(
            "SELECT id, role, created_at FROM users WHERE id = ?",
            params![id],
            row_to_user,
        )
        .optional()?)
}

/// Insert the user as a player if unknown; existing roles are left alone
pub fn ensure_user(conn: &Connection, id: &str) -> Result<UserRow, StoryError> {
    conn.execute(
        "INSERT INTO users (id, role, created_at) VALUES (?, 'player', ?)
         ON CONFLICT(id) DO NOTHING",
        params![id, super::now()],
    )?;
    get_user(conn, id)?.ok_or_else(|| StoryError::Internal("Failed to retrieve user".to_string()))
}

/// Set a role, creating the user if needed
pub fn set_role(conn: &Connection, id: &str, role: Role) -> Result<UserRow, StoryError> {
    conn.execute(
        "INSERT INTO users (id, role, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET role = excluded.role",
        params![id, role.as_str(), super::now()],
    )?;
    get_user(conn, id)?.ok_or_else(|| StoryError::Internal("Failed to retrieve user".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoryDb;

    #[test]
    fn test_ensure_user_does_not_demote() {
        let db = StoryDb::open_in_memory().unwrap();

        let user = db.with_conn(|conn| ensure_user(conn, "u1")).unwrap();
        assert_eq!(user.role, Role::Player);

        db.with_conn(|conn| set_role(conn, "u1", Role::Admin)).unwrap();
        let again = db.with_conn(|conn| ensure_user(conn, "u1")).unwrap();
        assert_eq!(again.role, Role::Admin);
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::Admin > Role::Author);
        assert!(Role::Author > Role::Player);
        assert_eq!("author".parse::<Role>().unwrap(), Role::Author);
    }
}
