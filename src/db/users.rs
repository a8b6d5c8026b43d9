use super::{Database, UserStore};
use crate::error::StoreError;
use crate::models::{NewUser, Role, User};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use time::OffsetDateTime;

const USER_COLUMNS: &str =
    "id, username, password_hash, email, first_name, last_name, role, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(6)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        email: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        role: role.parse::<Role>().map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                6,
                String::from("Invalid role value"),
                rusqlite::types::Type::Text,
            )
        })?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn fetch_user(conn: &Connection, username: &str) -> Result<User, StoreError> {
    let sql = format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS);
    conn.query_row(&sql, params![username], user_from_row)
        .optional()?
        .ok_or(StoreError::NotFound)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl UserStore for Database {
    fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let now = OffsetDateTime::now_utc();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (username, password_hash, email, first_name, last_name, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                user.username,
                user.password_hash,
                user.email,
                user.first_name,
                user.last_name,
                user.role.as_str(),
                now,
                now,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict
            } else {
                StoreError::Storage(e)
            }
        })?;
        fetch_user(&conn, &user.username)
    }

    fn find_by_username(&self, username: &str) -> Result<User, StoreError> {
        fetch_user(&self.conn.lock(), username)
    }
}
