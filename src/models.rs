//! Data models for the hospital records service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// The role a user holds inside the hospital.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Nurse,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Patient => "patient",
        }
    }

    /// Staff roles may modify patient records.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Doctor | Role::Nurse)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "nurse" => Ok(Role::Nurse),
            "patient" => Ok(Role::Patient),
            _ => Err(()),
        }
    }
}

/// A registered user, exactly as the credential store holds it.
///
/// Deliberately not `Serialize`: the password hash must never end up in a
/// response body. Use [`PublicUser`] for anything client-facing.
#[derive(Debug, Clone)]
pub struct User {
    /// The user's unique ID.
    pub id: i64,
    pub username: String,
    /// bcrypt hash of the password.
    pub password_hash: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    /// First and last name joined by a space, trimmed when either is blank.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn public_view(&self) -> PublicUser {
        PublicUser {
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            full_name: self.full_name(),
        }
    }
}

/// Fields needed to insert a user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

/// The view of a user returned from login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub username: String,
    pub email: String,
    pub role: Role,
    pub full_name: String,
}

/// Represents a patient in the hospital records system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// The patient's unique ID.
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    /// Calendar date, `YYYY-MM-DD`.
    pub date_of_birth: String,
    /// Free-form, e.g. `Male` or `Female`.
    pub gender: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The mutable fields of a patient, used for both create and update.
///
/// Missing fields decode as empty so validation can name them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub gender: String,
}

/// Claims carried inside a session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Username of the token holder.
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}
