//! Login and registration.

use crate::db::UserStore;
use crate::error::{ApiError, StoreError};
use crate::models::{NewUser, PublicUser, Role, User};
use crate::token::TokenService;
use anyhow::{Context, Result};
use bcrypt::{hash, verify};
use serde::{Deserialize, Serialize};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: PublicUser,
}

/// Hash a password with bcrypt at the given cost.
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    hash(password, cost).context("Failed to hash password")
}

/// Verify a password against a stored bcrypt hash.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    verify(password, password_hash).context("Failed to verify password")
}

/// Plaintext behind [`Passwords::decoy_hash`]. Never stored for any account.
const DECOY_PASSWORD: &str = "decoy-password-for-unknown-users";

/// bcrypt settings shared by registration and login.
///
/// Besides the work factor this holds a decoy hash made at the same cost.
/// Login verifies against it when the username is unknown, so a miss costs
/// as much as a wrong password.
#[derive(Debug, Clone)]
pub struct Passwords {
    cost: u32,
    decoy_hash: String,
}

impl Passwords {
    /// Creates the settings and computes the decoy hash.
    ///
    /// # Errors
    ///
    /// Returns an error if bcrypt rejects `cost` (outside 4..=31).
    pub fn new(cost: u32) -> Result<Self> {
        let decoy_hash = hash_password(DECOY_PASSWORD, cost)?;
        Ok(Self { cost, decoy_hash })
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        hash_password(password, self.cost)
    }

    /// A hash we cannot parse is treated like a wrong password.
    pub fn verify(&self, password: &str, password_hash: &str) -> bool {
        verify_password(password, password_hash).unwrap_or(false)
    }

    pub fn decoy_hash(&self) -> &str {
        &self.decoy_hash
    }
}

/// Checks credentials and issues a session token.
///
/// The username is looked up in `users` and the password verified with
/// bcrypt. An unknown username is verified against the decoy hash in
/// `passwords` before failing, so both failure paths do the same work.
///
/// # Errors
///
/// * [`ApiError::Validation`] if the username or password is empty.
/// * [`ApiError::Unauthorized`] with "Invalid credentials" for an unknown
///   username or a wrong password. The two are indistinguishable.
/// * [`ApiError::Internal`] if the store fails or the token cannot be signed.
pub fn login(
    users: &dyn UserStore,
    tokens: &TokenService,
    passwords: &Passwords,
    credentials: Credentials,
) -> Result<LoginResponse, ApiError> {
    if credentials.username.is_empty() || credentials.password.is_empty() {
        return Err(ApiError::validation("Username and password are required"));
    }

    let user = authenticate(users, &credentials, passwords.decoy_hash(), |pw, hash| {
        passwords.verify(pw, hash)
    })?;

    let token = tokens
        .issue(&user.username, user.role)
        .map_err(ApiError::internal)?;
    tracing::info!(username = %user.username, role = %user.role, "User logged in");

    Ok(LoginResponse {
        token,
        user: user.public_view(),
    })
}

/// Runs `verify` exactly once whether or not the username exists.
fn authenticate(
    users: &dyn UserStore,
    credentials: &Credentials,
    decoy_hash: &str,
    verify: impl Fn(&str, &str) -> bool,
) -> Result<User, ApiError> {
    match users.find_by_username(&credentials.username) {
        Ok(user) if verify(&credentials.password, &user.password_hash) => Ok(user),
        Ok(_) => Err(invalid_credentials()),
        Err(StoreError::NotFound) => {
            let _ = verify(&credentials.password, decoy_hash);
            Err(invalid_credentials())
        }
        Err(e) => Err(e.into()),
    }
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid credentials".to_string())
}

/// Validate a registration, stopping at the first problem found.
pub fn validate_registration(registration: &Registration) -> Result<Role, ApiError> {
    let Registration {
        username,
        password,
        email,
        first_name,
        last_name,
        role,
    } = registration;

    if username.is_empty() {
        return Err(ApiError::validation("username is required"));
    }
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(ApiError::validation(format!(
            "username must be at least {} characters long",
            MIN_USERNAME_LEN
        )));
    }
    if password.is_empty() {
        return Err(ApiError::validation("password is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }
    if email.is_empty() {
        return Err(ApiError::validation("email is required"));
    }
    if !email.contains('@') {
        return Err(ApiError::validation("invalid email format"));
    }
    if first_name.is_empty() {
        return Err(ApiError::validation("first name is required"));
    }
    if last_name.is_empty() {
        return Err(ApiError::validation("last name is required"));
    }
    if role.is_empty() {
        return Err(ApiError::validation("role is required"));
    }
    role.parse::<Role>()
        .map_err(|_| ApiError::validation("invalid role specified"))
}

/// Validates and persists a new user. Does not log the user in.
///
/// The password is hashed with `passwords` before it reaches the store.
///
/// # Errors
///
/// * [`ApiError::Validation`] with the first rule the registration breaks,
///   checked in the order of [`validate_registration`]. Nothing is stored.
/// * [`ApiError::Conflict`] with "Username already exists" if the username
///   is taken, including when a concurrent registration wins the race.
/// * [`ApiError::Internal`] if hashing or the store fails.
pub fn register(
    users: &dyn UserStore,
    passwords: &Passwords,
    registration: Registration,
) -> Result<(), ApiError> {
    let role = validate_registration(&registration)?;

    // Skip the expensive hash for names we already know are taken. The
    // unique index still decides races.
    match users.find_by_username(&registration.username) {
        Ok(_) => return Err(username_taken()),
        Err(StoreError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }

    let password_hash = passwords
        .hash(&registration.password)
        .map_err(ApiError::internal)?;
    let new_user = NewUser {
        username: registration.username,
        password_hash,
        email: registration.email,
        first_name: registration.first_name,
        last_name: registration.last_name,
        role,
    };

    match users.create_user(new_user) {
        Ok(user) => {
            tracing::info!(username = %user.username, role = %user.role, "Registered user");
            Ok(())
        }
        Err(StoreError::Conflict) => Err(username_taken()),
        Err(e) => Err(e.into()),
    }
}

fn username_taken() -> ApiError {
    ApiError::Conflict("Username already exists".to_string())
}
