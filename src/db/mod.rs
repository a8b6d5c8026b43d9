//! Database module for the hospital records service.
//!
//! This module owns the single SQLite connection used by the process. It
//! creates the schema, seeds first-boot data, and exposes the two store
//! traits the rest of the crate programs against: [`UserStore`] for
//! credentials and [`PatientStore`] for patient records. [`Database`]
//! implements both.

mod patients;
mod users;

use crate::auth::Passwords;
use crate::error::StoreError;
use crate::models::{NewPatient, NewUser, Patient, Role, User};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::time::Duration;

/// How long a statement waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Username of the bootstrap administrator account.
pub const ADMIN_USERNAME: &str = "admin";

const ADMIN_EMAIL: &str = "admin@localhost";

/// Persistence contract for user credentials.
///
/// Implementations must enforce username uniqueness themselves. Callers
/// may check first, but only the store can decide a race between two
/// registrations of the same name.
pub trait UserStore: Send + Sync {
    /// Inserts a user, stamping `created_at`/`updated_at`, and returns the
    /// stored record.
    ///
    /// # Errors
    ///
    /// * [`StoreError::Conflict`] if the username is already taken.
    /// * [`StoreError::Storage`] if the underlying database fails.
    fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    /// Looks a user up by username, including the password hash.
    ///
    /// # Errors
    ///
    /// * [`StoreError::NotFound`] if no user has that username.
    /// * [`StoreError::Storage`] if the underlying database fails.
    fn find_by_username(&self, username: &str) -> Result<User, StoreError>;
}

/// Persistence contract for patient records.
///
/// Every method fails with [`StoreError::Storage`] if the underlying
/// database fails. Only the other variants are listed below.
pub trait PatientStore: Send + Sync {
    /// Inserts a patient, stamping `created_at`/`updated_at`.
    fn create_patient(&self, patient: NewPatient) -> Result<Patient, StoreError>;

    /// Every patient, in insertion order.
    fn list_patients(&self) -> Result<Vec<Patient>, StoreError>;

    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no patient has that id.
    fn get_patient(&self, id: i64) -> Result<Patient, StoreError>;

    /// Replaces the mutable fields of a patient and refreshes `updated_at`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no patient has that id.
    fn update_patient(&self, id: i64, patient: NewPatient) -> Result<Patient, StoreError>;

    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no patient has that id.
    fn delete_patient(&self, id: i64) -> Result<(), StoreError>;
}

/// A SQLite-backed store shared by every request.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens the database named by `url`.
    ///
    /// Accepts a plain file path, a `sqlite://` URL, or `:memory:`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or configured.
    pub fn open(url: &str) -> Result<Self> {
        let path = url.strip_prefix("sqlite://").unwrap_or(url);
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .with_context(|| format!("Failed to open database at {}", path))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set busy timeout")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a fresh in-memory database with the schema applied.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database or the schema
    /// fails to apply.
    pub fn open_in_memory() -> Result<Self> {
        let db = Self::open(":memory:")?;
        db.migrate()?;
        Ok(db)
    }

    /// Creates the tables and the unique username index if missing.
    ///
    /// Safe to run on every start; existing tables are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be executed.
    pub fn migrate(&self) -> Result<()> {
        let schema = include_str!("schema.sql");
        self.conn
            .lock()
            .execute_batch(schema)
            .context("Failed to execute schema")
    }

    /// Inserts the two sample patients if the patients table is empty.
    ///
    /// Returns how many patients were inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be counted or an insert fails.
    pub fn seed_patients(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))
            .context("Failed to count patients")?;
        if count > 0 {
            return Ok(0);
        }

        let samples = [
            NewPatient {
                first_name: "John".to_string(),
                last_name: "Doe".to_string(),
                date_of_birth: "1990-01-01".to_string(),
                gender: "Male".to_string(),
            },
            NewPatient {
                first_name: "Jane".to_string(),
                last_name: "Doe".to_string(),
                date_of_birth: "1995-02-01".to_string(),
                gender: "Female".to_string(),
            },
        ];
        let inserted = samples.len();
        for patient in samples {
            self.create_patient(patient)
                .context("Failed to seed sample patient")?;
        }
        tracing::info!("Seeded {} sample patients", inserted);
        Ok(inserted)
    }

    /// Creates the administrator account if it does not exist yet.
    ///
    /// The password is hashed with `passwords`. An existing account keeps
    /// its current password, even if `password` differs.
    ///
    /// Returns `true` when a new account was created.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup, the hash or the insert fails. Losing
    /// an insert race to another process is not an error.
    pub fn seed_admin(&self, password: &str, passwords: &Passwords) -> Result<bool> {
        match self.find_by_username(ADMIN_USERNAME) {
            Ok(_) => return Ok(false),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e).context("Failed to look up admin user"),
        }

        let password_hash = passwords.hash(password)?;
        let admin = NewUser {
            username: ADMIN_USERNAME.to_string(),
            password_hash,
            email: ADMIN_EMAIL.to_string(),
            first_name: "System".to_string(),
            last_name: "Administrator".to_string(),
            role: Role::Admin,
        };
        match self.create_user(admin) {
            Ok(_) => {
                tracing::info!("Created '{}' user from configured password", ADMIN_USERNAME);
                Ok(true)
            }
            // Another process seeded it between the lookup and the insert.
            Err(StoreError::Conflict) => Ok(false),
            Err(e) => Err(e).context("Failed to create admin user"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password_hash: "$2b$04$notarealhash".to_string(),
            email: format!("{}@example.com", username),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            role: Role::Doctor,
        }
    }

    fn new_patient(first: &str) -> NewPatient {
        NewPatient {
            first_name: first.to_string(),
            last_name: "Smith".to_string(),
            date_of_birth: "1980-06-15".to_string(),
            gender: "Other".to_string(),
        }
    }

    #[test]
    fn test_create_and_find_user() {
        let db = Database::open_in_memory().unwrap();
        let created = db.create_user(new_user("carol")).unwrap();
        assert!(created.id > 0);
        assert_eq!(created.created_at, created.updated_at);

        let found = db.find_by_username("carol").unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.role, Role::Doctor);
        assert_eq!(found.password_hash, "$2b$04$notarealhash");
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(new_user("dave")).unwrap();
        let err = db.create_user(new_user("dave")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[test]
    fn test_find_missing_user() {
        let db = Database::open_in_memory().unwrap();
        let err = db.find_by_username("nobody").unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn test_patient_crud() {
        let db = Database::open_in_memory().unwrap();
        let created = db.create_patient(new_patient("Ann")).unwrap();
        assert_eq!(db.get_patient(created.id).unwrap(), created);

        let mut changes = new_patient("Annabel");
        changes.gender = "Non-binary".to_string();
        let updated = db.update_patient(created.id, changes).unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.first_name, "Annabel");
        assert_eq!(updated.gender, "Non-binary");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);

        db.delete_patient(created.id).unwrap();
        assert!(matches!(
            db.get_patient(created.id).unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[test]
    fn test_update_and_delete_missing_patient() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.update_patient(42, new_patient("Ghost")).unwrap_err(),
            StoreError::NotFound
        ));
        assert!(matches!(
            db.delete_patient(42).unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[test]
    fn test_list_patients_in_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        for name in ["Zed", "Amy", "Mo"] {
            db.create_patient(new_patient(name)).unwrap();
        }
        let names: Vec<String> = db
            .list_patients()
            .unwrap()
            .into_iter()
            .map(|p| p.first_name)
            .collect();
        assert_eq!(names, vec!["Zed", "Amy", "Mo"]);
    }

    #[test]
    fn test_seed_patients_only_when_empty() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.seed_patients().unwrap(), 2);
        assert_eq!(db.seed_patients().unwrap(), 0);

        let patients = db.list_patients().unwrap();
        assert_eq!(patients.len(), 2);
        assert_eq!(patients[0].first_name, "John");
        assert_eq!(patients[1].date_of_birth, "1995-02-01");
    }

    #[test]
    fn test_seed_patients_skips_non_empty_table() {
        let db = Database::open_in_memory().unwrap();
        db.create_patient(new_patient("Existing")).unwrap();
        assert_eq!(db.seed_patients().unwrap(), 0);
        assert_eq!(db.list_patients().unwrap().len(), 1);
    }

    #[test]
    fn test_seed_admin_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let passwords = Passwords::new(4).unwrap();
        assert!(db.seed_admin("bootstrap-pass", &passwords).unwrap());
        assert!(!db.seed_admin("other-pass", &passwords).unwrap());

        let admin = db.find_by_username(ADMIN_USERNAME).unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(passwords.verify("bootstrap-pass", &admin.password_hash));
        assert!(!passwords.verify("other-pass", &admin.password_hash));

        let public = admin.public_view();
        assert_eq!(public.full_name, "System Administrator");
        assert_eq!(public.email, "admin@localhost");
    }

    #[test]
    fn test_open_accepts_sqlite_url() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("open-url.db");
        let db = Database::open(&format!("sqlite://{}", path.display())).unwrap();
        db.migrate().unwrap();
        assert!(path.exists());
    }
}
