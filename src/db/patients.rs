use super::{Database, PatientStore};
use crate::error::StoreError;
use crate::models::{NewPatient, Patient};
use rusqlite::{params, Connection, OptionalExtension, Row};
use time::OffsetDateTime;

const PATIENT_COLUMNS: &str =
    "id, first_name, last_name, date_of_birth, gender, created_at, updated_at";

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        date_of_birth: row.get(3)?,
        gender: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn fetch_patient(conn: &Connection, id: i64) -> Result<Patient, StoreError> {
    let sql = format!("SELECT {} FROM patients WHERE id = ?", PATIENT_COLUMNS);
    conn.query_row(&sql, params![id], patient_from_row)
        .optional()?
        .ok_or(StoreError::NotFound)
}

impl PatientStore for Database {
    fn create_patient(&self, patient: NewPatient) -> Result<Patient, StoreError> {
        let now = OffsetDateTime::now_utc();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO patients (first_name, last_name, date_of_birth, gender, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                patient.first_name,
                patient.last_name,
                patient.date_of_birth,
                patient.gender,
                now,
                now,
            ],
        )?;
        fetch_patient(&conn, conn.last_insert_rowid())
    }

    fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM patients ORDER BY id", PATIENT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let patients = stmt
            .query_map([], patient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(patients)
    }

    fn get_patient(&self, id: i64) -> Result<Patient, StoreError> {
        fetch_patient(&self.conn.lock(), id)
    }

    fn update_patient(&self, id: i64, patient: NewPatient) -> Result<Patient, StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE patients SET first_name = ?, last_name = ?, date_of_birth = ?, gender = ?, updated_at = ? WHERE id = ?",
            params![
                patient.first_name,
                patient.last_name,
                patient.date_of_birth,
                patient.gender,
                OffsetDateTime::now_utc(),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        fetch_patient(&conn, id)
    }

    fn delete_patient(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM patients WHERE id = ?", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
