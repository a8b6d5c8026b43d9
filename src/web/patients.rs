use crate::error::{ApiError, StoreError};
use crate::models::{NewPatient, Patient};
use crate::web::middleware::AuthUser;
use crate::web::{blocking, json_body, AppState, Envelope};
use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use time::macros::format_description;
use time::Date;

fn patient_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::validation("Invalid patient id"))
}

fn not_found(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound => ApiError::NotFound("Patient not found".to_string()),
        other => other.into(),
    }
}

/// Reject patient payloads with a blank name or gender, or an unparseable
/// birth date. The first problem found is reported.
pub fn validate_patient(patient: &NewPatient) -> Result<(), ApiError> {
    if patient.first_name.trim().is_empty() {
        return Err(ApiError::validation("first name is required"));
    }
    if patient.last_name.trim().is_empty() {
        return Err(ApiError::validation("last name is required"));
    }
    let format = format_description!("[year]-[month]-[day]");
    if Date::parse(&patient.date_of_birth, format).is_err() {
        return Err(ApiError::validation(
            "date of birth must be a valid YYYY-MM-DD date",
        ));
    }
    if patient.gender.trim().is_empty() {
        return Err(ApiError::validation("gender is required"));
    }
    Ok(())
}

/// GET /api/patients
#[tracing::instrument(skip_all)]
pub async fn list_patients(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Envelope<Vec<Patient>>>, ApiError> {
    let patients = blocking(move || state.patients.list_patients().map_err(ApiError::from)).await?;
    Ok(Json(Envelope::ok("", patients)))
}

/// GET /api/patients/{id}
#[tracing::instrument(skip(state, path))]
pub async fn get_patient(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Envelope<Patient>>, ApiError> {
    let id = patient_id(path)?;
    let patient = blocking(move || state.patients.get_patient(id).map_err(not_found)).await?;
    Ok(Json(Envelope::ok("", patient)))
}

/// POST /api/patients
#[tracing::instrument(skip_all, fields(username = %auth.0.sub))]
pub async fn create_patient(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    body: Result<Json<NewPatient>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Patient>>), ApiError> {
    auth.require_staff()?;
    let new_patient = json_body(body)?;
    validate_patient(&new_patient)?;

    let patient = blocking(move || {
        state
            .patients
            .create_patient(new_patient)
            .map_err(ApiError::from)
    })
    .await?;
    tracing::info!(patient_id = patient.id, "Created patient");
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok("Patient created successfully", patient)),
    ))
}

/// PUT /api/patients/{id}
#[tracing::instrument(skip_all, fields(username = %auth.0.sub))]
pub async fn update_patient(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<NewPatient>, JsonRejection>,
) -> Result<Json<Envelope<Patient>>, ApiError> {
    auth.require_staff()?;
    let id = patient_id(path)?;
    let changes = json_body(body)?;
    validate_patient(&changes)?;

    let patient =
        blocking(move || state.patients.update_patient(id, changes).map_err(not_found)).await?;
    tracing::info!(patient_id = id, "Updated patient");
    Ok(Json(Envelope::ok("Patient updated successfully", patient)))
}

/// DELETE /api/patients/{id}
#[tracing::instrument(skip_all, fields(username = %auth.0.sub))]
pub async fn delete_patient(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Envelope<()>>, ApiError> {
    auth.require_staff()?;
    let id = patient_id(path)?;
    blocking(move || state.patients.delete_patient(id).map_err(not_found)).await?;
    tracing::info!(patient_id = id, "Deleted patient");
    Ok(Json(Envelope::done("Patient deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    fn patient(first: &str, last: &str, dob: &str) -> NewPatient {
        NewPatient {
            first_name: first.to_string(),
            last_name: last.to_string(),
            date_of_birth: dob.to_string(),
            gender: "Female".to_string(),
        }
    }

    #[test]
    fn test_validate_patient_accepts_well_formed() {
        assert!(validate_patient(&patient("Jane", "Doe", "1995-02-01")).is_ok());

        for gender in ["male", "Unknown", "Non-binary"] {
            let mut p = patient("Jane", "Doe", "1995-02-01");
            p.gender = gender.to_string();
            assert!(validate_patient(&p).is_ok(), "{} should be accepted", gender);
        }
    }

    #[test]
    fn test_validate_patient_rejects_bad_input() {
        assert!(validate_patient(&patient(" ", "Doe", "1995-02-01")).is_err());
        assert!(validate_patient(&patient("Jane", "", "1995-02-01")).is_err());
        assert!(validate_patient(&patient("Jane", "Doe", "01/02/1995")).is_err());
        assert!(validate_patient(&patient("Jane", "Doe", "1995-02-30")).is_err());

        let mut blank_gender = patient("Jane", "Doe", "1995-02-01");
        blank_gender.gender = "  ".to_string();
        match validate_patient(&blank_gender) {
            Err(ApiError::Validation(msg)) => assert_eq!(msg, "gender is required"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
