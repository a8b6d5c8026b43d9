use crate::auth::{self, Credentials, LoginResponse, Registration};
use crate::error::ApiError;
use crate::web::middleware::AuthUser;
use crate::web::{blocking, json_body, AppState, Envelope};
use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;

/// POST /api/login
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<Envelope<LoginResponse>>, ApiError> {
    let credentials = json_body(body)?;
    let response = blocking(move || {
        auth::login(
            state.users.as_ref(),
            &state.tokens,
            &state.passwords,
            credentials,
        )
    })
    .await?;
    Ok(Json(Envelope::ok("Login successful", response)))
}

/// POST /api/register
#[tracing::instrument(skip_all)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Registration>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<()>>), ApiError> {
    let registration = json_body(body)?;
    blocking(move || auth::register(state.users.as_ref(), &state.passwords, registration))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::done("User registered successfully")),
    ))
}

/// GET /api/me
pub async fn me(AuthUser(claims): AuthUser) -> Json<Envelope<Value>> {
    Json(Envelope::ok(
        "",
        json!({
            "username": claims.sub,
            "role": claims.role,
            "expiresAt": claims.exp,
        }),
    ))
}
