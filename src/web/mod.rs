pub mod auth;
pub mod middleware;
pub mod patients;

use crate::auth::Passwords;
use crate::db::{Database, PatientStore, UserStore};
use crate::error::ApiError;
use crate::token::TokenService;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    middleware::{from_fn_with_state, map_response},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub patients: Arc<dyn PatientStore>,
    pub tokens: Arc<TokenService>,
    pub passwords: Arc<Passwords>,
}

impl AppState {
    /// State backed by a single database serving both stores.
    pub fn new(db: Arc<Database>, tokens: TokenService, passwords: Passwords) -> Self {
        Self {
            users: db.clone(),
            patients: db,
            tokens: Arc::new(tokens),
            passwords: Arc::new(passwords),
        }
    }
}

/// The JSON body of every API response.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl Envelope<()> {
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Unwrap a JSON body, answering 400 in the envelope format when it does not parse.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            tracing::debug!("Rejected request body: {}", rejection);
            Err(ApiError::validation("Invalid request format"))
        }
    }
}

/// Run store or hashing work on the blocking thread pool.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(ApiError::internal)?
}

/// Give the bare 408 from the timeout layer the usual failure envelope.
async fn timeout_envelope(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        return ApiError::Timeout.into_response();
    }
    response
}

async fn health() -> Json<Envelope<()>> {
    Json(Envelope::done("ok"))
}

pub fn build_api_routes(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route(
            "/patients",
            get(patients::list_patients).post(patients::create_patient),
        )
        .route(
            "/patients/{id}",
            get(patients::get_patient)
                .put(patients::update_patient)
                .delete(patients::delete_patient),
        )
        .route("/me", get(auth::me))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .merge(protected)
        .with_state(state)
}

pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health))
        .nest("/api", build_api_routes(state))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(map_response(timeout_envelope))
        .layer(TraceLayer::new_for_http())
}
