use crate::error::ApiError;
use crate::models::Claims;
use crate::web::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Verified claims of the caller, attached to the request by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    /// Fails with 403 unless the caller holds a staff role.
    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.0.role.is_staff() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Insufficient permissions".to_string()))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(unauthorized)
    }
}

fn unauthorized() -> ApiError {
    ApiError::Unauthorized("Unauthorized".to_string())
}

/// Pull the token out of an `Authorization` header value.
///
/// Accepts both `Bearer <token>` and a bare token.
pub fn bearer_token(header_value: &str) -> &str {
    let value = header_value.trim();
    match value.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer ") => value[7..].trim_start(),
        _ => value,
    }
}

/// Reject the request with 401 unless it carries a valid session token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(bearer_token)
        .filter(|t| !t.is_empty())
        .ok_or_else(unauthorized)?;

    let validation = state.tokens.validate(token);
    let claims = match validation.claims {
        Some(claims) if validation.valid => claims,
        _ => return Err(unauthorized()),
    };

    tracing::debug!(username = %claims.sub, role = %claims.role, "Authenticated request");
    request.extensions_mut().insert(AuthUser(claims));
    Ok(next.run(request).await)
}
