use super::jwt::JwtManager;
use crate::utils::error::ApiError;
use axum::{
    extract::Request,
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
    Extension,
};
use std::sync::Arc;

/// Identity of the authenticated caller, inserted into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub name: String,
}

/// Rejects the request with 401 before any handler work when the bearer
/// token is missing or invalid.
pub async fn require_auth(
    Extension(jwt): Extension<Arc<JwtManager>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = jwt
        .validate_token(token)
        .map_err(|e| ApiError::Unauthorized(format!("Invalid token: {}", e)))?;

    request.extensions_mut().insert(AuthUser {
        id: claims.sub,
        name: claims.name,
    });

    Ok(next.run(request).await)
}
