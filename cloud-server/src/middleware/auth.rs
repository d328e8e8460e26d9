//! Authentication middleware
//!
//! Callers present an HS256 bearer token minted by the identity provider.
//! The token carries the caller's role and the children they may see; the
//! pipeline itself decides what that role may do.

use axum::{
    extract::{State, Request},
    middleware::Next,
    response::Response,
    http::header::AUTHORIZATION,
};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use guardian_core::logic::authz::{CallerContext, Role};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, AppError};

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Actor id recorded in the audit trail
    pub sub: String,
    pub role: String,
    #[serde(default)]
    pub children: Vec<Uuid>,
    pub exp: usize,
}

/// Authenticated caller, extracted from request extensions
#[derive(Debug, Clone)]
pub struct Caller(pub CallerContext);

/// Middleware: Require JWT authentication
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&req)?;

    let token_data = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default()
    )?;

    let claims = token_data.claims;
    let role: Role = claims.role.parse().map_err(|_| {
        tracing::warn!("Token for {} carries unknown role '{}'", claims.sub, claims.role);
        AppError::TokenInvalid
    })?;

    let caller = CallerContext::new(claims.sub, role, claims.children);

    // Insert into request extensions
    req.extensions_mut().insert(Caller(caller));

    Ok(next.run(req).await)
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(req: &Request) -> Result<String, AppError> {
    let auth_header = req.headers()
        .get(AUTHORIZATION)
        .ok_or(AppError::Unauthorized)?
        .to_str()
        .map_err(|_| AppError::Unauthorized)?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or(AppError::Unauthorized)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions
            .get::<Caller>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}
