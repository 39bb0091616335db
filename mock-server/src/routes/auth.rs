use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;

use crate::error::ServerError;
use crate::model::{AuthResponse, SigninRequest};
use crate::Db;

pub async fn signin(
    State(db): State<Db>,
    Json(req): Json<SigninRequest>,
) -> Result<Json<AuthResponse>, ServerError> {
    let auth = db.write().await.signin(&req).inspect_err(|_| {
        tracing::info!(username = %req.username, "rejected sign-in");
    })?;
    tracing::info!(username = %auth.username, "signed in");
    Ok(Json(auth))
}

/// Resolve `Authorization: Bearer <token>` to a `Caller` request extension.
pub async fn require_bearer(
    State(db): State<Db>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .ok_or(ServerError::Unauthorized)?;
    let caller = db.read().await.caller(&token).ok_or(ServerError::Unauthorized)?;
    tracing::debug!(user = %caller.username, path = %req.uri().path(), "authenticated");
    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}
