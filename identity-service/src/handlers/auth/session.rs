use service_core::{
    axum::{extract::State, http::HeaderMap, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::{
        auth::{RefreshRequest, SessionResponse, SignInRequest, SignOutRequest},
        MessageResponse,
    },
    middleware::client_info,
    services::SignIn,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Sign in with email and password
pub async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<SignInRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .credentials
        .authenticate(SignIn {
            email: req.email,
            password: Password::new(req.password),
            remember_me: req.remember_me,
            client: client_info(&headers),
        })
        .await?;
    Ok(Json(SessionResponse::from(session)))
}

/// Exchange a refresh token for a new session
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .sessions
        .rotate(&req.refresh_token, &client_info(&headers))
        .await?;
    Ok(Json(SessionResponse::from(session)))
}

/// Revoke a refresh token
pub async fn sign_out(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignOutRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.sessions.revoke(&req.refresh_token).await?;
    Ok(Json(MessageResponse::new("Signed out successfully")))
}
