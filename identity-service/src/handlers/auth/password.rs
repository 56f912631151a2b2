use service_core::{
    axum::{extract::State, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::{
        auth::{ChangePasswordRequest, ForgotPasswordRequest, ResetPasswordRequest},
        MessageResponse,
    },
    middleware::AuthUser,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Request a password reset code. The response never reveals whether the
/// address is registered.
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let message = state.passwords.request_reset(&req.email).await?;
    Ok(Json(MessageResponse::new(message)))
}

pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .passwords
        .reset(&req.token, Password::new(req.new_password))
        .await?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}

pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .passwords
        .change_password(
            principal.principal_id,
            Password::new(req.current_password),
            Password::new(req.new_password),
        )
        .await?;
    Ok(Json(MessageResponse::new("Password changed")))
}
