use service_core::{
    axum::{extract::State, response::IntoResponse, Json},
    error::AppError,
};

use crate::{middleware::AuthUser, AppState};

/// Profile of the signed-in principal.
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let me = state.directory.current(principal.principal_id).await?;
    Ok(Json(me))
}
