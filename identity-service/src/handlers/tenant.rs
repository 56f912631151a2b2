use service_core::{
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    dtos::tenant::{CreateTenantRequest, TenantResponse, UpdateTenantRequest},
    utils::ValidatedJson,
    AppState,
};

pub async fn create_tenant(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateTenantRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tenant = state.tenants.create(&req.name).await?;
    Ok((StatusCode::CREATED, Json(TenantResponse::from(tenant))))
}

pub async fn get_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tenant = state.tenants.get(tenant_id).await?;
    Ok(Json(TenantResponse::from(tenant)))
}

/// Apply a partial update. Each present field is its own audited change.
pub async fn update_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateTenantRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tenants = &state.tenants;
    let tenant = match (req.name.as_deref(), req.is_active) {
        (None, None) => {
            return Err(AppError::Unprocessable(
                "At least one of name or isActive is required".to_string(),
            ))
        }
        (Some(name), None) => tenants.rename(tenant_id, name).await?,
        (None, Some(is_active)) => tenants.set_active(tenant_id, is_active).await?,
        (Some(name), Some(is_active)) => {
            tenants.rename(tenant_id, name).await?;
            tenants.set_active(tenant_id, is_active).await?
        }
    };
    Ok(Json(TenantResponse::from(tenant)))
}

pub async fn delete_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.tenants.delete(tenant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_tenant_audit_log(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let logs = state.tenants.history(tenant_id).await?;
    Ok(Json(logs))
}
