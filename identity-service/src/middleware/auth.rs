use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::services::{ClientInfo, PrincipalContext, RequestContext};
use crate::AppState;

/// Require a valid bearer access token. The rest of the request runs inside
/// a [`RequestContext`] scope for the token's principal.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
        })?;

    let claims = state.jwt.validate_access_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Access token rejected");
        AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
    })?;

    let principal_id = claims
        .principal_id()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid token subject")))?;

    let client = client_info(req.headers());
    let context = PrincipalContext {
        principal_id,
        tenant_id: claims.tenant_uuid(),
        role: claims.role.clone(),
        ip_address: client.ip_address,
        user_agent: client.user_agent,
    };

    req.extensions_mut().insert(context.clone());

    Ok(RequestContext::scope(context, next.run(req)).await)
}

/// Caller address and agent. The first `X-Forwarded-For` hop wins over
/// `X-Real-IP`.
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let ip_address = header_str("x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .or_else(|| header_str("x-real-ip").map(str::to_string));

    ClientInfo {
        ip_address,
        user_agent: header_str(header::USER_AGENT.as_str()).map(str::to_string),
    }
}

/// Extractor for the authenticated principal in handlers behind
/// [`auth_middleware`].
pub struct AuthUser(pub PrincipalContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts.extensions.get::<PrincipalContext>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Principal context missing from request extensions"
            ))
        })?;

        Ok(AuthUser(context.clone()))
    }
}
