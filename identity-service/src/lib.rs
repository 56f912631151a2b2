pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::tracing::request_id_middleware;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::services::{
    AuditRecorder, AuthorizationGate, CacheStore, ClaimsResolver, CredentialVerifier,
    IdentityStore, JwtService, Notifier, PasswordLifecycle, PrincipalDirectory, RoleClaimAdmin,
    SessionIssuer, SessionSettings, TenantService,
};
use crate::utils::PasswordHasher;

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub store: Arc<dyn IdentityStore>,
    pub cache: Arc<dyn CacheStore>,
    pub jwt: JwtService,
    pub credentials: CredentialVerifier,
    pub sessions: SessionIssuer,
    pub passwords: PasswordLifecycle,
    pub directory: PrincipalDirectory,
    pub claims: ClaimsResolver,
    pub role_claims: RoleClaimAdmin,
    pub gate: AuthorizationGate,
    pub tenants: TenantService,
}

impl AppState {
    /// Wire every service over the given ports.
    pub fn new(
        config: IdentityConfig,
        store: Arc<dyn IdentityStore>,
        cache: Arc<dyn CacheStore>,
        notifier: Arc<dyn Notifier>,
        jwt: JwtService,
        hasher: PasswordHasher,
    ) -> Self {
        let sessions = SessionIssuer::new(
            store.clone(),
            jwt.clone(),
            SessionSettings::from(&config.jwt),
        );
        let credentials = CredentialVerifier::new(
            store.clone(),
            hasher.clone(),
            sessions.clone(),
            config.lockout.clone(),
        );
        let passwords = PasswordLifecycle::new(
            store.clone(),
            hasher.clone(),
            notifier,
            config.password.reset_token_expiry_minutes,
        );
        let directory = PrincipalDirectory::new(store.clone(), hasher);
        let claims = ClaimsResolver::new(
            store.clone(),
            cache.clone(),
            config.claims_cache.ttl_seconds,
        );
        let role_claims = RoleClaimAdmin::new(store.clone(), claims.clone());
        let gate = AuthorizationGate::new(claims.clone());
        let tenants = TenantService::new(
            store.clone(),
            gate.clone(),
            AuditRecorder::new(store.clone()),
        );

        Self {
            config,
            store,
            cache,
            jwt,
            credentials,
            sessions,
            passwords,
            directory,
            claims,
            role_claims,
            gate,
            tenants,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/auth/me", get(handlers::user::get_me))
        .route(
            "/auth/change-password",
            post(handlers::auth::change_password),
        )
        .route("/tenants", post(handlers::tenant::create_tenant))
        .route(
            "/tenants/:tenant_id",
            get(handlers::tenant::get_tenant)
                .patch(handlers::tenant::update_tenant)
                .delete(handlers::tenant::delete_tenant),
        )
        .route(
            "/tenants/:tenant_id/audit-log",
            get(handlers::tenant::get_tenant_audit_log),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .allowed_origins
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect::<Vec<HeaderValue>>(),
        )
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/sign-in", post(handlers::auth::sign_in))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/sign-out", post(handlers::auth::sign_out))
        .route(
            "/auth/forgot-password",
            post(handlers::auth::forgot_password),
        )
        .route(
            "/auth/reset-password",
            post(handlers::auth::reset_password),
        )
        .merge(authenticated)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(cors)
}

/// Service health check
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::from(e)
    })?;

    state.cache.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Cache health check failed");
        AppError::InternalError(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "database": "up",
            "cache": "up"
        }
    })))
}
