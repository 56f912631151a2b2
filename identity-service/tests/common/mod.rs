//! Shared setup for identity-service integration tests.
//!
//! Builds an `AppState` over the in-memory store, a mock cache and a mock
//! notifier, so no PostgreSQL, Redis or SMTP is needed.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use identity_service::{
    build_router,
    config::{
        ClaimsCacheConfig, DatabaseConfig, Environment, IdentityConfig, JwtConfig,
        LockoutConfig, PasswordConfig, RedisConfig, SmtpConfig,
    },
    models::{Principal, Role},
    services::{
        ClientInfo, JwtService, MemoryIdentityStore, MockCache, MockNotifier, NewPrincipal,
        PrincipalContext, Session, SignIn,
    },
    utils::{Password, PasswordHasher},
    AppState,
};
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "integration-test-secret-at-least-32-bytes";
pub const TEST_PASSWORD: &str = "correct-horse-1";

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config { port: 0 },
        environment: Environment::Dev,
        service_name: "identity-service".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        allowed_origins: vec!["http://localhost:3000".to_string()],
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
        },
        jwt: JwtConfig {
            secret: Some(TEST_JWT_SECRET.to_string()),
            ..JwtConfig::default()
        },
        lockout: LockoutConfig::default(),
        password: PasswordConfig::default(),
        claims_cache: ClaimsCacheConfig::default(),
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            user: String::new(),
            password: String::new(),
            from: "no-reply@localhost".to_string(),
        },
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryIdentityStore>,
    pub cache: Arc<MockCache>,
    pub notifier: Arc<MockNotifier>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: IdentityConfig) -> Self {
        let store = Arc::new(MemoryIdentityStore::new());
        let cache = Arc::new(MockCache::new());
        let notifier = Arc::new(MockNotifier::new());
        let jwt = JwtService::with_secret(TEST_JWT_SECRET.as_bytes(), &config.jwt.issuer);
        // Cheap argon2 parameters keep the suite fast.
        let hasher = PasswordHasher::with_params(8, 1, 1).unwrap();

        let state = AppState::new(
            config,
            store.clone(),
            cache.clone(),
            notifier.clone(),
            jwt,
            hasher,
        );
        state.role_claims.seed_defaults().await.unwrap();

        Self {
            state,
            store,
            cache,
            notifier,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Provision a principal with [`TEST_PASSWORD`].
    pub async fn create_principal(&self, email: &str, role: Role) -> Principal {
        self.create_principal_in(email, role, None).await
    }

    pub async fn create_principal_in(
        &self,
        email: &str,
        role: Role,
        tenant_id: Option<Uuid>,
    ) -> Principal {
        self.state
            .directory
            .provision(NewPrincipal {
                tenant_id,
                email: email.to_string(),
                display_name: None,
                password: Password::new(TEST_PASSWORD),
                role,
            })
            .await
            .unwrap()
    }

    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<Session, identity_service::services::ServiceError> {
        self.state
            .credentials
            .authenticate(SignIn {
                email: email.to_string(),
                password: Password::new(password),
                remember_me,
                client: ClientInfo {
                    ip_address: Some("198.51.100.10".to_string()),
                    user_agent: Some("integration-test".to_string()),
                },
            })
            .await
    }

    /// Access token for a principal, signed with the test secret.
    pub async fn access_token(&self, principal: &Principal) -> String {
        self.sign_in(&principal.email, TEST_PASSWORD, false)
            .await
            .unwrap()
            .access_token
    }

    /// Send a request through the full router and decode the JSON body.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        bearer: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }
}

pub fn context_for(principal: &Principal) -> PrincipalContext {
    PrincipalContext {
        principal_id: principal.principal_id,
        tenant_id: principal.tenant_id,
        role: principal.role_code.clone(),
        ip_address: Some("198.51.100.10".to_string()),
        user_agent: Some("integration-test".to_string()),
    }
}
