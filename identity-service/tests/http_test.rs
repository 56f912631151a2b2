mod common;

use axum::http::StatusCode;
use common::{TestApp, TEST_PASSWORD};
use identity_service::models::Role;
use serde_json::json;

#[tokio::test]
async fn health_reports_store_and_cache() {
    let app = TestApp::new().await;
    let (status, body) = app.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["cache"], "up");

    app.cache.set_fail_reads(true);
    let (status, _) = app.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn sign_in_then_me() {
    let app = TestApp::new().await;
    app.create_principal("http@example.com", Role::Staff).await;

    let (status, session) = app
        .request(
            "POST",
            "/auth/sign-in",
            None,
            Some(json!({"email": "http@example.com", "password": TEST_PASSWORD, "rememberMe": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["tokenType"], "Bearer");
    let access = session["accessToken"].as_str().unwrap().to_string();

    let (status, me) = app.request("GET", "/auth/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "http@example.com");
    assert_eq!(me["role"], "staff");
    assert!(me.get("password_hash").is_none());
}

#[tokio::test]
async fn bad_credentials_are_401_and_locked_is_423() {
    let app = TestApp::new().await;
    app.create_principal("locked@example.com", Role::Staff).await;
    let wrong = json!({"email": "locked@example.com", "password": "wrong-password-1"});

    for _ in 0..5 {
        let (status, body) = app
            .request("POST", "/auth/sign-in", None, Some(wrong.clone()))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    let (status, _) = app
        .request(
            "POST",
            "/auth/sign-in",
            None,
            Some(json!({"email": "locked@example.com", "password": TEST_PASSWORD})),
        )
        .await;
    assert_eq!(status, StatusCode::LOCKED);
}

#[tokio::test]
async fn malformed_sign_in_is_rejected() {
    let app = TestApp::new().await;
    let (status, body) = app
        .request(
            "POST",
            "/auth/sign-in",
            None,
            Some(json!({"email": "not-an-email", "password": "x"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Validation error");
}

#[tokio::test]
async fn refresh_and_sign_out_over_http() {
    let app = TestApp::new().await;
    app.create_principal("cycle@example.com", Role::Staff).await;
    let session = app
        .sign_in("cycle@example.com", TEST_PASSWORD, false)
        .await
        .unwrap();

    let (status, rotated) = app
        .request(
            "POST",
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": session.refresh_token})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let next = rotated["refreshToken"].as_str().unwrap().to_string();

    let (status, _) = app
        .request(
            "POST",
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": session.refresh_token})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request("POST", "/auth/sign-out", None, Some(json!({"refreshToken": next})))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn forgot_password_answers_the_same_for_unknown_addresses() {
    let app = TestApp::new().await;
    app.create_principal("known@example.com", Role::Staff).await;

    let (known_status, known) = app
        .request(
            "POST",
            "/auth/forgot-password",
            None,
            Some(json!({"email": "known@example.com"})),
        )
        .await;
    let (unknown_status, unknown) = app
        .request(
            "POST",
            "/auth/forgot-password",
            None,
            Some(json!({"email": "unknown@example.com"})),
        )
        .await;

    assert_eq!(known_status, StatusCode::OK);
    assert_eq!(unknown_status, StatusCode::OK);
    assert_eq!(known, unknown);

    let token = app.notifier.last_reset_token("known@example.com").unwrap();
    let (status, _) = app
        .request(
            "POST",
            "/auth/reset-password",
            None,
            Some(json!({"token": token, "newPassword": "brand-new-pass-2"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            "POST",
            "/auth/reset-password",
            None,
            Some(json!({"token": token, "newPassword": "brand-new-pass-3"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn change_password_requires_bearer() {
    let app = TestApp::new().await;
    let principal = app.create_principal("change@example.com", Role::Staff).await;
    let body = json!({"currentPassword": TEST_PASSWORD, "newPassword": "brand-new-pass-2"});

    let (status, _) = app
        .request("POST", "/auth/change-password", None, Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = app.access_token(&principal).await;
    let (status, _) = app
        .request("POST", "/auth/change-password", Some(&token), Some(body))
        .await;
    assert_eq!(status, StatusCode::OK);

    assert!(app
        .sign_in("change@example.com", "brand-new-pass-2", false)
        .await
        .is_ok());
}

#[tokio::test]
async fn tenant_routes_are_gated() {
    let app = TestApp::new().await;
    let staff = app.create_principal("staff@example.com", Role::Staff).await;
    let root = app.create_principal("root@example.com", Role::SuperAdmin).await;
    let body = json!({"name": "Acme"});

    let (status, _) = app.request("POST", "/tenants", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request("POST", "/tenants", Some("not-a-jwt"), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let staff_token = app.access_token(&staff).await;
    let (status, _) = app
        .request("POST", "/tenants", Some(&staff_token), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let root_token = app.access_token(&root).await;
    let (status, created) = app
        .request("POST", "/tenants", Some(&root_token), Some(body))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, updated) = app
        .request(
            "PATCH",
            &format!("/tenants/{}", id),
            Some(&root_token),
            Some(json!({"name": "Acme Health", "isActive": false})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Acme Health");
    assert_eq!(updated["isActive"], false);

    let (status, _) = app
        .request(
            "PATCH",
            &format!("/tenants/{}", id),
            Some(&root_token),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, log) = app
        .request(
            "GET",
            &format!("/tenants/{}/audit-log", id),
            Some(&root_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(log.as_array().unwrap().len(), 3);

    let (status, _) = app
        .request("DELETE", &format!("/tenants/{}", id), Some(&root_token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .request("GET", &format!("/tenants/{}", id), Some(&root_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
