mod common;

use chrono::{Duration, Utc};
use common::{TestApp, TEST_PASSWORD};
use identity_service::models::Role;
use identity_service::services::{IdentityStore, ServiceError};

#[tokio::test]
async fn sixth_attempt_is_locked_even_with_correct_password() {
    let app = TestApp::new().await;
    let principal = app.create_principal("lock@example.com", Role::Staff).await;

    for _ in 0..5 {
        assert!(matches!(
            app.sign_in("lock@example.com", "wrong-password-1", false).await,
            Err(ServiceError::InvalidCredentials)
        ));
    }

    match app.sign_in("lock@example.com", TEST_PASSWORD, false).await {
        Err(ServiceError::AccountLocked(until)) => {
            assert!(until > Utc::now());
            assert!(until <= Utc::now() + Duration::minutes(15));
        }
        other => panic!("expected AccountLocked, got {:?}", other.map(|_| ())),
    }

    let stored = app
        .store
        .find_principal_by_id(principal.principal_id)
        .await
        .unwrap()
        .unwrap();
    // The counter restarts once the lockout is applied.
    assert_eq!(stored.failed_login_attempts, 0);
    assert!(stored.is_locked(Utc::now()));
}

#[tokio::test]
async fn unknown_email_and_wrong_password_are_indistinguishable() {
    let app = TestApp::new().await;
    app.create_principal("known@example.com", Role::Staff).await;

    let unknown = app.sign_in("nobody@example.com", TEST_PASSWORD, false).await;
    let wrong = app.sign_in("known@example.com", "wrong-password-1", false).await;

    assert!(matches!(unknown, Err(ServiceError::InvalidCredentials)));
    assert!(matches!(wrong, Err(ServiceError::InvalidCredentials)));
}

#[tokio::test]
async fn success_resets_failure_counter() {
    let app = TestApp::new().await;
    let principal = app.create_principal("reset@example.com", Role::Staff).await;

    for _ in 0..4 {
        let _ = app.sign_in("reset@example.com", "wrong-password-1", false).await;
    }
    app.sign_in("RESET@example.com", TEST_PASSWORD, false)
        .await
        .unwrap();

    let stored = app
        .store
        .find_principal_by_id(principal.principal_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.failed_login_attempts, 0);
    assert!(stored.lockout_until.is_none());
    assert!(stored.last_login_utc.is_some());

    // A fresh run of four failures does not lock.
    for _ in 0..4 {
        let _ = app.sign_in("reset@example.com", "wrong-password-1", false).await;
    }
    assert!(app.sign_in("reset@example.com", TEST_PASSWORD, false).await.is_ok());
}

#[tokio::test]
async fn inactive_principal_is_rejected_after_lookup() {
    let app = TestApp::new().await;
    let principal = app.create_principal("off@example.com", Role::Staff).await;
    app.state
        .directory
        .set_active(principal.principal_id, false)
        .await
        .unwrap();

    assert!(matches!(
        app.sign_in("off@example.com", TEST_PASSWORD, false).await,
        Err(ServiceError::AccountInactive)
    ));
}

#[tokio::test]
async fn remember_me_controls_access_token_lifetime() {
    let app = TestApp::new().await;
    app.create_principal("remember@example.com", Role::Staff).await;

    let short = app
        .sign_in("remember@example.com", TEST_PASSWORD, false)
        .await
        .unwrap();
    let long = app
        .sign_in("remember@example.com", TEST_PASSWORD, true)
        .await
        .unwrap();

    let short_ttl = short.expires_at - Utc::now();
    let long_ttl = long.expires_at - Utc::now();
    assert!(short_ttl > Duration::minutes(59) && short_ttl <= Duration::hours(1));
    assert!(long_ttl > Duration::days(7) - Duration::minutes(1) && long_ttl <= Duration::days(7));

    let claims = app.state.jwt.validate_access_token(&long.access_token).unwrap();
    assert_eq!(claims.exp, long.expires_at.timestamp());
    assert_eq!(claims.role, "staff");
}
