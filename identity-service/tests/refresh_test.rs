mod common;

use common::{TestApp, TEST_PASSWORD};
use identity_service::models::Role;
use identity_service::services::{ClientInfo, ServiceError};

#[tokio::test]
async fn rotated_refresh_token_cannot_be_replayed() {
    let app = TestApp::new().await;
    app.create_principal("rotate@example.com", Role::Staff).await;
    let first = app
        .sign_in("rotate@example.com", TEST_PASSWORD, false)
        .await
        .unwrap();

    let client = ClientInfo::default();
    let second = app
        .state
        .sessions
        .rotate(&first.refresh_token, &client)
        .await
        .unwrap();

    assert!(matches!(
        app.state.sessions.rotate(&first.refresh_token, &client).await,
        Err(ServiceError::InvalidToken)
    ));
    assert!(app
        .state
        .sessions
        .rotate(&second.refresh_token, &client)
        .await
        .is_ok());
}

#[tokio::test]
async fn concurrent_rotations_have_exactly_one_winner() {
    let app = TestApp::new().await;
    app.create_principal("race@example.com", Role::Staff).await;
    let session = app
        .sign_in("race@example.com", TEST_PASSWORD, false)
        .await
        .unwrap();

    let sessions = app.state.sessions.clone();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let sessions = sessions.clone();
        let token = session.refresh_token.clone();
        handles.push(tokio::spawn(async move {
            sessions.rotate(&token, &ClientInfo::default()).await
        }));
    }

    let mut wins = 0;
    let mut losses = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(ServiceError::InvalidToken) => losses += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(losses, 7);
}

#[tokio::test]
async fn sign_out_revokes_refresh_token() {
    let app = TestApp::new().await;
    app.create_principal("out@example.com", Role::Staff).await;
    let session = app
        .sign_in("out@example.com", TEST_PASSWORD, false)
        .await
        .unwrap();

    app.state.sessions.revoke(&session.refresh_token).await.unwrap();

    assert!(matches!(
        app.state
            .sessions
            .rotate(&session.refresh_token, &ClientInfo::default())
            .await,
        Err(ServiceError::InvalidToken)
    ));
}

#[tokio::test]
async fn issuance_purges_inactive_tokens() {
    let app = TestApp::new().await;
    let principal = app.create_principal("purge@example.com", Role::Staff).await;

    let first = app
        .sign_in("purge@example.com", TEST_PASSWORD, false)
        .await
        .unwrap();
    app.state.sessions.revoke(&first.refresh_token).await.unwrap();

    app.sign_in("purge@example.com", TEST_PASSWORD, false)
        .await
        .unwrap();

    let rows = app.store.refresh_tokens_for(principal.principal_id).unwrap();
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].revoked);
}

#[tokio::test]
async fn repeated_rotation_keeps_token_rows_bounded() {
    let app = TestApp::new().await;
    let principal = app.create_principal("churn@example.com", Role::Staff).await;
    let mut session = app
        .sign_in("churn@example.com", TEST_PASSWORD, false)
        .await
        .unwrap();

    let client = ClientInfo::default();
    for _ in 0..50 {
        session = app
            .state
            .sessions
            .rotate(&session.refresh_token, &client)
            .await
            .unwrap();
    }

    let rows = app.store.refresh_tokens_for(principal.principal_id).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.iter().filter(|t| !t.revoked).count(), 1);
}
