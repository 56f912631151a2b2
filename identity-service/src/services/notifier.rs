use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use serde::Serialize;
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SmtpConfig;

pub const PASSWORD_RESET_TEMPLATE: &str = "password_reset";

/// Outbound message addressed by template name.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub recipient: String,
    pub template: String,
    pub data: serde_json::Value,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(587)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "SMTP notifier initialized");

        Ok(Self {
            mailer,
            from_email: config.from.clone(),
        })
    }

    fn render(notification: &Notification) -> (String, String, String) {
        match notification.template.as_str() {
            PASSWORD_RESET_TEMPLATE => {
                let token = notification.data["token"].as_str().unwrap_or_default();
                let expires_at = notification.data["expires_at"].as_str().unwrap_or_default();
                let plain = format!(
                    "Password Reset Request\n\nUse the following code to set a new password:\n\n{}\n\nThis code expires at {}. If you didn't request this, please ignore this email.",
                    token, expires_at
                );
                let html = format!(
                    r#"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Password Reset Request</h2>
        <p>Use the following code to set a new password:</p>
        <p><code>{}</code></p>
        <p style="color: #666; font-size: 12px;">This code expires at {}. If you didn't request this, please ignore this email.</p>
    </body>
</html>"#,
                    token, expires_at
                );
                ("Reset Your Password".to_string(), plain, html)
            }
            other => {
                let body = notification.data.to_string();
                (other.to_string(), body.clone(), format!("<pre>{}</pre>", body))
            }
        }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: Notification) -> Result<(), AppError> {
        let (subject, plain_body, html_body) = Self::render(&notification);

        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?,
            )
            .to(notification
                .recipient
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )?;

        // SmtpTransport is synchronous
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(
                    template = %notification.template,
                    "Notification sent"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    template = %notification.template,
                    "Failed to send notification"
                );
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

/// Records notifications instead of sending them.
#[derive(Default)]
pub struct MockNotifier {
    pub sent: Mutex<Vec<Notification>>,
    pub fail: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Token from the most recent password reset sent to `recipient`.
    pub fn last_reset_token(&self, recipient: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|n| n.template == PASSWORD_RESET_TEMPLATE && n.recipient == recipient)
            .and_then(|n| n.data["token"].as_str().map(str::to_string))
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, notification: Notification) -> Result<(), AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::EmailError("smtp relay unavailable".to_string()));
        }
        self.sent
            .lock()
            .map_err(|_| AppError::InternalError(anyhow::anyhow!("Mutex poisoned")))?
            .push(notification);
        Ok(())
    }
}
