//! services/api/src/adapters/mailer.rs
//!
//! This module contains the adapter for the outbound notification mailer.
//! It implements the `MailerService` port by posting to a SendGrid-style
//! HTTP mail API. Callers treat delivery as fire-and-forget; a failed send
//! never changes the outcome of the operation that triggered it.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use chatbot_core::ports::{MailerService, PortError, PortResult};

const MAIL_TIMEOUT: Duration = Duration::from_secs(10);

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct HttpMailerAdapter {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from_address: String,
    frontend_url: String,
}

impl HttpMailerAdapter {
    /// Creates a new `HttpMailerAdapter`.
    pub fn new(
        http: reqwest::Client,
        api_url: String,
        api_key: Option<String>,
        from_address: String,
        frontend_url: String,
    ) -> Self {
        Self {
            http,
            api_url,
            api_key,
            from_address,
            frontend_url,
        }
    }

    async fn send(&self, to_email: &str, subject: &str, html_body: &str) -> PortResult<()> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(PortError::Unavailable(
                "Mail delivery is not configured".to_string(),
            ));
        };

        let payload = json!({
            "personalizations": [{ "to": [{ "email": to_email }] }],
            "from": { "email": self.from_address },
            "subject": subject,
            "content": [{ "type": "text/html", "value": html_body }],
        });

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(api_key)
            .timeout(MAIL_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Upstream {
                message: format!("Mail request failed: {e}"),
                transient: e.is_timeout() || e.is_connect(),
            })?;

        if !response.status().is_success() {
            return Err(PortError::Upstream {
                message: format!("Mail provider returned {}", response.status()),
                transient: response.status().is_server_error(),
            });
        }
        Ok(())
    }
}

//=========================================================================================
// `MailerService` Trait Implementation
//=========================================================================================

#[async_trait]
impl MailerService for HttpMailerAdapter {
    async fn send_welcome(&self, to_email: &str, handle: &str) -> PortResult<()> {
        let html = format!(
            "<h2>Hello {handle},</h2>\
             <p>Thank you for registering with Chatbot App!</p>\
             <p>You can now chat with the assistant, upload images for analysis, \
             send voice messages, and browse your chat history.</p>"
        );
        self.send(to_email, "Welcome to Chatbot App!", &html).await
    }

    async fn send_password_reset(
        &self,
        to_email: &str,
        handle: &str,
        token: &str,
    ) -> PortResult<()> {
        let reset_link = format!("{}/reset-password?token={}", self.frontend_url, token);
        let html = format!(
            "<h2>Hello {handle},</h2>\
             <p>We received a request to reset your password. Use the link below \
             to create a new one:</p>\
             <p><a href=\"{reset_link}\">Reset Password</a></p>\
             <p>This link will expire soon. If you didn't request a password \
             reset, you can ignore this email.</p>"
        );
        self.send(to_email, "Reset Your Password - Chatbot App", &html)
            .await
    }
}
