use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("email send failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("email API error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// Thin client for the Resend HTTP API.
#[derive(Clone)]
pub struct EmailClient {
    client: Client,
    endpoint: String,
    api_key: String,
    from: String,
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

impl EmailClient {
    /// Every send is abandoned after `timeout`, connect included.
    pub fn new(api_key: &str, from_email: &str, from_name: &str, timeout: Duration) -> Result<Self, EmailError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: RESEND_ENDPOINT.to_string(),
            api_key: api_key.to_string(),
            from: format!("{from_name} <{from_email}>"),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<(), EmailError> {
        let request = ResendRequest {
            from: &self.from,
            to: [to],
            subject,
            html,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Api { status: status.as_u16(), body });
        }

        tracing::debug!(to = %to, subject = %subject, "email sent");
        Ok(())
    }
}
