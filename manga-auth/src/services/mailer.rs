//! Outgoing mail runs on a detached worker so request handlers never wait on
//! (or fail because of) the mail provider.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use manga_shared::clients::email::EmailClient;

use crate::models::TokenUsage;

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl MailSender for EmailClient {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        self.send_email(to, subject, body).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    /// The message carrying a verification link for `usage`.
    pub fn for_token(to: &str, usage: TokenUsage, app_url: &str, token: &str, valid_minutes: i64) -> Self {
        let base = app_url.trim_end_matches('/');
        let (subject, heading, path, footer) = match usage {
            TokenUsage::VerifyEmail => (
                "Verify your email",
                "Confirm your email address",
                "verify-email",
                "",
            ),
            TokenUsage::ResetPassword => (
                "Reset your password",
                "Password reset requested",
                "reset-password",
                " If you did not request this, you can ignore this email.",
            ),
        };
        let link = format!("{base}/{path}?token={token}");
        let body = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
            <h2>{heading}</h2>
            <p><a href="{link}">{link}</a></p>
            <p style="color: #666;">This link expires in {valid_minutes} minutes.{footer}</p>
            </div>"#
        );

        Self {
            to: to.to_string(),
            subject: subject.to_string(),
            body,
        }
    }
}

/// Handle for queueing mail. Cloning shares the same worker.
#[derive(Clone)]
pub struct MailDispatcher {
    tx: mpsc::UnboundedSender<OutgoingMail>,
}

impl MailDispatcher {
    /// Start the worker. It runs until every dispatcher clone is dropped.
    pub fn spawn(sender: Arc<dyn MailSender>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<OutgoingMail>();

        let worker = tokio::spawn(async move {
            while let Some(mail) = rx.recv().await {
                let sender = sender.clone();
                tokio::spawn(async move {
                    if let Err(e) = sender.send(&mail.to, &mail.subject, &mail.body).await {
                        tracing::error!(error = %e, to = %mail.to, subject = %mail.subject, "failed to send email");
                    }
                });
            }
            tracing::debug!("mail dispatcher stopped");
        });

        (Self { tx }, worker)
    }

    /// Queue `mail` and return immediately.
    pub fn dispatch(&self, mail: OutgoingMail) {
        if let Err(e) = self.tx.send(mail) {
            tracing::error!(to = %e.0.to, "mail worker is gone, email dropped");
        }
    }
}
