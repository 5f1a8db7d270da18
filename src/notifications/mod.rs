use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

pub mod dispatcher;
pub mod templates;

pub use dispatcher::NotificationDispatcher;

/// An outbound HTML email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

impl EmailMessage {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            to: vec![to.into()],
            subject: subject.into(),
            html: html.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Message has no recipients")]
    NoRecipients,
    #[error("Mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Mail relay rejected message with status {0}")]
    Rejected(u16),
}

/// Delivers email. Implementations must be safe to call more than once for
/// the same message; the outbox delivers at least once.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
}

/// Posts messages as JSON to an HTTP mail relay.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    relay_url: String,
    from: String,
}

impl HttpMailer {
    pub fn new(relay_url: impl Into<String>, from: impl Into<String>) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            relay_url: relay_url.into(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    #[instrument(skip(self, message), fields(subject = %message.subject))]
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if message.to.is_empty() {
            return Err(MailError::NoRecipients);
        }

        let response = self
            .client
            .post(&self.relay_url)
            .json(&RelayPayload {
                from: &self.from,
                to: &message.to,
                subject: &message.subject,
                html: &message.html,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Mail relay returned {}", status);
            return Err(MailError::Rejected(status.as_u16()));
        }

        info!("Email sent to {} recipient(s)", message.to.len());
        Ok(())
    }
}

/// Writes messages to the log instead of sending them. Used when no relay
/// is configured.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if message.to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        info!(
            to = %message.to.join(","),
            subject = %message.subject,
            "email (not sent, no relay configured)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn http_mailer_posts_message_to_relay() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(body_partial_json(serde_json::json!({
                "from": "noreply@example.com",
                "to": ["jane@example.com"],
                "subject": "Order Status Update"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(format!("{}/send", server.uri()), "noreply@example.com").unwrap();
        let message = EmailMessage::new("jane@example.com", "Order Status Update", "<p>hi</p>");
        mailer.send(&message).await.unwrap();
    }

    #[tokio::test]
    async fn http_mailer_surfaces_relay_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(server.uri(), "noreply@example.com").unwrap();
        let message = EmailMessage::new("jane@example.com", "s", "b");
        let err = mailer.send(&message).await.unwrap_err();
        assert!(matches!(err, MailError::Rejected(503)));
    }

    #[tokio::test]
    async fn log_mailer_requires_recipients() {
        let message = EmailMessage {
            to: vec![],
            subject: "s".into(),
            html: "b".into(),
        };
        assert!(matches!(
            LogMailer.send(&message).await,
            Err(MailError::NoRecipients)
        ));
    }
}
