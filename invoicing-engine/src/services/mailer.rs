//! Outbound mail for backup snapshots.

use crate::config::SmtpConfig;
use crate::error::MailError;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body_text: String,
    pub attachment: Option<PathBuf>,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &EmailMessage) -> Result<(), MailError>;
    fn is_enabled(&self) -> bool;
}

pub struct SmtpMailer {
    config: SmtpConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self, MailError> {
        if !config.enabled {
            return Ok(Self {
                config,
                transport: None,
            });
        }

        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().clone(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| MailError::Configuration(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .timeout(Some(config.timeout))
            .build();

        Ok(Self {
            config,
            transport: Some(transport),
        })
    }

    async fn build_message(&self, email: &EmailMessage) -> Result<Message, MailError> {
        let from_mailbox: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| MailError::Configuration(format!("Invalid from address: {}", e)))?;

        let to_mailbox: Mailbox = email
            .to
            .parse()
            .map_err(|e| MailError::InvalidRecipient(format!("{}: {}", email.to, e)))?;

        let builder = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(&email.subject);

        let Some(path) = &email.attachment else {
            return builder
                .header(ContentType::TEXT_PLAIN)
                .body(email.body_text.clone())
                .map_err(|e| MailError::SendFailed(format!("Failed to build message: {}", e)));
        };

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| MailError::Attachment {
                path: path.clone(),
                source,
            })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "backup".to_string());
        let content_type = ContentType::parse("application/octet-stream")
            .map_err(|e| MailError::SendFailed(format!("Invalid content type: {}", e)))?;

        builder
            .multipart(
                MultiPart::mixed()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.body_text.clone()),
                    )
                    .singlepart(Attachment::new(filename).body(bytes, content_type)),
            )
            .map_err(|e| MailError::SendFailed(format!("Failed to build message: {}", e)))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, email: &EmailMessage) -> Result<(), MailError> {
        if !self.config.enabled {
            return Err(MailError::NotEnabled(
                "SMTP mailer is not enabled".to_string(),
            ));
        }

        let transport = self.transport.as_ref().ok_or_else(|| {
            MailError::Configuration("SMTP transport not initialized".to_string())
        })?;

        let message = self.build_message(email).await?;

        transport
            .send(message)
            .await
            .map_err(|e| MailError::SendFailed(format!("Failed to send email: {}", e)))?;

        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "Email sent successfully"
        );

        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

/// In-memory mailer for tests.
pub struct MockMailer {
    enabled: bool,
    fail: bool,
    delay: Option<Duration>,
    send_count: AtomicU64,
    sent: std::sync::Mutex<Vec<EmailMessage>>,
}

impl MockMailer {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            fail: false,
            delay: None,
            send_count: AtomicU64::new(0),
            sent: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Every send attempt fails with `SendFailed`.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(true)
        }
    }

    /// Every send sleeps before completing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MailTransport for MockMailer {
    async fn send(&self, email: &EmailMessage) -> Result<(), MailError> {
        if !self.enabled {
            return Err(MailError::NotEnabled(
                "Mock mailer is not enabled".to_string(),
            ));
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.send_count.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            return Err(MailError::SendFailed("mock relay refused".to_string()));
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email.clone());
        }

        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "[MOCK] Email would be sent"
        );

        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
