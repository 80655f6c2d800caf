//! Mail transport.
//!
//! One SMTP transport is built per run; its pooled connection is reused for
//! every message of that run.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, Message, header};
use lettre::transport::smtp::AsyncSmtpTransport;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncTransport, Tokio1Executor};

use crate::error::{AppError, Result};
use crate::models::{MailConfig, MailSecurity};

/// A plain-text message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Delivery backend for outgoing mail.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// SMTP delivery through lettre.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build the transport, or `None` when delivery settings are incomplete.
    pub fn from_config(config: &MailConfig) -> Result<Option<Self>> {
        let missing = config.missing_settings();
        if !missing.is_empty() {
            log::warn!(
                "Mail delivery disabled, missing settings: {}",
                missing.join(", ")
            );
            return Ok(None);
        }

        let (Some(host), Some(user), Some(pass), Some(from)) = (
            config.host.as_deref(),
            config.username.as_deref(),
            config.password.as_deref(),
            config.from.as_deref(),
        ) else {
            return Ok(None);
        };

        let builder = match config.security {
            MailSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
            MailSecurity::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
        }
        .map_err(|e| AppError::config(format!("invalid SMTP host {host}: {e}")))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(user.to_string(), pass.to_string()))
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        let from = from
            .parse::<Mailbox>()
            .map_err(|e| AppError::config(format!("invalid sender address {from}: {e}")))?;

        Ok(Some(Self { transport, from }))
    }

    fn build_message(&self, mail: &OutgoingMail) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(mail.subject.as_str())
            .header(header::ContentType::TEXT_PLAIN);

        for to in &mail.to {
            let mailbox = to
                .parse::<Mailbox>()
                .map_err(|e| AppError::notify(format!("invalid recipient {to}: {e}")))?;
            builder = builder.to(mailbox);
        }

        builder
            .body(mail.body.clone())
            .map_err(|e| AppError::notify(format!("build email: {e}")))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let message = self.build_message(mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::notify(format!("send email: {e}")))?;
        Ok(())
    }
}
