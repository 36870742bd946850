//! Outbound delivery of one-time codes.
//!
//! The orchestrator only needs "send this HTML to that address". Delivery is
//! spawned off the request path, so implementations may block on the network
//! for as long as their own timeout allows.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

use crate::config::SmtpConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &SmtpConfig) -> Result<Self> {
        let address: Address = config
            .from_email
            .parse()
            .with_context(|| format!("Invalid from address: {}", config.from_email))?;

        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .with_context(|| format!("Failed to create SMTP transport for {}", config.host))?;

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)));
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from: Mailbox::new(Some(config.from_name.clone()), address),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        let to: Mailbox = mail
            .to
            .parse()
            .with_context(|| format!("Invalid recipient address: {}", mail.to))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject)
            .header(ContentType::TEXT_HTML)
            .body(mail.html)
            .context("Failed to build email")?;

        self.transport
            .send(message)
            .await
            .context("SMTP delivery failed")?;

        Ok(())
    }
}

/// Used when SMTP is disabled: codes stay in the ledger and only the fact
/// that a message would have gone out is logged.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        info!(to = %mail.to, subject = %mail.subject, "SMTP disabled, email not sent");
        Ok(())
    }
}

/// Captures messages instead of sending them.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    fail: std::sync::atomic::AtomicBool,
}

impl MemoryMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `send` fail.
    pub fn fail_deliveries(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<OutgoingMail> {
        self.sent().pop()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("delivery to {} refused", mail.to);
        }
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(mail);
        Ok(())
    }
}

pub const OTP_SUBJECT: &str = "Admin Verification Code";

#[must_use]
pub fn otp_email(to: &str, code: &str, ttl_minutes: i64, brand: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: format!("{brand} {OTP_SUBJECT}"),
        html: otp_email_template(code, ttl_minutes, brand),
    }
}

#[must_use]
pub fn otp_email_template(code: &str, ttl_minutes: i64, brand: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, Helvetica, sans-serif; background-color: #f5f7fa; padding: 32px; max-width: 520px; margin: auto; border-radius: 8px; border: 1px solid #e0e6ed; color: #111;">
  <h2 style="font-size: 20px; font-weight: 600; color: #111827; text-align: center; margin-bottom: 20px;">{brand} {OTP_SUBJECT}</h2>
  <p style="font-size: 15px; color: #374151; text-align: center; margin-bottom: 24px;">Please use the code below to complete your verification process:</p>
  <div style="background-color: #ffffff; border: 1px solid #d1d5db; font-size: 24px; letter-spacing: 6px; font-weight: bold; padding: 16px; text-align: center; border-radius: 6px; color: #111827; margin-bottom: 24px;">{code}</div>
  <p style="font-size: 14px; color: #4b5563; text-align: center; margin-bottom: 8px;">This code will expire in <strong>{ttl_minutes} minutes</strong>.</p>
  <p style="font-size: 13px; color: #6b7280; text-align: center; margin-top: 16px;">If you did not request this code, you can safely ignore this email.</p>
</div>"#
    )
}

/// Picks the transport for the configured deployment.
pub fn from_config(config: &SmtpConfig) -> Result<std::sync::Arc<dyn Mailer>> {
    if config.enabled {
        Ok(std::sync::Arc::new(SmtpMailer::from_config(config)?))
    } else {
        Ok(std::sync::Arc::new(LogMailer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_embeds_code_and_expiry() {
        let mail = otp_email("ops@example.com", "042917", 10, "Universal Technology");
        assert_eq!(mail.to, "ops@example.com");
        assert_eq!(mail.subject, "Universal Technology Admin Verification Code");
        assert!(mail.html.contains(">042917</div>"));
        assert!(mail.html.contains("<strong>10 minutes</strong>"));
    }

    #[tokio::test]
    async fn memory_mailer_records_and_fails_on_demand() {
        let mailer = MemoryMailer::new();
        mailer.send(otp_email("a@example.com", "111111", 10, "X")).await.unwrap();
        assert_eq!(mailer.sent().len(), 1);

        mailer.fail_deliveries(true);
        assert!(mailer.send(otp_email("a@example.com", "222222", 10, "X")).await.is_err());
        assert!(mailer.last().unwrap().html.contains("111111"));
    }

    #[test]
    fn smtp_mailer_rejects_bad_sender() {
        let config = SmtpConfig {
            enabled: true,
            from_email: "not an address".into(),
            ..SmtpConfig::default()
        };
        assert!(SmtpMailer::from_config(&config).is_err());
    }
}
