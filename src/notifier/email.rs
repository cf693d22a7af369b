//! Email delivery via SMTP.
//!
//! [`EmailChannel`] wraps the `lettre` async SMTP transport and is the
//! fallback when WhatsApp delivery fails. The account is read from the
//! environment; without it, [`EmailCredentials::from_env`] returns `None` and
//! the channel is left out.

use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use crate::config::NotifyConfig;
use crate::error::NotifyError;
use crate::model::Message;
use crate::notifier::{Channel, non_empty_var};

const CHANNEL_NAME: &str = "email";

/// SMTP account used both to authenticate and as the sender.
#[derive(Debug, Clone)]
pub struct EmailCredentials {
    pub address: String,
    pub app_password: String,
    /// Recipient; falls back to `address` when unset.
    pub notify_address: Option<String>,
}

impl EmailCredentials {
    /// | Variable             | Required | Default           |
    /// |----------------------|----------|-------------------|
    /// | `GMAIL_ADDRESS`      | yes      |                   |
    /// | `GMAIL_APP_PASSWORD` | yes      |                   |
    /// | `NOTIFY_EMAIL`       | no       | `GMAIL_ADDRESS`   |
    pub fn from_env() -> Option<Self> {
        Some(Self {
            address: non_empty_var("GMAIL_ADDRESS")?,
            app_password: non_empty_var("GMAIL_APP_PASSWORD")?,
            notify_address: non_empty_var("NOTIFY_EMAIL"),
        })
    }

    fn recipient(&self) -> &str {
        self.notify_address.as_deref().unwrap_or(&self.address)
    }
}

pub struct EmailChannel {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailChannel {
    /// Build the SMTP transport (implicit TLS) and parse both addresses.
    pub fn new(
        config: &NotifyConfig,
        credentials: EmailCredentials,
    ) -> Result<Self, Report<NotifyError>> {
        let from = credentials
            .address
            .parse::<Mailbox>()
            .change_context(NotifyError::Address)
            .attach_with(|| format!("sender: {}", credentials.address))?;
        let to = credentials
            .recipient()
            .parse::<Mailbox>()
            .change_context(NotifyError::Address)
            .attach_with(|| format!("recipient: {}", credentials.recipient()))?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .change_context(NotifyError::Smtp)
            .attach_with(|| format!("host: {}", config.smtp_host))?
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .credentials(Credentials::new(
                credentials.address.clone(),
                credentials.app_password.clone(),
            ))
            .build();

        Ok(Self { mailer, from, to })
    }
}

impl Channel for EmailChannel {
    fn name(&self) -> &'static str {
        CHANNEL_NAME
    }

    fn deliver<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<(), Report<NotifyError>>> {
        Box::pin(async move {
            let email = lettre::Message::builder()
                .from(self.from.clone())
                .to(self.to.clone())
                .subject(message.subject.clone())
                .header(ContentType::TEXT_PLAIN)
                .body(message.body.clone())
                .change_context(NotifyError::Build)?;

            self.mailer
                .send(email)
                .await
                .change_context(NotifyError::Smtp)?;

            tracing::info!(to = %self.to, "email sent");
            Ok(())
        })
    }
}
