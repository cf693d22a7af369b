//! WhatsApp delivery through the CallMeBot HTTP gateway.

use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;

use crate::config::NotifyConfig;
use crate::error::NotifyError;
use crate::model::Message;
use crate::notifier::{Channel, non_empty_var};

const CHANNEL_NAME: &str = "whatsapp";

/// CallMeBot credentials.
#[derive(Debug, Clone)]
pub struct WhatsAppCredentials {
    pub phone: String,
    pub api_key: String,
}

impl WhatsAppCredentials {
    /// Read `CALLMEBOT_PHONE` and `CALLMEBOT_APIKEY`.
    ///
    /// Returns `None` unless both are set and non-empty.
    pub fn from_env() -> Option<Self> {
        let phone = non_empty_var("CALLMEBOT_PHONE")?;
        let api_key = non_empty_var("CALLMEBOT_APIKEY")?;
        Some(Self { phone, api_key })
    }
}

pub struct WhatsAppChannel {
    client: reqwest::Client,
    url: String,
    credentials: WhatsAppCredentials,
}

impl WhatsAppChannel {
    pub fn new(
        config: &NotifyConfig,
        credentials: WhatsAppCredentials,
    ) -> Result<Self, Report<NotifyError>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .change_context(NotifyError::Request {
                channel: CHANNEL_NAME.into(),
            })?;

        Ok(Self {
            client,
            url: config.whatsapp_url.clone(),
            credentials,
        })
    }
}

impl Channel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        CHANNEL_NAME
    }

    fn deliver<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<(), Report<NotifyError>>> {
        Box::pin(async move {
            let params = [
                ("phone", self.credentials.phone.as_str()),
                ("text", message.body.as_str()),
                ("apikey", self.credentials.api_key.as_str()),
            ];

            let response = self
                .client
                .get(&self.url)
                .query(&params)
                .send()
                .await
                .change_context(NotifyError::Request {
                    channel: CHANNEL_NAME.into(),
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Report::new(NotifyError::Status {
                    channel: CHANNEL_NAME.into(),
                    status: status.as_u16(),
                })
                .attach(format!("response: {body}")));
            }

            Ok(())
        })
    }
}
