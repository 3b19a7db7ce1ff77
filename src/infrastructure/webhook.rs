use crate::domain::ports::ChatNotifier;
use crate::error::NotifyError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Posts admin messages to an incoming-webhook chat endpoint as
/// `{"text": "..."}`. Without a URL every message is skipped.
#[derive(Debug, Clone)]
pub struct WebhookChatNotifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookChatNotifier {
    pub fn new(url: Option<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.filter(|u| !u.trim().is_empty()),
        })
    }

    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            url: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }
}

#[async_trait]
impl ChatNotifier for WebhookChatNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let Some(url) = &self.url else {
            debug!("chat webhook not configured, skipping message");
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .json(&WebhookPayload { text })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}
