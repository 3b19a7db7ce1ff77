use crate::domain::notification::Email;
use crate::domain::ports::Mailer;
use crate::error::NotifyError;
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Writes emails to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), NotifyError> {
        info!(to = %email.to, subject = %email.subject, "email");
        Ok(())
    }
}

/// Drops every email as an `.html` file into a directory, for local runs and
/// for handing mail to an external relay.
#[derive(Debug)]
pub struct OutboxMailer {
    dir: PathBuf,
    counter: AtomicU64,
}

impl OutboxMailer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, email: &Email) -> Result<(), NotifyError> {
        if email.to.is_empty() {
            return Err(NotifyError::Rejected("email has no recipient".to_string()));
        }
        tokio::fs::create_dir_all(&self.dir).await?;

        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let filename = format!(
            "{}-{seq:04}.html",
            Utc::now().format("%Y%m%dT%H%M%S%.3f")
        );
        let document = format!(
            "<!-- to: {} -->\n<!-- subject: {} -->\n{}\n",
            email.to.replace("--", ""),
            email.subject.replace("--", ""),
            email.html_body
        );
        let path = self.dir.join(filename);
        tokio::fs::write(&path, document).await?;
        info!(to = %email.to, path = %path.display(), "email written to outbox");
        Ok(())
    }
}
