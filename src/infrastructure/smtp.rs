use crate::config::SmtpConfig;
use crate::domain::notification::Email;
use crate::domain::ports::Mailer;
use crate::error::NotifyError;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

const IMPLICIT_TLS_PORT: u16 = 465;

/// Delivers emails as `text/html` through an SMTP relay.
///
/// The connection is opened per message, so building the mailer never
/// touches the network.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self, NotifyError> {
        let from: Mailbox = config.from.parse()?;
        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?
        };
        let builder = builder.port(config.port);
        let builder = match config.user {
            Some(user) => builder.credentials(Credentials::new(
                user,
                config.password.unwrap_or_default(),
            )),
            None => builder,
        };
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn message(&self, email: &Email) -> Result<Message, NotifyError> {
        if email.to.trim().is_empty() {
            return Err(NotifyError::Rejected("email has no recipient".to_string()));
        }
        let message = Message::builder()
            .from(self.from.clone())
            .to(email.to.parse::<Mailbox>()?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone())?;
        Ok(message)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), NotifyError> {
        let message = self.message(email)?;
        self.transport.send(message).await?;
        info!(to = %email.to, "email sent");
        Ok(())
    }
}
