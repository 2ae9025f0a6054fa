use crate::SendError;
use async_trait::async_trait;
use imapwatch_core::SmtpSettings;
use lettre::message::{header, Mailbox};
use lettre::{
    transport::smtp::authentication::Credentials, AsyncSmtpTransport, AsyncTransport, Message,
    Tokio1Executor,
};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends exactly one message. No retries.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SendError>;
}

/// Opens a fresh SMTP session (implicit TLS) for every message.
#[derive(Debug, Clone)]
pub struct SmtpNotifier {
    settings: SmtpSettings,
}

impl SmtpNotifier {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<Message, SendError> {
        let from = parse_mailbox(&self.settings.from)?;
        let to = parse_mailbox(to)?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|err| SendError::Build(err.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SendError> {
        let message = self.build_message(to, subject, body)?;

        tracing::debug!(
            from = %self.settings.from,
            to,
            subject,
            "sending notification"
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.settings.host)
            .map_err(|err| SendError::Smtp(err.to_string()))?
            .port(self.settings.port())
            .credentials(Credentials::new(
                self.settings.username.clone(),
                self.settings.password.clone(),
            ))
            .build();

        transport
            .send(message)
            .await
            .map_err(|err| SendError::Smtp(err.to_string()))?;

        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, SendError> {
    address
        .parse()
        .map_err(|err| SendError::Build(format!("invalid email {address}: {err}")))
}
