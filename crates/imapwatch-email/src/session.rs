use crate::SessionError;
use imap::types::UnsolicitedResponse;
use imap_proto::types::AttributeValue;
use imapwatch_core::AccountConfig;
use std::time::Duration;

/// One asynchronous notification pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawNotification {
    Exists(u32),
    Recent(u32),
    Expunge(u32),
    Fetch { id: u32, flags: Vec<String> },
    Other,
}

impl From<UnsolicitedResponse> for RawNotification {
    fn from(response: UnsolicitedResponse) -> Self {
        match response {
            UnsolicitedResponse::Exists(count) => Self::Exists(count),
            UnsolicitedResponse::Recent(count) => Self::Recent(count),
            UnsolicitedResponse::Expunge(seq) => Self::Expunge(seq),
            UnsolicitedResponse::Fetch { id, attributes } => {
                let flags = attributes
                    .iter()
                    .filter_map(|attribute| match attribute {
                        AttributeValue::Flags(flags) => Some(flags),
                        _ => None,
                    })
                    .flatten()
                    .map(|flag| flag.to_string())
                    .collect();
                Self::Fetch { id, flags }
            }
            _ => Self::Other,
        }
    }
}

/// Undecoded envelope fields, straight off the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEnvelope {
    pub seq: u32,
    pub subject: Option<Vec<u8>>,
    pub message_id: Option<Vec<u8>>,
    pub from_name: Option<Vec<u8>>,
    pub from_mailbox: Option<Vec<u8>>,
    pub from_host: Option<Vec<u8>>,
}

/// A logged-in connection with one mailbox selected.
///
/// `end_wait` must be called before `fetch_envelopes`, `keepalive` or a new
/// `begin_wait`.
pub trait MailboxSession: Send {
    fn begin_wait(&mut self) -> Result<(), SessionError>;

    /// Waits out roughly `timeout` and returns everything the server pushed
    /// in that window. An empty result means nothing happened.
    fn poll_wait(&mut self, timeout: Duration) -> Result<Vec<RawNotification>, SessionError>;

    fn end_wait(&mut self) -> Result<(), SessionError>;

    fn fetch_envelopes(&mut self, ids: &[u32]) -> Result<Vec<RawEnvelope>, SessionError>;

    fn keepalive(&mut self) -> Result<(), SessionError>;

    /// Best-effort logout; errors are swallowed.
    fn close(&mut self);
}

pub trait SessionConnector: Send + Sync {
    fn connect(
        &self,
        account: &AccountConfig,
        mailbox: &str,
    ) -> Result<Box<dyn MailboxSession>, SessionError>;
}

#[derive(Debug, Default)]
pub struct ImapConnector;

impl SessionConnector for ImapConnector {
    fn connect(
        &self,
        account: &AccountConfig,
        mailbox: &str,
    ) -> Result<Box<dyn MailboxSession>, SessionError> {
        let session = ImapSession::connect(account, mailbox)?;
        Ok(Box::new(session))
    }
}

/// [`MailboxSession`] over the blocking `imap` client.
///
/// The client scopes an IDLE command to a single borrow of the session, so
/// every `poll_wait` runs one bounded `IDLE`/`DONE` exchange; `begin_wait`
/// and `end_wait` only move the session in and out of wait mode.
pub struct ImapSession {
    session: imap::Session<imap::Connection>,
    mailbox: String,
    waiting: bool,
}

impl ImapSession {
    pub fn connect(account: &AccountConfig, mailbox: &str) -> Result<Self, SessionError> {
        let mode = if account.use_tls {
            imap::ConnectionMode::Tls
        } else {
            imap::ConnectionMode::Plaintext
        };

        let client = imap::ClientBuilder::new(account.host.as_str(), account.port())
            .mode(mode)
            .connect()
            .map_err(|err| connect_error("connect", err))?;

        let mut session = client
            .login(&account.username, &account.password)
            .map_err(|err| connect_error("login", err.0))?;

        if let Err(err) = session.select(mailbox) {
            let _ = session.logout();
            return Err(connect_error("select", err));
        }

        let supports_idle = match session.capabilities() {
            Ok(capabilities) => capabilities.has_str("IDLE"),
            Err(err) => {
                let _ = session.logout();
                return Err(connect_error("capability", err));
            }
        };
        if !supports_idle {
            let _ = session.logout();
            return Err(SessionError::Protocol(format!(
                "{} does not support IDLE",
                account.host
            )));
        }

        tracing::debug!(host = %account.host, mailbox, "imap session ready");
        Ok(Self {
            session,
            mailbox: mailbox.to_string(),
            waiting: false,
        })
    }

    fn drain_unsolicited(&mut self) -> Vec<RawNotification> {
        self.session
            .take_all_unsolicited()
            .map(RawNotification::from)
            .collect()
    }

    fn ensure_not_waiting(&self, operation: &str) -> Result<(), SessionError> {
        if self.waiting {
            return Err(SessionError::Protocol(format!(
                "{operation} issued while {} is in IDLE",
                self.mailbox
            )));
        }
        Ok(())
    }
}

impl MailboxSession for ImapSession {
    fn begin_wait(&mut self) -> Result<(), SessionError> {
        self.ensure_not_waiting("IDLE")?;
        self.waiting = true;
        Ok(())
    }

    fn poll_wait(&mut self, timeout: Duration) -> Result<Vec<RawNotification>, SessionError> {
        if !self.waiting {
            return Err(SessionError::Protocol(format!(
                "poll on {} outside of IDLE",
                self.mailbox
            )));
        }

        // Responses that arrived during earlier commands come first.
        let mut notifications = self.drain_unsolicited();
        if !notifications.is_empty() {
            return Ok(notifications);
        }

        // Stay in IDLE for the whole window: the client drops untagged lines
        // read while DONE is acknowledged.
        self.session
            .idle()
            .timeout(timeout)
            .keepalive(false)
            .wait_while(|response| {
                notifications.push(RawNotification::from(response));
                true
            })
            .map_err(session_error)?;

        notifications.extend(self.drain_unsolicited());
        Ok(notifications)
    }

    fn end_wait(&mut self) -> Result<(), SessionError> {
        self.waiting = false;
        Ok(())
    }

    fn fetch_envelopes(&mut self, ids: &[u32]) -> Result<Vec<RawEnvelope>, SessionError> {
        self.ensure_not_waiting("FETCH")?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sequence = ids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let fetches = self
            .session
            .fetch(sequence, "ENVELOPE")
            .map_err(session_error)?;

        let mut envelopes = Vec::new();
        for fetched in fetches.iter() {
            let Some(envelope) = fetched.envelope() else {
                tracing::debug!(seq = fetched.message, "fetch response without envelope");
                continue;
            };
            let sender = envelope.from.as_ref().and_then(|from| from.first());
            envelopes.push(RawEnvelope {
                seq: fetched.message,
                subject: envelope.subject.as_ref().map(|subject| subject.to_vec()),
                message_id: envelope.message_id.as_ref().map(|id| id.to_vec()),
                from_name: sender.and_then(|address| address.name.as_ref().map(|n| n.to_vec())),
                from_mailbox: sender
                    .and_then(|address| address.mailbox.as_ref().map(|m| m.to_vec())),
                from_host: sender.and_then(|address| address.host.as_ref().map(|h| h.to_vec())),
            });
        }

        Ok(envelopes)
    }

    fn keepalive(&mut self) -> Result<(), SessionError> {
        self.ensure_not_waiting("NOOP")?;
        self.session.noop().map_err(session_error)
    }

    fn close(&mut self) {
        self.waiting = false;
        if let Err(err) = self.session.logout() {
            tracing::debug!(mailbox = %self.mailbox, "imap logout failed: {err}");
        }
    }
}

fn connect_error(stage: &str, error: imap::Error) -> SessionError {
    SessionError::Transport(format!("imap {stage} failed: {error}"))
}

fn session_error(error: imap::Error) -> SessionError {
    match error {
        imap::Error::Io(err) => SessionError::Transport(format!("imap io error: {err}")),
        imap::Error::ConnectionLost => {
            SessionError::Transport("imap connection lost".to_string())
        }
        other => SessionError::Protocol(format!("imap error: {other}")),
    }
}
