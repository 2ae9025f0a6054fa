use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_IMAP_TLS_PORT: u16 = 993;
pub const DEFAULT_IMAP_PLAIN_PORT: u16 = 143;
pub const DEFAULT_SMTP_PORT: u16 = 465;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// A new message arrived in the mailbox.
    New,
    /// A message gained the `\Flagged` flag.
    Flagged,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => f.write_str("new"),
            Self::Flagged => f.write_str("flagged"),
        }
    }
}

#[derive(Clone)]
pub struct AccountConfig {
    pub name: String,
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
    pub refresh_interval: Duration,
    pub mailboxes: Vec<MailboxSpec>,
}

impl AccountConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(if self.use_tls {
            DEFAULT_IMAP_TLS_PORT
        } else {
            DEFAULT_IMAP_PLAIN_PORT
        })
    }
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("use_tls", &self.use_tls)
            .field("refresh_interval", &self.refresh_interval)
            .field("mailboxes", &self.mailboxes)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxSpec {
    pub mailbox: String,
    pub triggers: BTreeSet<TriggerKind>,
    /// Name of the [`ActionSpec`] fired for matching events.
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub name: String,
    pub email: String,
    pub label: Option<String>,
}

impl ActionSpec {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl SmtpSettings {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SMTP_PORT)
    }
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("from", &self.from)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    /// Upper bound on a single IDLE poll; also bounds how long a watcher
    /// takes to notice the stop signal.
    pub poll_interval: Duration,
    pub reconnect_backoff: Duration,
    pub reconnect_backoff_max: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            reconnect_backoff: Duration::from_secs(1),
            reconnect_backoff_max: Duration::from_secs(60),
        }
    }
}

/// Validated configuration handed to the watch engine.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub smtp: SmtpSettings,
    pub watch: WatchSettings,
    pub accounts: Vec<AccountConfig>,
    pub actions: Vec<ActionSpec>,
}

impl WatchConfig {
    pub fn action(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|action| action.name == name)
    }
}

/// Decoded envelope of one matched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeRecord {
    pub from: String,
    pub subject: String,
    pub message_id: String,
}
