use crate::ConfigError;
use imapwatch_core::{
    AccountConfig, ActionSpec, MailboxSpec, SmtpSettings, TriggerKind, WatchConfig, WatchSettings,
};
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

/// On-disk shape of `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub watch: WatchSection,
    pub smtp: SmtpSection,
    #[serde(default)]
    pub accounts: Vec<AccountSection>,
    #[serde(default)]
    pub actions: Vec<ActionSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,
    #[serde(default = "default_reconnect_backoff_max_secs")]
    pub reconnect_backoff_max_secs: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            reconnect_backoff_max_secs: default_reconnect_backoff_max_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpSection {
    pub server: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountSection {
    pub name: Option<String>,
    pub server: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub mailboxes: Vec<MailboxSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailboxSection {
    pub mailbox: String,
    #[serde(default)]
    pub check_for: Vec<TriggerKind>,
    pub action: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionSection {
    pub name: String,
    pub email: String,
    pub label: Option<String>,
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_reconnect_backoff_secs() -> u64 {
    1
}

fn default_reconnect_backoff_max_secs() -> u64 {
    60
}

fn default_use_tls() -> bool {
    true
}

fn default_refresh_interval_secs() -> u64 {
    600
}

impl ConfigFile {
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Checks the structural rules and converts into the engine's model.
    /// Action references are resolved later, by the supervisor.
    pub fn into_watch_config(self) -> Result<WatchConfig, ConfigError> {
        if self.watch.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "watch.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.smtp.server.trim().is_empty() {
            return Err(ConfigError::Invalid("smtp.server is empty".to_string()));
        }
        if self.smtp.from.trim().is_empty() {
            return Err(ConfigError::Invalid("smtp.from is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for action in &self.actions {
            if !seen.insert(action.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate action name {}",
                    action.name
                )));
            }
        }

        let accounts = self
            .accounts
            .into_iter()
            .map(account_from_section)
            .collect::<Result<Vec<_>, _>>()?;

        let actions = self
            .actions
            .into_iter()
            .map(|action| ActionSpec {
                name: action.name,
                email: action.email,
                label: action.label,
            })
            .collect();

        let reconnect_backoff = Duration::from_secs(self.watch.reconnect_backoff_secs);
        Ok(WatchConfig {
            smtp: SmtpSettings {
                host: self.smtp.server,
                port: self.smtp.port,
                username: self.smtp.username,
                password: self.smtp.password,
                from: self.smtp.from,
            },
            watch: WatchSettings {
                poll_interval: Duration::from_secs(self.watch.poll_interval_secs),
                reconnect_backoff,
                reconnect_backoff_max: Duration::from_secs(self.watch.reconnect_backoff_max_secs)
                    .max(reconnect_backoff),
            },
            accounts,
            actions,
        })
    }
}

fn account_from_section(section: AccountSection) -> Result<AccountConfig, ConfigError> {
    if section.server.trim().is_empty() {
        return Err(ConfigError::Invalid("account server is empty".to_string()));
    }

    let name = section
        .name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| section.server.clone());

    let mut mailboxes = Vec::with_capacity(section.mailboxes.len());
    for mailbox in section.mailboxes {
        if mailbox.mailbox.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "account {name} has a mailbox with an empty name"
            )));
        }
        if mailbox.check_for.is_empty() {
            tracing::warn!(
                account = %name,
                mailbox = %mailbox.mailbox,
                "mailbox has no triggers configured, it will never notify"
            );
        }
        mailboxes.push(MailboxSpec {
            mailbox: mailbox.mailbox,
            triggers: mailbox.check_for.into_iter().collect::<BTreeSet<_>>(),
            action: mailbox.action,
        });
    }

    Ok(AccountConfig {
        name,
        host: section.server,
        port: section.port,
        username: section.username,
        password: section.password,
        use_tls: section.use_tls,
        refresh_interval: Duration::from_secs(section.refresh_interval_secs),
        mailboxes,
    })
}
