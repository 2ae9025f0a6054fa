use crate::WatchTarget;
use async_trait::async_trait;
use imapwatch_core::{
    AccountConfig, ActionSpec, MailboxSpec, SmtpSettings, StopSignal, TriggerKind, WatchConfig,
    WatchSettings,
};
use imapwatch_email::{
    MailboxSession, Notifier, RawEnvelope, RawNotification, SendError, SessionConnector,
    SessionError,
};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) type CallLog = Arc<Mutex<Vec<String>>>;

pub(crate) fn calls(log: &CallLog) -> Vec<String> {
    log.lock().expect("call log").clone()
}

pub(crate) fn count(log: &CallLog, call: &str) -> usize {
    calls(log).iter().filter(|entry| entry.as_str() == call).count()
}

/// Session that replays a fixed list of poll results. Once the script runs
/// out it either sets the stop signal or idles for the poll timeout.
pub(crate) struct ScriptedSession {
    log: CallLog,
    stop: StopSignal,
    polls: VecDeque<Result<Vec<RawNotification>, SessionError>>,
    envelopes: Vec<RawEnvelope>,
    fetch_error: Option<SessionError>,
    poll_delay: Duration,
    idle_when_exhausted: bool,
}

impl ScriptedSession {
    pub(crate) fn new(
        log: &CallLog,
        stop: &StopSignal,
        polls: Vec<Result<Vec<RawNotification>, SessionError>>,
    ) -> Self {
        Self {
            log: log.clone(),
            stop: stop.clone(),
            polls: polls.into(),
            envelopes: Vec::new(),
            fetch_error: None,
            poll_delay: Duration::ZERO,
            idle_when_exhausted: false,
        }
    }

    pub(crate) fn idle(log: &CallLog, stop: &StopSignal) -> Self {
        Self {
            idle_when_exhausted: true,
            ..Self::new(log, stop, Vec::new())
        }
    }

    pub(crate) fn with_envelopes(mut self, envelopes: Vec<RawEnvelope>) -> Self {
        self.envelopes = envelopes;
        self
    }

    pub(crate) fn with_fetch_error(mut self, error: SessionError) -> Self {
        self.fetch_error = Some(error);
        self
    }

    pub(crate) fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    fn record(&self, call: impl Into<String>) {
        self.log.lock().expect("call log").push(call.into());
    }
}

impl MailboxSession for ScriptedSession {
    fn begin_wait(&mut self) -> Result<(), SessionError> {
        self.record("begin_wait");
        Ok(())
    }

    fn poll_wait(&mut self, timeout: Duration) -> Result<Vec<RawNotification>, SessionError> {
        self.record("poll");
        if !self.poll_delay.is_zero() {
            std::thread::sleep(self.poll_delay);
        }
        match self.polls.pop_front() {
            Some(result) => result,
            None if self.idle_when_exhausted => {
                std::thread::sleep(timeout);
                Ok(Vec::new())
            }
            None => {
                self.stop.set();
                Ok(Vec::new())
            }
        }
    }

    fn end_wait(&mut self) -> Result<(), SessionError> {
        self.record("end_wait");
        Ok(())
    }

    fn fetch_envelopes(&mut self, ids: &[u32]) -> Result<Vec<RawEnvelope>, SessionError> {
        self.record(format!("fetch {ids:?}"));
        if let Some(error) = self.fetch_error.take() {
            return Err(error);
        }
        Ok(self
            .envelopes
            .iter()
            .filter(|envelope| ids.contains(&envelope.seq))
            .cloned()
            .collect())
    }

    fn keepalive(&mut self) -> Result<(), SessionError> {
        self.record("keepalive");
        Ok(())
    }

    fn close(&mut self) {
        self.record("close");
    }
}

/// Hands out scripted sessions in order. When the script is exhausted it
/// either keeps producing idle sessions or sets the stop signal and fails.
pub(crate) struct ScriptedConnector {
    log: CallLog,
    stop: StopSignal,
    sessions: Mutex<VecDeque<Result<ScriptedSession, SessionError>>>,
    idle_when_exhausted: bool,
}

impl ScriptedConnector {
    pub(crate) fn new(
        log: &CallLog,
        stop: &StopSignal,
        sessions: Vec<Result<ScriptedSession, SessionError>>,
    ) -> Self {
        Self {
            log: log.clone(),
            stop: stop.clone(),
            sessions: Mutex::new(sessions.into()),
            idle_when_exhausted: false,
        }
    }

    pub(crate) fn idle(log: &CallLog, stop: &StopSignal) -> Self {
        Self {
            idle_when_exhausted: true,
            ..Self::new(log, stop, Vec::new())
        }
    }
}

impl SessionConnector for ScriptedConnector {
    fn connect(
        &self,
        _account: &AccountConfig,
        _mailbox: &str,
    ) -> Result<Box<dyn MailboxSession>, SessionError> {
        self.log.lock().expect("call log").push("connect".to_string());
        let next = self.sessions.lock().expect("session script").pop_front();
        match next {
            Some(Ok(session)) => Ok(Box::new(session)),
            Some(Err(error)) => Err(error),
            None if self.idle_when_exhausted => {
                Ok(Box::new(ScriptedSession::idle(&self.log, &self.stop)))
            }
            None => {
                self.stop.set();
                Err(SessionError::Transport("script exhausted".to_string()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    attempts: Arc<AtomicUsize>,
    fail: bool,
}

impl RecordingNotifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("sent messages").clone()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SendError::Smtp("connection refused".to_string()));
        }
        self.sent.lock().expect("sent messages").push(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

pub(crate) fn fast_settings() -> WatchSettings {
    WatchSettings {
        poll_interval: Duration::from_millis(10),
        reconnect_backoff: Duration::ZERO,
        reconnect_backoff_max: Duration::ZERO,
    }
}

pub(crate) fn account(name: &str, mailboxes: Vec<MailboxSpec>) -> AccountConfig {
    AccountConfig {
        name: name.to_string(),
        host: format!("imap.{name}.example"),
        port: None,
        username: "me".to_string(),
        password: "secret".to_string(),
        use_tls: true,
        refresh_interval: Duration::from_secs(3600),
        mailboxes,
    }
}

pub(crate) fn mailbox(name: &str, triggers: &[TriggerKind], action: &str) -> MailboxSpec {
    MailboxSpec {
        mailbox: name.to_string(),
        triggers: triggers.iter().copied().collect::<BTreeSet<_>>(),
        action: action.to_string(),
    }
}

pub(crate) fn things_action() -> ActionSpec {
    ActionSpec {
        name: "things".to_string(),
        email: "things@example.com".to_string(),
        label: Some("Things inbox".to_string()),
    }
}

pub(crate) fn target(triggers: &[TriggerKind], refresh_interval: Duration) -> WatchTarget {
    let mut account = account("personal", vec![mailbox("INBOX", triggers, "things")]);
    account.refresh_interval = refresh_interval;
    WatchTarget {
        mailbox: account.mailboxes[0].clone(),
        account: Arc::new(account),
        action: things_action(),
    }
}

pub(crate) fn watch_config(accounts: Vec<AccountConfig>) -> WatchConfig {
    WatchConfig {
        smtp: SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: None,
            username: "me".to_string(),
            password: "secret".to_string(),
            from: "imapwatch@example.com".to_string(),
        },
        watch: fast_settings(),
        accounts,
        actions: vec![things_action()],
    }
}
