use crate::{Dispatcher, WatchTarget};
use imapwatch_core::{EnvelopeRecord, StopSignal, WatchSettings};
use imapwatch_email::{
    build_notification, classify, envelope_from_raw, MailboxSession, SessionConnector,
    SessionError,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Disconnected,
    Connecting,
    Waiting,
    Dispatching,
    Closed,
}

#[derive(Debug, Clone)]
pub struct WatcherState {
    pub phase: WatchPhase,
    pub last_sync: Instant,
    pub reconnects: u32,
}

/// What a watcher hands back once it reaches [`WatchPhase::Closed`]: its
/// final state and the sends it may still have in flight.
pub struct WatcherExit {
    pub state: WatcherState,
    pub dispatcher: Dispatcher,
}

/// Watches one mailbox of one account over a session it owns exclusively.
pub struct MailboxWatcher {
    target: WatchTarget,
    settings: WatchSettings,
    connector: Arc<dyn SessionConnector>,
    dispatcher: Dispatcher,
    stop: StopSignal,
    state: WatcherState,
    backoff: Duration,
}

impl MailboxWatcher {
    pub fn new(
        target: WatchTarget,
        settings: WatchSettings,
        connector: Arc<dyn SessionConnector>,
        dispatcher: Dispatcher,
        stop: StopSignal,
    ) -> Self {
        let backoff = settings.reconnect_backoff;
        Self {
            target,
            settings,
            connector,
            dispatcher,
            stop,
            state: WatcherState {
                phase: WatchPhase::Disconnected,
                last_sync: Instant::now(),
                reconnects: 0,
            },
            backoff,
        }
    }

    pub fn state(&self) -> &WatcherState {
        &self.state
    }

    /// Runs until the stop signal is observed. Blocking; meant for a
    /// dedicated thread.
    pub fn run(mut self) -> WatcherExit {
        let span = tracing::info_span!(
            "watcher",
            account = %self.target.account.name,
            mailbox = %self.target.mailbox.mailbox
        );
        let _entered = span.enter();

        // Every failure lands back here; reconnects never nest.
        while !self.stop.is_set() {
            self.state.phase = WatchPhase::Connecting;
            let mut session = match self.open_session() {
                Ok(session) => session,
                Err(err) => {
                    tracing::warn!(reconnects = self.state.reconnects, "connect failed: {err}");
                    if self.disconnected() {
                        break;
                    }
                    continue;
                }
            };
            self.backoff = self.settings.reconnect_backoff;

            match self.watch(session.as_mut()) {
                Ok(()) => {
                    if let Err(err) = session.end_wait() {
                        tracing::debug!("ending IDLE on shutdown failed: {err}");
                    }
                    session.close();
                    break;
                }
                Err(err) => {
                    tracing::warn!("session failed, reconnecting: {err}");
                    session.close();
                    if self.disconnected() {
                        break;
                    }
                }
            }
        }

        self.state.phase = WatchPhase::Closed;
        tracing::info!(reconnects = self.state.reconnects, "watcher closed");
        WatcherExit {
            state: self.state,
            dispatcher: self.dispatcher,
        }
    }

    fn open_session(&mut self) -> Result<Box<dyn MailboxSession>, SessionError> {
        let mut session = self
            .connector
            .connect(&self.target.account, &self.target.mailbox.mailbox)?;
        if let Err(err) = session.begin_wait() {
            session.close();
            return Err(err);
        }

        self.state.phase = WatchPhase::Waiting;
        self.state.last_sync = Instant::now();
        tracing::info!(reconnects = self.state.reconnects, "connected to mailbox");
        Ok(session)
    }

    fn watch(&mut self, session: &mut dyn MailboxSession) -> Result<(), SessionError> {
        while !self.stop.is_set() {
            let cycle_started = Instant::now();
            let notifications = session.poll_wait(self.settings.poll_interval)?;
            if self.stop.is_set() {
                break;
            }

            let ids = classify(&notifications, &self.target.mailbox.triggers);
            if !ids.is_empty() {
                self.dispatch(session, &ids)?;
                self.state.last_sync = cycle_started;
                continue;
            }

            let idle_for = cycle_started.saturating_duration_since(self.state.last_sync);
            if refresh_due(idle_for, self.target.account.refresh_interval) {
                tracing::debug!(idle_secs = idle_for.as_secs(), "refreshing IDLE");
                session.end_wait()?;
                session.keepalive()?;
                session.begin_wait()?;
                self.state.last_sync = cycle_started;
            }
        }

        Ok(())
    }

    fn dispatch(
        &mut self,
        session: &mut dyn MailboxSession,
        ids: &[u32],
    ) -> Result<(), SessionError> {
        self.state.phase = WatchPhase::Dispatching;
        tracing::info!(?ids, "matched {} message(s)", ids.len());

        session.end_wait()?;
        let records = session
            .fetch_envelopes(ids)?
            .iter()
            .map(envelope_from_raw)
            .collect::<Vec<EnvelopeRecord>>();
        for record in &records {
            tracing::info!(from = %record.from, subject = %record.subject, "found message");
        }

        match build_notification(&records) {
            Some(notification) => {
                tracing::info!(
                    action = self.target.action.label(),
                    to = %self.target.action.email,
                    "dispatching notification"
                );
                self.dispatcher
                    .dispatch(&self.target.action.email, notification);
            }
            None => tracing::debug!("matched messages were gone before fetch"),
        }

        session.keepalive()?;
        session.begin_wait()?;
        self.state.phase = WatchPhase::Waiting;
        Ok(())
    }

    /// Moves to `Disconnected` and waits out the backoff. Returns `true` if
    /// the stop signal arrived meanwhile.
    fn disconnected(&mut self) -> bool {
        self.state.phase = WatchPhase::Disconnected;
        self.state.reconnects = self.state.reconnects.saturating_add(1);

        let delay = self.backoff;
        self.backoff = self
            .backoff
            .saturating_mul(2)
            .min(self.settings.reconnect_backoff_max);

        if delay.is_zero() {
            return self.stop.is_set();
        }
        tracing::debug!(delay_ms = delay.as_millis() as u64, "waiting before reconnect");
        self.stop.sleep(delay, self.settings.poll_interval)
    }
}

/// A quiet session is refreshed once it has idled strictly longer than the
/// account's refresh interval.
fn refresh_due(idle_for: Duration, refresh_interval: Duration) -> bool {
    idle_for > refresh_interval
}
