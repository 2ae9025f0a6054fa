use crate::{Dispatcher, MailboxWatcher, WatchError, WatcherExit};
use imapwatch_config::ConfigError;
use imapwatch_core::{
    AccountConfig, ActionSpec, MailboxSpec, StopSignal, TriggerKind, WatchConfig, WatchSettings,
};
use imapwatch_email::{Notifier, SessionConnector};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::{self, JoinHandle};

/// One watched mailbox with its action resolved.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    pub account: Arc<AccountConfig>,
    pub mailbox: MailboxSpec,
    pub action: ActionSpec,
}

pub struct WatchSupervisor {
    targets: Vec<WatchTarget>,
    settings: WatchSettings,
    connector: Arc<dyn SessionConnector>,
    notifier: Arc<dyn Notifier>,
    stop: StopSignal,
    started: AtomicBool,
    workers: Mutex<Vec<JoinHandle<WatcherExit>>>,
}

impl WatchSupervisor {
    pub fn new(
        config: &WatchConfig,
        connector: Arc<dyn SessionConnector>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, WatchError> {
        let mut targets = Vec::new();
        for account in &config.accounts {
            let shared = Arc::new(account.clone());
            for mailbox in &account.mailboxes {
                let action = config.action(&mailbox.action).cloned().ok_or_else(|| {
                    ConfigError::MissingAction {
                        mailbox: format!("{}/{}", account.name, mailbox.mailbox),
                        action: mailbox.action.clone(),
                    }
                })?;
                targets.push(WatchTarget {
                    account: shared.clone(),
                    mailbox: mailbox.clone(),
                    action,
                });
            }
        }

        Ok(Self {
            targets,
            settings: config.watch.clone(),
            connector,
            notifier,
            stop: StopSignal::new(),
            started: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Spawns every watcher and resolves once they have all closed after the
    /// stop signal.
    pub async fn start(&self) -> Result<(), WatchError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(WatchError::AlreadyStarted);
        }

        {
            // Spawning under the lock keeps a concurrent `stop` from joining
            // a half-built worker list.
            let mut workers = self.workers.lock().await;
            if self.stop.is_set() {
                tracing::info!("stop requested before start; no watchers spawned");
                return Ok(());
            }

            let runtime = Handle::current();
            for target in &self.targets {
                tracing::info!(
                    account = %target.account.name,
                    mailbox = %target.mailbox.mailbox,
                    triggers = %describe_triggers(&target.mailbox.triggers),
                    action = target.action.label(),
                    "spawning watcher"
                );
                let dispatcher = Dispatcher::new(self.notifier.clone(), runtime.clone());
                let watcher = MailboxWatcher::new(
                    target.clone(),
                    self.settings.clone(),
                    self.connector.clone(),
                    dispatcher,
                    self.stop.clone(),
                );
                workers.push(task::spawn_blocking(move || watcher.run()));
            }
            tracing::info!(watchers = workers.len(), "watch supervisor started");
        }

        self.stop.wait().await;
        self.join().await;
        Ok(())
    }

    /// Sets the stop signal and waits for every watcher to close. Safe to
    /// call more than once and from several tasks.
    pub async fn stop(&self) {
        if self.stop.set() {
            tracing::info!("stopping watchers");
        }
        self.join().await;
    }

    async fn join(&self) {
        // Held until the join completes so that every caller returns after it.
        let mut workers = self.workers.lock().await;
        if workers.is_empty() {
            return;
        }

        let mut dispatchers = Vec::with_capacity(workers.len());
        for handle in workers.drain(..) {
            match handle.await {
                Ok(exit) => dispatchers.push(exit.dispatcher),
                Err(err) => tracing::error!("watcher task failed: {err}"),
            }
        }

        for dispatcher in dispatchers {
            dispatcher.drain().await;
        }
        tracing::info!("all watchers closed");
    }
}

fn describe_triggers(triggers: &BTreeSet<TriggerKind>) -> String {
    if triggers.is_empty() {
        return "none".to_string();
    }
    triggers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
