use imapwatch_email::{Notification, Notifier};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Fire-and-forget sender owned by one watcher. Sends run as tokio tasks so
/// a slow SMTP server never delays the watch loop.
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    runtime: Handle,
    in_flight: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, runtime: Handle) -> Self {
        Self {
            notifier,
            runtime,
            in_flight: JoinSet::new(),
        }
    }

    pub fn dispatch(&mut self, to: &str, notification: Notification) {
        self.reap();

        let notifier = self.notifier.clone();
        let to = to.to_string();
        let send = async move {
            match notifier
                .send(&to, &notification.subject, &notification.body)
                .await
            {
                Ok(()) => tracing::info!(to = %to, subject = %notification.subject, "notification sent"),
                Err(err) => tracing::warn!(to = %to, "notification send failed: {err}"),
            }
        };
        self.in_flight.spawn_on(send.in_current_span(), &self.runtime);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Waits for every send still running.
    pub async fn drain(mut self) {
        while let Some(result) = self.in_flight.join_next().await {
            if let Err(err) = result {
                tracing::warn!("notification task failed: {err}");
            }
        }
    }

    fn reap(&mut self) {
        while let Some(result) = self.in_flight.try_join_next() {
            if let Err(err) = result {
                tracing::warn!("notification task failed: {err}");
            }
        }
    }
}
