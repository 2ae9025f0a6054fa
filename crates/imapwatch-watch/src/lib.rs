mod dispatch;
mod error;
mod supervisor;
mod watcher;

#[cfg(test)]
mod testing;

pub use dispatch::Dispatcher;
pub use error::WatchError;
pub use supervisor::{WatchSupervisor, WatchTarget};
pub use watcher::{MailboxWatcher, WatchPhase, WatcherExit, WatcherState};
