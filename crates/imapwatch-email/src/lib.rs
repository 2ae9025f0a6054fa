mod classify;
mod error;
mod header;
mod notification;
mod notifier;
mod session;

pub use classify::classify;
pub use error::{SendError, SessionError};
pub use header::decode_header;
pub use notification::{build_notification, envelope_from_raw, Notification};
pub use notifier::{Notifier, SmtpNotifier};
pub use session::{
    ImapConnector, ImapSession, MailboxSession, RawEnvelope, RawNotification, SessionConnector,
};
