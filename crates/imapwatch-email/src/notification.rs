use crate::{decode_header, RawEnvelope};
use imapwatch_core::EnvelopeRecord;
use url::form_urlencoded;

const ENVELOPE_ICON: &str = "\u{2709}\u{fe0f}";

/// Subject and body of one outbound notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

/// Decodes the header fields of a fetched envelope. The sender is the
/// display name when there is one, `mailbox@host` otherwise.
pub fn envelope_from_raw(raw: &RawEnvelope) -> EnvelopeRecord {
    let subject = raw
        .subject
        .as_deref()
        .map(decode_header)
        .unwrap_or_default()
        .trim()
        .to_string();

    let message_id = raw
        .message_id
        .as_deref()
        .map(|id| String::from_utf8_lossy(id).trim().to_string())
        .unwrap_or_default();

    let display_name = raw
        .from_name
        .as_deref()
        .map(|name| decode_header(name).trim().to_string())
        .filter(|name| !name.is_empty());

    let from = display_name.unwrap_or_else(|| {
        let mailbox = raw
            .from_mailbox
            .as_deref()
            .map(String::from_utf8_lossy)
            .unwrap_or_default();
        let host = raw
            .from_host
            .as_deref()
            .map(String::from_utf8_lossy)
            .unwrap_or_default();
        format!("{mailbox}@{host}")
    });

    EnvelopeRecord {
        from,
        subject,
        message_id,
    }
}

/// Builds the notification for one dispatch cycle, or `None` when there is
/// nothing to report.
pub fn build_notification(records: &[EnvelopeRecord]) -> Option<Notification> {
    let first = records.first()?;

    let body = records
        .iter()
        .map(|record| {
            format!(
                "{ENVELOPE_ICON} {}: \"{}\"\nmessage:{}",
                record.from,
                record.subject,
                escape_message_id(&record.message_id)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    Some(Notification {
        subject: first.subject.clone(),
        body,
    })
}

fn escape_message_id(message_id: &str) -> String {
    form_urlencoded::byte_serialize(message_id.as_bytes()).collect()
}
