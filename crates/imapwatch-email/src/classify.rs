use crate::RawNotification;
use imapwatch_core::TriggerKind;
use std::collections::BTreeSet;

const FLAGGED: &str = "\\Flagged";

/// Returns the message sequence numbers whose notifications match one of
/// `triggers`, in the order the server sent them.
pub fn classify(notifications: &[RawNotification], triggers: &BTreeSet<TriggerKind>) -> Vec<u32> {
    let want_new = triggers.contains(&TriggerKind::New);
    let want_flagged = triggers.contains(&TriggerKind::Flagged);

    notifications
        .iter()
        .filter_map(|notification| match notification {
            RawNotification::Exists(seq) if want_new => Some(*seq),
            RawNotification::Fetch { id, flags }
                if want_flagged && flags.iter().any(|flag| flag.eq_ignore_ascii_case(FLAGGED)) =>
            {
                Some(*id)
            }
            _ => None,
        })
        .collect()
}
