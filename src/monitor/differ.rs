//! Decides whether two consecutive presence snapshots warrant a notification.
use std::collections::HashSet;

use crate::ping::status::PresenceSnapshot;

pub const JOINED_SINGULAR_FORMAT: &str = "{} has logged in!";
pub const JOINED_PLURAL_FORMAT: &str = "{} have logged in!";
pub const PLAYER_COUNT_FORMAT: &str = "{} players are online right now.";

/// Newly seen names beyond this count switch the message to count phrasing.
const MAX_NAMED: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyDecision {
    Suppress,
    Notify { caption: String, body: String },
}

impl NotifyDecision {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, NotifyDecision::Suppress)
    }
}

/// Whether `current` should replace the stored baseline. Failed polls never
/// do, so the next success is compared against the last good roster.
pub fn should_store(current: &PresenceSnapshot) -> bool {
    current.success
}

pub fn diff(
    caption: &str,
    previous: Option<&PresenceSnapshot>,
    current: &PresenceSnapshot,
    enabled: bool,
    global_notify: bool,
) -> NotifyDecision {
    if !enabled || !global_notify {
        return NotifyDecision::Suppress;
    }
    let Some(previous) = previous.filter(|previous| previous.success) else {
        // No baseline yet.
        return NotifyDecision::Suppress;
    };
    if !current.success {
        return NotifyDecision::Suppress;
    }

    let previous_names: HashSet<&str> = previous
        .sample
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();
    let current_names: Vec<&str> = current
        .sample
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();

    if current_names.is_empty() && previous.sample.is_some() {
        return NotifyDecision::Suppress;
    }

    // Keep the service's own ordering so messages are stable.
    let mut seen = HashSet::new();
    let new_names: Vec<&str> = current_names
        .into_iter()
        .filter(|name| !previous_names.contains(name) && seen.insert(*name))
        .collect();
    // Counts come straight off the wire; compare rather than subtract.
    let count_changed = current.online != previous.online;

    if new_names.is_empty() && !count_changed {
        return NotifyDecision::Suppress;
    }

    let body = if (1..=MAX_NAMED).contains(&new_names.len()) {
        let names = new_names[..new_names.len().min(MAX_NAMED)].join(", ");
        let format = if new_names.len() == 1 {
            JOINED_SINGULAR_FORMAT
        } else {
            JOINED_PLURAL_FORMAT
        };
        format.replacen("{}", &names, 1)
    } else {
        PLAYER_COUNT_FORMAT.replacen("{}", &format!("{}/{}", current.online, current.max), 1)
    };

    NotifyDecision::Notify {
        caption: caption.to_string(),
        body,
    }
}
