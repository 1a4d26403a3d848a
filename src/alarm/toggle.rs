use std::time::{Duration, Instant};

use crate::alarm::model::Cookie;

pub const TOGGLE_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingToggle {
    pub cookie: Cookie,
    pub enabled: bool,
    pub due: Instant,
}

/// At most one deferred enable/disable at a time. A new request for the same
/// row supersedes the pending one; requests for other rows are refused until
/// it has run. The window disables its list while a toggle is pending, so
/// superseding is only reached by callers driving the controller directly.
#[derive(Debug, Clone)]
pub struct ToggleDebouncer {
    delay: Duration,
    pending: Option<PendingToggle>,
}

impl Default for ToggleDebouncer {
    fn default() -> Self {
        Self::new(TOGGLE_DEBOUNCE)
    }
}

impl ToggleDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Returns false when another row's toggle is still pending.
    pub fn request(&mut self, cookie: Cookie, enabled: bool, now: Instant) -> bool {
        if self
            .pending
            .is_some_and(|pending| pending.cookie != cookie)
        {
            return false;
        }
        self.pending = Some(PendingToggle {
            cookie,
            enabled,
            due: now + self.delay,
        });
        true
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<PendingToggle> {
        self.pending
    }

    /// Hands out the pending toggle once its delay has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Option<PendingToggle> {
        match self.pending {
            Some(pending) if pending.due <= now => self.pending.take(),
            _ => None,
        }
    }

    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.pending
            .map(|pending| pending.due.saturating_duration_since(now))
    }
}
