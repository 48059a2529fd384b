//! Dark resume event history for throttling.

use std::collections::VecDeque;
use std::time::Duration;

/// Events older than this are never queried and are pruned on insert.
pub const HISTORY_RETENTION: Duration = Duration::from_secs(10 * 60);

/// Boot-clock timestamps of counted dark resumes, oldest first.
///
/// Time since boot includes suspended time, so dark resumes hours apart in
/// suspend never look clustered.
#[derive(Debug, Clone, Default)]
pub struct DarkResumeHistory {
    events: VecDeque<Duration>,
}

impl DarkResumeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event at `now`, dropping events past the retention window.
    pub fn record(&mut self, now: Duration) {
        while let Some(&oldest) = self.events.front() {
            if now.saturating_sub(oldest) <= HISTORY_RETENTION {
                break;
            }
            self.events.pop_front();
        }
        self.events.push_back(now);
    }

    /// Number of events no older than `window` as seen from `now`.
    pub fn count_within(&self, window: Duration, now: Duration) -> usize {
        self.events
            .iter()
            .rev()
            .take_while(|&&t| now.saturating_sub(t) <= window)
            .count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
