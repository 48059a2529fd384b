//! Single-shot deadline timers driven by the service loop.

use tokio::time::Instant;

/// A one-shot timer.
///
/// The timer holds only a deadline. The owner's event loop sleeps until the
/// earliest deadline and calls [`expire`](Self::expire) to find out whether a
/// given timer fired; stopping a timer therefore cancels it without any task
/// to abort.
///
/// Deadlines are `tokio` instants by default; wake alarms use boot-time
/// [`Duration`](std::time::Duration)s from a [`Clock`](super::clock::Clock).
#[derive(Debug, Clone)]
pub struct OneShotTimer<T = Instant> {
    deadline: Option<T>,
}

impl<T> Default for OneShotTimer<T> {
    fn default() -> Self {
        Self { deadline: None }
    }
}

impl<T: Copy + Ord> OneShotTimer<T> {
    /// A stopped timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer, replacing any earlier deadline.
    pub fn start(&mut self, deadline: T) {
        self.deadline = Some(deadline);
    }

    /// Disarm the timer.
    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<T> {
        self.deadline
    }

    /// Disarm and return `true` if the deadline is at or before `now`.
    pub fn expire(&mut self, now: T) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Earliest of several optional deadlines.
pub(crate) fn earliest(deadlines: impl IntoIterator<Item = Option<Instant>>) -> Option<Instant> {
    deadlines.into_iter().flatten().min()
}
