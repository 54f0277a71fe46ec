//! A single-slot debouncer.
//!
//! Every [`Debouncer::push`] replaces the pending value and restarts the window, so a burst of
//! triggers collapses to the last one.  Time is `tokio::time::Instant` so paused-clock tests
//! drive it deterministically.

use std::time::Duration;

use tokio::time::Instant;

/// Collapses rapid triggers into one value, released once the window has passed quietly.
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    /// Creates a debouncer with the given quiet window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// The quiet window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Stage `value`, replacing anything pending.  Returns true when a value was replaced.
    pub fn push(&mut self, value: T, now: Instant) -> bool {
        let replaced = self.pending.is_some();
        self.pending = Some((value, now + self.window));
        replaced
    }

    /// When the pending value becomes ready, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }

    /// The pending value, if any.
    pub fn peek(&self) -> Option<&T> {
        self.pending.as_ref().map(|(value, _)| value)
    }

    /// True when nothing is pending.
    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    /// Take the pending value if its window has elapsed at `now`.
    pub fn take_ready(&mut self, now: Instant) -> Option<T> {
        match self.pending {
            Some((_, deadline)) if deadline <= now => self.pending.take().map(|(value, _)| value),
            _ => None,
        }
    }

    /// Drop the pending value without releasing it.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    /// Wait out the window and take the pending value.
    pub async fn settle(&mut self) -> Option<T> {
        let deadline = self.deadline()?;
        tokio::time::sleep_until(deadline).await;
        self.take_ready(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn last_push_wins() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        let start = Instant::now();
        assert!(!debouncer.push("first", start));
        assert!(debouncer.push("second", start + Duration::from_millis(100)));
        assert_eq!(debouncer.peek(), Some(&"second"));

        assert_eq!(debouncer.settle().await, Some("second"));
        assert!(Instant::now() >= start + Duration::from_millis(400));
        assert!(debouncer.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn push_restarts_window() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        let start = Instant::now();
        debouncer.push(1, start);
        debouncer.push(2, start + Duration::from_millis(250));

        assert_eq!(debouncer.take_ready(start + Duration::from_millis(300)), None);
        assert_eq!(
            debouncer.take_ready(start + Duration::from_millis(550)),
            Some(2)
        );
        assert_eq!(debouncer.take_ready(start + Duration::from_secs(10)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_when_idle() {
        let mut debouncer: Debouncer<u32> = Debouncer::new(Duration::from_millis(300));
        assert_eq!(debouncer.settle().await, None);
    }

    #[test]
    fn cancel_discards() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        let now = Instant::now();
        debouncer.push("draft", now);
        assert_eq!(debouncer.cancel(), Some("draft"));
        assert_eq!(debouncer.take_ready(now + Duration::from_secs(1)), None);
    }
}
