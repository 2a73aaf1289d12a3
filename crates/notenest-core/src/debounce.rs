/// Trailing debounce with cancel, driven by explicit `Instant`s.
///
/// The host loop polls the debouncer instead of arming a timer, the same
/// way periodic flush and auto-save checks compare `Instant`s each frame.
use std::time::{Duration, Instant};

/// Holds the latest scheduled value until it has been stable for `window`.
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Replaces the pending value and restarts the quiet period at `now`.
    pub fn schedule(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.window));
    }

    /// Returns the pending value once its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        if self.deadline().is_some_and(|deadline| now >= deadline) {
            self.flush()
        } else {
            None
        }
    }

    /// Takes the pending value without waiting for the deadline.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    /// Discards the pending value, returning it.
    pub fn cancel(&mut self) -> Option<T> {
        self.flush()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref().map(|(value, _)| value)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(300);

    #[test]
    fn test_poll_before_deadline_returns_none() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.schedule("a", start);

        assert_eq!(debouncer.poll(start + Duration::from_millis(299)), None);
        assert!(debouncer.is_pending());
    }

    #[test]
    fn test_poll_at_deadline_fires_once() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.schedule("a", start);

        assert_eq!(debouncer.poll(start + WINDOW), Some("a"));
        assert_eq!(debouncer.poll(start + WINDOW * 2), None);
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_schedule_restarts_window_and_keeps_latest() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.schedule("h", start);
        debouncer.schedule("he", start + Duration::from_millis(200));
        debouncer.schedule("hey", start + Duration::from_millis(400));

        assert_eq!(debouncer.poll(start + Duration::from_millis(600)), None);
        assert_eq!(
            debouncer.deadline(),
            Some(start + Duration::from_millis(700))
        );
        assert_eq!(debouncer.poll(start + Duration::from_millis(700)), Some("hey"));
    }

    #[test]
    fn test_flush_ignores_deadline() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.schedule(1, start);

        assert_eq!(debouncer.flush(), Some(1));
        assert_eq!(debouncer.flush(), None);
    }

    #[test]
    fn test_cancel_discards_pending() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.schedule(1, start);

        assert_eq!(debouncer.cancel(), Some(1));
        assert_eq!(debouncer.poll(start + WINDOW), None);
        assert!(debouncer.deadline().is_none());
    }

    #[test]
    fn test_pending_peek() {
        let mut debouncer = Debouncer::new(WINDOW);
        assert!(debouncer.pending().is_none());
        debouncer.schedule(String::from("note"), Instant::now());
        assert_eq!(debouncer.pending().map(String::as_str), Some("note"));
        assert_eq!(debouncer.window(), WINDOW);
    }
}
