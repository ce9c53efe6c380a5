use std::fmt;

use parking_lot::Mutex;

/// Records events from multiple threads in the order they happened.
pub struct EventLog<T: fmt::Debug + PartialEq> {
    events: Mutex<Vec<T>>,
}

impl<T: fmt::Debug + PartialEq> Default for EventLog<T> {
    fn default() -> Self { Self { events: Mutex::new(Vec::new()) } }
}

impl<T: fmt::Debug + PartialEq> EventLog<T> {
    /// Records that `event` has happened.
    pub fn trace(&self, event: T) {
        log::trace!("event {event:?}");
        self.events.lock().push(event);
    }

    /// Counts the occurrences of `event`.
    pub fn count(&self, event: &T) -> usize {
        self.events.lock().iter().filter(|&seen| seen == event).count()
    }

    /// Asserts that every occurrence of `before` precedes every occurrence of `after`.
    ///
    /// # Panics
    /// Panics if either event never happened or the order is violated.
    pub fn assert_before(&self, before: &T, after: &T) {
        let events = self.events.lock();
        let last_before = events
            .iter()
            .rposition(|seen| seen == before)
            .unwrap_or_else(|| panic!("{before:?} never happened"));
        let first_after = events
            .iter()
            .position(|seen| seen == after)
            .unwrap_or_else(|| panic!("{after:?} never happened"));
        assert!(last_before < first_after, "{after:?} should happen after {before:?}");
    }

    /// Returns the events observed in this log.
    pub fn into_events(self) -> Vec<T> { self.events.into_inner() }
}
