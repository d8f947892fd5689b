//! Event numbers and the staleness comparison.
//!
//! A registry hands out strictly increasing event numbers. An entry records
//! the number it saw the last time it was brought up to date; a dependent is
//! fresh relative to a producer when the dependent's number is newer.
//!
//! The counter is a 32-bit signed integer that wraps from `i32::MAX` back to
//! `0`. Comparisons reserve a band of half the positive range: a difference
//! larger than [`WRAP_BAND`] is read as one side having wrapped. No single
//! entity may therefore go through more than `WRAP_BAND` events between two
//! checks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Differences beyond this magnitude are interpreted as wraparound.
pub const WRAP_BAND: i32 = i32::MAX / 2;

/// Snapshot of a registry's event counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventNumber(i32);

impl EventNumber {
    pub const ZERO: EventNumber = EventNumber(0);

    pub fn new(value: i32) -> Self {
        Self(value)
    }

    pub fn value(self) -> i32 {
        self.0
    }

    /// Whether a dependent stamped `self` is fresh relative to `producer`.
    ///
    /// ```text
    /// producer  dependent  result
    /// 11        10         false   producer changed since
    /// 11        11         false
    /// 10        11         true
    /// 0         big        false   producer wrapped, dependent not yet
    /// big       0          true    dependent wrapped, producer not yet
    /// ```
    pub fn up_to_date(self, producer: EventNumber) -> bool {
        let delta = producer.0.wrapping_sub(self.0);

        if delta > WRAP_BAND {
            true
        } else if delta < -WRAP_BAND {
            false
        } else {
            delta < 0
        }
    }

    /// Conjunction of [`up_to_date`](Self::up_to_date) over all producers.
    pub fn up_to_date_all(self, producers: impl IntoIterator<Item = EventNumber>) -> bool {
        producers.into_iter().all(|p| self.up_to_date(p))
    }
}

impl fmt::Display for EventNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic event source owned by one registry.
#[derive(Debug, Clone)]
pub struct EventCounter {
    next: i32,
}

impl Default for EventCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventCounter {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Counter whose next event is `value`.
    pub fn starting_at(value: i32) -> Self {
        Self { next: value.max(0) }
    }

    /// Current event; advances the counter by one.
    pub fn get_event(&mut self) -> EventNumber {
        let current = self.next;
        if current == i32::MAX {
            tracing::warn!("[registry] event counter wrapped around to 0");
            self.next = 0;
        } else {
            self.next += 1;
        }
        EventNumber(current)
    }

    /// The value the next [`get_event`](Self::get_event) will return.
    pub fn peek(&self) -> EventNumber {
        EventNumber(self.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(v: i32) -> EventNumber {
        EventNumber::new(v)
    }

    #[test]
    fn test_normal_ordering() {
        assert!(!ev(10).up_to_date(ev(11)));
        assert!(!ev(11).up_to_date(ev(11)));
        assert!(ev(11).up_to_date(ev(10)));
    }

    #[test]
    fn test_wraparound_bands() {
        // Producer wrapped to a small number; dependent is stale.
        assert!(!ev(i32::MAX - 3).up_to_date(ev(2)));
        // Dependent wrapped past the producer; it is fresh.
        assert!(ev(2).up_to_date(ev(i32::MAX - 3)));
    }

    #[test]
    fn test_up_to_date_all() {
        let dependent = ev(20);
        assert!(dependent.up_to_date_all([ev(3), ev(19)]));
        assert!(!dependent.up_to_date_all([ev(3), ev(21)]));
        assert!(dependent.up_to_date_all(std::iter::empty()));
    }

    #[test]
    fn test_counter_advances_by_one() {
        let mut counter = EventCounter::new();
        let a = counter.get_event();
        let b = counter.get_event();
        assert_eq!(b.value(), a.value() + 1);
        assert_eq!(counter.peek().value(), b.value() + 1);
    }

    #[test]
    fn test_counter_wraps_to_zero() {
        let mut counter = EventCounter::starting_at(i32::MAX - 1);
        assert_eq!(counter.get_event().value(), i32::MAX - 1);
        assert_eq!(counter.get_event().value(), i32::MAX);
        assert_eq!(counter.get_event().value(), 0);
        assert_eq!(counter.get_event().value(), 1);
    }
}
