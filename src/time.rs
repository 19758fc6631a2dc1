//! Logical time. The blockmesh protocol has no wall-clock dependency: a
//! `TimeSource` is just whatever the external driver says the current round
//! is, stamped onto blocks at creation and compared during step-2 ordering.

use std::cell::Cell;

pub type Timestamp = u64;

pub trait TimeSource {
    fn time(&self) -> Timestamp;
}

/// A clock that only moves when told to. The round-driver calls
/// `advance_to` once per tick before invoking step-1/step-2.
#[derive(Debug, Default)]
pub struct LogicalClock {
    current: Cell<Timestamp>,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self { current: Cell::new(0) }
    }

    pub fn at(initial: Timestamp) -> Self {
        Self { current: Cell::new(initial) }
    }

    pub fn advance_to(&self, t: Timestamp) {
        self.current.set(t);
    }

    pub fn tick(&self) -> Timestamp {
        let next = self.current.get() + 1;
        self.current.set(next);
        next
    }
}

impl TimeSource for LogicalClock {
    fn time(&self) -> Timestamp {
        self.current.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_only_moves_on_request() {
        let clock = LogicalClock::new();
        assert_eq!(clock.time(), 0);
        clock.advance_to(5);
        assert_eq!(clock.time(), 5);
        assert_eq!(clock.tick(), 6);
    }
}
