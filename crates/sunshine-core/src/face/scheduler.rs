//! Two single-shot timers, one per tick kind.
//!
//! Each kind has at most one pending deadline. Posting a kind replaces its
//! pending deadline, so repeated posts between fires never pile up.

use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    /// Redraw the clock
    Time,
    /// Refresh the forecast
    Forecast,
}

/// Delay from `now` to the next multiple of `interval`, in `1..=interval`.
///
/// An instant sitting exactly on a boundary waits a full interval.
pub fn delay_to_boundary(now_millis: i64, interval_ms: i64) -> i64 {
    interval_ms - now_millis.rem_euclid(interval_ms)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickScheduler {
    time: Option<i64>,
    forecast: Option<i64>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, kind: TickKind) -> &mut Option<i64> {
        match kind {
            TickKind::Time => &mut self.time,
            TickKind::Forecast => &mut self.forecast,
        }
    }

    /// Schedule `kind` at `due_millis`, replacing any pending deadline.
    pub fn post(&mut self, kind: TickKind, due_millis: i64) {
        trace!(" Posting {:?} at {}", kind, due_millis);
        *self.slot(kind) = Some(due_millis);
    }

    pub fn cancel(&mut self, kind: TickKind) {
        *self.slot(kind) = None;
    }

    pub fn cancel_all(&mut self) {
        self.time = None;
        self.forecast = None;
    }

    pub fn pending(&self, kind: TickKind) -> Option<i64> {
        match kind {
            TickKind::Time => self.time,
            TickKind::Forecast => self.forecast,
        }
    }

    pub fn pending_count(&self) -> usize {
        usize::from(self.time.is_some()) + usize::from(self.forecast.is_some())
    }

    /// Earliest pending deadline of either kind.
    pub fn next_deadline(&self) -> Option<i64> {
        match (self.time, self.forecast) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Take every kind whose deadline has passed, TIME first.
    pub fn fire_due(&mut self, now_millis: i64) -> heapless::Vec<TickKind, 2> {
        let mut due = heapless::Vec::new();
        for kind in [TickKind::Time, TickKind::Forecast] {
            let slot = self.slot(kind);
            if slot.is_some_and(|deadline| deadline <= now_millis) {
                *slot = None;
                // Capacity matches the number of kinds
                let _ = due.push(kind);
            }
        }
        due
    }
}
