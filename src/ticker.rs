use std::time::{Duration, Instant};

/// The recurring render timer.
///
/// The monitor is single-threaded: whoever drives the event loop asks
/// [`Ticker::due`] whether a tick should fire now.
pub trait Ticker {
    fn start(&mut self, period: Duration);

    fn stop(&mut self);

    fn is_active(&self) -> bool;

    /// Returns true at most once per elapsed period while active.
    fn due(&mut self, now: Instant) -> bool;
}

#[derive(Debug, Default)]
pub struct IntervalTicker {
    period: Duration,
    next: Option<Instant>,
}

impl IntervalTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time left until the next tick, if active.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.next.map(|next| next.saturating_duration_since(now))
    }
}

impl Ticker for IntervalTicker {
    fn start(&mut self, period: Duration) {
        self.period = period;
        self.next = Some(Instant::now() + period);
    }

    fn stop(&mut self) {
        self.next = None;
    }

    fn is_active(&self) -> bool {
        self.next.is_some()
    }

    fn due(&mut self, now: Instant) -> bool {
        match self.next {
            Some(next) if now >= next => {
                // Skip missed ticks instead of bursting to catch up.
                let mut following = next + self.period;
                if following <= now {
                    following = now + self.period;
                }
                self.next = Some(following);
                true
            }
            _ => false,
        }
    }
}
