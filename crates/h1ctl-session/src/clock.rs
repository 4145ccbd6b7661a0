use std::time::Duration;

/// Source of blocking waits for the correlator and sequencer.
///
/// Production code sleeps the thread; tests substitute a clock that only
/// records the requested durations.
pub trait Clock {
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}
