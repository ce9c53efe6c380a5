use std::cell::Cell;
use std::hint;
use std::thread;

/// Number of doubling rounds spent in `spin_loop` before the thread starts yielding.
const SPIN_LIMIT: u32 = 6;

/// Exponential backoff for busy-wait loops.
///
/// The first few rounds only issue CPU spin hints.
/// Once the spin budget is exhausted, every round yields the thread to the OS scheduler.
#[derive(Debug, Default)]
pub struct Backoff {
    step: Cell<u32>,
}

impl Backoff {
    /// Creates a fresh backoff state.
    pub fn new() -> Self { Self::default() }

    /// Resets the backoff to the spinning phase.
    pub fn reset(&self) { self.step.set(0); }

    /// Waits for a short while, spinning first and yielding once spinning stops paying off.
    pub fn snooze(&self) {
        let step = self.step.get();
        if step <= SPIN_LIMIT {
            for _ in 0..1 << step {
                hint::spin_loop();
            }
            self.step.set(step + 1);
        } else {
            thread::yield_now();
        }
    }

    /// Spins without ever yielding the thread.
    ///
    /// Used by real-time waiters that trade power for latency.
    pub fn spin(&self) {
        let step = self.step.get().min(SPIN_LIMIT);
        for _ in 0..1 << step {
            hint::spin_loop();
        }
        if step < SPIN_LIMIT {
            self.step.set(step + 1);
        }
    }
}
