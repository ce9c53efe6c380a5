use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Blocks until `saturation` threads are waiting at the same time.
///
/// Used to prove that code paths run concurrently:
/// if one thread held the others out, the semaphore would never saturate.
#[derive(Debug)]
pub struct AntiSemaphore {
    saturation: usize,
    state:      Mutex<State>,
    condvar:    Condvar,
}

#[derive(Debug, Default)]
struct State {
    current:    usize,
    generation: usize,
}

impl AntiSemaphore {
    /// Creates a semaphore that saturates once `saturation` threads wait on it.
    pub fn new(saturation: usize) -> Self {
        Self { saturation, state: Mutex::new(State::default()), condvar: Condvar::new() }
    }

    /// Blocks until the semaphore is saturated.
    ///
    /// # Panics
    /// Panics if the semaphore is not saturated within 5 seconds.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        log::trace!(
            "AntiSemaphore(current: {}, saturation: {}).wait()",
            state.current,
            self.saturation
        );

        state.current += 1;
        if state.current == self.saturation {
            state.current = 0;
            state.generation += 1;
            self.condvar.notify_all();
            return;
        }

        let generation = state.generation;
        let deadline = Instant::now() + Duration::from_secs(5);
        while state.generation == generation {
            if self.condvar.wait_until(&mut state, deadline).timed_out() {
                panic!("Deadlock: AntiSemaphore not saturated for more than 5 seconds");
            }
        }
    }
}
