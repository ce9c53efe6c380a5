//! Runtime configuration.

use std::env;
use std::str::FromStr;


/// Configures the scheduler of a [`Context`](crate::Context).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Hardware threads left for the OS and the main thread.
    pub reserved_threads: usize,
    /// Overrides the detected hardware concurrency.
    pub concurrency:      Option<usize>,
    /// Number of ranks of the tick barrier, at least 2.
    pub max_rank:         usize,
    /// Whether threaded chains yield between ticks instead of spinning.
    pub low_power:        bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { reserved_threads: 2, concurrency: None, max_rank: 16, low_power: false }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let value = env::var(name).ok()?;
    match value.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring invalid value {value:?} of {name}");
            None
        }
    }
}

impl Config {
    /// Reads the default configuration, overridden by the environment variables
    /// `KINETIC_RESERVED_THREADS`, `KINETIC_CONCURRENCY`, `KINETIC_MAX_RANK`
    /// and `KINETIC_LOW_POWER`.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(reserved) = parse_env("KINETIC_RESERVED_THREADS") {
            config.reserved_threads = reserved;
        }
        if let Some(concurrency) = parse_env("KINETIC_CONCURRENCY") {
            config.concurrency = Some(concurrency);
        }
        if let Some(max_rank) = parse_env("KINETIC_MAX_RANK") {
            config.max_rank = max_rank;
        }
        if let Some(low_power) = parse_env("KINETIC_LOW_POWER") {
            config.low_power = low_power;
        }
        config
    }

    /// Sets [`reserved_threads`](Self::reserved_threads).
    pub fn with_reserved_threads(mut self, reserved_threads: usize) -> Self {
        self.reserved_threads = reserved_threads;
        self
    }

    /// Sets [`concurrency`](Self::concurrency).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Sets [`max_rank`](Self::max_rank).
    pub fn with_max_rank(mut self, max_rank: usize) -> Self {
        self.max_rank = max_rank;
        self
    }

    /// Sets [`low_power`](Self::low_power).
    pub fn with_low_power(mut self, low_power: bool) -> Self {
        self.low_power = low_power;
        self
    }

    /// The hardware concurrency, or the configured override.
    pub fn concurrency(&self) -> usize {
        if let Some(concurrency) = self.concurrency {
            return concurrency;
        }

        match std::thread::available_parallelism() {
            Ok(c) => c.get(),
            Err(err) => {
                log::error!("Cannot detect number of CPUs ({err}), parallelism disabled");
                1
            }
        }
    }

    /// Number of threads the scheduler may spawn, which is never less than 1.
    pub fn thread_budget(&self) -> usize {
        self.concurrency().saturating_sub(self.reserved_threads).max(1)
    }
}
