#![allow(missing_docs)]

use std::env;

use parking_lot::Once;

use crate::registry::{self, Registry};

mod anti_semaphore;
pub use anti_semaphore::AntiSemaphore;

mod event_log;
pub use event_log::EventLog;

// Repeat concurrent tests to increase the chance of catching random bugs.
// However, do not rely on test repetitions to assert for behavior;
// use more synchronization where practical.
lazy_static::lazy_static! {
    pub static ref CONCURRENT_TEST_REPETITIONS: usize = (|| {
        if let Ok(count) = env::var("CONCURRENT_TEST_REPETITIONS") {
            if let Ok(count) = count.parse::<usize>() {
                return count;
            }
        }

        if env::var("RUST_LOG").is_ok() { 1 } else { 50 }
    })();
}

pub(crate) fn init() {
    static SET_LOGGER_ONCE: Once = Once::new();
    SET_LOGGER_ONCE.call_once(env_logger::init);
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position(pub f32, pub f32);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Velocity(pub f32, pub f32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Health(pub u32);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Name(pub String);

/// A registry with all test components registered.
pub fn registry() -> Registry {
    init();
    registry_builder().build()
}

pub fn registry_builder() -> registry::Builder {
    Registry::builder()
        .register::<Position>()
        .register::<Velocity>()
        .register::<Health>()
        .register::<Name>()
}
