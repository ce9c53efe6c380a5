use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{select, Receiver};

use super::Command;
use crate::job::JobPool;
use crate::tracer::{self, Tracer};

/// How long an idle worker blocks before checking the exit flag again.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

pub(super) struct Context {
    pub(super) thread:   tracer::Thread,
    pub(super) commands: Receiver<Command>,
    pub(super) jobs:     Receiver<Arc<JobPool>>,
    pub(super) exit:     Arc<AtomicBool>,
    pub(super) tracer:   Arc<dyn Tracer>,
}

pub(super) fn run(context: Context) {
    let name = std::thread::current().name().unwrap_or("worker").to_string();
    context.tracer.start_thread(context.thread, &name);

    while !context.exit.load(Ordering::Acquire) {
        select! {
            recv(context.commands) -> command => match command {
                Ok(command) => command(),
                // the scheduler dropped the queue during shutdown
                Err(_) => break,
            },
            recv(context.jobs) -> pool => {
                if let Ok(pool) = pool {
                    let ran = pool.drain();
                    log::trace!("{:?} ran {ran} of {} jobs", context.thread, pool.len());
                }
            },
            default(POLL_INTERVAL) => {},
        }
    }

    context.tracer.end_thread(context.thread, &name);
}
