use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::System;
use crate::scheduler::ChainMode;
use crate::{test_util, Config, Error, Scheduler};

fn scheduler() -> Arc<Scheduler> {
    test_util::init();
    let scheduler = Scheduler::new(&Config::default().with_concurrency(1));
    for chain in ["update", "render"] {
        scheduler.create_chain(chain, ChainMode::Main).expect("distinct chains");
    }
    Arc::new(scheduler)
}

fn counter_callback(counter: &Arc<AtomicUsize>) -> impl FnMut(Duration) + Send + 'static {
    let counter = Arc::clone(counter);
    move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_create_and_destroy_process() {
    let scheduler = scheduler();
    let mut system = System::new("movement", Arc::clone(&scheduler));
    let counter = Arc::new(AtomicUsize::new(0));

    let id = system
        .create_process("update", "step", Duration::ZERO, counter_callback(&counter))
        .expect("chain exists");
    assert_eq!(system.processes().collect::<Vec<_>>(), vec![(id, "update")]);

    assert_eq!(scheduler.tick_main(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    system.destroy_process(id).expect("created above");
    assert_eq!(scheduler.tick_main(), 0);
    assert_eq!(system.destroy_process(id), Err(Error::UnknownProcess(id)));
}

#[test]
fn test_unknown_chain() {
    let scheduler = scheduler();
    let mut system = System::new("movement", scheduler);
    let counter = Arc::new(AtomicUsize::new(0));

    let result =
        system.create_process("physics", "step", Duration::ZERO, counter_callback(&counter));
    assert_eq!(result, Err(Error::UnknownChain("physics".into())));
    assert_eq!(system.processes().count(), 0);
}

#[test]
fn test_duplicate_process() {
    let scheduler = scheduler();
    let mut system = System::new("movement", Arc::clone(&scheduler));
    let counter = Arc::new(AtomicUsize::new(0));

    let id = system
        .create_process("update", "step", Duration::ZERO, counter_callback(&counter))
        .expect("chain exists");
    let result =
        system.create_process("update", "step", Duration::ZERO, counter_callback(&counter));
    assert_eq!(result, Err(Error::DuplicateProcess(id)));

    system
        .create_process("update", "step", Duration::from_millis(5), counter_callback(&counter))
        .expect("a different interval is a different process");
    assert_eq!(system.processes().count(), 2);

    let result =
        system.create_process("render", "step", Duration::ZERO, counter_callback(&counter));
    assert_eq!(result, Err(Error::DuplicateProcess(id)), "ids are unique per system");
    assert!(scheduler.chain("render").expect("chain exists").is_empty());
}

#[test]
fn test_same_name_different_owner() {
    let scheduler = scheduler();
    let mut first = System::new("first", Arc::clone(&scheduler));
    let mut second = System::new("second", Arc::clone(&scheduler));
    let counter = Arc::new(AtomicUsize::new(0));

    for system in [&mut first, &mut second] {
        system
            .create_process("update", "step", Duration::ZERO, counter_callback(&counter))
            .expect("owners differ");
    }
    assert_eq!(scheduler.tick_main(), 2);
}

#[test]
fn test_drop_unhooks_processes() {
    let scheduler = scheduler();
    let counter = Arc::new(AtomicUsize::new(0));

    {
        let mut system = System::new("movement", Arc::clone(&scheduler));
        for chain in ["update", "render"] {
            system
                .create_process(chain, chain, Duration::ZERO, counter_callback(&counter))
                .expect("chain exists");
        }
        assert_eq!(scheduler.tick_main(), 2);
    }

    assert_eq!(scheduler.tick_main(), 0);
    for chain in ["update", "render"] {
        assert!(scheduler.chain(chain).expect("chain exists").is_empty());
    }
}

#[test]
fn test_wait_for_sync() {
    let scheduler = scheduler();
    let system = System::new("observer", Arc::clone(&scheduler));

    let waiter = thread::spawn(move || system.wait_for_sync());

    let deadline = Instant::now() + Duration::from_secs(10);
    while !waiter.is_finished() {
        assert!(Instant::now() < deadline, "system was never released");
        scheduler.tick_main();
    }
    waiter.join().expect("waiter panicked");
}
