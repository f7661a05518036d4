//! Integration tests for callback ordering and thread affinity.

mod common;

use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use common::{test_loop, Watchdog};

#[test]
fn single_producer_callbacks_run_in_post_order() {
    let event_loop = test_loop("fifo");
    let handle = event_loop.handle();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..500u32 {
        let sink = Arc::clone(&seen);
        handle
            .post_callback(move |n| sink.lock().unwrap().push(n), i)
            .unwrap();
    }
    let stopper = handle.clone();
    handle.post(move || stopper.request_shutdown()).unwrap();

    let watchdog = Watchdog::arm(&handle);
    event_loop.run().unwrap();
    watchdog.disarm();

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, (0..500).collect::<Vec<_>>());
}

#[test]
fn concurrent_producers_keep_per_thread_order() {
    const THREADS: usize = 10;
    const PER_THREAD: usize = 100;

    let event_loop = test_loop("producers");
    let handle = event_loop.handle();
    let seen: Arc<Mutex<Vec<(usize, usize, bool)>>> = Arc::new(Mutex::new(Vec::new()));
    let barrier = Arc::new(Barrier::new(THREADS));

    let producers: Vec<_> = (0..THREADS)
        .map(|producer| {
            let (handle, seen, barrier) = (handle.clone(), Arc::clone(&seen), Arc::clone(&barrier));
            thread::spawn(move || {
                barrier.wait();
                for seq in 0..PER_THREAD {
                    let (sink, inner) = (Arc::clone(&seen), handle.clone());
                    handle
                        .post(move || {
                            let on_loop = inner.is_loop_thread();
                            let mut seen = sink.lock().unwrap();
                            seen.push((producer, seq, on_loop));
                            if seen.len() == THREADS * PER_THREAD {
                                inner.request_shutdown();
                            }
                        })
                        .unwrap();
                }
            })
        })
        .collect();

    let watchdog = Watchdog::arm(&handle);
    event_loop.run().unwrap();
    watchdog.disarm();
    for producer in producers {
        producer.join().unwrap();
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), THREADS * PER_THREAD);
    assert!(seen.iter().all(|&(_, _, on_loop)| on_loop));

    let mut next = [0usize; THREADS];
    for &(producer, seq, _) in seen.iter() {
        assert_eq!(seq, next[producer], "producer {producer} ran out of order");
        next[producer] += 1;
    }
    assert_eq!(event_loop.metrics().posted_executed, (THREADS * PER_THREAD) as u64);
}

#[test]
fn loop_thread_is_the_caller_of_run() {
    let event_loop = test_loop("affinity");
    let handle = event_loop.handle();
    let runner_id = thread::current().id();
    let ids = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..3 {
        let sink = Arc::clone(&ids);
        handle
            .set_timeout(std::time::Duration::from_millis(5), move || {
                sink.lock().unwrap().push(thread::current().id());
            })
            .unwrap();
    }
    let (sink, stopper) = (Arc::clone(&ids), handle.clone());
    handle
        .set_timeout(std::time::Duration::from_millis(50), move || {
            sink.lock().unwrap().push(thread::current().id());
            stopper.request_shutdown();
        })
        .unwrap();

    let watchdog = Watchdog::arm(&handle);
    event_loop.run().unwrap();
    watchdog.disarm();

    let ids = ids.lock().unwrap();
    assert_eq!(ids.len(), 4);
    assert!(ids.iter().all(|id| *id == runner_id));
}
