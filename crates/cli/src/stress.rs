use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use msgloop_runtime::EventLoop;
use tracing::{info, warn};

/// Per-producer ordering observed on the loop thread.
#[derive(Debug, Default)]
struct Tally {
    /// Next sequence number expected from each producer.
    next: Vec<usize>,
    received: usize,
    violations: usize,
    off_loop: usize,
}

impl Tally {
    fn new(producers: usize) -> Self {
        Self {
            next: vec![0; producers],
            ..Self::default()
        }
    }

    fn observe(&mut self, producer: usize, seq: usize, on_loop: bool) {
        if seq != self.next[producer] {
            warn!(producer, expected = self.next[producer], got = seq, "out-of-order callback");
            self.violations += 1;
        }
        self.next[producer] = seq + 1;
        self.received += 1;
        if !on_loop {
            self.off_loop += 1;
        }
    }
}

/// Post `per_thread` callbacks from each of `threads` producers concurrently
/// and check that every producer's callbacks ran in the order it posted them.
pub fn run(event_loop: &EventLoop, threads: usize, per_thread: usize) -> Result<()> {
    anyhow::ensure!(threads > 0 && per_thread > 0, "--threads and --per-thread must be positive");
    let total = threads
        .checked_mul(per_thread)
        .context("--threads times --per-thread overflows")?;
    let handle = event_loop.handle();
    let tally = Arc::new(Mutex::new(Tally::new(threads)));
    let barrier = Arc::new(Barrier::new(threads));
    let started = Instant::now();

    let producers = (0..threads)
        .map(|producer| {
            let (handle, tally, barrier) = (handle.clone(), Arc::clone(&tally), Arc::clone(&barrier));
            thread::Builder::new()
                .name(format!("producer-{producer}"))
                .spawn(move || -> Result<()> {
                    barrier.wait();
                    for seq in 0..per_thread {
                        let (tally, inner) = (Arc::clone(&tally), handle.clone());
                        handle.post_callback(
                            move |seq| {
                                let mut tally = tally.lock().unwrap_or_else(|p| p.into_inner());
                                tally.observe(producer, seq, inner.is_loop_thread());
                                if tally.received == total {
                                    inner.request_shutdown();
                                }
                            },
                            seq,
                        )?;
                    }
                    Ok(())
                })
                .context("failed to spawn producer thread")
        })
        .collect::<Result<Vec<_>>>()?;

    event_loop.run().context("event loop failed")?;

    for producer in producers {
        match producer.join() {
            Ok(result) => result?,
            Err(_) => bail!("producer thread panicked"),
        }
    }

    let tally = tally.lock().unwrap_or_else(|p| p.into_inner());
    info!(
        received = tally.received,
        violations = tally.violations,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "stress run finished"
    );
    println!(
        "{} callbacks from {threads} threads in {:.3}s, {} ordering violations",
        tally.received,
        started.elapsed().as_secs_f64(),
        tally.violations
    );

    if tally.received != total {
        bail!("expected {total} callbacks, {} ran", tally.received);
    }
    if tally.off_loop > 0 {
        bail!("{} callbacks ran off the loop thread", tally.off_loop);
    }
    if tally.violations > 0 {
        bail!("{} per-thread ordering violations", tally.violations);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_accepts_interleaved_producers() {
        let mut tally = Tally::new(2);
        for (producer, seq) in [(0, 0), (1, 0), (1, 1), (0, 1), (0, 2)] {
            tally.observe(producer, seq, true);
        }
        assert_eq!(tally.received, 5);
        assert_eq!(tally.violations, 0);
        assert_eq!(tally.off_loop, 0);
    }

    #[test]
    fn overflowing_total_is_rejected() {
        let event_loop = EventLoop::new(msgloop_core::LoopConfig {
            name: "stress-test".into(),
            worker_threads: 1,
            ..Default::default()
        })
        .unwrap();
        let err = run(&event_loop, usize::MAX, 2).unwrap_err();
        assert!(err.to_string().contains("overflows"));
        assert!(!event_loop.is_shutdown_requested());
    }

    #[test]
    fn tally_flags_reordering() {
        let mut tally = Tally::new(1);
        tally.observe(0, 1, true);
        tally.observe(0, 0, false);
        assert_eq!(tally.violations, 2);
        assert_eq!(tally.off_loop, 1);
    }
}
