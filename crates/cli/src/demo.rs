use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use msgloop_runtime::{EventLoop, LoopHandle, TimerId};
use tracing::info;

/// One-shot delays in milliseconds before scaling.
const ONE_SHOTS: [u64; 3] = [1000, 1500, 2000];
const SHUTDOWN_AFTER_MS: u64 = 9000;

fn scaled(ms: u64, scale: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(ms as f64 * scale / 1000.0)
        .with_context(|| format!("--scale {scale} puts a {ms}ms delay out of range"))
}

/// Arm the demo timers from a callback on the loop thread and run until the
/// shutdown timer fires.
pub fn run(event_loop: &EventLoop, scale: f64) -> Result<()> {
    anyhow::ensure!(scale.is_finite() && scale > 0.0, "--scale must be a positive number");
    // Reject an unusable scale before anything is armed.
    scaled(SHUTDOWN_AFTER_MS, scale)?;
    anyhow::ensure!(
        !scaled(ONE_SHOTS[0], scale)?.is_zero(),
        "--scale {scale} rounds the shortest delay down to zero"
    );

    let handle = event_loop.handle();
    let started = Instant::now();
    let bootstrap = handle.clone();
    handle
        .post(move || {
            if let Err(e) = arm_timers(&bootstrap, started, scale) {
                tracing::error!(error = %e, "failed to arm demo timers");
                bootstrap.request_shutdown();
            }
        })
        .context("failed to post bootstrap callback")?;

    event_loop.run().context("event loop failed")?;
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "demo finished");
    Ok(())
}

fn arm_timers(handle: &LoopHandle, started: Instant, scale: f64) -> Result<()> {
    for ms in ONE_SHOTS {
        let delay = scaled(ms, scale)?;
        handle.set_timer(
            delay,
            false,
            move |id: TimerId, _: &mut ()| {
                println!(
                    "timer {id} ({}ms) fired after {:.3}s",
                    delay.as_millis(),
                    started.elapsed().as_secs_f64()
                );
            },
            (),
        )?;
    }

    let stopper = handle.clone();
    let delay = scaled(SHUTDOWN_AFTER_MS, scale)?;
    handle.set_timeout(delay, move || {
        println!(
            "shutdown timer fired after {:.3}s",
            started.elapsed().as_secs_f64()
        );
        stopper.request_shutdown();
    })?;
    Ok(())
}
