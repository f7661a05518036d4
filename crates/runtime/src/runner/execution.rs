use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Instant;

use msgloop_core::{LoopError, PanicPolicy};
use tracing::{debug, error, info, warn};

use crate::message::Message;
use crate::shared::panic_message;

use super::EventLoop;

/// Marks the calling thread as the loop thread for the duration of `run`.
struct RunGuard<'a> {
    event_loop: &'a EventLoop,
}

impl<'a> RunGuard<'a> {
    fn enter(event_loop: &'a EventLoop) -> Result<Self, LoopError> {
        if event_loop
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LoopError::AlreadyRunning);
        }
        if let Ok(mut current) = event_loop.shared.loop_thread.write() {
            *current = Some(thread::current().id());
        }
        Ok(Self { event_loop })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut current) = self.event_loop.shared.loop_thread.write() {
            *current = None;
        }
        self.event_loop.running.store(false, Ordering::Release);
    }
}

impl EventLoop {
    /// Run the loop on the calling thread. Blocks until shutdown.
    ///
    /// Each cycle drains every queued message and executes them in order
    /// before blocking again. Shutdown is checked between batches, so a
    /// callback that requests it still lets the rest of its batch run.
    /// Returns after the timer thread has been joined.
    ///
    /// Only one thread may run a loop at a time; a concurrent call fails
    /// with [`LoopError::AlreadyRunning`].
    pub fn run(&self) -> Result<(), LoopError> {
        let _guard = RunGuard::enter(self)?;
        info!(loop_name = %self.shared.config.name, "event loop started");

        let outcome = self.dispatch();

        self.shared.request_shutdown();
        self.join();
        info!(
            loop_name = %self.shared.config.name,
            executed = self.metrics().executed(),
            "event loop stopped"
        );
        outcome
    }

    fn dispatch(&self) -> Result<(), LoopError> {
        while !self.shared.is_shutdown() {
            let batch = self.shared.queue.drain_all();
            if batch.is_empty() {
                continue;
            }
            debug!(batch = batch.len(), "dispatching batch");
            if let Ok(mut m) = self.shared.metrics.write() {
                m.record_batch(batch.len());
            }

            for message in batch {
                if let Err(panic) = self.execute(message) {
                    if self.shared.config.on_panic == PanicPolicy::Propagate {
                        return Err(LoopError::CallbackPanicked(panic));
                    }
                }
            }
        }
        Ok(())
    }

    /// Run one message's callback, applying the loop's panic policy.
    ///
    /// Returns the panic message if the callback panicked.
    fn execute(&self, message: Message) -> Result<(), String> {
        let origin = message.origin();
        if message.is_cancelled() {
            debug!(%origin, "skipping firing of cancelled timer");
            if let Ok(mut m) = self.shared.metrics.write() {
                m.cancelled_skipped += 1;
            }
            return Ok(());
        }

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| message.run()));
        let elapsed = started.elapsed();

        let slow = self
            .shared
            .config
            .slow_callback_threshold()
            .is_some_and(|threshold| elapsed > threshold);
        if slow {
            warn!(
                %origin,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow callback held up the loop; offload long work instead"
            );
        }

        if let Ok(mut m) = self.shared.metrics.write() {
            m.record_execution(origin, elapsed, slow);
            if result.is_err() {
                m.callback_panics += 1;
            }
        }

        result.map_err(|payload| {
            let text = panic_message(payload.as_ref());
            error!(%origin, panic = %text, policy = ?self.shared.config.on_panic, "callback panicked");
            text
        })
    }
}
