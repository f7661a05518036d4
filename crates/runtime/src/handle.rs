//! The scheduling facade: the only way producers talk to a running loop.
//!
//! A [`LoopHandle`] is cheap to clone and can be moved to any thread,
//! including into callbacks running on the loop itself. None of its methods
//! wait for a callback to run.

use std::sync::Arc;
use std::time::Duration;

use msgloop_core::LoopError;
use tracing::debug;

use crate::message::{timer_callback, Message};
use crate::metrics::LoopMetrics;
use crate::shared::Shared;
use crate::timer::TimerId;

/// Cloneable handle to an [`EventLoop`](crate::EventLoop).
#[derive(Clone)]
pub struct LoopHandle {
    pub(crate) shared: Arc<Shared>,
}

impl LoopHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Queue `callback(payload)` to run on the loop thread.
    ///
    /// Callbacks posted from one thread run in the order they were posted.
    /// Fails with [`LoopError::Closed`] after shutdown has been requested.
    pub fn post_callback<F, T>(&self, callback: F, payload: T) -> Result<(), LoopError>
    where
        F: FnOnce(T) + Send + 'static,
        T: Send + 'static,
    {
        self.shared.queue.enqueue(Message::new(callback, payload))
    }

    /// Queue a closure with no separate payload.
    pub fn post<F>(&self, callback: F) -> Result<(), LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_callback(move |()| callback(), ())
    }

    /// Arm a timer that fires `interval` from now, and every `interval`
    /// after that if `repeating`.
    ///
    /// Each firing runs `callback(id, &mut payload)` on the loop thread. The
    /// returned id is unique for the lifetime of the loop. A zero interval
    /// is rejected with [`LoopError::InvalidInterval`].
    pub fn set_timer<F, T>(
        &self,
        interval: Duration,
        repeating: bool,
        callback: F,
        payload: T,
    ) -> Result<TimerId, LoopError>
    where
        F: FnMut(TimerId, &mut T) + Send + 'static,
        T: Send + 'static,
    {
        let id = self
            .shared
            .registry
            .arm(interval, repeating, timer_callback(callback, payload))?;
        if let Ok(mut m) = self.shared.metrics.write() {
            m.timers_armed += 1;
        }
        Ok(id)
    }

    /// Arm a one-shot timer running `callback` once after `delay`.
    pub fn set_timeout<F>(&self, delay: Duration, callback: F) -> Result<TimerId, LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.set_timer(
            delay,
            false,
            |_, callback: &mut Option<F>| {
                if let Some(callback) = callback.take() {
                    callback();
                }
            },
            Some(callback),
        )
    }

    /// Cancel a timer. Returns `true` if it was armed.
    ///
    /// Firings already sitting in the queue are skipped when they reach the
    /// loop. Called on the loop thread (from any callback) this is exact: the
    /// timer's callback never runs again. Called from another thread, a
    /// firing the loop is dispatching at that moment may still run once.
    pub fn cancel_timer(&self, id: TimerId) -> bool {
        let found = self.shared.registry.cancel(id);
        if found {
            if let Ok(mut m) = self.shared.metrics.write() {
                m.timers_cancelled += 1;
            }
        }
        found
    }

    /// Run `work` on the worker pool and post `on_done(result)` back to the
    /// loop thread.
    ///
    /// Keeps long computations off the loop thread while the continuation
    /// still runs with the loop's single-thread guarantee. If the loop shuts
    /// down before `work` finishes, `on_done` is dropped without running.
    pub fn offload<W, R, D>(&self, work: W, on_done: D) -> Result<(), LoopError>
    where
        W: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
        D: FnOnce(R) + Send + 'static,
    {
        if self.shared.is_shutdown() {
            return Err(LoopError::Closed);
        }
        let shared = Arc::clone(&self.shared);
        self.shared.pool.spawn(move || {
            let result = work();
            if shared.queue.enqueue(Message::new(on_done, result)).is_err() {
                debug!("loop shut down before offloaded work finished");
            }
        });
        Ok(())
    }

    /// Ask the loop to stop. Callable from any thread, including from a
    /// callback; calling it again has no effect.
    ///
    /// The loop finishes the batch it is executing, then returns from
    /// [`EventLoop::run`](crate::EventLoop::run). Messages still queued are
    /// discarded and pending timers never fire.
    pub fn request_shutdown(&self) {
        self.shared.request_shutdown();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shared.is_shutdown()
    }

    /// Whether the caller is the thread currently running the loop.
    pub fn is_loop_thread(&self) -> bool {
        self.shared.is_loop_thread()
    }

    /// Snapshot of the loop's counters.
    pub fn metrics(&self) -> LoopMetrics {
        self.shared.metrics_snapshot()
    }
}

impl std::fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHandle")
            .field("name", &self.shared.config.name)
            .field("shutdown", &self.shared.is_shutdown())
            .finish()
    }
}
