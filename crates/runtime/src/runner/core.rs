use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use msgloop_core::{LoopConfig, LoopError};
use tracing::{error, info};

use crate::handle::LoopHandle;
use crate::metrics::LoopMetrics;
use crate::shared::Shared;
use crate::timer::spawn_timer_thread;

/// A single-consumer event loop.
///
/// Creating the loop starts its timer thread and worker pool. Callbacks
/// queued through a [`LoopHandle`] only execute once some thread calls
/// [`EventLoop::run`], and then only on that thread.
pub struct EventLoop {
    pub(super) shared: Arc<Shared>,
    /// Timer thread, taken when joined.
    pub(super) timer_thread: Mutex<Option<JoinHandle<()>>>,
    /// Set while a thread is inside `run`.
    pub(super) running: AtomicBool,
}

impl EventLoop {
    /// Create a loop with the given config and start its timer thread.
    pub fn new(config: LoopConfig) -> Result<Self, LoopError> {
        config.validate()?;
        let shared = Arc::new(Shared::new(config)?);
        let timer_thread = spawn_timer_thread(Arc::clone(&shared))?;
        info!(
            loop_name = %shared.config.name,
            worker_threads = shared.pool.current_num_threads(),
            "event loop created"
        );

        Ok(Self {
            shared,
            timer_thread: Mutex::new(Some(timer_thread)),
            running: AtomicBool::new(false),
        })
    }

    /// Get a handle for posting callbacks and arming timers.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle::new(Arc::clone(&self.shared))
    }

    /// Signal the loop to stop. See [`LoopHandle::request_shutdown`].
    pub fn request_shutdown(&self) {
        self.shared.request_shutdown();
    }

    /// Wait for the timer thread to exit. Only returns promptly after
    /// shutdown has been requested.
    pub fn join(&self) {
        let handle = match self.timer_thread.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(loop_name = %self.shared.config.name, "timer thread panicked");
            }
        }
    }

    /// Get a snapshot of the current loop metrics.
    pub fn metrics(&self) -> LoopMetrics {
        self.shared.metrics_snapshot()
    }

    pub fn config(&self) -> &LoopConfig {
        &self.shared.config
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shared.is_shutdown()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.shared.request_shutdown();
        self.join();
    }
}
