use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::thread::{self, ThreadId};

use msgloop_core::{LoopConfig, LoopError};
use tracing::{error, info};

use crate::metrics::LoopMetrics;
use crate::queue::MessageQueue;
use crate::timer::TimerRegistry;

/// State shared by the loop thread, the timer thread, the worker pool and
/// every [`LoopHandle`](crate::LoopHandle).
pub(crate) struct Shared {
    pub(crate) config: LoopConfig,
    pub(crate) queue: MessageQueue,
    pub(crate) registry: TimerRegistry,
    /// Process-wide stop flag for this loop; set once, never cleared.
    pub(crate) shutdown: AtomicBool,
    pub(crate) metrics: RwLock<LoopMetrics>,
    /// Thread currently inside `EventLoop::run`, if any.
    pub(crate) loop_thread: RwLock<Option<ThreadId>>,
    /// Pool for work offloaded from callbacks.
    pub(crate) pool: rayon::ThreadPool,
}

impl Shared {
    pub(crate) fn new(config: LoopConfig) -> Result<Self, LoopError> {
        let prefix = config.name.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.resolved_worker_threads())
            .thread_name(move |i| format!("{prefix}-worker-{i}"))
            .panic_handler(|payload| {
                error!(panic = %panic_message(payload.as_ref()), "offloaded work panicked");
            })
            .build()
            .map_err(|e| LoopError::WorkerPool(e.to_string()))?;

        Ok(Self {
            config,
            queue: MessageQueue::new(),
            registry: TimerRegistry::new(),
            shutdown: AtomicBool::new(false),
            metrics: RwLock::new(LoopMetrics::default()),
            loop_thread: RwLock::new(None),
            pool,
        })
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Set the stop flag and wake both blocked threads. Idempotent.
    pub(crate) fn request_shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(loop_name = %self.config.name, "shutdown requested");
        self.registry.close();
        let discarded = self.queue.close();
        if discarded > 0 {
            info!(discarded, "dropped messages still queued at shutdown");
        }
    }

    pub(crate) fn is_loop_thread(&self) -> bool {
        self.loop_thread
            .read()
            .map(|current| *current == Some(thread::current().id()))
            .unwrap_or(false)
    }

    pub(crate) fn metrics_snapshot(&self) -> LoopMetrics {
        let mut snapshot = self
            .metrics
            .read()
            .map(|m| m.clone())
            .unwrap_or_default();
        snapshot.pending_messages = self.queue.len();
        snapshot.armed_timers = self.registry.len();
        snapshot
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
