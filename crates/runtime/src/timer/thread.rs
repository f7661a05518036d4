use std::sync::Arc;
use std::thread::{self, JoinHandle};

use msgloop_core::LoopError;
use tracing::{debug, info};

use crate::shared::Shared;

/// Start the timer thread for `shared`.
///
/// The thread runs until the registry is closed by a shutdown request.
pub(crate) fn spawn_timer_thread(shared: Arc<Shared>) -> Result<JoinHandle<()>, LoopError> {
    let name = format!("{}-timer", shared.config.name);
    let handle = thread::Builder::new()
        .name(name)
        .spawn(move || run(&shared))?;
    Ok(handle)
}

fn run(shared: &Shared) {
    debug!(loop_name = %shared.config.name, "timer thread started");

    // The registry lock is released by the time a batch comes back, so the
    // queue lock below is never taken while holding it.
    while let Some(mut batch) = shared.registry.next_due() {
        let fired = batch.messages.len();
        if fired == 0 {
            continue;
        }
        if let Ok(mut m) = shared.metrics.write() {
            m.record_fired(fired, batch.missed_ticks);
        }
        let messages = std::mem::take(&mut batch.messages);
        if shared.queue.enqueue_batch(messages).is_err() {
            debug!(fired, "message queue closed, dropping timer firings");
            break;
        }
    }

    info!(loop_name = %shared.config.name, "timer thread exit");
}
