use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use msgloop_runtime::{EventLoop, LoopConfig, LoopHandle};

pub const WATCHDOG: Duration = Duration::from_secs(10);

pub fn test_loop(name: &str) -> EventLoop {
    let config = LoopConfig {
        name: name.into(),
        worker_threads: 2,
        ..LoopConfig::default()
    };
    EventLoop::new(config).unwrap()
}

/// Shuts the loop down if the test has not finished within [`WATCHDOG`],
/// so a missed wakeup fails the test instead of hanging it.
pub struct Watchdog {
    done: mpsc::Sender<()>,
    thread: JoinHandle<bool>,
}

impl Watchdog {
    pub fn arm(handle: &LoopHandle) -> Self {
        let (done, rx) = mpsc::channel::<()>();
        let handle = handle.clone();
        let thread = thread::spawn(move || match rx.recv_timeout(WATCHDOG) {
            Err(mpsc::RecvTimeoutError::Timeout) => {
                handle.request_shutdown();
                true
            }
            _ => false,
        });
        Self { done, thread }
    }

    /// Stop the watchdog. Panics if it had to shut the loop down.
    pub fn disarm(self) {
        let _ = self.done.send(());
        let tripped = self.thread.join().unwrap();
        assert!(!tripped, "watchdog shut the loop down");
    }
}
