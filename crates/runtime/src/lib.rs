//! Single-consumer event loop with apartment-threaded callback dispatch.
//!
//! Every callback handed to the loop, whether posted directly from any
//! thread or produced by a timer firing, runs on the one thread that calls
//! [`EventLoop::run`], in the order it became ready.
//!
//! - [`EventLoop`]: owns the message queue, the timer thread and the worker pool
//! - [`LoopHandle`]: cloneable facade for posting callbacks and arming timers
//! - [`LoopMetrics`]: counters exposed for diagnostics

mod message;
mod queue;
mod shared;
mod timer;

pub mod handle;
pub mod metrics;
pub mod runner;

pub use handle::LoopHandle;
pub use message::Origin;
pub use metrics::LoopMetrics;
pub use runner::EventLoop;
pub use timer::TimerId;

pub use msgloop_core::{LoopConfig, LoopError, PanicPolicy};
