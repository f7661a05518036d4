//! Timer registry and the dedicated timer thread.
//!
//! The registry keeps armed timers in a min-heap keyed by deadline. The
//! timer thread sleeps until the nearest deadline (or until an earlier timer
//! is armed), turns every due timer into a [`Message`](crate::message::Message)
//! and hands the batch to the message queue. Timer callbacks never run on
//! the timer thread.

mod entry;
mod registry;
mod thread;

use std::sync::{Arc, Mutex};

pub(crate) use registry::TimerRegistry;
pub(crate) use thread::spawn_timer_thread;

/// Identifier of an armed timer.
///
/// Ids are assigned from a per-loop counter starting at 1 and are never
/// reused, so a stale id can never cancel a different timer.
pub type TimerId = u64;

/// A timer callback shared between the registry and its queued firings.
pub(crate) type TimerCallback = Arc<Mutex<Box<dyn FnMut(TimerId) + Send>>>;
