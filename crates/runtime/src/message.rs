use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::timer::{TimerCallback, TimerId};

/// Where a queued message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Origin {
    /// Posted directly through [`LoopHandle::post_callback`](crate::LoopHandle::post_callback).
    Posted,
    /// Produced by the timer thread when the timer's deadline elapsed.
    Timer(TimerId),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Posted => write!(f, "posted"),
            Origin::Timer(id) => write!(f, "timer#{id}"),
        }
    }
}

/// A unit of ready work: a callback already bound to its payload.
///
/// The queue owns the message from enqueue until the main loop drains it;
/// the loop then consumes it in [`Message::run`].
pub(crate) struct Message {
    origin: Origin,
    callback: Box<dyn FnOnce() + Send>,
    cancelled: Option<Arc<AtomicBool>>,
}

impl Message {
    /// Bind `callback` to `payload`. The payload moves into the message and is
    /// handed back to the callback by value when the message runs.
    pub(crate) fn new<F, T>(callback: F, payload: T) -> Self
    where
        F: FnOnce(T) + Send + 'static,
        T: Send + 'static,
    {
        Self {
            origin: Origin::Posted,
            callback: Box::new(move || callback(payload)),
            cancelled: None,
        }
    }

    /// A firing of timer `id`. The timer's callback is shared with the
    /// registry entry, which keeps it for later firings of repeating timers.
    pub(crate) fn from_timer(id: TimerId, callback: TimerCallback, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            origin: Origin::Timer(id),
            callback: Box::new(move || {
                // A previous firing that panicked leaves the lock poisoned;
                // the payload is still the caller's to use.
                let mut guard = callback.lock().unwrap_or_else(PoisonError::into_inner);
                let callback = &mut **guard;
                callback(id)
            }),
            cancelled: Some(cancelled),
        }
    }

    pub(crate) fn origin(&self) -> Origin {
        self.origin
    }

    /// Whether the timer that produced this message was cancelled after firing.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Execute the callback on the calling thread.
    pub(crate) fn run(self) {
        (self.callback)()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("origin", &self.origin)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Wrap a user timer callback so the registry can share it across firings.
pub(crate) fn timer_callback<F, T>(mut callback: F, mut payload: T) -> TimerCallback
where
    F: FnMut(TimerId, &mut T) + Send + 'static,
    T: Send + 'static,
{
    let boxed: Box<dyn FnMut(TimerId) + Send> = Box::new(move |id| callback(id, &mut payload));
    Arc::new(Mutex::new(boxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn posted_message_receives_payload() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let msg = Message::new(move |value: u32| *sink.lock().unwrap() = Some(value), 7);

        assert_eq!(msg.origin(), Origin::Posted);
        assert!(!msg.is_cancelled());
        msg.run();
        assert_eq!(*seen.lock().unwrap(), Some(7));
    }

    #[test]
    fn timer_message_passes_id_and_keeps_payload_between_firings() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let callback = timer_callback(
            move |id, count: &mut u32| {
                *count += 1;
                sink.lock().unwrap().push((id, *count));
            },
            0u32,
        );
        let flag = Arc::new(AtomicBool::new(false));

        Message::from_timer(4, Arc::clone(&callback), Arc::clone(&flag)).run();
        Message::from_timer(4, callback, flag).run();

        assert_eq!(*calls.lock().unwrap(), vec![(4, 1), (4, 2)]);
    }

    #[test]
    fn timer_message_reports_cancellation() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let callback = timer_callback(
            move |_, _: &mut ()| {
                counter.fetch_add(1, Ordering::Relaxed);
            },
            (),
        );
        let flag = Arc::new(AtomicBool::new(false));
        let msg = Message::from_timer(1, callback, Arc::clone(&flag));

        assert_eq!(msg.origin(), Origin::Timer(1));
        flag.store(true, Ordering::Release);
        assert!(msg.is_cancelled());
        assert_eq!(fired.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn origin_display() {
        assert_eq!(Origin::Posted.to_string(), "posted");
        assert_eq!(Origin::Timer(12).to_string(), "timer#12");
    }
}
