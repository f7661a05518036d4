use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use msgloop_core::LoopError;

use crate::message::Message;

/// Thread-safe FIFO of ready messages with a single consumer.
///
/// Producers never block beyond the queue lock. The consumer blocks in
/// [`MessageQueue::drain_all`] until at least one message is present or
/// the queue is closed.
pub(crate) struct MessageQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

#[derive(Default)]
struct QueueState {
    messages: VecDeque<Message>,
    closed: bool,
}

impl MessageQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Nothing user-supplied runs under this lock; poisoning means the
        // queue itself is broken.
        self.state.lock().expect("message queue lock poisoned")
    }

    /// Append a message. Fails once the queue has been closed.
    pub(crate) fn enqueue(&self, message: Message) -> Result<(), LoopError> {
        let mut state = self.lock();
        if state.closed {
            return Err(LoopError::Closed);
        }
        state.messages.push_back(message);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Append messages in order under a single lock acquisition.
    pub(crate) fn enqueue_batch(&self, messages: Vec<Message>) -> Result<(), LoopError> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut state = self.lock();
        if state.closed {
            return Err(LoopError::Closed);
        }
        state.messages.extend(messages);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Block until messages are available, then take all of them in order.
    ///
    /// Returns an empty batch once the queue is closed. The lock is released
    /// before the caller runs anything from the batch.
    pub(crate) fn drain_all(&self) -> Vec<Message> {
        let mut state = self.lock();
        while state.messages.is_empty() && !state.closed {
            state = self
                .available
                .wait(state)
                .expect("message queue lock poisoned");
        }
        if state.closed {
            return Vec::new();
        }
        state.messages.drain(..).collect()
    }

    /// Reject further messages, wake the consumer, and discard what is left.
    ///
    /// Returns how many messages were discarded.
    pub(crate) fn close(&self) -> usize {
        let discarded = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.messages)
        };
        self.available.notify_all();
        // Payload destructors may call back into the loop, so drop them unlocked.
        let count = discarded.len();
        drop(discarded);
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use crate::message::Origin;

    fn recording(log: &Arc<Mutex<Vec<u32>>>, value: u32) -> Message {
        let log = Arc::clone(log);
        Message::new(move |v: u32| log.lock().unwrap().push(v), value)
    }

    #[test]
    fn drain_preserves_fifo_order() {
        let queue = MessageQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            queue.enqueue(recording(&log, i)).unwrap();
        }
        assert_eq!(queue.len(), 5);

        let batch = queue.drain_all();
        assert_eq!(batch.len(), 5);
        assert_eq!(queue.len(), 0);
        for msg in batch {
            msg.run();
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn enqueue_batch_appends_after_existing() {
        let queue = MessageQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        queue.enqueue(recording(&log, 1)).unwrap();
        queue
            .enqueue_batch(vec![recording(&log, 2), recording(&log, 3)])
            .unwrap();

        for msg in queue.drain_all() {
            msg.run();
        }
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn drain_blocks_until_enqueue() {
        let queue = Arc::new(MessageQueue::new());
        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            producer.enqueue(Message::new(|_: ()| {}, ())).unwrap();
        });

        let batch = queue.drain_all();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].origin(), Origin::Posted);
        handle.join().unwrap();
    }

    #[test]
    fn close_wakes_consumer_and_rejects_producers() {
        let queue = Arc::new(MessageQueue::new());
        let closer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            closer.close();
        });

        assert!(queue.drain_all().is_empty());
        handle.join().unwrap();

        let err = queue.enqueue(Message::new(|_: ()| {}, ())).unwrap_err();
        assert!(matches!(err, LoopError::Closed));
    }

    #[test]
    fn close_discards_pending_messages() {
        let queue = MessageQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        queue.enqueue(recording(&log, 1)).unwrap();
        queue.enqueue(recording(&log, 2)).unwrap();

        assert_eq!(queue.close(), 2);
        assert!(queue.drain_all().is_empty());
        assert!(log.lock().unwrap().is_empty());
    }
}
