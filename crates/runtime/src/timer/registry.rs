use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use msgloop_core::LoopError;
use tracing::{debug, warn};

use crate::message::Message;

use super::entry::TimerEntry;
use super::{TimerCallback, TimerId};

/// What the timer thread is currently blocked on.
///
/// `arm` only signals the wake condition when the new deadline could
/// come before the thread's current wait target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Waiting {
    /// Not waiting; the minimum is re-derived before the next wait.
    Busy,
    /// Registry was empty.
    Indefinitely,
    Until(Instant),
}

struct RegistryState {
    heap: BinaryHeap<TimerEntry>,
    /// Live timers. Heap entries whose id is missing here were cancelled
    /// and are discarded when they surface.
    armed: HashMap<TimerId, Arc<AtomicBool>>,
    next_id: TimerId,
    next_seq: u64,
    waiting: Waiting,
    closed: bool,
}

/// Messages produced by one pass of the timer thread.
#[derive(Default)]
pub(crate) struct DueBatch {
    /// One message per due timer, in deadline order.
    pub(crate) messages: Vec<Message>,
    /// Deadlines of repeating timers skipped because the loop fell behind.
    pub(crate) missed_ticks: u64,
    /// Cancelled entries, dropped by the caller outside the registry lock.
    discarded: Vec<TimerEntry>,
}

/// Thread-safe set of armed timers ordered by next deadline.
pub(crate) struct TimerRegistry {
    state: Mutex<RegistryState>,
    wake: Condvar,
}

impl TimerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                heap: BinaryHeap::new(),
                armed: HashMap::new(),
                next_id: 1,
                next_seq: 0,
                waiting: Waiting::Busy,
                closed: false,
            }),
            wake: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().expect("timer registry lock poisoned")
    }

    /// Arm a timer due `interval` from now.
    pub(crate) fn arm(
        &self,
        interval: Duration,
        repeating: bool,
        callback: TimerCallback,
    ) -> Result<TimerId, LoopError> {
        self.insert(interval, repeating, callback, |now| now.checked_add(interval))
    }

    /// Arm a timer with an explicit first deadline.
    #[cfg(test)]
    pub(crate) fn arm_at(
        &self,
        deadline: Instant,
        interval: Duration,
        repeating: bool,
        callback: TimerCallback,
    ) -> Result<TimerId, LoopError> {
        self.insert(interval, repeating, callback, |_| Some(deadline))
    }

    fn insert(
        &self,
        interval: Duration,
        repeating: bool,
        callback: TimerCallback,
        first_deadline: impl FnOnce(Instant) -> Option<Instant>,
    ) -> Result<TimerId, LoopError> {
        if interval.is_zero() {
            return Err(LoopError::InvalidInterval(interval));
        }

        let mut state = self.lock();
        if state.closed {
            return Err(LoopError::Closed);
        }
        let deadline =
            first_deadline(Instant::now()).ok_or(LoopError::InvalidInterval(interval))?;

        let id = state.next_id;
        state.next_id += 1;
        let seq = state.bump_seq();
        let cancelled = Arc::new(AtomicBool::new(false));
        state.armed.insert(id, Arc::clone(&cancelled));
        state.heap.push(TimerEntry {
            id,
            deadline,
            seq,
            interval,
            repeating,
            callback,
            cancelled,
        });

        let wake = match state.waiting {
            Waiting::Busy => false,
            Waiting::Indefinitely => true,
            Waiting::Until(target) => deadline < target,
        };
        drop(state);

        if wake {
            self.wake.notify_one();
        }
        debug!(timer_id = id, ?interval, repeating, wake, "timer armed");
        Ok(id)
    }

    /// Disarm a timer. Returns whether it was still armed.
    ///
    /// Firings of this timer already sitting in the message queue are
    /// suppressed as well.
    pub(crate) fn cancel(&self, id: TimerId) -> bool {
        let discarded = {
            let mut state = self.lock();
            let Some(flag) = state.armed.remove(&id) else {
                return false;
            };
            flag.store(true, Ordering::Release);
            state.compact()
        };
        drop(discarded);
        debug!(timer_id = id, "timer cancelled");
        true
    }

    /// Number of armed timers.
    pub(crate) fn len(&self) -> usize {
        self.lock().armed.len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: TimerId) -> bool {
        self.lock().armed.contains_key(&id)
    }

    /// Stop accepting timers, wake the timer thread and drop every entry.
    pub(crate) fn close(&self) {
        let (heap, armed) = {
            let mut state = self.lock();
            state.closed = true;
            (
                std::mem::take(&mut state.heap),
                std::mem::take(&mut state.armed),
            )
        };
        self.wake.notify_all();
        debug!(dropped = armed.len(), "timer registry closed");
        drop(heap);
    }

    /// Block until at least one timer is due, then fire every due timer.
    ///
    /// Returns `None` once the registry is closed. The minimum deadline is
    /// re-derived under the lock on every wake, so a wake caused by `arm`,
    /// by `close` or by a spurious return never fires anything early.
    pub(crate) fn next_due(&self) -> Option<DueBatch> {
        let mut batch = DueBatch::default();
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            state.discard_cancelled(&mut batch.discarded);

            let now = Instant::now();
            match state.heap.peek().map(|entry| entry.deadline) {
                Some(deadline) if deadline <= now => {
                    state.take_due(now, &mut batch);
                    state.waiting = Waiting::Busy;
                    return Some(batch);
                }
                _ if !batch.discarded.is_empty() => {
                    state.waiting = Waiting::Busy;
                    return Some(batch);
                }
                None => {
                    state.waiting = Waiting::Indefinitely;
                    state = self.wake.wait(state).expect("timer registry lock poisoned");
                }
                Some(deadline) => {
                    state.waiting = Waiting::Until(deadline);
                    let (guard, _) = self
                        .wake
                        .wait_timeout(state, deadline - now)
                        .expect("timer registry lock poisoned");
                    state = guard;
                }
            }
            state.waiting = Waiting::Busy;
        }
    }
}

impl RegistryState {
    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Pop cancelled entries off the top of the heap.
    fn discard_cancelled(&mut self, discarded: &mut Vec<TimerEntry>) {
        while let Some(top) = self.heap.peek() {
            if self.armed.contains_key(&top.id) {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                discarded.push(entry);
            }
        }
    }

    /// Rebuild the heap without cancelled entries once they dominate it.
    fn compact(&mut self) -> Vec<TimerEntry> {
        if self.heap.len() <= 2 * self.armed.len() + 64 {
            return Vec::new();
        }
        let (live, stale): (Vec<_>, Vec<_>) = std::mem::take(&mut self.heap)
            .into_vec()
            .into_iter()
            .partition(|entry| self.armed.contains_key(&entry.id));
        self.heap = BinaryHeap::from(live);
        stale
    }

    /// Fire every timer whose deadline is at or before `now`.
    ///
    /// One-shot timers leave the registry; repeating timers are pushed back
    /// with their next deadline. Both happen before the lock is released.
    fn take_due(&mut self, now: Instant, batch: &mut DueBatch) {
        loop {
            self.discard_cancelled(&mut batch.discarded);
            match self.heap.peek() {
                Some(top) if top.deadline <= now => {}
                _ => break,
            }
            let Some(mut entry) = self.heap.pop() else {
                break;
            };

            debug!(timer_id = entry.id, repeating = entry.repeating, "timer fired");
            batch.messages.push(Message::from_timer(
                entry.id,
                Arc::clone(&entry.callback),
                Arc::clone(&entry.cancelled),
            ));

            if !entry.repeating {
                self.armed.remove(&entry.id);
                continue;
            }

            match entry.deadline.checked_add(entry.interval) {
                Some(next) if next > now => entry.deadline = next,
                Some(_) => {
                    let behind = now.duration_since(entry.deadline);
                    let missed = (behind.as_nanos() / entry.interval.as_nanos()) as u64;
                    warn!(
                        timer_id = entry.id,
                        missed,
                        behind_ms = behind.as_millis() as u64,
                        "repeating timer fell behind, skipping missed deadlines"
                    );
                    batch.missed_ticks += missed;
                    entry.deadline = now + entry.interval;
                }
                None => {
                    warn!(timer_id = entry.id, "next deadline overflows the clock, retiring timer");
                    self.armed.remove(&entry.id);
                    continue;
                }
            }
            entry.seq = self.bump_seq();
            self.heap.push(entry);
        }
    }
}
