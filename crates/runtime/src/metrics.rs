use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::message::Origin;

/// Event loop operational metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopMetrics {
    /// Posted callbacks executed on the loop thread.
    pub posted_executed: u64,
    /// Timer callbacks executed on the loop thread.
    pub timer_executed: u64,
    /// Timer firings dropped because the timer was cancelled after firing.
    pub cancelled_skipped: u64,
    /// Timers armed through the facade.
    pub timers_armed: u64,
    /// Messages produced by the timer thread.
    pub timers_fired: u64,
    /// Successful cancellations.
    pub timers_cancelled: u64,
    /// Repeating-timer deadlines skipped because the loop fell behind.
    pub missed_ticks: u64,
    /// Callbacks that panicked.
    pub callback_panics: u64,
    /// Callbacks that exceeded the slow-callback threshold.
    pub slow_callbacks: u64,
    /// Batches drained from the message queue.
    pub batches: u64,
    /// Largest batch drained so far.
    pub max_batch_len: usize,
    /// Rolling mean of callback execution time.
    pub avg_callback_duration: Duration,
    /// Wall-clock time of the most recent timer firing.
    pub last_fired_at: Option<DateTime<Utc>>,
    /// Messages waiting in the queue when the snapshot was taken.
    pub pending_messages: usize,
    /// Armed timers when the snapshot was taken.
    pub armed_timers: usize,
}

impl LoopMetrics {
    /// Total callbacks executed, of either origin.
    pub fn executed(&self) -> u64 {
        self.posted_executed + self.timer_executed
    }

    /// Record a drained batch.
    pub(crate) fn record_batch(&mut self, len: usize) {
        self.batches += 1;
        self.max_batch_len = self.max_batch_len.max(len);
    }

    /// Record a callback execution.
    pub(crate) fn record_execution(&mut self, origin: Origin, duration: Duration, slow: bool) {
        match origin {
            Origin::Posted => self.posted_executed += 1,
            Origin::Timer(_) => self.timer_executed += 1,
        }
        if slow {
            self.slow_callbacks += 1;
        }

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = self.executed();
        self.avg_callback_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_callback_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    /// Record timer firings handed to the queue.
    pub(crate) fn record_fired(&mut self, fired: usize, missed_ticks: u64) {
        self.timers_fired += fired as u64;
        self.missed_ticks += missed_ticks;
        self.last_fired_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_execution() {
        let mut m = LoopMetrics::default();
        m.record_execution(Origin::Posted, Duration::from_millis(100), false);

        assert_eq!(m.posted_executed, 1);
        assert_eq!(m.timer_executed, 0);
        assert_eq!(m.avg_callback_duration, Duration::from_millis(100));
    }

    #[test]
    fn record_multiple_executions_averages() {
        let mut m = LoopMetrics::default();
        m.record_execution(Origin::Posted, Duration::from_millis(100), false);
        m.record_execution(Origin::Timer(3), Duration::from_millis(200), true);

        assert_eq!(m.executed(), 2);
        assert_eq!(m.timer_executed, 1);
        assert_eq!(m.slow_callbacks, 1);
        // Average of 100ms and 200ms = 150ms
        let avg = m.avg_callback_duration.as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
    }

    #[test]
    fn record_batches_tracks_largest() {
        let mut m = LoopMetrics::default();
        m.record_batch(3);
        m.record_batch(7);
        m.record_batch(2);
        assert_eq!(m.batches, 3);
        assert_eq!(m.max_batch_len, 7);
    }

    #[test]
    fn record_fired_sets_timestamp() {
        let mut m = LoopMetrics::default();
        assert!(m.last_fired_at.is_none());
        m.record_fired(2, 1);
        assert_eq!(m.timers_fired, 2);
        assert_eq!(m.missed_ticks, 1);
        assert!(m.last_fired_at.is_some());
    }

    #[test]
    fn default_metrics() {
        let m = LoopMetrics::default();
        assert_eq!(m.executed(), 0);
        assert_eq!(m.pending_messages, 0);
        assert_eq!(m.avg_callback_duration, Duration::ZERO);
    }
}
