//! Progress callback contract shared by every stage.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// One progress update: overall run progress plus a human-readable label
/// for the active stage and an optional detail string (e.g. "segment 42/180").
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub overall_progress: f64,
    pub stage_label: String,
    pub stage_detail: Option<String>,
}

/// A callback workers can invoke from any task. Safe to call far more often
/// than the 5 Hz delivery ceiling requires; throttling happens internally.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Wraps a [`ProgressSink`] so that calls faster than `min_interval`
/// (default 200ms, i.e. 5 Hz) are dropped, keeping noisy per-item workers
/// from flooding the sink. The final call for a stage should bypass
/// throttling via [`ThrottledProgressSink::report_now`].
pub struct ThrottledProgressSink<S: ProgressSink> {
    inner: S,
    min_interval: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl<S: ProgressSink> ThrottledProgressSink<S> {
    pub fn new(inner: S) -> Arc<Self> {
        Arc::new(Self {
            inner,
            min_interval: Duration::from_millis(200),
            last_sent: Mutex::new(None),
        })
    }

    pub fn with_min_interval(inner: S, min_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner,
            min_interval,
            last_sent: Mutex::new(None),
        })
    }

    /// Bypasses throttling; use for the final update of a stage or run so a
    /// caller always observes the terminal progress value.
    pub fn report_now(&self, update: ProgressUpdate) {
        *self.last_sent.lock().unwrap() = Some(Instant::now());
        self.inner.report(update);
    }
}

impl<S: ProgressSink> ProgressSink for ThrottledProgressSink<S> {
    fn report(&self, update: ProgressUpdate) {
        let mut last_sent = self.last_sent.lock().unwrap();
        let now = Instant::now();
        let should_send = match *last_sent {
            Some(last) => now.duration_since(last) >= self.min_interval,
            None => true,
        };
        if should_send {
            *last_sent = Some(now);
            drop(last_sent);
            self.inner.report(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(Arc<AtomicUsize>);
    impl ProgressSink for CountingSink {
        fn report(&self, _update: ProgressUpdate) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn throttle_drops_rapid_updates() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = ThrottledProgressSink::with_min_interval(
            CountingSink(count.clone()),
            Duration::from_secs(10),
        );
        for i in 0..5 {
            sink.report(ProgressUpdate {
                overall_progress: i as f64 / 5.0,
                stage_label: "transcribe".into(),
                stage_detail: None,
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn report_now_bypasses_throttle() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = ThrottledProgressSink::with_min_interval(
            CountingSink(count.clone()),
            Duration::from_secs(10),
        );
        sink.report(ProgressUpdate {
            overall_progress: 0.1,
            stage_label: "transcribe".into(),
            stage_detail: None,
        });
        sink.report_now(ProgressUpdate {
            overall_progress: 1.0,
            stage_label: "export".into(),
            stage_detail: None,
        });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
