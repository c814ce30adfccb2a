//! Event timing and throughput accounting
//!
//! Every document a worker handles is measured with an [`EventTimer`]; the
//! finished [`TimedEvent`] is added to a shared [`Timer`] that keeps running
//! totals and renders the progress and summary lines the engine logs.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Default minimum gap between two progress reports
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// One measured operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedEvent {
    /// When the operation started
    pub started_at: DateTime<Utc>,
    /// How long it took
    pub duration: Duration,
    /// Bytes moved
    pub bytes: u64,
    /// Whether the operation failed
    pub error: bool,
    /// What was measured, usually a document uri
    pub description: String,
    /// `false` excludes the event from the aggregates
    pub keep: bool,
}

/// Measures one operation from `start` to `finish`
#[derive(Debug)]
pub struct EventTimer {
    description: String,
    started_at: DateTime<Utc>,
    started: Instant,
    keep: bool,
}

impl EventTimer {
    /// Start measuring `description` now
    pub fn start<S: Into<String>>(description: S) -> Self {
        Self {
            description: description.into(),
            started_at: Utc::now(),
            started: Instant::now(),
            keep: true,
        }
    }

    /// Record the event without counting it in the aggregates
    pub fn discard(mut self) -> Self {
        self.keep = false;
        self
    }

    /// Stop the clock
    pub fn finish(self, bytes: u64, error: bool) -> TimedEvent {
        TimedEvent {
            started_at: self.started_at,
            duration: self.started.elapsed(),
            bytes,
            error,
            description: self.description,
            keep: self.keep,
        }
    }
}

/// Point-in-time copy of a [`Timer`]'s totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerSnapshot {
    /// Counted events
    pub events: u64,
    /// Counted events that failed
    pub errors: u64,
    /// Bytes moved by counted events
    pub bytes: u64,
    /// Sum of the counted events' durations
    pub busy: Duration,
    /// Wall-clock time since the timer was created
    pub elapsed: Duration,
}

impl TimerSnapshot {
    /// Counted events that succeeded
    pub const fn successes(&self) -> u64 {
        self.events - self.errors
    }

    /// Throughput in bytes per second; zero before anything happened
    #[allow(clippy::cast_precision_loss)]
    pub fn bytes_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if self.events == 0 || secs <= 0.0 {
            0.0
        } else {
            self.bytes as f64 / secs
        }
    }

    /// Event rate; zero before anything happened
    #[allow(clippy::cast_precision_loss)]
    pub fn events_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if self.events == 0 || secs <= 0.0 {
            0.0
        } else {
            self.events as f64 / secs
        }
    }

    /// `"{n} events/s, {k} kB/s"` with both rates rounded to integers
    pub fn rate_line(&self) -> String {
        format!(
            "{} events/s, {} kB/s",
            self.events_per_second().round(),
            (self.bytes_per_second() / 1024.0).round()
        )
    }
}

#[derive(Debug)]
struct TimerState {
    events: Vec<TimedEvent>,
    totals: TimerSnapshot,
    last_report: Instant,
}

/// Concurrency-safe accumulator of [`TimedEvent`]s
#[derive(Debug)]
pub struct Timer {
    created: Instant,
    report_interval: Duration,
    state: Mutex<TimerState>,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Timer reporting progress at most every [`DEFAULT_REPORT_INTERVAL`]
    pub fn new() -> Self {
        Self::with_report_interval(DEFAULT_REPORT_INTERVAL)
    }

    /// Timer reporting progress at most every `interval`
    pub fn with_report_interval(interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            created: now,
            report_interval: interval,
            state: Mutex::new(TimerState {
                events: Vec::new(),
                totals: TimerSnapshot::default(),
                last_report: now,
            }),
        }
    }

    /// Minimum gap between two progress reports
    pub const fn report_interval(&self) -> Duration {
        self.report_interval
    }

    /// Append a finished event
    pub fn add(&self, event: TimedEvent) {
        let mut state = self.state.lock();
        if event.keep {
            state.totals.events += 1;
            state.totals.bytes += event.bytes;
            state.totals.busy += event.duration;
            if event.error {
                state.totals.errors += 1;
            }
        }
        state.events.push(event);
    }

    /// Current totals
    pub fn snapshot(&self) -> TimerSnapshot {
        let mut totals = self.state.lock().totals;
        totals.elapsed = self.created.elapsed();
        totals
    }

    /// Every recorded event, kept or not, in the order added
    pub fn events(&self) -> Vec<TimedEvent> {
        self.state.lock().events.clone()
    }

    /// Counted events
    pub fn event_count(&self) -> u64 {
        self.state.lock().totals.events
    }

    /// Counted failures
    pub fn error_count(&self) -> u64 {
        self.state.lock().totals.errors
    }

    /// Counted successes
    pub fn success_count(&self) -> u64 {
        self.state.lock().totals.successes()
    }

    /// Progress line, or `None` when the last report is too recent
    pub fn progress_message(&self) -> Option<String> {
        let mut state = self.state.lock();
        let now = Instant::now();
        if now.duration_since(state.last_report) < self.report_interval {
            return None;
        }
        state.last_report = now;

        let mut totals = state.totals;
        drop(state);
        totals.elapsed = self.created.elapsed();
        Some(format!(
            "{} documents, {} errors, {}",
            totals.events,
            totals.errors,
            totals.rate_line()
        ))
    }

    /// Rates so far, e.g. `"12 events/s, 340 kB/s"`
    pub fn progress_summary(&self) -> String {
        self.snapshot().rate_line()
    }

    /// Summary of the whole run
    pub fn final_summary(&self) -> String {
        let totals = self.snapshot();
        format!(
            "Synchronized {} documents ({} errors, {} bytes) in {:.3} s: {}",
            totals.events,
            totals.errors,
            totals.bytes,
            totals.elapsed.as_secs_f64(),
            totals.rate_line()
        )
    }
}
