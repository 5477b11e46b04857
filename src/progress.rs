//! Progress reporting.
//!
//! Each phase owns a [`TaskProgressInterval`] of the overall 0-100 range and
//! reports at record granularity through an [`EntityCountProgress`].

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives overall progress. Must be callable from worker threads.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, message: &str);
}

/// Sink that drops every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _percent: u8, _message: &str) {}
}

/// Portion of overall progress assigned to one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskProgressInterval {
    pub start: u8,
    pub end: u8,
}

impl TaskProgressInterval {
    pub const PROJECT: Self = Self::new(0, 5);
    pub const ISSUES: Self = Self::new(5, 25);
    pub const ISSUE_RELATED: Self = Self::new(25, 40);
    pub const SECOND_DEGREE: Self = Self::new(40, 45);
    pub const ATTACHMENTS: Self = Self::new(45, 60);
    pub const CUSTOM_FIELD_VALUES: Self = Self::new(60, 80);
    pub const REINDEX: Self = Self::new(80, 100);

    #[must_use]
    pub const fn new(start: u8, end: u8) -> Self {
        let end = if end > 100 { 100 } else { end };
        let start = if start > end { end } else { start };
        Self { start, end }
    }

    /// Nested range expressed in percent of this one.
    #[must_use]
    pub fn sub_interval(self, from_percent: u8, to_percent: u8) -> Self {
        Self::new(
            self.at(usize::from(from_percent), 100),
            self.at(usize::from(to_percent), 100),
        )
    }

    /// Overall percent after `done` of `total` units of this interval.
    #[must_use]
    pub fn at(self, done: usize, total: usize) -> u8 {
        if total == 0 {
            return self.end;
        }
        let width = usize::from(self.end - self.start);
        let offset = width * done.min(total) / total;
        self.start + u8::try_from(offset).unwrap_or(self.end - self.start)
    }
}

/// Counts processed records and forwards progress to a sink.
pub struct EntityCountProgress {
    sink: Arc<dyn ProgressSink>,
    interval: TaskProgressInterval,
    total: usize,
    step: usize,
    processed: AtomicUsize,
    label: String,
}

impl EntityCountProgress {
    #[must_use]
    pub fn new(
        sink: Arc<dyn ProgressSink>,
        interval: TaskProgressInterval,
        total: usize,
        step: usize,
        label: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            interval,
            total,
            step: step.max(1),
            processed: AtomicUsize::new(0),
            label: label.into(),
        }
    }

    /// Record one processed entity; reports on every `step`-th call.
    pub fn processed_entity(&self) {
        let done = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.step == 0 || done == self.total {
            let message = format!("{} ({done} of {})", self.label, self.total);
            self.sink.report(self.interval.at(done, self.total), &message);
        }
    }

    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    /// Report the end of the interval regardless of what was counted.
    pub fn finish(&self) {
        self.sink.report(self.interval.end, &self.label);
    }
}

impl std::fmt::Debug for EntityCountProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCountProgress")
            .field("interval", &self.interval)
            .field("total", &self.total)
            .field("processed", &self.processed())
            .finish_non_exhaustive()
    }
}

/// Terminal progress bar sink.
#[derive(Debug, Clone)]
pub struct ProgressBarSink {
    bar: ProgressBar,
}

impl ProgressBarSink {
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) =
            ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }

    /// Sink over an existing bar, e.g. a hidden one.
    #[must_use]
    pub const fn with_bar(bar: ProgressBar) -> Self {
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressBarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressBarSink {
    fn report(&self, percent: u8, message: &str) {
        self.bar.set_position(u64::from(percent));
        self.bar.set_message(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<u8>>);

    impl ProgressSink for Recorder {
        fn report(&self, percent: u8, _message: &str) {
            self.0.lock().unwrap().push(percent);
        }
    }

    #[test]
    fn interval_scales_within_range() {
        let issues = TaskProgressInterval::ISSUES;
        assert_eq!(issues.at(0, 10), 5);
        assert_eq!(issues.at(5, 10), 15);
        assert_eq!(issues.at(10, 10), 25);
        assert_eq!(issues.at(0, 0), 25);
    }

    #[test]
    fn sub_interval_nests() {
        let sub = TaskProgressInterval::new(20, 40).sub_interval(50, 100);
        assert_eq!(sub, TaskProgressInterval::new(30, 40));
    }

    #[test]
    fn reports_every_step_and_at_end() {
        let recorder = Arc::new(Recorder::default());
        let progress = EntityCountProgress::new(
            recorder.clone(),
            TaskProgressInterval::new(0, 100),
            5,
            2,
            "Importing issues",
        );
        for _ in 0..5 {
            progress.processed_entity();
        }
        assert_eq!(*recorder.0.lock().unwrap(), vec![40, 80, 100]);
        assert_eq!(progress.processed(), 5);
    }

    #[test]
    fn hidden_bar_accepts_reports() {
        let sink = ProgressBarSink::with_bar(ProgressBar::hidden());
        sink.report(42, "halfway");
        sink.finish();
    }
}
