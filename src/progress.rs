//! Progress reporting and cancellation support.
//!
//! [`ProgressCallback`] observes long-running stages, [`CancellationToken`]
//! requests a cooperative stop, and [`ProgressInfo`] is the snapshot handed
//! to callbacks.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use signpipe::{PipelineOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{}] {pct:.1}% complete", info.stage);
//!         }
//!     }
//! }
//!
//! let options = PipelineOptions::new().with_progress(Arc::new(PrintProgress));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::stage::Stage;

/// A snapshot of stage progress.
///
/// Delivered to [`ProgressCallback::on_progress`] at a cadence controlled by
/// [`PipelineOptions::with_batch_size`](crate::PipelineOptions::with_batch_size).
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// The stage being executed.
    pub stage: Stage,
    /// Items (frames or clips) completed so far.
    pub current: u64,
    /// Total items expected, if known ahead of time.
    pub total: Option<u64>,
    /// Completion percentage (0.0 - 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the stage started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
}

/// Trait for receiving progress updates.
///
/// Implementations must be [`Send`] and [`Sync`]: the worker pool reports
/// from its worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during a stage.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. The default callback.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clones share state; cancelling any clone cancels them all.
///
/// ```
/// use signpipe::CancellationToken;
///
/// let token = CancellationToken::new();
/// let clone = token.clone();
/// clone.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token nobody has cancelled yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this token to stop at its next boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns `true` once any clone has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl ProgressInfo {
    /// Snapshot of `stage` after `current` of `total` items, `elapsed`
    /// after the stage started.
    fn snapshot(stage: Stage, current: u64, total: Option<u64>, elapsed: Duration) -> Self {
        let (percentage, estimated_remaining) = match total {
            Some(total) if total > 0 => {
                let done = current.min(total);
                let percentage = done as f32 * 100.0 / total as f32;
                // Remaining items at the average pace so far.
                let remaining = (done > 0).then(|| elapsed.mul_f64((total - done) as f64 / done as f64));
                (Some(percentage), remaining)
            }
            _ => (None, None),
        };

        Self {
            stage,
            current,
            total,
            percentage,
            elapsed,
            estimated_remaining,
        }
    }
}

/// Counts completed items of one stage and notifies the callback once at
/// least `batch_size` items have completed since the previous notification.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    stage: Stage,
    total: Option<u64>,
    completed: u64,
    reported: u64,
    batch_size: u64,
    started: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        stage: Stage,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            stage,
            total,
            completed: 0,
            reported: 0,
            batch_size: batch_size.max(1),
            started: Instant::now(),
        }
    }

    /// Record `count` more completed items.
    pub(crate) fn advance_by(&mut self, count: u64) {
        self.completed += count;
        if self.completed - self.reported >= self.batch_size {
            self.notify();
        }
    }

    /// Notify the callback with the final count, whatever the batch size.
    pub(crate) fn finish(&mut self) {
        self.notify();
    }

    fn notify(&mut self) {
        self.reported = self.completed;
        let info = ProgressInfo::snapshot(self.stage, self.completed, self.total, self.started.elapsed());
        self.callback.on_progress(&info);
    }
}
