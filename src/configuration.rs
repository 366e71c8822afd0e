//! Pipeline configuration.
//!
//! [`PipelineOptions`] is a builder that threads progress callbacks,
//! cancellation tokens, and the pipeline's tuning knobs through the stages
//! without polluting every function signature.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use signpipe::{CancellationToken, PipelineOptions, ProgressCallback, ProgressInfo};
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{}: {} done", info.stage, info.current);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = PipelineOptions::new()
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone())
//!     .with_worker_count(4)
//!     .with_batch_size(25);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::error::PipelineError;
use crate::models::GenerationConfig;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};
use crate::transcode::NormalizationSettings;

/// Default prompt for translating a clip. `{context}` is replaced with the
/// rolling context, or removed together with its line when there is none.
pub const DEFAULT_PROMPT_TEMPLATE: &str =
    "Previous translation: {context}\nTranslate the signing in this clip into English.";

/// Settings shared by every stage of the pipeline.
///
/// All fields have sensible defaults; a default-constructed value runs the
/// pipeline with 1 s detection chunks, 2 s clips, two detection workers and
/// a single-slot job queue.
#[derive(Clone)]
pub struct PipelineOptions {
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) batch_size: u64,
    pub(crate) chunk_seconds: f64,
    pub(crate) clip_seconds: f64,
    pub(crate) worker_count: usize,
    pub(crate) queue_capacity: usize,
    pub(crate) max_context_length: usize,
    pub(crate) tag_frames: bool,
    pub(crate) generation: GenerationConfig,
    pub(crate) prompt_template: String,
    pub(crate) normalization: NormalizationSettings,
}

impl Debug for PipelineOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PipelineOptions")
            .field("has_progress", &true)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .field("chunk_seconds", &self.chunk_seconds)
            .field("clip_seconds", &self.clip_seconds)
            .field("worker_count", &self.worker_count)
            .field("queue_capacity", &self.queue_capacity)
            .field("max_context_length", &self.max_context_length)
            .field("tag_frames", &self.tag_frames)
            .finish()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
            chunk_seconds: 1.0,
            clip_seconds: 2.0,
            worker_count: 2,
            queue_capacity: 1,
            max_context_length: 8_000,
            tag_frames: false,
            generation: GenerationConfig::default(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            normalization: NormalizationSettings::default(),
        }
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// A cancelled token stops the pipeline at the next chunk, clip or stage
    /// boundary with [`PipelineError::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set how often the progress callback fires (every N frames or clips).
    /// Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Duration of the chunks handed to detection workers.
    #[must_use]
    pub fn with_chunk_seconds(mut self, seconds: f64) -> Self {
        self.chunk_seconds = seconds;
        self
    }

    /// Duration of the clips used as translation units.
    #[must_use]
    pub fn with_clip_seconds(mut self, seconds: f64) -> Self {
        self.clip_seconds = seconds;
        self
    }

    /// Number of detection workers. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    /// Number of chunks buffered ahead of the workers. Clamped to a minimum
    /// of 1.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Maximum total length, in characters, of the rolling context.
    #[must_use]
    pub fn with_max_context_length(mut self, length: usize) -> Self {
        self.max_context_length = length;
        self
    }

    /// Burn frame numbers into the normalized video. Off by default.
    #[must_use]
    pub fn with_frame_tagging(mut self, enabled: bool) -> Self {
        self.tag_frames = enabled;
        self
    }

    /// Generation settings passed to the translator.
    #[must_use]
    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Prompt template for clip translation. See [`DEFAULT_PROMPT_TEMPLATE`].
    #[must_use]
    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = template.into();
        self
    }

    /// Framerate and resolution bounds used by the normalize stage.
    #[must_use]
    pub fn with_normalization(mut self, settings: NormalizationSettings) -> Self {
        self.normalization = settings;
        self
    }

    /// Duration of detection chunks.
    pub fn chunk_seconds(&self) -> f64 {
        self.chunk_seconds
    }

    /// Duration of clips.
    pub fn clip_seconds(&self) -> f64 {
        self.clip_seconds
    }

    /// Number of detection workers.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Returns `true` if cancellation has been requested.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    /// Fail with [`PipelineError::Cancelled`] if cancellation was requested.
    pub(crate) fn check_cancelled(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_clamped() {
        let options = PipelineOptions::new()
            .with_worker_count(0)
            .with_queue_capacity(0)
            .with_batch_size(0);
        assert_eq!(options.worker_count, 1);
        assert_eq!(options.queue_capacity, 1);
        assert_eq!(options.batch_size, 1);
    }

    #[test]
    fn cancellation_is_observed() {
        let token = CancellationToken::new();
        let options = PipelineOptions::new().with_cancellation(token.clone());
        assert!(options.check_cancelled().is_ok());
        token.cancel();
        assert!(matches!(options.check_cancelled(), Err(PipelineError::Cancelled)));
    }
}
