//! Error types for the `signpipe` crate.
//!
//! This module defines [`PipelineError`], the unified error type returned by
//! every fallible operation in the crate. Variants carry enough context
//! (paths, frame indices, expected and actual sizes) to diagnose a failed
//! stage from the processing log alone.

use std::any::Any;
use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

use crate::stage::Stage;

/// The unified error type for all `signpipe` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// The file extension does not map to a known video MIME type.
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(PathBuf),

    /// A video file could not be opened for decoding.
    #[error("Failed to open video file at {path}: {reason}")]
    FileOpen {
        /// Path of the file.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in {0}")]
    NoVideoStream(PathBuf),

    /// A video frame could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// A frame was written into a stream declared with a different fixed size.
    #[error(
        "Frame resolution {actual_width}x{actual_height} does not match the stream resolution {expected_width}x{expected_height}"
    )]
    ResolutionMismatch {
        /// Declared stream width.
        expected_width: u32,
        /// Declared stream height.
        expected_height: u32,
        /// Width of the offending frame.
        actual_width: u32,
        /// Height of the offending frame.
        actual_height: u32,
    },

    /// Width or height was queried on a stream without a declared fixed size.
    #[error("Stream has no fixed frame size")]
    HeterogeneousStream,

    /// A folder stream was opened before it was created.
    #[error("Folder frame stream at {0} has not been created")]
    FolderStreamNotCreated(PathBuf),

    /// A chunk or clip duration converts to zero frames.
    #[error("Duration of {seconds}s at {framerate} fps yields no frames")]
    InvalidChunkDuration {
        /// Requested duration in seconds.
        seconds: f64,
        /// Framerate of the source stream.
        framerate: f64,
    },

    /// Rebuilding the frame-to-clip lookup found a gap or overlap.
    #[error("Clips don't meet properly: clip {clip_index} starts at frame {start_frame}, expected {expected}")]
    ClipsNotContiguous {
        /// Index of the first offending clip.
        clip_index: usize,
        /// Its declared first frame.
        start_frame: usize,
        /// Running sum of the previous clips' frame counts.
        expected: usize,
    },

    /// A frame index or clip index fell outside the available data.
    #[error("{what} index {index} is out of range (length {length})")]
    IndexOutOfRange {
        /// What was indexed (e.g. `"frame"`, `"clip"`).
        what: &'static str,
        /// The requested index.
        index: usize,
        /// The number of available items.
        length: usize,
    },

    /// A stream produced more frames than the pre-sized output array holds.
    #[error("Stream produced more frames than expected ({expected})")]
    FrameCountMismatch {
        /// The number of slots allocated for the stage.
        expected: usize,
    },

    /// Not every slot of a pre-sized result array was filled.
    #[error("{missing} of {total} result slots were never filled (first missing index {first_missing})")]
    IncompleteResults {
        /// Number of unfilled slots.
        missing: usize,
        /// Total number of slots.
        total: usize,
        /// Index of the first unfilled slot.
        first_missing: usize,
    },

    /// A worker thread panicked while processing a job.
    #[error("Worker {0} panicked")]
    WorkerPanicked(usize),

    /// A matrix had the wrong number of columns.
    #[error("{what} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        /// What was checked.
        what: String,
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// The landmark detector returned output that does not match its batch.
    #[error("Landmark detector contract violated: {0}")]
    DetectorContract(String),

    /// A visual encoder returned output that does not match its batch.
    #[error("Encoder contract violated: {0}")]
    EncoderContract(String),

    /// A model could not be loaded.
    #[error("Failed to load model {name}: {reason}")]
    ModelLoad {
        /// Model name.
        name: String,
        /// Underlying reason.
        reason: String,
    },

    /// A model call failed.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// The external transcoder failed.
    #[error("Transcode error: {0}")]
    TranscodeError(String),

    /// Processing was requested for a video that has not finished uploading.
    #[error("Video {0} has not finished uploading")]
    NotUploaded(String),

    /// No record exists for the requested video.
    #[error("Video {0} not found")]
    VideoNotFound(String),

    /// A stage needs an artifact that an earlier stage should have produced.
    #[error("Stage {stage} requires missing artifact {path}")]
    MissingArtifact {
        /// The stage that needed the artifact.
        stage: Stage,
        /// Path of the artifact.
        path: PathBuf,
    },

    /// Reading or writing a feature matrix file failed.
    #[error("Feature store error: {0}")]
    FeatureStore(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// A JSON artifact could not be parsed or written.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// A pipeline run panicked. Holds the panic message.
    #[error("Processing panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    /// Build a [`PipelineError::Panicked`] from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => payload
                .downcast_ref::<&str>()
                .map_or_else(|| "unknown panic".to_string(), |message| (*message).to_string()),
        };
        PipelineError::Panicked(message)
    }
}

impl From<FfmpegError> for PipelineError {
    fn from(error: FfmpegError) -> Self {
        PipelineError::FfmpegError(error.to_string())
    }
}

impl From<ndarray_npy::ReadNpyError> for PipelineError {
    fn from(error: ndarray_npy::ReadNpyError) -> Self {
        PipelineError::FeatureStore(error.to_string())
    }
}

impl From<ndarray_npy::WriteNpyError> for PipelineError {
    fn from(error: ndarray_npy::WriteNpyError) -> Self {
        PipelineError::FeatureStore(error.to_string())
    }
}

impl From<ndarray_npy::ReadNpzError> for PipelineError {
    fn from(error: ndarray_npy::ReadNpzError) -> Self {
        PipelineError::FeatureStore(error.to_string())
    }
}

impl From<ndarray_npy::WriteNpzError> for PipelineError {
    fn from(error: ndarray_npy::WriteNpzError) -> Self {
        PipelineError::FeatureStore(error.to_string())
    }
}
