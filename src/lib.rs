//! # signpipe
//!
//! Resumable sign language video pipeline: normalize an uploaded video,
//! detect per-frame body, hand and face geometry, crop regions of interest,
//! encode the crops into visual features, slice the video into clips and
//! translate the clips one after another with a rolling text context.
//!
//! The neural models are not part of this crate. They plug in through the
//! traits of [`models`]; decoding and probing use FFmpeg via
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next), and normalization
//! runs the `ffmpeg` executable.
//!
//! ## Quick Start
//!
//! ### Chunk a Video
//!
//! ```no_run
//! use signpipe::{Chunker, FileFrameStream};
//!
//! let mut stream = FileFrameStream::open("input.mp4")?;
//! for chunk in Chunker::new(&mut stream, 1.0)? {
//!     println!("chunk of {} frames", chunk?.len());
//! }
//! # Ok::<(), signpipe::PipelineError>(())
//! ```
//!
//! ### Slice a Video into Clips
//!
//! ```no_run
//! use signpipe::{FileFrameStream, slice_into_clips};
//!
//! let mut stream = FileFrameStream::open("input.mp4")?;
//! let clips = slice_into_clips(&mut stream, 2.0)?;
//! clips.store("clips_collection.json")?;
//! # Ok::<(), signpipe::PipelineError>(())
//! ```
//!
//! ### Run the Whole Pipeline
//!
//! Build a [`Toolkit`] with the model factories, then hand a video record
//! to [`process_video`]. Every stage writes its artifact into the video's
//! folder; running again skips the stages that are already done.
//!
//! ## Features
//!
//! - **Frame streams** over video files, in-memory buffers and numbered
//!   image folders
//! - **Time-based chunking** of any frame stream
//! - **Bounded worker pool** with per-worker model handles and lock-free
//!   disjoint result slots
//! - **Idempotent stages** detected by their artifacts, with forced rerun
//! - **Rolling context** translation with nearest-token inspection of the
//!   projected visual embeddings
//! - **Progress & cancellation** through `ProgressCallback` and
//!   `CancellationToken`
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | `ProcessingFuture` and `LogFollower` via Tokio |
//! | `rayon` | Parallel nearest-token lookup |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed to build, and the
//! `ffmpeg` executable must be on `PATH` to normalize videos.

#[cfg(feature = "async")]
pub mod background;
pub mod chunker;
pub mod clip;
pub mod configuration;
pub mod context;
pub mod detection;
pub mod encoding;
pub mod error;
pub mod features;
pub mod ffmpeg;
pub mod file_stream;
pub mod folder_stream;
pub mod frame;
pub mod frame_stream;
pub mod geometry;
pub mod memory_stream;
pub mod metadata;
pub mod models;
pub mod neighbors;
pub mod processing_log;
pub mod processor;
pub mod progress;
pub mod repository;
pub mod slicer;
pub mod source;
pub mod stage;
pub mod transcode;
pub mod translation;
mod utilities;
pub mod worker_pool;

#[cfg(feature = "async")]
pub use background::{LogFollower, ProcessingFuture};
pub use chunker::Chunker;
pub use clip::{Clip, ClipsCollection};
pub use configuration::{DEFAULT_PROMPT_TEMPLATE, PipelineOptions};
pub use context::ContextTracker;
pub use detection::{CropFolders, detect_geometry, run_detection};
pub use encoding::{clip_landmarks, run_dino, run_mae, run_sign2vec};
pub use error::PipelineError;
pub use features::{
    ClipFeatureMap, ClipVisualFeatures, DINO_DIMENSION, DINO_PART_DIMENSION, MAE_DIMENSION,
    S2V_DIMENSION, VideoVisualFeatures,
};
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use file_stream::FileFrameStream;
pub use folder_stream::FolderFrameStream;
pub use frame::Frame;
pub use frame_stream::{FrameStream, Frames};
pub use geometry::{BoundingBox, FrameGeometry, LandmarkKind, Landmarks, load_geometry, store_geometry};
pub use memory_stream::InMemoryFrameStream;
pub use metadata::VideoFile;
pub use models::{
    ClipLandmarks, DetectionBatch, FrameEncoder, GenerationConfig, LandmarkDetector,
    LandmarkSequenceEncoder, ModelCache, ModelFactory, TranslationInput, TranslationOutput,
    Translator,
};
pub use neighbors::EmbeddingNeighborLookup;
pub use processing_log::ProcessingLog;
pub use processor::{Toolkit, VideoProcessor, process_video};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use repository::{Video, VideoFolder, VideoFolderFactory, VideosRepository};
pub use slicer::slice_into_clips;
pub use source::{FfmpegVideoSource, VideoSource};
pub use stage::Stage;
pub use transcode::{FfmpegCommand, NormalizationPlan, NormalizationSettings, Transcoder};
pub use translation::{ModalitySelection, prepare_translation_prompt, retranslate_clip, translate_clips};
pub use utilities::seconds_to_frame_count;
