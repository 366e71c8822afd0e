//! Access to video files on disk.
//!
//! The stages never call FFmpeg directly; they go through a [`VideoSource`]
//! so that the whole pipeline can run against synthetic streams.

use std::path::Path;

use crate::error::PipelineError;
use crate::file_stream::FileFrameStream;
use crate::frame_stream::FrameStream;
use crate::metadata::VideoFile;

/// Opens frame streams over video files and probes their metadata.
pub trait VideoSource: Send + Sync {
    /// Open a forward-only frame stream over `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn FrameStream>, PipelineError>;

    /// Probe `path`, recording it relative to `root_path`.
    fn probe(&self, root_path: &Path, path: &Path) -> Result<VideoFile, PipelineError>;
}

/// [`VideoSource`] backed by the FFmpeg libraries.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegVideoSource;

impl VideoSource for FfmpegVideoSource {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameStream>, PipelineError> {
        Ok(Box::new(FileFrameStream::open(path)?))
    }

    fn probe(&self, root_path: &Path, path: &Path) -> Result<VideoFile, PipelineError> {
        VideoFile::probe(root_path, path)
    }
}
