//! Metadata of a video file stored in a video folder.
//!
//! [`VideoFile`] is probed once with FFmpeg when a file is produced
//! (uploaded, normalized, tagged) and stored on the video's record.
//!
//! # Example
//!
//! ```no_run
//! use signpipe::VideoFile;
//!
//! let file = VideoFile::probe("videos_data/42", "videos_data/42/normalized_file.mp4")?;
//! println!("{} frames at {} fps", file.frame_count, file.framerate);
//! # Ok::<(), signpipe::PipelineError>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::media::Type;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::file_stream::FileFrameStream;
use crate::frame_stream::FrameStream;
use crate::utilities::rational_to_fps;

/// Probed properties of a video file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFile {
    /// MIME type guessed from the extension, e.g. `"video/mp4"`.
    pub media_type: String,
    /// Path relative to the video folder.
    pub file_path: PathBuf,
    /// Container duration in seconds.
    pub duration_seconds: f64,
    /// Number of video frames.
    pub frame_count: usize,
    /// Frames per second.
    pub framerate: f64,
    /// Frame width in pixels.
    pub frame_width: u32,
    /// Frame height in pixels.
    pub frame_height: u32,
    /// Size of the file on disk.
    pub file_size_bytes: u64,
}

impl VideoFile {
    /// Probe `file_path` and record it relative to `root_path`.
    ///
    /// When the container does not declare a frame count, the frames are
    /// decoded and counted.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnsupportedFileType`] for an unknown extension,
    /// [`PipelineError::FileOpen`] or [`PipelineError::NoVideoStream`] if
    /// FFmpeg cannot read the file.
    pub fn probe<R: AsRef<Path>, P: AsRef<Path>>(root_path: R, file_path: P) -> Result<Self, PipelineError> {
        let file_path = file_path.as_ref();
        let media_type = guess_media_type(file_path)?;
        let file_size_bytes = fs::metadata(file_path)?.len();

        ffmpeg_next::init().map_err(|error| PipelineError::FileOpen {
            path: file_path.to_path_buf(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;
        let input_context =
            ffmpeg_next::format::input(&file_path).map_err(|error| PipelineError::FileOpen {
                path: file_path.to_path_buf(),
                reason: error.to_string(),
            })?;

        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or_else(|| PipelineError::NoVideoStream(file_path.to_path_buf()))?;
        let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .video()?;

        let framerate = rational_to_fps(stream.avg_frame_rate())
            .or_else(|| rational_to_fps(stream.rate()))
            .unwrap_or(0.0);
        let duration_microseconds = input_context.duration();
        let duration_seconds = if duration_microseconds > 0 {
            Duration::from_micros(duration_microseconds as u64).as_secs_f64()
        } else {
            0.0
        };

        let mut frame_count = usize::try_from(stream.frames()).unwrap_or(0);
        if frame_count == 0 {
            log::warn!(
                "{} does not declare a frame count, counting decoded frames",
                file_path.display()
            );
            frame_count = count_frames(file_path)?;
        }

        let relative_path = file_path
            .strip_prefix(root_path.as_ref())
            .unwrap_or(file_path)
            .to_path_buf();

        Ok(Self {
            media_type,
            file_path: relative_path,
            duration_seconds,
            frame_count,
            framerate,
            frame_width: decoder.width(),
            frame_height: decoder.height(),
            file_size_bytes,
        })
    }
}

/// Guess a video MIME type from the file extension.
pub fn guess_media_type(path: &Path) -> Result<String, PipelineError> {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let media_type = match extension.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mpeg" | "mpg" => "video/mpeg",
        "ogv" => "video/ogg",
        _ => return Err(PipelineError::UnsupportedFileType(path.to_path_buf())),
    };
    Ok(media_type.to_string())
}

/// Decode the whole file and count its frames.
pub fn count_frames(path: &Path) -> Result<usize, PipelineError> {
    let mut stream = FileFrameStream::open(path)?;
    let mut count = 0;
    while stream.next_frame()?.is_some() {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_follows_extension() {
        assert_eq!(guess_media_type(Path::new("a/b.MP4")).unwrap(), "video/mp4");
        assert_eq!(guess_media_type(Path::new("clip.webm")).unwrap(), "video/webm");
        assert!(matches!(
            guess_media_type(Path::new("notes.txt")),
            Err(PipelineError::UnsupportedFileType(_))
        ));
        assert!(guess_media_type(Path::new("no_extension")).is_err());
    }
}
