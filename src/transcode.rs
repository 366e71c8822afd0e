//! Video normalization and frame tagging through an external transcoder.
//!
//! The normalize stage rewrites an uploaded video to a framerate inside
//! `[fps_lower_bound, fps_upper_bound]` and at most `max_pixel_count` pixels
//! per frame, encoded as H.264 `yuv420p`. [`NormalizationPlan`] decides what
//! has to change; a [`Transcoder`] carries it out as a black box that either
//! runs to completion or fails.
//!
//! [`FfmpegCommand`] drives the `ffmpeg` command-line tool.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::PipelineError;
use crate::ffmpeg::FfmpegLogLevel;
use crate::metadata::VideoFile;

/// Framerate and resolution bounds for normalized videos.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationSettings {
    /// Lowest framerate kept as is.
    pub fps_lower_bound: f64,
    /// Highest framerate kept as is.
    pub fps_upper_bound: f64,
    /// Framerate used when the source is outside the bounds.
    pub target_fps: f64,
    /// Frames with more pixels than this are downscaled.
    pub max_pixel_count: u64,
    /// Length of the longer side after downscaling.
    pub target_size: u32,
}

impl Default for NormalizationSettings {
    fn default() -> Self {
        Self {
            // many videos are 23.98 fps
            fps_lower_bound: 23.0,
            fps_upper_bound: 30.0,
            target_fps: 30.0,
            max_pixel_count: 1280 * 720,
            target_size: 1280,
        }
    }
}

/// What the transcoder has to change about a source video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationPlan {
    /// Resample to this framerate; `None` keeps the source framerate.
    pub framerate: Option<f64>,
    /// Scale to this `(width, height)`; `None` keeps the source size.
    pub size: Option<(u32, u32)>,
}

impl NormalizationPlan {
    /// Decide how to normalize `source`.
    pub fn for_source(source: &VideoFile, settings: &NormalizationSettings) -> Self {
        let framerate = (source.framerate < settings.fps_lower_bound
            || source.framerate > settings.fps_upper_bound)
            .then_some(settings.target_fps);

        let pixel_count = u64::from(source.frame_width) * u64::from(source.frame_height);
        let size = (pixel_count > settings.max_pixel_count).then(|| {
            scale_long_side(source.frame_width, source.frame_height, settings.target_size)
        });

        Self { framerate, size }
    }

    /// The `-vf` filter chain, or `None` when nothing changes.
    pub fn filter_graph(&self) -> Option<String> {
        let mut filters = Vec::new();
        if let Some(framerate) = self.framerate {
            filters.push(format!("fps={framerate}:round=down"));
        }
        if let Some((width, height)) = self.size {
            filters.push(format!("scale={width}:{height}"));
        }
        (!filters.is_empty()).then(|| filters.join(","))
    }
}

/// Scale so the longer side equals `target`, keeping the aspect ratio and
/// rounding both sides to even numbers.
fn scale_long_side(width: u32, height: u32, target: u32) -> (u32, u32) {
    let even = |value: f64| ((value / 2.0).round() as u32 * 2).max(2);
    if width >= height {
        (even(f64::from(target)), even(f64::from(height) * f64::from(target) / f64::from(width)))
    } else {
        (even(f64::from(width) * f64::from(target) / f64::from(height)), even(f64::from(target)))
    }
}

/// An external video transcoder.
pub trait Transcoder: Send + Sync {
    /// Write a normalized copy of `input` to `output`.
    fn normalize(&self, input: &Path, output: &Path, plan: &NormalizationPlan) -> Result<(), PipelineError>;

    /// Write a copy of `input` to `output` with each frame's number drawn in
    /// its top-left corner.
    fn tag_frames(&self, input: &Path, output: &Path) -> Result<(), PipelineError>;
}

/// Burn frame numbers into `path`, replacing the file.
pub fn tag_frames_in_place(transcoder: &dyn Transcoder, path: &Path) -> Result<(), PipelineError> {
    let temp_path = path.with_file_name("temp_tagged_file.mp4");
    transcoder.tag_frames(path, &temp_path)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// [`Transcoder`] that runs the `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    program: PathBuf,
    log_level: FfmpegLogLevel,
}

impl Default for FfmpegCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegCommand {
    /// Run `ffmpeg` from `PATH` with log level `error`.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            log_level: FfmpegLogLevel::Error,
        }
    }

    /// Use a specific `ffmpeg` executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the `-loglevel` passed to `ffmpeg`.
    #[must_use]
    pub fn with_log_level(mut self, level: FfmpegLogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Arguments of a normalize run.
    pub fn normalize_arguments(&self, input: &Path, output: &Path, plan: &NormalizationPlan) -> Vec<OsString> {
        let mut arguments = self.input_arguments(input);
        if let Some(filters) = plan.filter_graph() {
            arguments.push("-vf".into());
            arguments.push(filters.into());
        }
        arguments.extend(self.output_arguments(output));
        arguments
    }

    /// Arguments of a frame tagging run.
    pub fn tag_arguments(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut arguments = self.input_arguments(input);
        arguments.push("-vf".into());
        arguments.push(
            "drawtext=text='%{frame_num}':start_number=0:x=10:y=10:fontsize=32:fontcolor=white:box=1:boxcolor=black@0.6"
                .into(),
        );
        arguments.extend(self.output_arguments(output));
        arguments
    }

    fn input_arguments(&self, input: &Path) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-loglevel".into(),
            self.log_level.name().into(),
            "-i".into(),
            input.as_os_str().to_owned(),
        ]
    }

    fn output_arguments(&self, output: &Path) -> Vec<OsString> {
        vec![
            "-an".into(),
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            output.as_os_str().to_owned(),
        ]
    }

    fn run(&self, arguments: Vec<OsString>) -> Result<(), PipelineError> {
        log::debug!("Running {} {:?}", self.program.display(), arguments);

        let output = Command::new(&self.program)
            .args(&arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|error| {
                PipelineError::TranscodeError(format!("Failed to spawn {}: {error}", self.program.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::TranscodeError(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Transcoder for FfmpegCommand {
    fn normalize(&self, input: &Path, output: &Path, plan: &NormalizationPlan) -> Result<(), PipelineError> {
        self.run(self.normalize_arguments(input, output, plan))
    }

    fn tag_frames(&self, input: &Path, output: &Path) -> Result<(), PipelineError> {
        self.run(self.tag_arguments(input, output))
    }
}
