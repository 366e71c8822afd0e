//! Normalization integration tests.
//!
//! Tests require fixture files from `tests/fixtures/generate_fixtures.sh`
//! and the `ffmpeg` executable on `PATH`.

use std::path::Path;
use std::process::Command;

use signpipe::transcode::tag_frames_in_place;
use signpipe::{
    FfmpegCommand, FfmpegLogLevel, NormalizationPlan, NormalizationSettings, PipelineError,
    Transcoder, VideoFile,
};

fn high_framerate_video_path() -> &'static str {
    "tests/fixtures/sample_video_1080p60.mp4"
}

fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .output()
        .is_ok_and(|output| output.status.success())
}

#[test]
fn normalize_downscales_and_resamples() {
    let path = high_framerate_video_path();
    if !Path::new(path).exists() || !ffmpeg_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("normalized_file.mp4");
    let source = VideoFile::probe("tests/fixtures", path).unwrap();
    let plan = NormalizationPlan::for_source(&source, &NormalizationSettings::default());
    assert_eq!(plan.framerate, Some(30.0));
    assert_eq!(plan.size, Some((1280, 720)));

    let transcoder = FfmpegCommand::new().with_log_level(FfmpegLogLevel::Error);
    transcoder.normalize(Path::new(path), &output, &plan).unwrap();

    let normalized = VideoFile::probe(dir.path(), &output).unwrap();
    assert_eq!((normalized.frame_width, normalized.frame_height), (1280, 720));
    assert!((normalized.framerate - 30.0).abs() < 0.01);
    assert_eq!(normalized.file_path, Path::new("normalized_file.mp4"));
}

#[test]
fn tagging_keeps_frame_count() {
    let path = high_framerate_video_path();
    if !Path::new(path).exists() || !ffmpeg_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("normalized_file.mp4");
    let source = VideoFile::probe("tests/fixtures", path).unwrap();
    let plan = NormalizationPlan::for_source(&source, &NormalizationSettings::default());

    let transcoder = FfmpegCommand::new().with_log_level(FfmpegLogLevel::Error);
    transcoder.normalize(Path::new(path), &output, &plan).unwrap();
    let before = VideoFile::probe(dir.path(), &output).unwrap().frame_count;

    match tag_frames_in_place(&transcoder, &output) {
        // ffmpeg built without the drawtext filter
        Err(PipelineError::TranscodeError(message)) if message.contains("drawtext") => return,
        result => result.unwrap(),
    }
    let after = VideoFile::probe(dir.path(), &output).unwrap().frame_count;
    assert_eq!(before, after);
    assert!(!dir.path().join("temp_tagged_file.mp4").exists());
}

#[test]
fn missing_program_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = FfmpegCommand::new().with_program(dir.path().join("no-such-ffmpeg"));
    let plan = NormalizationPlan {
        framerate: None,
        size: None,
    };

    let result = transcoder.normalize(
        &dir.path().join("in.mp4"),
        &dir.path().join("out.mp4"),
        &plan,
    );
    assert!(matches!(result, Err(PipelineError::TranscodeError(_))));
}
