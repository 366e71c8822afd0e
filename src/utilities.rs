//! Internal utility functions.
//!
//! Helpers for pixel-data copying and time/frame conversion shared by the
//! stream, chunking and normalization modules.

use std::fs;
use std::path::Path;

use ffmpeg_next::{Rational, frame::Video as VideoFrame};
use serde::Serialize;

use crate::error::PipelineError;

/// Copy pixel data from an FFmpeg RGB24 frame into a tightly-packed buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × 3).
/// This function strips that padding so the result can be passed directly to
/// [`image::RgbImage::from_raw`].
pub(crate) fn frame_to_rgb_buffer(video_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_bytes = (width as usize) * 3;
    let data = video_frame.data(0);

    if stride == row_bytes {
        data[..row_bytes * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
        }
        buffer
    }
}

/// Convert an FFmpeg rational to frames per second, or `None` when the
/// denominator is zero.
pub(crate) fn rational_to_fps(rate: Rational) -> Option<f64> {
    (rate.denominator() != 0 && rate.numerator() > 0)
        .then(|| rate.numerator() as f64 / rate.denominator() as f64)
}

/// Number of frames spanned by `seconds` at `framerate`, rounded to the
/// nearest frame.
///
/// # Errors
///
/// [`PipelineError::InvalidChunkDuration`] if the result is not at least one
/// frame.
pub fn seconds_to_frame_count(seconds: f64, framerate: f64) -> Result<usize, PipelineError> {
    let frames = (seconds * framerate).round();
    if !frames.is_finite() || frames < 1.0 {
        return Err(PipelineError::InvalidChunkDuration { seconds, framerate });
    }
    Ok(frames as usize)
}

/// Produce `path` through a sibling `<name>.tmp` file that `write` fills
/// and that is then renamed over `path`.
///
/// `path` only ever appears complete. If `write` fails the temp file is
/// removed and `path` keeps its previous content, or stays absent.
pub(crate) fn write_atomically<F>(path: &Path, write: F) -> Result<(), PipelineError>
where
    F: FnOnce(&Path) -> Result<(), PipelineError>,
{
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    if let Err(error) = write(&temp_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(error);
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Serialize `value` as JSON and write it with [`write_atomically`].
pub(crate) fn write_json_atomically<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), PipelineError> {
    let bytes = serde_json::to_vec(value)?;
    write_atomically(path, |temp_path| Ok(fs::write(temp_path, &bytes)?))
}
