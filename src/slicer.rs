//! Fixed-length clip splitting.

use crate::chunker::Chunker;
use crate::clip::{Clip, ClipsCollection};
use crate::error::PipelineError;
use crate::frame_stream::FrameStream;

/// Split `stream` into consecutive clips of `clip_seconds` each.
///
/// The last clip may be shorter. The returned collection's lookup table has
/// one entry per frame of the stream.
///
/// # Errors
///
/// Propagates stream errors, [`PipelineError::InvalidChunkDuration`] for a
/// duration shorter than one frame, and [`PipelineError::ClipsNotContiguous`]
/// if the resulting clips fail the contiguity check.
pub fn slice_into_clips<S: FrameStream + ?Sized>(
    stream: &mut S,
    clip_seconds: f64,
) -> Result<ClipsCollection, PipelineError> {
    let mut clips = Vec::new();
    let mut start_frame = 0;

    for chunk in Chunker::new(stream, clip_seconds)? {
        let frame_count = chunk?.len();
        clips.push(Clip::new(clips.len(), start_frame, frame_count));
        start_frame += frame_count;
    }

    log::debug!("Sliced {start_frame} frames into {} clips", clips.len());
    ClipsCollection::from_clips(clips)
}
