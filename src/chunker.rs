//! Time-based chunking of a frame stream.
//!
//! [`Chunker`] cuts a [`FrameStream`] into consecutive in-memory chunks of
//! `round(seconds * framerate)` frames each. Only the last chunk may be
//! shorter; a chunk is never empty.
//!
//! # Example
//!
//! ```
//! use signpipe::{Chunker, Frame, FrameStream, InMemoryFrameStream};
//!
//! let mut stream = InMemoryFrameStream::new(25.0, Some((2, 2)));
//! for _ in 0..60 {
//!     stream.write_frame(Frame::filled(2, 2, [0, 0, 0]), true)?;
//! }
//! stream.seek(0);
//!
//! let lengths: Vec<usize> = Chunker::new(&mut stream, 1.0)?
//!     .map(|chunk| chunk.map(|chunk| chunk.len()))
//!     .collect::<Result<_, _>>()?;
//! assert_eq!(lengths, vec![25, 25, 10]);
//! # Ok::<(), signpipe::PipelineError>(())
//! ```

use crate::error::PipelineError;
use crate::frame_stream::FrameStream;
use crate::memory_stream::InMemoryFrameStream;
use crate::utilities::seconds_to_frame_count;

/// Lazy, forward-only iterator of bounded-duration chunks.
///
/// Each chunk inherits the framerate and declared size of the source.
pub struct Chunker<'a, S: FrameStream + ?Sized> {
    source: &'a mut S,
    chunk_length: usize,
    done: bool,
}

impl<'a, S: FrameStream + ?Sized> Chunker<'a, S> {
    /// Chunk `source` into pieces of `seconds` each.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidChunkDuration`] if `seconds` converts to fewer
    /// than one frame at the source framerate.
    pub fn new(source: &'a mut S, seconds: f64) -> Result<Self, PipelineError> {
        let chunk_length = seconds_to_frame_count(seconds, source.framerate())?;
        Ok(Self::with_frame_count(source, chunk_length))
    }

    /// Chunk `source` into pieces of `chunk_length` frames (at least one).
    pub fn with_frame_count(source: &'a mut S, chunk_length: usize) -> Self {
        Self {
            source,
            chunk_length: chunk_length.max(1),
            done: false,
        }
    }

    /// Target number of frames per chunk.
    pub fn chunk_length(&self) -> usize {
        self.chunk_length
    }

    fn drain_chunk(&mut self) -> Result<InMemoryFrameStream, PipelineError> {
        let mut chunk = InMemoryFrameStream::new(self.source.framerate(), self.source.fixed_size());
        while chunk.len() < self.chunk_length {
            match self.source.next_frame()? {
                Some(frame) => chunk.write_frame(frame, true)?,
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        chunk.seek(0);
        Ok(chunk)
    }
}

impl<S: FrameStream + ?Sized> Iterator for Chunker<'_, S> {
    type Item = Result<InMemoryFrameStream, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.drain_chunk() {
            Ok(chunk) if chunk.is_empty() => None,
            Ok(chunk) => Some(Ok(chunk)),
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn stream_of(count: usize, framerate: f64) -> InMemoryFrameStream {
        let mut stream = InMemoryFrameStream::new(framerate, Some((1, 1)));
        for _ in 0..count {
            stream
                .write_frame(Frame::filled(1, 1, [0, 0, 0]), true)
                .unwrap();
        }
        stream.seek(0);
        stream
    }

    #[test]
    fn chunk_counts_match_ceiling_division() {
        for total in [0usize, 1, 7, 24, 25, 26, 49, 50, 51, 250] {
            for length in [1usize, 3, 25, 50] {
                let mut stream = stream_of(total, 25.0);
                let lengths: Vec<usize> = Chunker::with_frame_count(&mut stream, length)
                    .map(|chunk| chunk.unwrap().len())
                    .collect();

                assert_eq!(lengths.len(), total.div_ceil(length), "N={total} L={length}");
                assert_eq!(lengths.iter().sum::<usize>(), total);
                if let Some((last, rest)) = lengths.split_last() {
                    assert!(rest.iter().all(|&l| l == length));
                    let remainder = total % length;
                    assert_eq!(*last, if remainder == 0 { length } else { remainder });
                }
            }
        }
    }

    #[test]
    fn exhausted_source_yields_nothing() {
        let mut stream = stream_of(5, 25.0);
        stream.seek(5);
        assert_eq!(Chunker::new(&mut stream, 1.0).unwrap().count(), 0);
    }

    #[test]
    fn chunks_inherit_source_properties() {
        let mut stream = stream_of(10, 30.0);
        let chunk = Chunker::new(&mut stream, 0.1).unwrap().next().unwrap().unwrap();
        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk.framerate(), 30.0);
        assert_eq!(chunk.fixed_size(), Some((1, 1)));
    }

    #[test]
    fn too_short_duration_is_rejected() {
        let mut stream = stream_of(10, 25.0);
        assert!(matches!(
            Chunker::new(&mut stream, 0.001),
            Err(PipelineError::InvalidChunkDuration { .. })
        ));
    }
}
