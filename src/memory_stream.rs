//! Fully buffered frame stream.

use crate::error::PipelineError;
use crate::frame::Frame;
use crate::frame_stream::{FrameStream, check_resolution};

/// A frame stream held entirely in memory.
///
/// Reading advances a cursor; [`seek`](InMemoryFrameStream::seek) moves it
/// anywhere in `[0, len]`, which makes the stream restartable. Writing at
/// the cursor overwrites an existing frame or appends at the end.
///
/// # Example
///
/// ```
/// use signpipe::{Frame, FrameStream, InMemoryFrameStream};
///
/// let mut stream = InMemoryFrameStream::new(25.0, Some((4, 4)));
/// stream.write_frame(Frame::filled(4, 4, [0, 0, 0]), true)?;
/// stream.write_frame(Frame::filled(4, 4, [255, 0, 0]), true)?;
///
/// stream.seek(0);
/// assert_eq!(stream.frames().count(), 2);
/// # Ok::<(), signpipe::PipelineError>(())
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryFrameStream {
    framerate: f64,
    size: Option<(u32, u32)>,
    frames: Vec<Frame>,
    next_frame_index: usize,
}

impl InMemoryFrameStream {
    /// Create an empty stream. `size` declares a fixed `(width, height)`
    /// that every written frame must match; `None` accepts any size.
    pub fn new(framerate: f64, size: Option<(u32, u32)>) -> Self {
        Self {
            framerate,
            size,
            frames: Vec::new(),
            next_frame_index: 0,
        }
    }

    /// Buffer the rest of `source` and rewind to the first frame.
    pub fn from_stream<S: FrameStream + ?Sized>(source: &mut S) -> Result<Self, PipelineError> {
        let mut stream = Self::new(source.framerate(), source.fixed_size());
        while let Some(frame) = source.next_frame()? {
            stream.write_frame(frame, true)?;
        }
        stream.seek(0);
        Ok(stream)
    }

    /// Number of buffered frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if no frames are buffered.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Move the cursor. Clamped to `[0, len]`.
    pub fn seek(&mut self, frame_index: usize) {
        self.next_frame_index = frame_index.min(self.frames.len());
    }

    /// Read the frame under the cursor, optionally advancing past it.
    pub fn read_frame(&mut self, advance: bool) -> Option<Frame> {
        let frame = self.frames.get(self.next_frame_index)?.clone();
        if advance {
            self.next_frame_index += 1;
        }
        Some(frame)
    }

    /// Write a frame at the cursor, overwriting or appending.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ResolutionMismatch`] if the stream has a fixed size
    /// that `frame` does not match.
    pub fn write_frame(&mut self, frame: Frame, advance: bool) -> Result<(), PipelineError> {
        check_resolution(self.size, &frame)?;

        if self.next_frame_index == self.frames.len() {
            self.frames.push(frame);
        } else {
            self.frames[self.next_frame_index] = frame;
        }

        if advance {
            self.next_frame_index += 1;
        }
        Ok(())
    }

    /// Borrow all buffered frames.
    pub fn as_slice(&self) -> &[Frame] {
        &self.frames
    }

    /// Take all buffered frames.
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

impl FrameStream for InMemoryFrameStream {
    fn framerate(&self) -> f64 {
        self.framerate
    }

    fn width(&self) -> Result<u32, PipelineError> {
        self.size
            .map(|(width, _)| width)
            .ok_or(PipelineError::HeterogeneousStream)
    }

    fn height(&self) -> Result<u32, PipelineError> {
        self.size
            .map(|(_, height)| height)
            .ok_or(PipelineError::HeterogeneousStream)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        Ok(self.read_frame(true))
    }
}
