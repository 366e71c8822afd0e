//! The [`FrameStream`] capability trait.
//!
//! A frame stream is anything that hands out [`Frame`]s one at a time in
//! order and knows its framerate. Three implementations ship with the crate:
//!
//! - [`FileFrameStream`](crate::FileFrameStream) decodes a video file on
//!   demand and cannot be restarted without reopening it.
//! - [`InMemoryFrameStream`](crate::InMemoryFrameStream) buffers every frame
//!   and can be rewound or overwritten.
//! - [`FolderFrameStream`](crate::FolderFrameStream) stores one numbered
//!   JPEG per frame and supports out-of-order writes.
//!
//! Reaching the end of a stream is not an error: [`FrameStream::next_frame`]
//! returns `Ok(None)`.

use crate::error::PipelineError;
use crate::frame::Frame;

/// Sequential access to video frames.
pub trait FrameStream {
    /// Frames per second.
    fn framerate(&self) -> f64;

    /// Width of every frame in the stream.
    ///
    /// # Errors
    ///
    /// [`PipelineError::HeterogeneousStream`] if the stream has no declared
    /// fixed size.
    fn width(&self) -> Result<u32, PipelineError>;

    /// Height of every frame in the stream.
    ///
    /// # Errors
    ///
    /// [`PipelineError::HeterogeneousStream`] if the stream has no declared
    /// fixed size.
    fn height(&self) -> Result<u32, PipelineError>;

    /// Read the next frame, or `Ok(None)` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError>;

    /// The declared `(width, height)`, if the stream has one.
    fn fixed_size(&self) -> Option<(u32, u32)> {
        match (self.width(), self.height()) {
            (Ok(width), Ok(height)) => Some((width, height)),
            _ => None,
        }
    }

    /// Borrow the stream as an [`Iterator`] of frames.
    ///
    /// The iterator stops after the first error.
    fn frames(&mut self) -> Frames<'_, Self>
    where
        Self: Sized,
    {
        Frames {
            stream: self,
            done: false,
        }
    }
}

impl<S: FrameStream + ?Sized> FrameStream for Box<S> {
    fn framerate(&self) -> f64 {
        (**self).framerate()
    }

    fn width(&self) -> Result<u32, PipelineError> {
        (**self).width()
    }

    fn height(&self) -> Result<u32, PipelineError> {
        (**self).height()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        (**self).next_frame()
    }
}

/// Iterator adapter returned by [`FrameStream::frames`].
pub struct Frames<'a, S: ?Sized> {
    stream: &'a mut S,
    done: bool,
}

impl<S: FrameStream + ?Sized> Iterator for Frames<'_, S> {
    type Item = Result<Frame, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.stream.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

/// Reject `frame` if `declared` is set and the sizes differ.
pub(crate) fn check_resolution(
    declared: Option<(u32, u32)>,
    frame: &Frame,
) -> Result<(), PipelineError> {
    match declared {
        Some((width, height)) if frame.width() != width || frame.height() != height => {
            Err(PipelineError::ResolutionMismatch {
                expected_width: width,
                expected_height: height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            })
        }
        _ => Ok(()),
    }
}
