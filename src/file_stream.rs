//! Frame stream decoded from a video file on demand.
//!
//! [`FileFrameStream`] reads and decodes just enough packets to produce the
//! next frame, converting every frame to RGB24 at the stream's native
//! resolution. It is single-pass: restarting requires reopening the file.
//!
//! # Example
//!
//! ```no_run
//! use signpipe::{FileFrameStream, FrameStream};
//!
//! let mut stream = FileFrameStream::open("normalized_file.mp4")?;
//! println!("{} fps, {}x{}", stream.framerate(), stream.width()?, stream.height()?);
//!
//! for frame in stream.frames() {
//!     let frame = frame?;
//!     println!("{frame:?}");
//! }
//! # Ok::<(), signpipe::PipelineError>(())
//! ```

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    Error as FfmpegError, Packet,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::RgbImage;

use crate::error::PipelineError;
use crate::frame::Frame;
use crate::frame_stream::FrameStream;
use crate::utilities::{frame_to_rgb_buffer, rational_to_fps};

/// A forward-only stream of frames decoded from a video file.
pub struct FileFrameStream {
    path: PathBuf,
    input_context: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    video_stream_index: usize,
    framerate: f64,
    width: u32,
    height: u32,
    decoded_frame: VideoFrame,
    scaled_frame: VideoFrame,
    eof_sent: bool,
    done: bool,
}

impl FileFrameStream {
    /// Open `path` and prepare its best video stream for decoding.
    ///
    /// # Errors
    ///
    /// [`PipelineError::FileOpen`] if FFmpeg cannot open the file or build a
    /// decoder, [`PipelineError::NoVideoStream`] if it has no video stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref().to_path_buf();

        ffmpeg_next::init().map_err(|error| PipelineError::FileOpen {
            path: path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| PipelineError::FileOpen {
                path: path.clone(),
                reason: error.to_string(),
            })?;

        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or_else(|| PipelineError::NoVideoStream(path.clone()))?;
        let video_stream_index = stream.index();

        let framerate = rational_to_fps(stream.avg_frame_rate())
            .or_else(|| rational_to_fps(stream.rate()))
            .ok_or_else(|| PipelineError::FileOpen {
                path: path.clone(),
                reason: "Video stream does not declare a framerate".to_string(),
            })?;

        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| PipelineError::FileOpen {
                path: path.clone(),
                reason: format!("Failed to create video decoder: {error}"),
            })?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ScalingContext::get(
            decoder.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            ScalingFlags::BILINEAR,
        )?;

        log::debug!(
            "Opened {} for decoding ({width}x{height} @ {framerate:.3} fps)",
            path.display()
        );

        Ok(Self {
            path,
            input_context,
            decoder,
            scaler,
            video_stream_index,
            framerate,
            width,
            height,
            decoded_frame: VideoFrame::empty(),
            scaled_frame: VideoFrame::empty(),
            eof_sent: false,
            done: false,
        })
    }

    /// The file being decoded.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn convert_current_frame(&mut self) -> Result<Frame, PipelineError> {
        self.scaler.run(&self.decoded_frame, &mut self.scaled_frame)?;

        let buffer = frame_to_rgb_buffer(&self.scaled_frame, self.width, self.height);
        let image = RgbImage::from_raw(self.width, self.height, buffer).ok_or_else(|| {
            PipelineError::VideoDecodeError(
                "Failed to construct RGB image from decoded frame data".to_string(),
            )
        })?;
        Ok(Frame::new(image))
    }
}

impl FrameStream for FileFrameStream {
    fn framerate(&self) -> f64 {
        self.framerate
    }

    fn width(&self) -> Result<u32, PipelineError> {
        Ok(self.width)
    }

    fn height(&self) -> Result<u32, PipelineError> {
        Ok(self.height)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        if self.done {
            return Ok(None);
        }

        loop {
            if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                return match self.convert_current_frame() {
                    Ok(frame) => Ok(Some(frame)),
                    Err(error) => {
                        self.done = true;
                        Err(error)
                    }
                };
            }

            if self.eof_sent {
                self.done = true;
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input_context) {
                Ok(()) => {
                    if packet.stream() == self.video_stream_index {
                        if let Err(error) = self.decoder.send_packet(&packet) {
                            self.done = true;
                            return Err(error.into());
                        }
                    }
                }
                Err(FfmpegError::Eof) => {
                    if let Err(error) = self.decoder.send_eof() {
                        self.done = true;
                        return Err(error.into());
                    }
                    self.eof_sent = true;
                }
                Err(error) => {
                    log::debug!("Skipping unreadable packet in {}: {error}", self.path.display());
                }
            }
        }
    }
}
