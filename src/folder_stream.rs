//! Frame stream backed by a folder of numbered JPEG files.
//!
//! Frame `i` lives at `frame_{i:06}.jpg`. A small JSON record next to the
//! frames stores the framerate and the optional fixed size; a folder stream
//! can only be [`open`](FolderFrameStream::open)ed after it has been
//! [`create`](FolderFrameStream::create)d.
//!
//! Writes may target any index via `seek_to`. Several independent stream
//! instances may write into the same folder concurrently as long as they
//! never write the same index, which is how the geometry stage stores crops
//! from its worker threads.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::frame::Frame;
use crate::frame_stream::{FrameStream, check_resolution};

/// Name of the metadata record inside the folder.
pub const META_FILE: &str = "_frame_stream.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FolderMeta {
    framerate: f64,
    width: Option<u32>,
    height: Option<u32>,
}

/// A restartable frame stream stored as one JPEG per frame.
#[derive(Debug, Clone)]
pub struct FolderFrameStream {
    folder_path: PathBuf,
    framerate: f64,
    size: Option<(u32, u32)>,
    next_frame_index: usize,
}

impl FolderFrameStream {
    /// Create the folder (and its metadata record) and return a stream over
    /// it. With `clear_if_exists` any previous content is removed first.
    pub fn create<P: AsRef<Path>>(
        folder_path: P,
        framerate: f64,
        size: Option<(u32, u32)>,
        clear_if_exists: bool,
    ) -> Result<Self, PipelineError> {
        let folder_path = folder_path.as_ref().to_path_buf();

        if clear_if_exists && folder_path.is_dir() {
            fs::remove_dir_all(&folder_path)?;
        }
        fs::create_dir_all(&folder_path)?;

        let meta = FolderMeta {
            framerate,
            width: size.map(|(width, _)| width),
            height: size.map(|(_, height)| height),
        };
        fs::write(folder_path.join(META_FILE), serde_json::to_vec(&meta)?)?;

        log::debug!("Created folder frame stream at {}", folder_path.display());

        Ok(Self {
            folder_path,
            framerate,
            size,
            next_frame_index: 0,
        })
    }

    /// Open a folder previously set up by [`create`](FolderFrameStream::create).
    ///
    /// # Errors
    ///
    /// [`PipelineError::FolderStreamNotCreated`] if the metadata record is
    /// missing.
    pub fn open<P: AsRef<Path>>(folder_path: P) -> Result<Self, PipelineError> {
        let folder_path = folder_path.as_ref().to_path_buf();
        let raw = match fs::read(folder_path.join(META_FILE)) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::FolderStreamNotCreated(folder_path));
            }
            Err(error) => return Err(error.into()),
        };
        let meta: FolderMeta = serde_json::from_slice(&raw)?;

        Ok(Self {
            folder_path,
            framerate: meta.framerate,
            size: meta.width.zip(meta.height),
            next_frame_index: 0,
        })
    }

    /// The folder holding the frames.
    pub fn folder_path(&self) -> &Path {
        &self.folder_path
    }

    /// Returns `true` if every frame must have the declared size.
    pub fn has_fixed_size(&self) -> bool {
        self.size.is_some()
    }

    /// Move the cursor to `frame_index`.
    pub fn seek(&mut self, frame_index: usize) {
        self.next_frame_index = frame_index;
    }

    /// Path of the file holding frame `frame_index`.
    pub fn frame_path(&self, frame_index: usize) -> PathBuf {
        self.folder_path.join(format!("frame_{frame_index:06}.jpg"))
    }

    /// Read the frame under the cursor. Returns `Ok(None)` when no file
    /// exists at that index.
    pub fn read_frame(&mut self, advance: bool) -> Result<Option<Frame>, PipelineError> {
        let frame_path = self.frame_path(self.next_frame_index);
        if !frame_path.is_file() {
            return Ok(None);
        }

        let frame = Frame::new(image::open(&frame_path)?.to_rgb8());
        check_resolution(self.size, &frame)?;

        if advance {
            self.next_frame_index += 1;
        }
        Ok(Some(frame))
    }

    /// Write `frame`, first seeking to `seek_to` when given.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ResolutionMismatch`] if the stream has a fixed size
    /// that `frame` does not match; nothing is written in that case.
    pub fn write_frame(
        &mut self,
        frame: &Frame,
        seek_to: Option<usize>,
        advance: bool,
    ) -> Result<(), PipelineError> {
        check_resolution(self.size, frame)?;

        if let Some(index) = seek_to {
            self.seek(index);
        }

        frame.image().save(self.frame_path(self.next_frame_index))?;

        if advance {
            self.next_frame_index += 1;
        }
        Ok(())
    }

    /// Number of frame files currently in the folder.
    pub fn len(&self) -> Result<usize, PipelineError> {
        let mut count = 0;
        for entry in fs::read_dir(&self.folder_path)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("frame_") && name.ends_with(".jpg") {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Returns `true` if the folder holds no frames.
    pub fn is_empty(&self) -> Result<bool, PipelineError> {
        Ok(self.len()? == 0)
    }
}

impl FrameStream for FolderFrameStream {
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
        self.read_frame(true)
    }
}
