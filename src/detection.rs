//! Landmark detection and region-of-interest cropping.
//!
//! The normalized video is cut into chunks and fanned out to a
//! [`ChunkWorkerPool`]. Each worker loads its own [`LandmarkDetector`],
//! writes the four crops of every frame into numbered image folders and
//! returns the frame's [`FrameGeometry`]. Every crop folder is opened anew
//! inside each job and written at explicit indices, so jobs never share a
//! stream cursor.

use std::path::PathBuf;

use crate::chunker::Chunker;
use crate::configuration::PipelineOptions;
use crate::error::PipelineError;
use crate::folder_stream::FolderFrameStream;
use crate::frame_stream::FrameStream;
use crate::geometry::{FrameGeometry, store_geometry};
use crate::memory_stream::InMemoryFrameStream;
use crate::models::{LandmarkDetector, ModelFactory};
use crate::repository::VideoFolder;
use crate::stage::Stage;
use crate::worker_pool::{ChunkProcessor, ChunkWorkerPool};

/// The four folders crops are written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropFolders {
    /// Crops around the left hand.
    pub left_hand: PathBuf,
    /// Crops around the right hand.
    pub right_hand: PathBuf,
    /// Crops around the face.
    pub face: PathBuf,
    /// Crops of the whole signing space.
    pub images: PathBuf,
}

impl CropFolders {
    /// The crop folders of a video folder.
    pub fn of(folder: &VideoFolder) -> Self {
        Self {
            left_hand: folder.cropped_left_hand_folder(),
            right_hand: folder.cropped_right_hand_folder(),
            face: folder.cropped_face_folder(),
            images: folder.cropped_images_folder(),
        }
    }

    fn all(&self) -> [&PathBuf; 4] {
        [&self.left_hand, &self.right_hand, &self.face, &self.images]
    }

    /// Create every folder as an empty stream, removing earlier crops.
    fn create(&self, framerate: f64) -> Result<(), PipelineError> {
        for path in self.all() {
            FolderFrameStream::create(path, framerate, None, true)?;
        }
        Ok(())
    }
}

/// Detection worker: one detector handle, used for every chunk the worker
/// receives.
struct DetectionWorker {
    worker_index: usize,
    detector: Box<dyn LandmarkDetector>,
    folders: CropFolders,
}

impl ChunkProcessor for DetectionWorker {
    type Output = FrameGeometry;

    fn process_chunk(
        &mut self,
        chunk: InMemoryFrameStream,
        start_frame: usize,
    ) -> Result<Vec<FrameGeometry>, PipelineError> {
        let frames = chunk.into_frames();
        let batch = self.detector.detect(&frames)?;
        batch.validate(frames.len())?;

        let mut left_hand = FolderFrameStream::open(&self.folders.left_hand)?;
        let mut right_hand = FolderFrameStream::open(&self.folders.right_hand)?;
        let mut face = FolderFrameStream::open(&self.folders.face)?;
        let mut images = FolderFrameStream::open(&self.folders.images)?;

        for offset in 0..frames.len() {
            let index = Some(start_frame + offset);
            left_hand.write_frame(&batch.cropped_left_hand[offset], index, true)?;
            right_hand.write_frame(&batch.cropped_right_hand[offset], index, true)?;
            face.write_frame(&batch.cropped_face[offset], index, true)?;
            images.write_frame(&batch.cropped_images[offset], index, true)?;
        }

        log::debug!(
            "Worker {} detected frames {}-{}",
            self.worker_index,
            start_frame,
            start_frame + frames.len()
        );
        Ok(batch.geometry)
    }
}

/// Detect the geometry of every frame of `stream` and write the crops.
///
/// `total_frames` is the frame count of the stream, used to pre-size the
/// result array. The geometry is returned in frame order; it is not
/// persisted.
pub fn detect_geometry<S: FrameStream + ?Sized>(
    stream: &mut S,
    total_frames: usize,
    folders: &CropFolders,
    detector: &dyn ModelFactory<dyn LandmarkDetector>,
    options: &PipelineOptions,
) -> Result<Vec<FrameGeometry>, PipelineError> {
    folders.create(stream.framerate())?;

    let chunks = Chunker::new(stream, options.chunk_seconds)?;
    let pool = ChunkWorkerPool::from_options(options, Stage::Geometry);

    pool.run(chunks, total_frames, |worker_index| {
        Ok(DetectionWorker {
            worker_index,
            detector: detector.load()?,
            folders: folders.clone(),
        })
    })
}

/// Run detection over a video folder's normalized stream and store
/// `geometry.json`.
pub fn run_detection<S: FrameStream + ?Sized>(
    stream: &mut S,
    total_frames: usize,
    folder: &VideoFolder,
    detector: &dyn ModelFactory<dyn LandmarkDetector>,
    options: &PipelineOptions,
) -> Result<(), PipelineError> {
    let geometry = detect_geometry(stream, total_frames, &CropFolders::of(folder), detector, options)?;
    store_geometry(folder.geometry_file(), &geometry)?;
    log::info!("Stored geometry of {} frames", geometry.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::models::DetectionBatch;

    struct SolidCrops;

    impl LandmarkDetector for SolidCrops {
        fn detect(&mut self, images: &[Frame]) -> Result<DetectionBatch, PipelineError> {
            let crops = |side| images.iter().map(|_| Frame::filled(side, side, [200, 10, 10])).collect();
            Ok(DetectionBatch {
                geometry: images
                    .iter()
                    .map(|image| FrameGeometry::undetected(image.width(), image.height()))
                    .collect(),
                cropped_left_hand: crops(8),
                cropped_right_hand: crops(8),
                cropped_face: crops(12),
                cropped_images: crops(16),
            })
        }
    }

    struct ShortBatch;

    impl LandmarkDetector for ShortBatch {
        fn detect(&mut self, _images: &[Frame]) -> Result<DetectionBatch, PipelineError> {
            Ok(DetectionBatch::default())
        }
    }

    fn stream_of(count: usize) -> InMemoryFrameStream {
        let mut stream = InMemoryFrameStream::new(10.0, Some((32, 24)));
        for _ in 0..count {
            stream.write_frame(Frame::filled(32, 24, [0, 0, 0]), true).unwrap();
        }
        stream.seek(0);
        stream
    }

    #[test]
    fn every_frame_gets_geometry_and_crops() {
        let dir = tempfile::tempdir().unwrap();
        let folder = VideoFolder::new(dir.path());
        let factory = || Ok::<_, PipelineError>(Box::new(SolidCrops) as Box<dyn LandmarkDetector>);
        let options = PipelineOptions::new().with_worker_count(3);

        let mut stream = stream_of(35);
        run_detection(&mut stream, 35, &folder, &factory, &options).unwrap();

        let geometry = crate::geometry::load_geometry(folder.geometry_file()).unwrap();
        assert_eq!(geometry.len(), 35);
        assert_eq!(geometry[0].sign_space.width(), 32);

        for path in CropFolders::of(&folder).all() {
            let crops = FolderFrameStream::open(path).unwrap();
            assert_eq!(crops.len().unwrap(), 35);
            assert_eq!(crops.framerate(), 10.0);
        }
    }

    #[test]
    fn short_detector_output_fails_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let folders = CropFolders::of(&VideoFolder::new(dir.path()));
        let factory = || Ok::<_, PipelineError>(Box::new(ShortBatch) as Box<dyn LandmarkDetector>);

        let mut stream = stream_of(12);
        let result = detect_geometry(&mut stream, 12, &folders, &factory, &PipelineOptions::new());
        assert!(matches!(result, Err(PipelineError::DetectorContract(_))));
    }
}
