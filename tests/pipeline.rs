//! End-to-end pipeline tests over synthetic videos and stand-in models.
//!
//! Nothing here touches FFmpeg: frames come from an in-memory stream and
//! the transcoder only writes placeholder files.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::Array2;
use signpipe::{
    CancellationToken, ClipLandmarks, ClipsCollection, DINO_PART_DIMENSION, DetectionBatch, Frame,
    FrameEncoder, FrameGeometry, FrameStream, InMemoryFrameStream, LandmarkDetector,
    LandmarkSequenceEncoder, MAE_DIMENSION, ModelCache, NormalizationPlan, PipelineError,
    PipelineOptions, ProcessingLog, S2V_DIMENSION, Stage, Toolkit, Transcoder, TranslationInput,
    TranslationOutput, Translator, Video, VideoFile, VideoFolder, VideoProcessor, VideoSource,
    VideosRepository, load_geometry, process_video,
};

const FRAME_COUNT: usize = 250;
const FRAMERATE: f64 = 25.0;

struct SyntheticSource;

impl VideoSource for SyntheticSource {
    fn open(&self, _path: &Path) -> Result<Box<dyn FrameStream>, PipelineError> {
        let mut stream = InMemoryFrameStream::new(FRAMERATE, Some((8, 8)));
        for index in 0..FRAME_COUNT {
            stream.write_frame(Frame::filled(8, 8, [(index % 256) as u8, 0, 0]), true)?;
        }
        stream.seek(0);
        Ok(Box::new(stream))
    }

    fn probe(&self, root_path: &Path, path: &Path) -> Result<VideoFile, PipelineError> {
        Ok(video_file(path.strip_prefix(root_path).unwrap_or(path).to_path_buf()))
    }
}

fn video_file(file_path: PathBuf) -> VideoFile {
    VideoFile {
        media_type: "video/mp4".to_string(),
        file_path,
        duration_seconds: FRAME_COUNT as f64 / FRAMERATE,
        frame_count: FRAME_COUNT,
        framerate: FRAMERATE,
        frame_width: 8,
        frame_height: 8,
        file_size_bytes: 1024,
    }
}

#[derive(Default)]
struct PlaceholderTranscoder {
    calls: AtomicUsize,
}

impl Transcoder for PlaceholderTranscoder {
    fn normalize(&self, _input: &Path, output: &Path, _plan: &NormalizationPlan) -> Result<(), PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(output, b"normalized")?;
        Ok(())
    }

    fn tag_frames(&self, input: &Path, output: &Path) -> Result<(), PipelineError> {
        std::fs::copy(input, output)?;
        Ok(())
    }
}

struct UndetectedPerson;

impl LandmarkDetector for UndetectedPerson {
    fn detect(&mut self, images: &[Frame]) -> Result<DetectionBatch, PipelineError> {
        let crops = |side| images.iter().map(|_| Frame::filled(side, side, [90, 90, 90])).collect();
        Ok(DetectionBatch {
            geometry: images
                .iter()
                .map(|image| FrameGeometry::undetected(image.width(), image.height()))
                .collect(),
            cropped_left_hand: crops(4),
            cropped_right_hand: crops(4),
            cropped_face: crops(4),
            cropped_images: crops(8),
        })
    }
}

struct ConstantEncoder(usize);

impl FrameEncoder for ConstantEncoder {
    fn dimension(&self) -> usize {
        self.0
    }

    fn encode(&mut self, images: &[Frame]) -> Result<Array2<f32>, PipelineError> {
        Ok(Array2::ones((images.len(), self.0)))
    }
}

struct SingleRowSign2Vec;

impl LandmarkSequenceEncoder for SingleRowSign2Vec {
    fn dimension(&self) -> usize {
        S2V_DIMENSION
    }

    fn encode(&mut self, _landmarks: &ClipLandmarks) -> Result<Array2<f32>, PipelineError> {
        Ok(Array2::zeros((1, S2V_DIMENSION)))
    }
}

/// Names each clip after its MAE row count; fails while `broken` is set.
struct CountingTranslator {
    broken: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl Translator for CountingTranslator {
    fn infer(&mut self, input: &TranslationInput) -> Result<TranslationOutput, PipelineError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(PipelineError::Inference("translator offline".to_string()));
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let rows = input.features.mae_features.as_ref().map_or(0, |features| features.nrows());
        Ok(TranslationOutput {
            text: format!("sign {call} over {rows} frames"),
            ..TranslationOutput::default()
        })
    }
}

/// Crashes on its first clip.
struct PanickingTranslator;

impl Translator for PanickingTranslator {
    fn infer(&mut self, _input: &TranslationInput) -> Result<TranslationOutput, PipelineError> {
        panic!("translator crashed")
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    repository: Arc<VideosRepository>,
    folder: VideoFolder,
    transcoder: Arc<PlaceholderTranscoder>,
    translator_broken: Arc<AtomicBool>,
    translator_calls: Arc<AtomicUsize>,
    detector_loads: Arc<AtomicUsize>,
    toolkit: Toolkit,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repository = Arc::new(VideosRepository::new(dir.path().join("videos.json")));
        let folder = VideoFolder::new(dir.path().join("42"));
        let transcoder = Arc::new(PlaceholderTranscoder::default());
        let translator_broken = Arc::new(AtomicBool::new(false));
        let translator_calls = Arc::new(AtomicUsize::new(0));
        let detector_loads = Arc::new(AtomicUsize::new(0));

        let broken = Arc::clone(&translator_broken);
        let calls = Arc::clone(&translator_calls);
        let loads = Arc::clone(&detector_loads);

        let toolkit = Toolkit {
            source: Arc::new(SyntheticSource),
            transcoder: Arc::clone(&transcoder) as Arc<dyn Transcoder>,
            detector: Arc::new(move || {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, PipelineError>(Box::new(UndetectedPerson) as Box<dyn LandmarkDetector>)
            }),
            mae: Arc::new(|| Ok::<_, PipelineError>(Box::new(ConstantEncoder(MAE_DIMENSION)) as Box<dyn FrameEncoder>)),
            dino_face: Arc::new(|| {
                Ok::<_, PipelineError>(Box::new(ConstantEncoder(DINO_PART_DIMENSION)) as Box<dyn FrameEncoder>)
            }),
            dino_hand: Arc::new(|| {
                Ok::<_, PipelineError>(Box::new(ConstantEncoder(DINO_PART_DIMENSION)) as Box<dyn FrameEncoder>)
            }),
            sign2vec: Arc::new(|| {
                Ok::<_, PipelineError>(Box::new(SingleRowSign2Vec) as Box<dyn LandmarkSequenceEncoder>)
            }),
            translator: Arc::new(ModelCache::new(move || {
                Ok::<_, PipelineError>(Box::new(CountingTranslator {
                    broken: Arc::clone(&broken),
                    calls: Arc::clone(&calls),
                }) as Box<dyn Translator>)
            })),
        };

        Self {
            _dir: dir,
            repository,
            folder,
            transcoder,
            translator_broken,
            translator_calls,
            detector_loads,
            toolkit,
        }
    }

    fn uploaded_video(&self) -> Video {
        let mut video = Video::new("42", "Greeting", "video/mp4");
        video.uploaded_file = Some(video_file(PathBuf::from("uploaded_file.mp4")));
        self.repository.store(&video).unwrap();
        video
    }

    fn options(&self) -> PipelineOptions {
        PipelineOptions::new().with_worker_count(3)
    }

    fn process(&self, video: Video, force_all: bool) -> Result<Video, PipelineError> {
        process_video(
            video,
            Arc::clone(&self.repository),
            self.folder.clone(),
            self.toolkit.clone(),
            self.options(),
            force_all,
        )
    }

    fn pending_stages(&self, video: Video) -> Vec<Stage> {
        VideoProcessor::new(
            video,
            Arc::clone(&self.repository),
            self.folder.clone(),
            self.toolkit.clone(),
            self.options(),
        )
        .unwrap()
        .pending_stages(false)
        .unwrap()
    }
}

#[test]
fn full_run_produces_every_artifact() {
    let harness = Harness::new();
    let video = harness.process(harness.uploaded_video(), false).unwrap();

    assert!(!video.is_processing);
    let normalized = video.normalized_file.as_ref().unwrap();
    assert_eq!(normalized.file_path, PathBuf::from("normalized_file.mp4"));
    assert!(!harness.folder.root().join("temp_normalized_file.mp4").exists());

    let geometry = load_geometry(harness.folder.geometry_file()).unwrap();
    assert_eq!(geometry.len(), FRAME_COUNT);

    let clips = ClipsCollection::load(harness.folder.clips_collection_file()).unwrap();
    assert_eq!(clips.len(), 5);
    for frame in 0..FRAME_COUNT {
        assert_eq!(clips.clip_index_lookup[frame], frame / 50);
    }
    assert!(clips.is_fully_translated());
    assert_eq!(
        clips.clips[0].translation_result.as_deref(),
        Some("sign 0 over 50 frames")
    );
    assert!(clips.clips[0].translation_context.is_none());
    assert!(clips.clips[1].translation_context.as_deref().unwrap().contains("sign 0"));

    for stage in Stage::ALL {
        assert!(harness.folder.artifact(stage).exists(), "missing artifact of {stage}");
    }
    assert_eq!(harness.repository.get("42").unwrap(), video);
}

#[test]
fn second_run_skips_completed_stages() {
    let harness = Harness::new();
    let video = harness.process(harness.uploaded_video(), false).unwrap();
    let detector_loads = harness.detector_loads.load(Ordering::SeqCst);

    assert!(harness.pending_stages(video.clone()).is_empty());
    harness.process(video, false).unwrap();

    assert_eq!(harness.transcoder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.detector_loads.load(Ordering::SeqCst), detector_loads);
    assert_eq!(harness.translator_calls.load(Ordering::SeqCst), 5);
}

#[test]
fn force_all_reruns_every_stage() {
    let harness = Harness::new();
    let video = harness.process(harness.uploaded_video(), false).unwrap();
    harness.process(video, true).unwrap();

    assert_eq!(harness.transcoder.calls.load(Ordering::SeqCst), 2);
    // A forced run re-splits the clips, so every clip is translated again.
    assert_eq!(harness.translator_calls.load(Ordering::SeqCst), 10);
}

#[test]
fn failed_translation_resumes_at_translation() {
    let harness = Harness::new();
    harness.translator_broken.store(true, Ordering::SeqCst);

    let result = harness.process(harness.uploaded_video(), false);
    assert!(matches!(result, Err(PipelineError::Inference(_))));

    let stored = harness.repository.get("42").unwrap();
    assert!(!stored.is_processing);
    assert!(stored.normalized_file.is_some());
    assert_eq!(harness.pending_stages(stored.clone()), vec![Stage::Translate]);

    let log = ProcessingLog::new(harness.folder.log_file()).read_lines().unwrap();
    assert!(log.iter().any(|line| line.contains("Processing failed")));

    harness.translator_broken.store(false, Ordering::SeqCst);
    harness.process(stored, false).unwrap();
    assert_eq!(harness.transcoder.calls.load(Ordering::SeqCst), 1);
    assert!(
        ClipsCollection::load(harness.folder.clips_collection_file())
            .unwrap()
            .is_fully_translated()
    );
}

#[test]
fn panicking_translator_clears_processing_flag() {
    let harness = Harness::new();
    let mut toolkit = harness.toolkit.clone();
    toolkit.translator = Arc::new(ModelCache::new(|| {
        Ok::<_, PipelineError>(Box::new(PanickingTranslator) as Box<dyn Translator>)
    }));

    let result = process_video(
        harness.uploaded_video(),
        Arc::clone(&harness.repository),
        harness.folder.clone(),
        toolkit,
        harness.options(),
        false,
    );
    assert!(matches!(result, Err(PipelineError::Panicked(message)) if message == "translator crashed"));

    let stored = harness.repository.get("42").unwrap();
    assert!(!stored.is_processing);
    assert_eq!(harness.pending_stages(stored.clone()), vec![Stage::Translate]);

    let log = ProcessingLog::new(harness.folder.log_file()).read_lines().unwrap();
    assert!(log.iter().any(|line| line.contains("Processing failed")));

    harness.process(stored, false).unwrap();
    assert!(!harness.repository.get("42").unwrap().is_processing);
}

#[test]
fn failed_feature_write_leaves_stage_pending() {
    let harness = Harness::new();
    // A directory in place of the temp file makes the MAE write fail midway.
    let blocker = harness.folder.root().join("mae_features.npy.tmp");
    std::fs::create_dir_all(&blocker).unwrap();

    let result = harness.process(harness.uploaded_video(), false);
    assert!(result.is_err());
    assert!(!harness.folder.mae_features_file().exists());

    let stored = harness.repository.get("42").unwrap();
    assert!(!stored.is_processing);
    assert_eq!(
        harness.pending_stages(stored.clone()),
        vec![Stage::MaeFeatures, Stage::Sign2VecFeatures, Stage::DinoFeatures, Stage::Translate]
    );

    std::fs::remove_dir(&blocker).unwrap();
    harness.process(stored, false).unwrap();
    assert!(harness.folder.mae_features_file().exists());
    assert!(harness.pending_stages(harness.repository.get("42").unwrap()).is_empty());
}

#[test]
fn video_without_upload_is_rejected() {
    let harness = Harness::new();
    let video = Video::new("42", "Greeting", "video/mp4");
    harness.repository.store(&video).unwrap();

    let result = harness.process(video, false);
    assert!(matches!(result, Err(PipelineError::NotUploaded(id)) if id == "42"));
    assert!(!harness.repository.get("42").unwrap().is_processing);
    assert_eq!(harness.transcoder.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn cancelled_run_stops_before_first_stage() {
    let harness = Harness::new();
    let token = CancellationToken::new();
    token.cancel();

    let result = process_video(
        harness.uploaded_video(),
        Arc::clone(&harness.repository),
        harness.folder.clone(),
        harness.toolkit.clone(),
        harness.options().with_cancellation(token),
        false,
    );
    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(harness.transcoder.calls.load(Ordering::SeqCst), 0);
}
