//! Per-video stage orchestration.
//!
//! [`VideoProcessor::run`] walks the stages of [`Stage::ALL`] in order. A
//! stage whose artifact already exists in the video folder is skipped, so a
//! run that failed halfway can simply be started again. With `force_all`
//! every stage runs and overwrites its artifact.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use signpipe::{PipelineOptions, Toolkit, VideoFolderFactory, VideosRepository, process_video};
//!
//! # fn toolkit() -> Toolkit { unimplemented!() }
//! let repository = Arc::new(VideosRepository::new("videos.json"));
//! let video = repository.get("42")?;
//! let folder = VideoFolderFactory::default().folder_for(&video.id);
//!
//! process_video(video, repository, folder, toolkit(), PipelineOptions::new(), false)?;
//! # Ok::<(), signpipe::PipelineError>(())
//! ```

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use crate::configuration::PipelineOptions;
use crate::detection::run_detection;
use crate::encoding::{run_dino, run_mae, run_sign2vec};
use crate::error::PipelineError;
use crate::metadata::VideoFile;
use crate::models::{FrameEncoder, LandmarkDetector, LandmarkSequenceEncoder, ModelCache, ModelFactory, Translator};
use crate::processing_log::ProcessingLog;
use crate::repository::{Video, VideoFolder, VideosRepository};
use crate::slicer::slice_into_clips;
use crate::source::VideoSource;
use crate::stage::Stage;
use crate::transcode::{NormalizationPlan, Transcoder, tag_frames_in_place};
use crate::translation::{is_fully_translated, translate_clips};

/// The external collaborators a pipeline run needs.
///
/// Encoders and the detector are created through factories because each
/// worker or stage loads its own handle. The translator sits in a shared
/// [`ModelCache`] so it stays loaded across runs.
#[derive(Clone)]
pub struct Toolkit {
    /// Opens and probes video files.
    pub source: Arc<dyn VideoSource>,
    /// Normalizes uploads and tags frames.
    pub transcoder: Arc<dyn Transcoder>,
    /// Landmark detector, one per worker.
    pub detector: Arc<dyn ModelFactory<dyn LandmarkDetector>>,
    /// MAE encoder over the sign space crops.
    pub mae: Arc<dyn ModelFactory<dyn FrameEncoder>>,
    /// DINO encoder over the face crops.
    pub dino_face: Arc<dyn ModelFactory<dyn FrameEncoder>>,
    /// DINO encoder over the hand crops.
    pub dino_hand: Arc<dyn ModelFactory<dyn FrameEncoder>>,
    /// Sign2Vec encoder over the clip landmarks.
    pub sign2vec: Arc<dyn ModelFactory<dyn LandmarkSequenceEncoder>>,
    /// Shared translator, loaded on first use.
    pub translator: Arc<ModelCache<dyn Translator>>,
}

/// Runs every stage of the pipeline for one uploaded video.
pub struct VideoProcessor {
    video: Video,
    repository: Arc<VideosRepository>,
    folder: VideoFolder,
    toolkit: Toolkit,
    options: PipelineOptions,
    log: ProcessingLog,
}

impl VideoProcessor {
    /// Prepare to process `video`, whose files live in `folder`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotUploaded`] if the video has no uploaded file.
    pub fn new(
        video: Video,
        repository: Arc<VideosRepository>,
        folder: VideoFolder,
        toolkit: Toolkit,
        options: PipelineOptions,
    ) -> Result<Self, PipelineError> {
        if video.uploaded_file.is_none() {
            return Err(PipelineError::NotUploaded(video.id));
        }
        let log = ProcessingLog::new(folder.log_file());
        Ok(Self {
            video,
            repository,
            folder,
            toolkit,
            options,
            log,
        })
    }

    /// The video record, including files attached by completed stages.
    pub fn video(&self) -> &Video {
        &self.video
    }

    /// The video record with everything the run stored on it.
    pub fn into_video(self) -> Video {
        self.video
    }

    /// Returns `true` if the artifact of `stage` is complete.
    pub fn is_stage_complete(&self, stage: Stage) -> Result<bool, PipelineError> {
        match stage {
            Stage::Translate => is_fully_translated(&self.folder.artifact(stage)),
            _ => Ok(self.folder.artifact(stage).exists()),
        }
    }

    /// The stages a call to [`run`](Self::run) would execute.
    pub fn pending_stages(&self, force_all: bool) -> Result<Vec<Stage>, PipelineError> {
        let mut pending = Vec::new();
        for stage in Stage::ALL {
            if force_all || !self.is_stage_complete(stage)? {
                pending.push(stage);
            }
        }
        Ok(pending)
    }

    /// Run every stage that is not complete yet, or all of them with
    /// `force_all`.
    ///
    /// Artifacts of completed stages survive a failure, so calling `run`
    /// again resumes at the stage that failed.
    pub fn run(&mut self, force_all: bool) -> Result<(), PipelineError> {
        self.folder.create()?;

        for stage in Stage::ALL {
            self.options.check_cancelled()?;

            if !force_all && self.is_stage_complete(stage)? {
                log::debug!("Skipping completed stage {stage} of video {}", self.video.id);
                continue;
            }

            self.log.append(format!("Stage {stage} started"))?;
            self.run_stage(stage)?;
            self.log.append(format!("Stage {stage} finished"))?;
        }
        Ok(())
    }

    fn run_stage(&mut self, stage: Stage) -> Result<(), PipelineError> {
        let toolkit = self.toolkit.clone();
        match stage {
            Stage::Normalize => self.normalize(),
            Stage::Geometry => {
                let normalized = self.normalized_file()?;
                let mut stream = toolkit.source.open(&self.folder.resolve(&normalized))?;
                run_detection(
                    &mut *stream,
                    normalized.frame_count,
                    &self.folder,
                    toolkit.detector.as_ref(),
                    &self.options,
                )
            }
            Stage::ClipSplit => {
                let normalized = self.normalized_file()?;
                let mut stream = toolkit.source.open(&self.folder.resolve(&normalized))?;
                let clips = slice_into_clips(&mut *stream, self.options.clip_seconds)?;
                self.log.append(format!("Video was sliced into {} clips", clips.len()))?;
                clips.store(self.folder.clips_collection_file())
            }
            Stage::MaeFeatures => run_mae(&self.folder, toolkit.mae.as_ref(), &self.options),
            Stage::Sign2VecFeatures => run_sign2vec(&self.folder, toolkit.sign2vec.as_ref(), &self.options),
            Stage::DinoFeatures => run_dino(
                &self.folder,
                toolkit.dino_face.as_ref(),
                toolkit.dino_hand.as_ref(),
                &self.options,
            ),
            Stage::Translate => translate_clips(&self.folder, &toolkit.translator, &self.options).map(|_| ()),
        }
    }

    /// Normalize the upload into a temporary file, tag it if requested, and
    /// only then move it into place. An interrupted normalization therefore
    /// never leaves a `normalized_file.mp4` behind.
    fn normalize(&mut self) -> Result<(), PipelineError> {
        let uploaded = self
            .video
            .uploaded_file
            .clone()
            .ok_or_else(|| PipelineError::NotUploaded(self.video.id.clone()))?;
        let input = self.folder.resolve(&uploaded);
        let output = self.folder.normalized_file();
        let temp_output = output.with_file_name("temp_normalized_file.mp4");

        let plan = NormalizationPlan::for_source(&uploaded, &self.options.normalization);
        log::debug!("Normalization plan for video {}: {plan:?}", self.video.id);
        self.toolkit.transcoder.normalize(&input, &temp_output, &plan)?;

        if self.options.tag_frames {
            self.log.append("Tagging frames with their numbers")?;
            tag_frames_in_place(self.toolkit.transcoder.as_ref(), &temp_output)?;
        }
        fs::rename(&temp_output, &output)?;

        self.store_normalized_metadata(&output)?;
        Ok(())
    }

    fn store_normalized_metadata(&mut self, path: &Path) -> Result<VideoFile, PipelineError> {
        let file = self.toolkit.source.probe(self.folder.root(), path)?;
        self.video.normalized_file = Some(file.clone());
        self.repository.store(&self.video)?;
        Ok(file)
    }

    /// Metadata of the normalized file, probing it if the record lacks it.
    fn normalized_file(&mut self) -> Result<VideoFile, PipelineError> {
        if let Some(file) = &self.video.normalized_file {
            return Ok(file.clone());
        }
        let path = self.folder.normalized_file();
        if !path.exists() {
            return Err(PipelineError::MissingArtifact {
                stage: Stage::Normalize,
                path,
            });
        }
        self.store_normalized_metadata(&path)
    }
}

/// Process `video` from start to finish.
///
/// The record's `is_processing` flag is set for the duration of the run and
/// cleared afterwards, whether the run succeeded, failed or panicked. A panic
/// inside a stage or model comes back as [`PipelineError::Panicked`].
/// Failures are also written to the video's processing log.
pub fn process_video(
    mut video: Video,
    repository: Arc<VideosRepository>,
    folder: VideoFolder,
    toolkit: Toolkit,
    options: PipelineOptions,
    force_all: bool,
) -> Result<Video, PipelineError> {
    let log = ProcessingLog::new(folder.log_file());
    folder.create()?;

    video.is_processing = true;
    repository.store(&video)?;
    log.append(format!("Processing of video {} started", video.id))?;

    let run = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Video, PipelineError> {
        let mut processor =
            VideoProcessor::new(video.clone(), Arc::clone(&repository), folder, toolkit, options)?;
        processor.run(force_all)?;
        Ok(processor.into_video())
    }));
    let result = run.unwrap_or_else(|payload| Err(PipelineError::from_panic(payload)));

    let mut latest = match &result {
        Ok(processed) => processed.clone(),
        Err(_) => repository.get(&video.id).unwrap_or(video),
    };
    latest.is_processing = false;
    repository.store(&latest)?;

    match result {
        Ok(_) => {
            log.append("Processing finished")?;
            Ok(latest)
        }
        Err(error) => {
            log::error!("Processing of video {} failed: {error}", latest.id);
            log.append(format!("Processing failed: {error}"))?;
            Err(error)
        }
    }
}
