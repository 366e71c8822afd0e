//! Visual feature extraction stages.
//!
//! - MAE encodes the sign space crops, one 768-wide row per frame.
//! - DINO encodes face, left hand and right hand crops (384 each) and
//!   concatenates them into one 1152-wide row per frame.
//! - Sign2Vec encodes each clip's landmark sequence into a `[rows, 768]`
//!   matrix.
//!
//! Crop folders are read in chunks of `chunk_seconds` so that a single
//! encoder call never sees more than one chunk of images.
//!
//! Failure policy differs per stage. MAE and DINO failures abort the stage.
//! A Sign2Vec failure on one clip is logged and replaced with an empty
//! `[0, 768]` matrix so the remaining clips still get encoded.

use std::path::Path;

use ndarray::{Array2, Array3, Axis, concatenate, s};

use crate::chunker::Chunker;
use crate::clip::ClipsCollection;
use crate::configuration::PipelineOptions;
use crate::error::PipelineError;
use crate::features::{
    ClipFeatureMap, DINO_DIMENSION, DINO_PART_DIMENSION, MAE_DIMENSION, S2V_DIMENSION, check_width,
    save_clip_map, save_matrix,
};
use crate::folder_stream::FolderFrameStream;
use crate::geometry::{FrameGeometry, LandmarkKind, load_geometry};
use crate::memory_stream::InMemoryFrameStream;
use crate::models::{ClipLandmarks, FrameEncoder, LandmarkSequenceEncoder, ModelFactory};
use crate::progress::ProgressTracker;
use crate::repository::VideoFolder;
use crate::stage::Stage;

/// Encode the sign space crops with MAE and store `mae_features.npy`.
pub fn run_mae(
    folder: &VideoFolder,
    mae: &dyn ModelFactory<dyn FrameEncoder>,
    options: &PipelineOptions,
) -> Result<(), PipelineError> {
    let mut encoder = mae.load()?;
    let mut streams = [FolderFrameStream::open(folder.cropped_images_folder())?];

    let features = encode_in_chunks(Stage::MaeFeatures, &mut streams, MAE_DIMENSION, options, |chunks| {
        encode_checked("MAE", encoder.as_mut(), &chunks[0], MAE_DIMENSION)
    })?;

    save_matrix(&folder.mae_features_file(), Some(&features))?;
    log::info!("Stored MAE features of {} frames", features.nrows());
    Ok(())
}

/// Encode face and hand crops with DINO and store `dino_features.npy`.
///
/// Face crops go through `face`, both hands through `hand`.
pub fn run_dino(
    folder: &VideoFolder,
    face: &dyn ModelFactory<dyn FrameEncoder>,
    hand: &dyn ModelFactory<dyn FrameEncoder>,
    options: &PipelineOptions,
) -> Result<(), PipelineError> {
    let mut face_encoder = face.load()?;
    let mut hand_encoder = hand.load()?;
    let mut streams = [
        FolderFrameStream::open(folder.cropped_face_folder())?,
        FolderFrameStream::open(folder.cropped_left_hand_folder())?,
        FolderFrameStream::open(folder.cropped_right_hand_folder())?,
    ];

    let features = encode_in_chunks(Stage::DinoFeatures, &mut streams, DINO_DIMENSION, options, |chunks| {
        let face = encode_checked("DINO face", face_encoder.as_mut(), &chunks[0], DINO_PART_DIMENSION)?;
        let left = encode_checked("DINO left hand", hand_encoder.as_mut(), &chunks[1], DINO_PART_DIMENSION)?;
        let right = encode_checked("DINO right hand", hand_encoder.as_mut(), &chunks[2], DINO_PART_DIMENSION)?;
        concatenate(Axis(1), &[face.view(), left.view(), right.view()])
            .map_err(|error| PipelineError::EncoderContract(error.to_string()))
    })?;

    save_matrix(&folder.dino_features_file(), Some(&features))?;
    log::info!("Stored DINO features of {} frames", features.nrows());
    Ok(())
}

/// Encode every clip's landmarks with Sign2Vec and store `s2v_features.npz`.
pub fn run_sign2vec(
    folder: &VideoFolder,
    sign2vec: &dyn ModelFactory<dyn LandmarkSequenceEncoder>,
    options: &PipelineOptions,
) -> Result<(), PipelineError> {
    let geometry = load_geometry(require(Stage::Sign2VecFeatures, &folder.geometry_file())?)?;
    let clips = ClipsCollection::load(require(Stage::Sign2VecFeatures, &folder.clips_collection_file())?)?;
    if geometry.len() != clips.total_frames() {
        return Err(PipelineError::DimensionMismatch {
            what: "geometry frames".to_string(),
            expected: clips.total_frames(),
            actual: geometry.len(),
        });
    }

    let mut encoder = sign2vec.load()?;
    let mut tracker = ProgressTracker::new(
        options.progress.clone(),
        Stage::Sign2VecFeatures,
        Some(clips.len() as u64),
        options.batch_size,
    );

    let mut features = ClipFeatureMap::new();
    for clip in &clips.clips {
        options.check_cancelled()?;

        let landmarks = clip_landmarks(&geometry[clip.frame_range()]);
        let matrix = match encoder.encode(&landmarks) {
            Ok(matrix) => {
                check_width(&format!("Sign2Vec features of clip {}", clip.clip_index), &matrix, S2V_DIMENSION)?;
                matrix
            }
            Err(error) => {
                log::warn!("Sign2Vec failed on clip {}, using no features: {error}", clip.clip_index);
                Array2::zeros((0, S2V_DIMENSION))
            }
        };
        features.insert(clip.clip_index, matrix);
        tracker.advance_by(1);
    }
    tracker.finish();

    save_clip_map(&folder.s2v_features_file(), Some(&features))?;
    log::info!("Stored Sign2Vec features of {} clips", features.len());
    Ok(())
}

/// Stack the landmarks of consecutive frames, zero-filling undetected parts.
pub fn clip_landmarks(geometry: &[FrameGeometry]) -> ClipLandmarks {
    let stack = |kind: LandmarkKind| {
        let mut stacked = Array3::zeros((geometry.len(), kind.point_count(), 4));
        for (index, frame) in geometry.iter().enumerate() {
            if let Some(landmarks) = frame.landmarks(kind) {
                stacked.slice_mut(s![index, .., ..]).assign(&landmarks.to_array());
            }
        }
        stacked
    };

    ClipLandmarks {
        pose: stack(LandmarkKind::Pose),
        right_hand: stack(LandmarkKind::RightHand),
        left_hand: stack(LandmarkKind::LeftHand),
        face: stack(LandmarkKind::Face),
    }
}

fn require<'a>(stage: Stage, path: &'a Path) -> Result<&'a Path, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::MissingArtifact {
            stage,
            path: path.to_path_buf(),
        });
    }
    Ok(path)
}

/// Run `encoder` on one chunk and check the output is `[chunk.len(), width]`.
fn encode_checked(
    name: &str,
    encoder: &mut dyn FrameEncoder,
    chunk: &InMemoryFrameStream,
    width: usize,
) -> Result<Array2<f32>, PipelineError> {
    let features = encoder.encode(chunk.as_slice())?;
    if features.nrows() != chunk.len() {
        return Err(PipelineError::EncoderContract(format!(
            "{name} returned {} rows for {} images",
            features.nrows(),
            chunk.len()
        )));
    }
    check_width(name, &features, width)?;
    Ok(features)
}

/// Read equally long folder streams in lockstep, one chunk each per step,
/// and write what `encode` returns into consecutive rows of the result.
fn encode_in_chunks<const N: usize>(
    stage: Stage,
    streams: &mut [FolderFrameStream; N],
    width: usize,
    options: &PipelineOptions,
    mut encode: impl FnMut(&[InMemoryFrameStream; N]) -> Result<Array2<f32>, PipelineError>,
) -> Result<Array2<f32>, PipelineError> {
    let total_frames = streams[0].len()?;
    for stream in streams.iter().skip(1) {
        let length = stream.len()?;
        if length != total_frames {
            return Err(PipelineError::DimensionMismatch {
                what: format!("frames in {}", stream.folder_path().display()),
                expected: total_frames,
                actual: length,
            });
        }
    }

    let mut output = Array2::zeros((total_frames, width));
    let mut tracker = ProgressTracker::new(
        options.progress.clone(),
        stage,
        Some(total_frames as u64),
        options.batch_size,
    );

    let mut chunkers = Vec::with_capacity(N);
    for stream in streams.iter_mut() {
        chunkers.push(Chunker::new(stream, options.chunk_seconds)?);
    }

    let mut start_frame = 0;
    loop {
        options.check_cancelled()?;

        let mut chunks = Vec::with_capacity(N);
        for chunker in chunkers.iter_mut() {
            if let Some(chunk) = chunker.next() {
                chunks.push(chunk?);
            }
        }
        if chunks.is_empty() {
            break;
        }
        let chunks: [InMemoryFrameStream; N] = chunks
            .try_into()
            .map_err(|_| PipelineError::FrameCountMismatch { expected: total_frames })?;

        let frame_count = chunks[0].len();
        let end_frame = start_frame + frame_count;
        if chunks.iter().any(|chunk| chunk.len() != frame_count) || end_frame > total_frames {
            return Err(PipelineError::FrameCountMismatch { expected: total_frames });
        }

        let features = encode(&chunks)?;
        output.slice_mut(s![start_frame..end_frame, ..]).assign(&features);
        log::debug!("{stage}: encoded frames {start_frame}-{end_frame}");

        tracker.advance_by(frame_count as u64);
        start_frame = end_frame;
    }
    tracker.finish();

    if start_frame != total_frames {
        return Err(PipelineError::IncompleteResults {
            missing: total_frames - start_frame,
            total: total_frames,
            first_missing: start_frame,
        });
    }
    Ok(output)
}
