//! Contracts of the neural models the pipeline drives.
//!
//! The pipeline never implements a model itself. It talks to a landmark
//! detector, three visual encoders and a translator through the traits in
//! this module, and obtains fresh handles through [`ModelFactory`] so that
//! heavyweight models can be created exactly where they are used: once per
//! detection worker, once per encoding stage, and once per process for the
//! translator (see [`ModelCache`]).

use std::sync::Mutex;

use ndarray::{Array2, Array3};

use crate::error::PipelineError;
use crate::features::ClipVisualFeatures;
use crate::frame::Frame;
use crate::geometry::FrameGeometry;
use crate::neighbors::EmbeddingNeighborLookup;

/// Detector output for one batch of frames. Every vector has one entry per
/// input frame.
#[derive(Debug, Clone, Default)]
pub struct DetectionBatch {
    /// Landmarks, crop rectangles and sign space of each frame.
    pub geometry: Vec<FrameGeometry>,
    /// Left hand crops.
    pub cropped_left_hand: Vec<Frame>,
    /// Right hand crops.
    pub cropped_right_hand: Vec<Frame>,
    /// Face crops.
    pub cropped_face: Vec<Frame>,
    /// Sign space crops.
    pub cropped_images: Vec<Frame>,
}

impl DetectionBatch {
    /// Check every per-frame vector has `frame_count` entries.
    pub fn validate(&self, frame_count: usize) -> Result<(), PipelineError> {
        let lengths = [
            ("geometry", self.geometry.len()),
            ("cropped_left_hand", self.cropped_left_hand.len()),
            ("cropped_right_hand", self.cropped_right_hand.len()),
            ("cropped_face", self.cropped_face.len()),
            ("cropped_images", self.cropped_images.len()),
        ];
        for (name, length) in lengths {
            if length != frame_count {
                return Err(PipelineError::DetectorContract(format!(
                    "{name} has {length} entries for {frame_count} frames"
                )));
            }
        }
        for geometry in &self.geometry {
            geometry.validate()?;
        }
        Ok(())
    }
}

/// Pose, hand and face landmark detector with crop extraction.
pub trait LandmarkDetector {
    /// Detect landmarks in a batch of frames (one chunk).
    fn detect(&mut self, images: &[Frame]) -> Result<DetectionBatch, PipelineError>;
}

/// An image encoder producing one embedding row per input image.
pub trait FrameEncoder {
    /// Width of every embedding row.
    fn dimension(&self) -> usize;

    /// Encode `images` into a `[images.len(), dimension]` matrix.
    fn encode(&mut self, images: &[Frame]) -> Result<Array2<f32>, PipelineError>;
}

/// Per-frame landmark stacks of one clip, shaped `[frames, points, 4]`.
/// Parts that were not detected in a frame are zero-filled.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipLandmarks {
    /// Pose, `[frames, 33, 4]`.
    pub pose: Array3<f64>,
    /// Right hand, `[frames, 21, 4]`.
    pub right_hand: Array3<f64>,
    /// Left hand, `[frames, 21, 4]`.
    pub left_hand: Array3<f64>,
    /// Face, `[frames, 478, 4]`.
    pub face: Array3<f64>,
}

/// An encoder over a clip's landmark sequence (Sign2Vec).
pub trait LandmarkSequenceEncoder {
    /// Width of every embedding row.
    fn dimension(&self) -> usize;

    /// Encode one clip into a `[rows, dimension]` matrix.
    fn encode(&mut self, landmarks: &ClipLandmarks) -> Result<Array2<f32>, PipelineError>;
}

/// Decoding settings forwarded to the translator.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    /// Upper bound on generated tokens.
    pub max_new_tokens: usize,
    /// Sampling temperature; zero means greedy decoding.
    pub temperature: f32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 128,
            temperature: 0.0,
            top_p: 1.0,
        }
    }
}

/// Input of one translator call.
#[derive(Debug, Clone)]
pub struct TranslationInput {
    /// Visual features of the clip. Absent modalities are not used.
    pub features: ClipVisualFeatures,
    /// Prompt, including any rolling context.
    pub prompt: String,
    /// Decoding settings.
    pub generation: GenerationConfig,
}

/// Output of one translator call.
#[derive(Debug, Clone, Default)]
pub struct TranslationOutput {
    /// Generated text.
    pub text: String,
    /// MAE features projected into the token embedding space.
    pub projected_mae: Option<Array2<f32>>,
    /// DINO features projected into the token embedding space.
    pub projected_dino: Option<Array2<f32>>,
    /// Sign2Vec features projected into the token embedding space.
    pub projected_s2v: Option<Array2<f32>>,
}

/// The sign language translation model.
pub trait Translator: Send {
    /// Translate one clip.
    fn infer(&mut self, input: &TranslationInput) -> Result<TranslationOutput, PipelineError>;

    /// Token embeddings of the model's vocabulary, used to name the nearest
    /// token of each projected visual embedding.
    fn neighbor_lookup(&self) -> Option<&EmbeddingNeighborLookup> {
        None
    }
}

/// Creates model handles on demand.
///
/// Implemented for every `Fn() -> Result<Box<M>, PipelineError>` closure.
pub trait ModelFactory<M: ?Sized>: Send + Sync {
    /// Load a fresh handle.
    fn load(&self) -> Result<Box<M>, PipelineError>;
}

impl<M: ?Sized, F> ModelFactory<M> for F
where
    F: Fn() -> Result<Box<M>, PipelineError> + Send + Sync,
{
    fn load(&self) -> Result<Box<M>, PipelineError> {
        self()
    }
}

/// A model loaded on first use and kept for every later call.
///
/// Access is serialized: one caller uses the model at a time.
pub struct ModelCache<M: ?Sized> {
    factory: Box<dyn ModelFactory<M>>,
    model: Mutex<Option<Box<M>>>,
}

impl<M: ?Sized> ModelCache<M> {
    /// A cache that loads its model with `factory` on first access.
    pub fn new(factory: impl ModelFactory<M> + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            model: Mutex::new(None),
        }
    }

    /// Returns `true` once the model has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.model.lock().is_ok_and(|model| model.is_some())
    }

    /// Run `action` against the model, loading it first if needed.
    pub fn with_model<R>(
        &self,
        action: impl FnOnce(&mut M) -> Result<R, PipelineError>,
    ) -> Result<R, PipelineError> {
        let mut guard = self
            .model
            .lock()
            .map_err(|_| PipelineError::Inference("model cache lock poisoned".to_string()))?;

        if guard.is_none() {
            log::info!("Loading model into cache");
            *guard = Some(self.factory.load()?);
        }

        match guard.as_deref_mut() {
            Some(model) => action(model),
            None => Err(PipelineError::Inference("model cache is empty".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct Echo;

    impl Translator for Echo {
        fn infer(&mut self, input: &TranslationInput) -> Result<TranslationOutput, PipelineError> {
            Ok(TranslationOutput {
                text: input.prompt.clone(),
                ..TranslationOutput::default()
            })
        }
    }

    #[test]
    fn cache_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let cache: ModelCache<dyn Translator> = ModelCache::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, PipelineError>(Box::new(Echo) as Box<dyn Translator>)
        });
        assert!(!cache.is_loaded());

        for _ in 0..3 {
            cache.with_model(|_| Ok(())).unwrap();
        }
        assert!(cache.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let cache: ModelCache<dyn Translator> = ModelCache::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(PipelineError::ModelLoad {
                    name: "translator".to_string(),
                    reason: "checkpoint missing".to_string(),
                })
            } else {
                Ok(Box::new(Echo) as Box<dyn Translator>)
            }
        });

        assert!(cache.with_model(|_| Ok(())).is_err());
        assert!(cache.with_model(|_| Ok(())).is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn batch_length_mismatch_is_a_contract_violation() {
        let batch = DetectionBatch {
            geometry: vec![FrameGeometry::undetected(2, 2)],
            ..DetectionBatch::default()
        };
        assert!(matches!(
            batch.validate(1),
            Err(PipelineError::DetectorContract(_))
        ));
    }
}
