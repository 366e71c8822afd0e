//! Sequential clip translation with rolling context.
//!
//! Clips are translated strictly in order: the prompt of each clip carries
//! the translations of the clips before it, bounded by a
//! [`ContextTracker`]. The collection is written back after every clip, so
//! an interrupted run resumes at the first clip without a translation.

use std::path::Path;

use crate::clip::{Clip, ClipsCollection};
use crate::configuration::PipelineOptions;
use crate::context::ContextTracker;
use crate::error::PipelineError;
use crate::features::{ClipVisualFeatures, VideoVisualFeatures};
use crate::models::{GenerationConfig, ModelCache, TranslationInput, TranslationOutput, Translator};
use crate::neighbors::EmbeddingNeighborLookup;
use crate::progress::ProgressTracker;
use crate::repository::VideoFolder;
use crate::stage::Stage;

/// Fill `template` with the rolling context.
///
/// Every `{context}` placeholder is replaced with `context`. Without context
/// the lines holding a placeholder are dropped.
///
/// ```
/// use signpipe::prepare_translation_prompt;
///
/// let template = "Before: {context}\nTranslate.";
/// assert_eq!(prepare_translation_prompt(template, Some("hi")), "Before: hi\nTranslate.");
/// assert_eq!(prepare_translation_prompt(template, None), "Translate.");
/// ```
pub fn prepare_translation_prompt(template: &str, context: Option<&str>) -> String {
    match context {
        Some(context) => template.replace("{context}", context),
        None => template
            .lines()
            .filter(|line| !line.contains("{context}"))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Which visual modalities are passed to the translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModalitySelection {
    /// Pass MAE features.
    pub mae: bool,
    /// Pass DINO features.
    pub dino: bool,
    /// Pass Sign2Vec features.
    pub s2v: bool,
}

impl Default for ModalitySelection {
    fn default() -> Self {
        Self {
            mae: true,
            dino: true,
            s2v: true,
        }
    }
}

impl ModalitySelection {
    /// Drop the features of every disabled modality.
    pub fn apply(&self, features: &mut ClipVisualFeatures) {
        if !self.mae {
            features.mae_features = None;
        }
        if !self.dino {
            features.dino_features = None;
        }
        if !self.s2v {
            features.s2v_features = None;
        }
    }
}

fn load_features(folder: &VideoFolder) -> Result<VideoVisualFeatures, PipelineError> {
    VideoVisualFeatures::load_all(
        &folder.mae_features_file(),
        &folder.dino_features_file(),
        &folder.s2v_features_file(),
    )
}

fn load_clips(folder: &VideoFolder) -> Result<ClipsCollection, PipelineError> {
    let path = folder.clips_collection_file();
    if !path.exists() {
        return Err(PipelineError::MissingArtifact {
            stage: Stage::Translate,
            path,
        });
    }
    ClipsCollection::load(path)
}

/// Translate every clip of the video in `folder` that has no translation yet.
///
/// Already translated clips are not sent to the model again; their text
/// re-seeds the rolling context. Returns the updated collection, which has
/// also been stored.
pub fn translate_clips(
    folder: &VideoFolder,
    translator: &ModelCache<dyn Translator>,
    options: &PipelineOptions,
) -> Result<ClipsCollection, PipelineError> {
    let features = load_features(folder)?;
    let mut collection = load_clips(folder)?;
    let clips_file = folder.clips_collection_file();

    let mut context = ContextTracker::new(options.max_context_length);
    let mut progress = ProgressTracker::new(
        options.progress.clone(),
        Stage::Translate,
        Some(collection.len() as u64),
        options.batch_size,
    );

    for index in 0..collection.len() {
        options.check_cancelled()?;

        let clip = &mut collection.clips[index];
        if let Some(result) = &clip.translation_result {
            context.add_next_output(result.clone());
            progress.advance_by(1);
            continue;
        }

        let current_context = context.current_context();
        let input = TranslationInput {
            features: features.select_clip(clip)?,
            prompt: prepare_translation_prompt(&options.prompt_template, current_context.as_deref()),
            generation: options.generation.clone(),
        };
        translate_clip(clip, translator, &input, current_context)?;

        let text = clip.translation_result.clone().unwrap_or_default();
        log::info!("Clip {index} was translated as {text:?}");
        context.add_next_output(text);

        collection.store(&clips_file)?;
        progress.advance_by(1);
    }
    progress.finish();

    Ok(collection)
}

/// Run the translator on one clip and record the result on it.
fn translate_clip(
    clip: &mut Clip,
    translator: &ModelCache<dyn Translator>,
    input: &TranslationInput,
    context: Option<String>,
) -> Result<(), PipelineError> {
    let (output, neighbors) = translator.with_model(|model| {
        let output = model.infer(input)?;
        let neighbors = match model.neighbor_lookup() {
            Some(lookup) => NeighborTokens::find(lookup, &output)?,
            None => NeighborTokens::default(),
        };
        Ok((output, neighbors))
    })?;

    clip.translation_context = context;
    clip.translation_result = Some(output.text);
    clip.embedding_neighbor_tokens_mae = neighbors.mae;
    clip.embedding_neighbor_tokens_dino = neighbors.dino;
    clip.embedding_neighbor_tokens_s2v = neighbors.s2v;
    Ok(())
}

#[derive(Default)]
struct NeighborTokens {
    mae: Option<Vec<String>>,
    dino: Option<Vec<String>>,
    s2v: Option<Vec<String>>,
}

impl NeighborTokens {
    fn find(lookup: &EmbeddingNeighborLookup, output: &TranslationOutput) -> Result<Self, PipelineError> {
        let tokens = |projected: &Option<ndarray::Array2<f32>>| {
            projected
                .as_ref()
                .map(|embeddings| lookup.find_neighbors_for(embeddings.view()))
                .transpose()
        };
        Ok(Self {
            mae: tokens(&output.projected_mae)?,
            dino: tokens(&output.projected_dino)?,
            s2v: tokens(&output.projected_s2v)?,
        })
    }
}

/// Translate a single clip again with a custom prompt and a subset of the
/// modalities. The stored collection is left untouched.
pub fn retranslate_clip(
    folder: &VideoFolder,
    clip: &Clip,
    prompt: &str,
    modalities: ModalitySelection,
    translator: &ModelCache<dyn Translator>,
) -> Result<String, PipelineError> {
    let mut features = load_features(folder)?.select_clip(clip)?;
    modalities.apply(&mut features);

    let input = TranslationInput {
        features,
        prompt: prompt.to_string(),
        generation: GenerationConfig::default(),
    };
    let output = translator.with_model(|model| model.infer(&input))?;
    Ok(output.text)
}

/// Returns `true` if the clips collection at `path` exists and every clip
/// has a translation.
pub fn is_fully_translated(path: &Path) -> Result<bool, PipelineError> {
    if !path.exists() {
        return Ok(false);
    }
    Ok(ClipsCollection::load(path)?.is_fully_translated())
}
