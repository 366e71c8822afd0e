//! Clip segmentation metadata.
//!
//! A [`Clip`] is a contiguous run of frames translated as one unit. The
//! [`ClipsCollection`] holds every clip of a video in order together with a
//! frame-to-clip lookup table, and is persisted as `clips_collection.json`.

use std::fs;
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::utilities::write_json_atomically;

/// One translation unit of a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clip {
    /// Position of the clip in its collection.
    pub clip_index: usize,
    /// Index of the first frame in this clip.
    pub start_frame: usize,
    /// Number of frames in this clip.
    pub frame_count: usize,
    /// Rolling context that was passed to the translator for this clip.
    #[serde(default)]
    pub translation_context: Option<String>,
    /// Text obtained from the translation of this clip.
    #[serde(default)]
    pub translation_result: Option<String>,
    /// Nearest vocabulary token for each projected MAE embedding.
    #[serde(default)]
    pub embedding_neighbor_tokens_mae: Option<Vec<String>>,
    /// Nearest vocabulary token for each projected DINO embedding.
    #[serde(default)]
    pub embedding_neighbor_tokens_dino: Option<Vec<String>>,
    /// Nearest vocabulary token for each projected Sign2Vec embedding.
    #[serde(default)]
    pub embedding_neighbor_tokens_s2v: Option<Vec<String>>,
}

impl Clip {
    /// A clip with no translation attached yet.
    pub fn new(clip_index: usize, start_frame: usize, frame_count: usize) -> Self {
        Self {
            clip_index,
            start_frame,
            frame_count,
            translation_context: None,
            translation_result: None,
            embedding_neighbor_tokens_mae: None,
            embedding_neighbor_tokens_dino: None,
            embedding_neighbor_tokens_s2v: None,
        }
    }

    /// One past the last frame of the clip.
    pub fn end_frame(&self) -> usize {
        self.start_frame + self.frame_count
    }

    /// The frame indices covered by the clip.
    pub fn frame_range(&self) -> Range<usize> {
        self.start_frame..self.end_frame()
    }

    /// Returns `true` once the translation loop has produced text for it.
    pub fn is_translated(&self) -> bool {
        self.translation_result.is_some()
    }
}

/// All clips of a video, ordered by index, plus a frame-to-clip lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipsCollection {
    /// Clips ordered by `clip_index`.
    pub clips: Vec<Clip>,
    /// `clip_index_lookup[f]` is the index of the clip containing frame `f`.
    pub clip_index_lookup: Vec<usize>,
}

impl ClipsCollection {
    /// Wrap `clips` and build the lookup table.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ClipsNotContiguous`] if the clips leave a gap or
    /// overlap.
    pub fn from_clips(clips: Vec<Clip>) -> Result<Self, PipelineError> {
        let mut collection = Self {
            clips,
            clip_index_lookup: Vec::new(),
        };
        collection.recompute_lookup_table()?;
        Ok(collection)
    }

    /// Rebuild `clip_index_lookup` from the clips.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ClipsNotContiguous`] if a clip does not start where
    /// the previous one ended. The existing table is left untouched.
    pub fn recompute_lookup_table(&mut self) -> Result<(), PipelineError> {
        let mut lookup = Vec::with_capacity(self.total_frames());
        for (clip_index, clip) in self.clips.iter().enumerate() {
            if clip.start_frame != lookup.len() {
                return Err(PipelineError::ClipsNotContiguous {
                    clip_index,
                    start_frame: clip.start_frame,
                    expected: lookup.len(),
                });
            }
            lookup.resize(lookup.len() + clip.frame_count, clip_index);
        }
        self.clip_index_lookup = lookup;
        Ok(())
    }

    /// Index of the clip containing `frame_index`.
    pub fn clip_index_for_frame(&self, frame_index: usize) -> Result<usize, PipelineError> {
        self.clip_index_lookup
            .get(frame_index)
            .copied()
            .ok_or(PipelineError::IndexOutOfRange {
                what: "frame",
                index: frame_index,
                length: self.clip_index_lookup.len(),
            })
    }

    /// Borrow the clip at `clip_index`.
    pub fn clip(&self, clip_index: usize) -> Result<&Clip, PipelineError> {
        self.clips.get(clip_index).ok_or(PipelineError::IndexOutOfRange {
            what: "clip",
            index: clip_index,
            length: self.clips.len(),
        })
    }

    /// Number of clips.
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    /// Returns `true` if there are no clips.
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Sum of all clip lengths.
    pub fn total_frames(&self) -> usize {
        self.clips.iter().map(|clip| clip.frame_count).sum()
    }

    /// Returns `true` if every clip carries a translation.
    pub fn is_fully_translated(&self) -> bool {
        self.clips.iter().all(Clip::is_translated)
    }

    /// Persist the collection as JSON.
    pub fn store<P: AsRef<Path>>(&self, path: P) -> Result<(), PipelineError> {
        write_json_atomically(path.as_ref(), self)
    }

    /// Load a collection previously written by [`store`](ClipsCollection::store).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let raw = fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_maps_frames_to_clips() {
        let collection = ClipsCollection::from_clips(vec![
            Clip::new(0, 0, 3),
            Clip::new(1, 3, 2),
            Clip::new(2, 5, 1),
        ])
        .unwrap();

        assert_eq!(collection.clip_index_lookup, vec![0, 0, 0, 1, 1, 2]);
        assert_eq!(collection.clip_index_for_frame(4).unwrap(), 1);
        assert!(matches!(
            collection.clip_index_for_frame(6),
            Err(PipelineError::IndexOutOfRange { what: "frame", .. })
        ));
    }

    #[test]
    fn gap_between_clips_is_rejected() {
        let result = ClipsCollection::from_clips(vec![Clip::new(0, 0, 3), Clip::new(1, 4, 2)]);
        assert!(matches!(
            result,
            Err(PipelineError::ClipsNotContiguous {
                clip_index: 1,
                start_frame: 4,
                expected: 3
            })
        ));
    }

    #[test]
    fn overlap_keeps_previous_lookup() {
        let mut collection = ClipsCollection::from_clips(vec![Clip::new(0, 0, 2)]).unwrap();
        collection.clips.push(Clip::new(1, 1, 2));
        assert!(collection.recompute_lookup_table().is_err());
        assert_eq!(collection.clip_index_lookup, vec![0, 0]);
    }

    #[test]
    fn store_and_load_preserve_translations() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("clips_collection.json");

        let mut collection =
            ClipsCollection::from_clips(vec![Clip::new(0, 0, 2), Clip::new(1, 2, 2)]).unwrap();
        collection.clips[0].translation_result = Some("hello".to_string());
        collection.clips[0].embedding_neighbor_tokens_mae = Some(vec!["hi".to_string()]);
        collection.store(&path).unwrap();

        let loaded = ClipsCollection::load(&path).unwrap();
        assert_eq!(loaded, collection);
        assert!(!loaded.is_fully_translated());
        assert_eq!(loaded.clip(1).unwrap().frame_range(), 2..4);
    }
}
