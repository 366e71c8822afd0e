//! Pipeline stages.
//!
//! The stage order is fixed for every video. Each stage is considered done
//! once its artifact exists in the video folder; see
//! [`VideoProcessor`](crate::VideoProcessor).

use std::fmt::{Display, Formatter, Result as FmtResult};

/// One step of the per-video pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Framerate/resolution normalization (and optional frame tagging).
    Normalize,
    /// Landmark detection and region-of-interest cropping.
    Geometry,
    /// Fixed-length clip segmentation.
    ClipSplit,
    /// MAE features over the full-body crops.
    MaeFeatures,
    /// Sign2Vec features over the per-clip landmarks.
    Sign2VecFeatures,
    /// DINO features over the face and hand crops.
    DinoFeatures,
    /// Sequential clip translation.
    Translate,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 7] = [
        Stage::Normalize,
        Stage::Geometry,
        Stage::ClipSplit,
        Stage::MaeFeatures,
        Stage::Sign2VecFeatures,
        Stage::DinoFeatures,
        Stage::Translate,
    ];

    /// Short lowercase name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Normalize => "normalize",
            Stage::Geometry => "geometry",
            Stage::ClipSplit => "clip-split",
            Stage::MaeFeatures => "mae",
            Stage::Sign2VecFeatures => "sign2vec",
            Stage::DinoFeatures => "dino",
            Stage::Translate => "translate",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}
