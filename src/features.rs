//! Visual feature matrices of a video and of a single clip.
//!
//! MAE and DINO features are dense `[frames, dim]` matrices stored as `.npy`
//! files. Sign2Vec works per clip, so its features are a map from clip index
//! to a `[rows, 768]` matrix, stored as one `.npz` archive with an entry
//! named `clip_{index}` per clip. Each of the three is independent: any may
//! be absent without affecting the others.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::Path;

use ndarray::{Array2, s};
use ndarray_npy::{NpzReader, NpzWriter, read_npy, write_npy};

use crate::clip::Clip;
use crate::error::PipelineError;
use crate::utilities::write_atomically;

/// Width of an MAE embedding row.
pub const MAE_DIMENSION: usize = 768;
/// Width of one DINO embedding (face, left hand or right hand).
pub const DINO_PART_DIMENSION: usize = 384;
/// Width of a DINO row: face, left hand and right hand concatenated.
pub const DINO_DIMENSION: usize = 3 * DINO_PART_DIMENSION;
/// Width of a Sign2Vec embedding row.
pub const S2V_DIMENSION: usize = 768;

/// Sign2Vec features keyed by clip index.
pub type ClipFeatureMap = BTreeMap<usize, Array2<f32>>;

/// All visual features of one video.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoVisualFeatures {
    /// `[frames, 768]`.
    pub mae_features: Option<Array2<f32>>,
    /// `[frames, 1152]`.
    pub dino_features: Option<Array2<f32>>,
    /// `[rows, 768]` per clip.
    pub s2v_features: Option<ClipFeatureMap>,
}

/// The visual features of a single clip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipVisualFeatures {
    /// `[clip frames, 768]`.
    pub mae_features: Option<Array2<f32>>,
    /// `[clip frames, 1152]`.
    pub dino_features: Option<Array2<f32>>,
    /// `[rows, 768]`.
    pub s2v_features: Option<Array2<f32>>,
}

impl VideoVisualFeatures {
    /// Load whichever of the three feature files exist.
    pub fn load_all(mae_file: &Path, dino_file: &Path, s2v_file: &Path) -> Result<Self, PipelineError> {
        let features = Self {
            mae_features: load_matrix(mae_file)?,
            dino_features: load_matrix(dino_file)?,
            s2v_features: load_clip_map(s2v_file)?,
        };
        features.validate()?;
        Ok(features)
    }

    /// Check every present matrix has the expected width.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if let Some(mae) = &self.mae_features {
            check_width("MAE features", mae, MAE_DIMENSION)?;
        }
        if let Some(dino) = &self.dino_features {
            check_width("DINO features", dino, DINO_DIMENSION)?;
        }
        if let Some(s2v) = &self.s2v_features {
            for (clip_index, matrix) in s2v {
                check_width(&format!("Sign2Vec features of clip {clip_index}"), matrix, S2V_DIMENSION)?;
            }
        }
        Ok(())
    }

    /// Cut out the features belonging to `clip`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::IndexOutOfRange`] if the clip reaches past the MAE or
    /// DINO rows, or if Sign2Vec features are present but lack the clip.
    pub fn select_clip(&self, clip: &Clip) -> Result<ClipVisualFeatures, PipelineError> {
        let rows = |matrix: &Array2<f32>| -> Result<Array2<f32>, PipelineError> {
            if clip.end_frame() > matrix.nrows() {
                return Err(PipelineError::IndexOutOfRange {
                    what: "frame",
                    index: clip.end_frame() - 1,
                    length: matrix.nrows(),
                });
            }
            Ok(matrix.slice(s![clip.start_frame..clip.end_frame(), ..]).to_owned())
        };

        let mae_features = self.mae_features.as_ref().map(rows).transpose()?;
        let dino_features = self.dino_features.as_ref().map(rows).transpose()?;
        let s2v_features = match &self.s2v_features {
            Some(map) => Some(map.get(&clip.clip_index).cloned().ok_or(
                PipelineError::IndexOutOfRange {
                    what: "clip",
                    index: clip.clip_index,
                    length: map.len(),
                },
            )?),
            None => None,
        };

        Ok(ClipVisualFeatures {
            mae_features,
            dino_features,
            s2v_features,
        })
    }
}

/// Load a dense matrix, or `None` if the file does not exist.
pub fn load_matrix(path: &Path) -> Result<Option<Array2<f32>>, PipelineError> {
    if !path.is_file() {
        return Ok(None);
    }
    Ok(Some(read_npy(path)?))
}

/// Store a dense matrix through a temp file, so a partial write never
/// appears at `path`. `None` removes the file.
pub fn save_matrix(path: &Path, matrix: Option<&Array2<f32>>) -> Result<(), PipelineError> {
    match matrix {
        Some(matrix) => write_atomically(path, |temp_path| Ok(write_npy(temp_path, matrix)?)),
        None => remove_if_present(path),
    }
}

/// Load per-clip matrices, or `None` if the archive does not exist.
pub fn load_clip_map(path: &Path) -> Result<Option<ClipFeatureMap>, PipelineError> {
    if !path.is_file() {
        return Ok(None);
    }

    let mut archive = NpzReader::new(File::open(path)?)?;
    let mut map = ClipFeatureMap::new();
    for name in archive.names()? {
        let clip_index = name
            .strip_prefix("clip_")
            .and_then(|index| index.parse::<usize>().ok())
            .ok_or_else(|| {
                PipelineError::FeatureStore(format!("Unexpected entry {name} in {}", path.display()))
            })?;
        let matrix: Array2<f32> = archive.by_name(&name)?;
        map.insert(clip_index, matrix);
    }
    Ok(Some(map))
}

/// Store per-clip matrices through a temp file. `None` removes the archive.
pub fn save_clip_map(path: &Path, map: Option<&ClipFeatureMap>) -> Result<(), PipelineError> {
    let Some(map) = map else {
        return remove_if_present(path);
    };

    write_atomically(path, |temp_path| {
        let mut archive = NpzWriter::new(File::create(temp_path)?);
        for (clip_index, matrix) in map {
            archive.add_array(format!("clip_{clip_index}"), matrix)?;
        }
        archive.finish()?;
        Ok(())
    })
}

fn remove_if_present(path: &Path) -> Result<(), PipelineError> {
    match fs::remove_file(path) {
        Err(error) if error.kind() != ErrorKind::NotFound => Err(error.into()),
        _ => Ok(()),
    }
}

/// Check `matrix` has `expected` columns.
pub(crate) fn check_width(what: &str, matrix: &Array2<f32>, expected: usize) -> Result<(), PipelineError> {
    if matrix.ncols() != expected {
        return Err(PipelineError::DimensionMismatch {
            what: what.to_string(),
            expected,
            actual: matrix.ncols(),
        });
    }
    Ok(())
}
