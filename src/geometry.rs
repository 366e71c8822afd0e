//! Per-frame body, hand and face geometry.
//!
//! Every coordinate is in the pixel space of the normalized video frame.
//! A video's geometry is persisted as one JSON array (`geometry.json`) with
//! one [`FrameGeometry`] per frame, landmark values rounded to two decimals.

use std::fs;
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::PipelineError;
use crate::utilities::write_json_atomically;

/// The landmark sets produced by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LandmarkKind {
    /// Body pose.
    Pose,
    /// Right hand.
    RightHand,
    /// Left hand.
    LeftHand,
    /// Face mesh.
    Face,
}

impl LandmarkKind {
    /// Number of points in a landmark set of this kind.
    pub const fn point_count(self) -> usize {
        match self {
            LandmarkKind::Pose => 33,
            LandmarkKind::RightHand | LandmarkKind::LeftHand => 21,
            LandmarkKind::Face => 478,
        }
    }
}

/// A landmark set: one `[x, y, z, visibility]` row per point.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Landmarks(Vec<[f64; 4]>);

impl Landmarks {
    /// Wrap `points`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::DetectorContract`] if the number of points does not
    /// match `kind`.
    pub fn new(kind: LandmarkKind, points: Vec<[f64; 4]>) -> Result<Self, PipelineError> {
        let landmarks = Self(points);
        landmarks.check(kind)?;
        Ok(landmarks)
    }

    /// A set of `kind` with every value zero.
    pub fn zeros(kind: LandmarkKind) -> Self {
        Self(vec![[0.0; 4]; kind.point_count()])
    }

    fn check(&self, kind: LandmarkKind) -> Result<(), PipelineError> {
        if self.0.len() != kind.point_count() {
            return Err(PipelineError::DetectorContract(format!(
                "{kind:?} landmarks have {} points, expected {}",
                self.0.len(),
                kind.point_count()
            )));
        }
        Ok(())
    }

    /// Borrow the points.
    pub fn points(&self) -> &[[f64; 4]] {
        &self.0
    }

    /// The points as a `[points, 4]` matrix.
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.0.len(), 4), |(row, column)| self.0[row][column])
    }
}

impl Serialize for Landmarks {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rounded: Vec<[f64; 4]> = self
            .0
            .iter()
            .map(|point| point.map(|value| (value * 100.0).round() / 100.0))
            .collect();
        rounded.serialize(serializer)
    }
}

/// An integer rectangle `[x_min, y_min, x_max, y_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    /// Left edge.
    pub x_min: i32,
    /// Top edge.
    pub y_min: i32,
    /// Right edge.
    pub x_max: i32,
    /// Bottom edge.
    pub y_max: i32,
}

impl BoundingBox {
    /// The rectangle covering an entire `width` × `height` frame.
    pub fn full_frame(width: u32, height: u32) -> Self {
        Self {
            x_min: 0,
            y_min: 0,
            x_max: width as i32,
            y_max: height as i32,
        }
    }

    /// Horizontal extent.
    pub fn width(&self) -> i32 {
        self.x_max - self.x_min
    }

    /// Vertical extent.
    pub fn height(&self) -> i32 {
        self.y_max - self.y_min
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from([x_min, y_min, x_max, y_max]: [i32; 4]) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max]
    }
}

/// Geometry detected in a single frame.
///
/// Missing landmark sets and boxes mean the part was not detected. The sign
/// space snaps to the full frame when no pose is detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameGeometry {
    /// 33 body pose landmarks.
    pub pose_landmarks: Option<Landmarks>,
    /// 21 right hand landmarks.
    pub right_hand_landmarks: Option<Landmarks>,
    /// 21 left hand landmarks.
    pub left_hand_landmarks: Option<Landmarks>,
    /// 478 face mesh landmarks.
    pub face_landmarks: Option<Landmarks>,
    /// The signing space rectangle used to produce the full crop.
    pub sign_space: BoundingBox,
    /// Right hand crop rectangle.
    pub right_hand_bbox: Option<BoundingBox>,
    /// Left hand crop rectangle.
    pub left_hand_bbox: Option<BoundingBox>,
    /// Face crop rectangle.
    pub face_bbox: Option<BoundingBox>,
}

impl FrameGeometry {
    /// Geometry of a frame in which nothing was detected.
    pub fn undetected(width: u32, height: u32) -> Self {
        Self {
            pose_landmarks: None,
            right_hand_landmarks: None,
            left_hand_landmarks: None,
            face_landmarks: None,
            sign_space: BoundingBox::full_frame(width, height),
            right_hand_bbox: None,
            left_hand_bbox: None,
            face_bbox: None,
        }
    }

    /// Borrow the landmark set of `kind`, if detected.
    pub fn landmarks(&self, kind: LandmarkKind) -> Option<&Landmarks> {
        match kind {
            LandmarkKind::Pose => self.pose_landmarks.as_ref(),
            LandmarkKind::RightHand => self.right_hand_landmarks.as_ref(),
            LandmarkKind::LeftHand => self.left_hand_landmarks.as_ref(),
            LandmarkKind::Face => self.face_landmarks.as_ref(),
        }
    }

    /// Check every present landmark set has the right number of points.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for kind in [
            LandmarkKind::Pose,
            LandmarkKind::RightHand,
            LandmarkKind::LeftHand,
            LandmarkKind::Face,
        ] {
            if let Some(landmarks) = self.landmarks(kind) {
                landmarks.check(kind)?;
            }
        }
        Ok(())
    }
}

/// Persist the geometry of every frame of a video.
pub fn store_geometry<P: AsRef<Path>>(path: P, frames: &[FrameGeometry]) -> Result<(), PipelineError> {
    write_json_atomically(path.as_ref(), frames)
}

/// Load geometry written by [`store_geometry`].
pub fn load_geometry<P: AsRef<Path>>(path: P) -> Result<Vec<FrameGeometry>, PipelineError> {
    let raw = fs::read(path.as_ref())?;
    let frames: Vec<FrameGeometry> = serde_json::from_slice(&raw)?;
    for geometry in &frames {
        geometry.validate()?;
    }
    Ok(frames)
}
