//! Video records and the on-disk layout of their artifacts.
//!
//! Every video owns a folder under the data root (`videos_data/<id>` by
//! default). Stage artifacts live at fixed names inside it; see
//! [`VideoFolder`]. The records themselves are kept together in a single
//! JSON file managed by [`VideosRepository`].

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::metadata::VideoFile;
use crate::stage::Stage;
use crate::utilities::write_json_atomically;

/// A video known to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    /// Unique identifier, also the name of the video folder.
    pub id: String,
    /// Human readable title.
    pub title: String,
    /// MIME type of the upload.
    pub media_type: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// The uploaded file, once the upload has completed.
    #[serde(default)]
    pub uploaded_file: Option<VideoFile>,
    /// The normalized file, once the normalize stage has run.
    #[serde(default)]
    pub normalized_file: Option<VideoFile>,
    /// Set while the pipeline runs on this video.
    #[serde(default)]
    pub is_processing: bool,
}

impl Video {
    /// A fresh record with no files attached.
    pub fn new(id: impl Into<String>, title: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            media_type: media_type.into(),
            created_at: Utc::now(),
            uploaded_file: None,
            normalized_file: None,
            is_processing: false,
        }
    }
}

/// All video records, persisted as one JSON array.
///
/// Every call re-reads the file, so several repositories over the same path
/// observe each other's writes. Writes from one repository are serialized.
#[derive(Debug)]
pub struct VideosRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl VideosRepository {
    /// A repository stored at `path`. The file is created on first write.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing JSON file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored record, in insertion order.
    pub fn all(&self) -> Result<Vec<Video>, PipelineError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };
        Ok(serde_json::from_slice(&raw)?)
    }

    /// The record with `id`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::VideoNotFound`] if there is none.
    pub fn get(&self, id: &str) -> Result<Video, PipelineError> {
        self.all()?
            .into_iter()
            .find(|video| video.id == id)
            .ok_or_else(|| PipelineError::VideoNotFound(id.to_string()))
    }

    /// Insert `video`, or replace the record with the same id.
    pub fn store(&self, video: &Video) -> Result<(), PipelineError> {
        let _guard = self.write_lock.lock();
        let mut videos = self.all()?;
        match videos.iter_mut().find(|stored| stored.id == video.id) {
            Some(stored) => *stored = video.clone(),
            None => videos.push(video.clone()),
        }
        write_json_atomically(&self.path, &videos)
    }

    /// Delete the record with `id`. Returns `false` if there was none.
    pub fn remove(&self, id: &str) -> Result<bool, PipelineError> {
        let _guard = self.write_lock.lock();
        let mut videos = self.all()?;
        let before = videos.len();
        videos.retain(|video| video.id != id);
        if videos.len() == before {
            return Ok(false);
        }
        write_json_atomically(&self.path, &videos)?;
        Ok(true)
    }
}

/// The folder holding one video's uploads and stage artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFolder {
    root: PathBuf,
}

impl VideoFolder {
    /// A folder rooted at `root`. Nothing is created on disk.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Create the folder if it does not exist yet.
    pub fn create(&self) -> Result<(), PipelineError> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Root of the folder.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a file recorded relative to this folder.
    pub fn resolve(&self, file: &VideoFile) -> PathBuf {
        self.root.join(&file.file_path)
    }

    /// Append-only processing log.
    pub fn log_file(&self) -> PathBuf {
        self.root.join("log.txt")
    }

    /// Output of the normalize stage.
    pub fn normalized_file(&self) -> PathBuf {
        self.root.join("normalized_file.mp4")
    }

    /// Per-frame landmark geometry.
    pub fn geometry_file(&self) -> PathBuf {
        self.root.join("geometry.json")
    }

    /// Left hand crops, one image per frame.
    pub fn cropped_left_hand_folder(&self) -> PathBuf {
        self.root.join("cropped_left_hand")
    }

    /// Right hand crops, one image per frame.
    pub fn cropped_right_hand_folder(&self) -> PathBuf {
        self.root.join("cropped_right_hand")
    }

    /// Face crops, one image per frame.
    pub fn cropped_face_folder(&self) -> PathBuf {
        self.root.join("cropped_face")
    }

    /// Sign space crops, one image per frame.
    pub fn cropped_images_folder(&self) -> PathBuf {
        self.root.join("cropped_images")
    }

    /// Clip boundaries and translations.
    pub fn clips_collection_file(&self) -> PathBuf {
        self.root.join("clips_collection.json")
    }

    /// MAE features, `[frames, 768]`.
    pub fn mae_features_file(&self) -> PathBuf {
        self.root.join("mae_features.npy")
    }

    /// Sign2Vec features, one archive entry per clip.
    pub fn s2v_features_file(&self) -> PathBuf {
        self.root.join("s2v_features.npz")
    }

    /// DINO features, `[frames, 1152]`.
    pub fn dino_features_file(&self) -> PathBuf {
        self.root.join("dino_features.npy")
    }

    /// The artifact whose presence marks `stage` as done. Translation shares
    /// the clips collection with clip splitting and is done only once every
    /// clip carries a translation.
    pub fn artifact(&self, stage: Stage) -> PathBuf {
        match stage {
            Stage::Normalize => self.normalized_file(),
            Stage::Geometry => self.geometry_file(),
            Stage::ClipSplit | Stage::Translate => self.clips_collection_file(),
            Stage::MaeFeatures => self.mae_features_file(),
            Stage::Sign2VecFeatures => self.s2v_features_file(),
            Stage::DinoFeatures => self.dino_features_file(),
        }
    }
}

/// Maps video ids to their folders under a common data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFolderFactory {
    data_root: PathBuf,
}

impl Default for VideoFolderFactory {
    fn default() -> Self {
        Self::new("videos_data")
    }
}

impl VideoFolderFactory {
    /// Video folders are created under `data_root`.
    pub fn new<P: AsRef<Path>>(data_root: P) -> Self {
        Self {
            data_root: data_root.as_ref().to_path_buf(),
        }
    }

    /// The folder of video `id`.
    pub fn folder_for(&self, id: &str) -> VideoFolder {
        VideoFolder::new(self.data_root.join(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_replaces_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let repository = VideosRepository::new(dir.path().join("videos.json"));
        assert!(repository.all().unwrap().is_empty());

        let mut video = Video::new("a", "First", "video/mp4");
        repository.store(&video).unwrap();
        repository.store(&Video::new("b", "Second", "video/webm")).unwrap();

        video.is_processing = true;
        repository.store(&video).unwrap();

        let videos = repository.all().unwrap();
        assert_eq!(videos.len(), 2);
        assert!(repository.get("a").unwrap().is_processing);
        assert_eq!(videos[1].title, "Second");
    }

    #[test]
    fn missing_video_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let repository = VideosRepository::new(dir.path().join("videos.json"));
        assert!(matches!(
            repository.get("nope"),
            Err(PipelineError::VideoNotFound(id)) if id == "nope"
        ));
        assert!(!repository.remove("nope").unwrap());
    }

    #[test]
    fn remove_deletes_record() {
        let dir = tempfile::tempdir().unwrap();
        let repository = VideosRepository::new(dir.path().join("videos.json"));
        repository.store(&Video::new("a", "First", "video/mp4")).unwrap();
        assert!(repository.remove("a").unwrap());
        assert!(repository.all().unwrap().is_empty());
    }

    #[test]
    fn folder_layout() {
        let folder = VideoFolderFactory::new("/data").folder_for("42");
        assert_eq!(folder.root(), Path::new("/data/42"));
        assert_eq!(folder.geometry_file(), Path::new("/data/42/geometry.json"));
        assert_eq!(folder.artifact(Stage::Translate), folder.clips_collection_file());
        assert_eq!(
            folder.artifact(Stage::DinoFeatures),
            Path::new("/data/42/dino_features.npy")
        );
    }
}
